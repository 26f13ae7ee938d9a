use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Encode a value into the byte form stored by the cache backends
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode::serde::encode_to_vec(value, bincode::config::standard())?)
}

/// Decode a value previously produced by [`encode`]
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;

    #[test]
    fn test_structured_value() {
        let value = (String::from("persona"), vec![0.25f32, -1.5], Some(3u64));
        let bytes = encode(&value).unwrap();
        let decoded: (String, Vec<f32>, Option<u64>) = decode(&bytes).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_truncated_input_is_error() {
        let bytes = encode(&String::from("a fairly long string")).unwrap();
        let result: Result<String> = decode(&bytes[..4]);
        assert!(matches!(result, Err(CacheError::Deserialization(_))));
    }
}
