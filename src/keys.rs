// Cache key derivation
//
// Keys are built from a caller prefix, a function or model name, and an
// optional SHA-256 digest of the bincode-encoded arguments. The digest is
// stable across processes, so memoized results survive restarts when they
// live in the disk cache.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::codec;
use crate::error::Result;

/// Hex SHA-256 digest of a byte slice
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Hex SHA-256 digest of a serializable value
pub fn hash_value<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let bytes = codec::encode(value)?;
    Ok(hash_bytes(&bytes))
}

/// Hex SHA-256 digest of a vector's f32 bit patterns
pub fn hash_vector(vector: &[f32]) -> String {
    let mut hasher = Sha256::new();
    for value in vector {
        hasher.update(value.to_le_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Derive a memoization key
///
/// Without `args` every call of `name` shares one key.
pub fn derive_key<A: Serialize + ?Sized>(prefix: &str, name: &str, args: Option<&A>) -> Result<String> {
    match args {
        Some(args) => Ok(format!("{}{}:{}", prefix, name, hash_value(args)?)),
        None => Ok(format!("{}{}", prefix, name)),
    }
}
