use std::time::{Duration, SystemTime};
use serde::{Deserialize, Serialize};

use crate::codec;
use crate::error::Result;

/// A stored value with its timing metadata
///
/// This is also the self-describing on-disk format of the disk cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Key the value was stored under
    pub key: String,

    /// Opaque payload
    pub value: Vec<u8>,

    /// Time of the last `set`
    pub created_at: SystemTime,

    /// Expiry time, if any
    pub expires_at: Option<SystemTime>,
}

impl CacheEntry {
    /// Create an entry stamped at `now`
    pub fn new(key: &str, value: &[u8], now: SystemTime, ttl: Option<Duration>) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_vec(),
            created_at: now,
            expires_at: ttl.and_then(|ttl| now.checked_add(ttl)),
        }
    }

    /// Check if the entry is expired at `now`
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        is_expired(self.expires_at, now)
    }

    /// Size of the payload in bytes
    pub fn size(&self) -> usize {
        self.value.len()
    }

    /// Encode the entry for storage
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        codec::encode(self)
    }

    /// Decode a stored entry
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        codec::decode(bytes)
    }
}

pub(crate) fn is_expired(expires_at: Option<SystemTime>, now: SystemTime) -> bool {
    match expires_at {
        Some(expires_at) => now >= expires_at,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_boundary() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
        let entry = CacheEntry::new("k", b"v", now, Some(Duration::from_secs(10)));

        assert!(!entry.is_expired_at(now + Duration::from_secs(9)));
        assert!(entry.is_expired_at(now + Duration::from_secs(10)));
    }

    #[test]
    fn test_no_ttl_never_expires() {
        let now = SystemTime::UNIX_EPOCH;
        let entry = CacheEntry::new("k", b"v", now, None);
        assert!(!entry.is_expired_at(now + Duration::from_secs(1 << 40)));
    }

    #[test]
    fn test_bytes() {
        let entry = CacheEntry::new("k", b"payload", SystemTime::now(), Some(Duration::from_secs(1)));
        let decoded = CacheEntry::from_bytes(&entry.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, entry);
        assert_eq!(decoded.size(), 7);
    }
}
