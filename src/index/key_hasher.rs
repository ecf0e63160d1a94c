use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Supplies the 64-bit key hash the index projects down to 32 bits for
/// addressing.
pub trait KeyHasher: Send + Sync {
    fn hash_key(&self, key: u32) -> u64;
}

/// SipHash via the standard library's `DefaultHasher`.
pub struct DefaultKeyHasher;

impl KeyHasher for DefaultKeyHasher {
    fn hash_key(&self, key: u32) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }
}

/// Passes the key through unchanged. Useful when a caller needs full
/// control over bucket placement, e.g. to provoke splits in tests.
pub struct IdentityKeyHasher;

impl KeyHasher for IdentityKeyHasher {
    fn hash_key(&self, key: u32) -> u64 {
        key as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_hasher_is_deterministic() {
        let hasher = DefaultKeyHasher;
        assert_eq!(hasher.hash_key(42), hasher.hash_key(42));
        assert_ne!(hasher.hash_key(42), hasher.hash_key(43));
    }

    #[test]
    fn test_identity_hasher_passes_through() {
        let hasher = IdentityKeyHasher;
        assert_eq!(hasher.hash_key(0xDEAD_BEEF), 0xDEAD_BEEF);
    }
}
