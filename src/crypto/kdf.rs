//! Key Derivation Functions
//!
//! Stretches a shared password into a method key with OpenSSL's
//! `EVP_BytesToKey` (MD5, one round, no salt):
//! `h0 = MD5(secret)`, `hi = MD5(h(i-1) ‖ secret)`, key = `h0 ‖ h1 ‖ …`
//! truncated to the method's key length.

use super::Method;
use md5::{Digest, Md5};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Derive `key_len` bytes from `secret`
pub fn evp_bytes_to_key(secret: &[u8], key_len: usize) -> Vec<u8> {
    let mut key = Vec::with_capacity(key_len + 16);
    let mut prev: Option<[u8; 16]> = None;

    while key.len() < key_len {
        let mut hasher = Md5::new();
        if let Some(prev) = &prev {
            hasher.update(prev);
        }
        hasher.update(secret);
        let digest: [u8; 16] = hasher.finalize().into();
        key.extend_from_slice(&digest);
        prev = Some(digest);
    }

    key.truncate(key_len);
    key
}

/// Derived keys, memoized by `(method, secret)`
///
/// Entries are never evicted; a process only ever sees a handful of
/// distinct pairs. A hit hands back the very same allocation.
#[derive(Debug, Default)]
pub struct KeyCache {
    keys: RwLock<HashMap<(Method, String), Arc<[u8]>>>,
}

impl KeyCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Key for `method` derived from `secret`
    pub fn derive(&self, method: Method, secret: &str) -> Arc<[u8]> {
        let index = (method, secret.to_string());

        if let Some(key) = self.keys.read().get(&index) {
            return Arc::clone(key);
        }

        let mut keys = self.keys.write();
        let key = keys
            .entry(index)
            .or_insert_with(|| evp_bytes_to_key(secret.as_bytes(), method.key_len()).into());
        Arc::clone(key)
    }

    /// Number of cached keys
    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    /// Whether nothing has been derived yet
    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_md5_of_password() {
        // MD5("password")
        let expected = [
            0x5f, 0x4d, 0xcc, 0x3b, 0x5a, 0xa7, 0x65, 0xd6, 0x1d, 0x83, 0x27, 0xde, 0xb8, 0x82,
            0xcf, 0x99,
        ];
        assert_eq!(evp_bytes_to_key(b"password", 16), expected);
    }

    #[test]
    fn test_chaining() {
        let key = evp_bytes_to_key(b"secret", 32);
        let h0: [u8; 16] = Md5::digest(b"secret").into();
        let mut hasher = Md5::new();
        hasher.update(h0);
        hasher.update(b"secret");
        let h1: [u8; 16] = hasher.finalize().into();

        assert_eq!(&key[..16], &h0);
        assert_eq!(&key[16..], &h1);
    }

    #[test]
    fn test_truncation() {
        let long = evp_bytes_to_key(b"secret", 32);
        let mid = evp_bytes_to_key(b"secret", 24);
        let short = evp_bytes_to_key(b"secret", 8);

        assert_eq!(mid.len(), 24);
        assert_eq!(short.len(), 8);
        assert_eq!(&long[..24], &mid[..]);
        assert_eq!(&long[..8], &short[..]);
    }

    #[test]
    fn test_cache_deterministic() {
        let cache = KeyCache::new();
        let key1 = cache.derive(Method::Aes256Cfb, "hunter2");
        let key2 = cache.derive(Method::Aes256Cfb, "hunter2");

        assert_eq!(key1, key2);
        assert!(Arc::ptr_eq(&key1, &key2));
        assert_eq!(key1.len(), Method::Aes256Cfb.key_len());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_separates_methods_and_secrets() {
        let cache = KeyCache::new();
        let a = cache.derive(Method::Aes128Cfb, "one");
        let b = cache.derive(Method::Aes256Cfb, "one");
        let c = cache.derive(Method::Aes128Cfb, "two");

        assert_eq!(&a[..], &b[..16]);
        assert_ne!(a, c);
        assert_eq!(cache.len(), 3);
    }
}
