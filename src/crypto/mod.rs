//! Cryptographic layer for the relay protocol
//!
//! This module provides:
//! - The fixed cipher method table (key and IV lengths per method)
//! - Password-based key derivation with a process-lifetime cache
//! - Stream transforms over the supported block ciphers in CFB mode and RC4
//! - Per-connection cipher sessions with lazily opened halves
//!
//! The primitives themselves come from the RustCrypto crates; only key
//! scheduling and IV chaining live here.

mod kdf;
mod method;
mod session;
mod stream;

pub use kdf::{evp_bytes_to_key, KeyCache};
pub use method::{Method, MethodDescriptor};
pub use session::{CipherSession, DecryptHalf, EncryptHalf, HalfState};
pub use stream::{Direction, StreamTransform};

use thiserror::Error;

/// Cryptographic errors
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Unsupported method: {0}")]
    UnsupportedMethod(String),

    #[error("Malformed header: expected at least {expected} bytes of IV, got {actual}")]
    MalformedHeader { expected: usize, actual: usize },

    #[error("Invalid key or IV length for {0}")]
    InvalidKeyLength(Method),

    #[error("Random number generation failed")]
    Random,
}

/// Fill `buf` from the system CSPRNG
pub fn random_bytes(buf: &mut [u8]) -> Result<(), CryptoError> {
    use ring::rand::{SecureRandom, SystemRandom};
    let rng = SystemRandom::new();
    rng.fill(buf).map_err(|_| CryptoError::Random)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_bytes() {
        let mut buf1 = [0u8; 32];
        let mut buf2 = [0u8; 32];
        random_bytes(&mut buf1).unwrap();
        random_bytes(&mut buf2).unwrap();
        assert_ne!(buf1, buf2);
    }

    #[test]
    fn test_random_bytes_empty() {
        let mut buf = [0u8; 0];
        random_bytes(&mut buf).unwrap();
    }
}
