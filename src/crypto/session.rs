//! Per-connection cipher sessions
//!
//! A session is two independent halves. The encrypt half opens on its first
//! chunk with a fresh random IV which it prepends to that chunk's output.
//! The decrypt half opens on its first chunk by consuming the IV the peer
//! prepended. After opening, chunks pass straight through the retained
//! keystream with no header.

use super::stream::{new_transform, Direction, StreamTransform};
use super::{random_bytes, CryptoError, KeyCache, Method};
use bytes::{Bytes, BytesMut};
use std::fmt;
use std::sync::Arc;

/// Whether a half has consumed or emitted its IV yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalfState {
    Unopened,
    Open,
}

/// Outbound half of a [`CipherSession`]
pub struct EncryptHalf {
    method: Method,
    key: Arc<[u8]>,
    stream: Option<Box<dyn StreamTransform>>,
}

impl EncryptHalf {
    fn new(method: Method, key: Arc<[u8]>) -> Self {
        Self {
            method,
            key,
            stream: None,
        }
    }

    /// Current state
    pub fn state(&self) -> HalfState {
        if self.stream.is_some() {
            HalfState::Open
        } else {
            HalfState::Unopened
        }
    }

    /// Encrypt the next plaintext chunk.
    ///
    /// The first call returns `IV ‖ ciphertext`, later calls ciphertext only.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Bytes, CryptoError> {
        if let Some(stream) = self.stream.as_mut() {
            let mut out = BytesMut::from(plaintext);
            stream.apply(&mut out);
            return Ok(out.freeze());
        }

        let iv_len = self.method.iv_len();
        let mut out = BytesMut::zeroed(iv_len);
        random_bytes(&mut out)?;

        let mut stream = new_transform(self.method, Direction::Encrypt, &self.key, &out)?;
        out.extend_from_slice(plaintext);
        stream.apply(&mut out[iv_len..]);

        self.stream = Some(stream);
        Ok(out.freeze())
    }
}

impl fmt::Debug for EncryptHalf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptHalf")
            .field("method", &self.method)
            .field("state", &self.state())
            .finish()
    }
}

/// Inbound half of a [`CipherSession`]
pub struct DecryptHalf {
    method: Method,
    key: Arc<[u8]>,
    stream: Option<Box<dyn StreamTransform>>,
}

impl DecryptHalf {
    fn new(method: Method, key: Arc<[u8]>) -> Self {
        Self {
            method,
            key,
            stream: None,
        }
    }

    /// Current state
    pub fn state(&self) -> HalfState {
        if self.stream.is_some() {
            HalfState::Open
        } else {
            HalfState::Unopened
        }
    }

    /// Bytes the next chunk must hold at minimum: the IV length until the
    /// half is open, zero afterwards.
    pub fn min_chunk_len(&self) -> usize {
        match self.state() {
            HalfState::Unopened => self.method.iv_len(),
            HalfState::Open => 0,
        }
    }

    /// Decrypt the next ciphertext chunk.
    ///
    /// The first call splits the IV off the front of `ciphertext`; it fails
    /// with [`CryptoError::MalformedHeader`] if the chunk is shorter than
    /// the IV.
    pub fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Bytes, CryptoError> {
        if let Some(stream) = self.stream.as_mut() {
            let mut out = BytesMut::from(ciphertext);
            stream.apply(&mut out);
            return Ok(out.freeze());
        }

        let iv_len = self.method.iv_len();
        if ciphertext.len() < iv_len {
            return Err(CryptoError::MalformedHeader {
                expected: iv_len,
                actual: ciphertext.len(),
            });
        }

        let (iv, body) = ciphertext.split_at(iv_len);
        let mut stream = new_transform(self.method, Direction::Decrypt, &self.key, iv)?;
        let mut out = BytesMut::from(body);
        stream.apply(&mut out);

        self.stream = Some(stream);
        Ok(out.freeze())
    }
}

impl fmt::Debug for DecryptHalf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptHalf")
            .field("method", &self.method)
            .field("state", &self.state())
            .finish()
    }
}

/// Encrypt and decrypt state for one connection
#[derive(Debug)]
pub struct CipherSession {
    method: Method,
    encrypt: EncryptHalf,
    decrypt: DecryptHalf,
}

impl CipherSession {
    /// Create a session whose halves are both unopened
    pub fn new(method: Method, keys: &KeyCache, secret: &str) -> Self {
        let key = keys.derive(method, secret);
        Self {
            method,
            encrypt: EncryptHalf::new(method, Arc::clone(&key)),
            decrypt: DecryptHalf::new(method, key),
        }
    }

    /// Method in use
    pub fn method(&self) -> Method {
        self.method
    }

    /// Encrypt an outbound chunk, opening the encrypt half if needed
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Bytes, CryptoError> {
        self.encrypt.encrypt(plaintext)
    }

    /// Decrypt an inbound chunk, opening the decrypt half if needed
    pub fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Bytes, CryptoError> {
        self.decrypt.decrypt(ciphertext)
    }

    /// State of the encrypt half
    pub fn encrypt_state(&self) -> HalfState {
        self.encrypt.state()
    }

    /// State of the decrypt half
    pub fn decrypt_state(&self) -> HalfState {
        self.decrypt.state()
    }

    /// Split into independently owned halves
    pub fn into_halves(self) -> (EncryptHalf, DecryptHalf) {
        (self.encrypt, self.decrypt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn session(method: Method) -> CipherSession {
        CipherSession::new(method, &KeyCache::new(), "test password")
    }

    #[test]
    fn test_roundtrip_single_chunk() {
        let mut local = session(Method::Aes256Cfb);
        let mut remote = session(Method::Aes256Cfb);

        let ciphertext = local.encrypt(b"hello relay").unwrap();
        assert_eq!(ciphertext.len(), 16 + 11);

        let plaintext = remote.decrypt(&ciphertext).unwrap();
        assert_eq!(&plaintext[..], b"hello relay");
    }

    #[test]
    fn test_iv_only_on_first_chunk() {
        let mut local = session(Method::BfCfb);
        let mut remote = session(Method::BfCfb);

        assert_eq!(local.encrypt_state(), HalfState::Unopened);
        let first = local.encrypt(b"abc").unwrap();
        assert_eq!(local.encrypt_state(), HalfState::Open);
        let second = local.encrypt(b"defg").unwrap();

        assert_eq!(first.len(), 8 + 3);
        assert_eq!(second.len(), 4);

        assert_eq!(&remote.decrypt(&first).unwrap()[..], b"abc");
        assert_eq!(remote.decrypt_state(), HalfState::Open);
        assert_eq!(&remote.decrypt(&second).unwrap()[..], b"defg");
    }

    #[test]
    fn test_iv_uniqueness() {
        let keys = KeyCache::new();
        let mut a = CipherSession::new(Method::Aes128Cfb, &keys, "same");
        let mut b = CipherSession::new(Method::Aes128Cfb, &keys, "same");

        let ct_a = a.encrypt(b"identical plaintext").unwrap();
        let ct_b = b.encrypt(b"identical plaintext").unwrap();

        assert_ne!(&ct_a[..16], &ct_b[..16]);
        assert_ne!(&ct_a[16..], &ct_b[16..]);
    }

    #[test]
    fn test_malformed_header() {
        let mut remote = session(Method::Aes128Cfb);
        let err = remote.decrypt(&[0u8; 10]).unwrap_err();
        assert!(matches!(
            err,
            CryptoError::MalformedHeader {
                expected: 16,
                actual: 10
            }
        ));
        assert_eq!(remote.decrypt_state(), HalfState::Unopened);
    }

    #[test]
    fn test_halves_are_independent() {
        let mut a = session(Method::Camellia128Cfb);
        let mut b = session(Method::Camellia128Cfb);

        let to_b = a.encrypt(b"ping").unwrap();
        assert_eq!(a.decrypt_state(), HalfState::Unopened);

        assert_eq!(&b.decrypt(&to_b).unwrap()[..], b"ping");
        assert_eq!(b.encrypt_state(), HalfState::Unopened);

        let to_a = b.encrypt(b"pong").unwrap();
        assert_eq!(&a.decrypt(&to_a).unwrap()[..], b"pong");
    }

    #[test]
    fn test_rc4_has_no_iv() {
        let mut a = session(Method::Rc4);
        let mut b = session(Method::Rc4);
        let ct = a.encrypt(b"no header").unwrap();
        assert_eq!(ct.len(), 9);
        assert_eq!(&b.decrypt(&ct).unwrap()[..], b"no header");
    }

    #[test]
    fn test_wrong_password_garbles() {
        let keys = KeyCache::new();
        let mut a = CipherSession::new(Method::Aes128Cfb, &keys, "right");
        let mut b = CipherSession::new(Method::Aes128Cfb, &keys, "wrong");
        let ct = a.encrypt(b"secret message").unwrap();
        assert_ne!(&b.decrypt(&ct).unwrap()[..], b"secret message");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Arbitrary chunking on either side never changes the plaintext
        #[test]
        fn prop_multi_chunk_roundtrip(
            data in proptest::collection::vec(any::<u8>(), 0..2048),
            enc_cuts in proptest::collection::vec(any::<usize>(), 0..6),
            dec_cuts in proptest::collection::vec(any::<usize>(), 0..6),
        ) {
            let mut local = session(Method::Aes128Cfb);
            let mut remote = session(Method::Aes128Cfb);

            let mut ciphertext = Vec::new();
            for chunk in split_at_cuts(&data, 0, &enc_cuts) {
                ciphertext.extend_from_slice(&local.encrypt(chunk).unwrap());
            }
            if ciphertext.is_empty() {
                ciphertext.extend_from_slice(&local.encrypt(&[]).unwrap());
            }

            let mut plaintext = Vec::new();
            for chunk in split_at_cuts(&ciphertext, 16, &dec_cuts) {
                plaintext.extend_from_slice(&remote.decrypt(chunk).unwrap());
            }

            prop_assert_eq!(plaintext, data);
        }
    }

    /// Split `data` at the given cut points, never cutting before `min_first`
    fn split_at_cuts<'a>(data: &'a [u8], min_first: usize, cuts: &[usize]) -> Vec<&'a [u8]> {
        if data.is_empty() {
            return Vec::new();
        }
        let span = data.len() - min_first + 1;
        let mut points: Vec<usize> = cuts.iter().map(|c| min_first + c % span).collect();
        points.push(data.len());
        points.sort_unstable();
        points.dedup();

        let mut chunks = Vec::new();
        let mut start = 0;
        for point in points {
            if point > start {
                chunks.push(&data[start..point]);
                start = point;
            }
        }
        chunks
    }
}
