//! Stream transforms
//!
//! Every method is exposed as an in-place, order-dependent keystream
//! transform: feeding a message in one piece or split at arbitrary points
//! yields the same output, which is what lets the relay accept whatever
//! chunk boundaries TCP hands it.

use super::{CryptoError, Method};
use cfb_mode::cipher::consts::U16;
use cfb_mode::cipher::{BlockCipher, BlockEncryptMut, KeyInit, KeyIvInit, StreamCipher};
use cfb_mode::{BufDecryptor, BufEncryptor};
use md5::{Digest, Md5};
use rc4::Rc4;

/// Which way a transform runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Encrypt,
    Decrypt,
}

/// A keyed stream transform applied in place
pub trait StreamTransform: Send {
    /// Transform `data` in place, continuing from the previous call
    fn apply(&mut self, data: &mut [u8]);
}

struct CfbEncrypt<C: BlockEncryptMut + BlockCipher>(BufEncryptor<C>);

impl<C> StreamTransform for CfbEncrypt<C>
where
    C: BlockEncryptMut + BlockCipher + Send,
{
    fn apply(&mut self, data: &mut [u8]) {
        self.0.encrypt(data);
    }
}

struct CfbDecrypt<C: BlockEncryptMut + BlockCipher>(BufDecryptor<C>);

impl<C> StreamTransform for CfbDecrypt<C>
where
    C: BlockEncryptMut + BlockCipher + Send,
{
    fn apply(&mut self, data: &mut [u8]) {
        self.0.decrypt(data);
    }
}

struct Rc4Transform(Rc4<U16>);

impl StreamTransform for Rc4Transform {
    fn apply(&mut self, data: &mut [u8]) {
        self.0.apply_keystream(data);
    }
}

fn cfb<C>(
    method: Method,
    direction: Direction,
    key: &[u8],
    iv: &[u8],
) -> Result<Box<dyn StreamTransform>, CryptoError>
where
    C: BlockEncryptMut + BlockCipher + KeyInit + Send + 'static,
{
    let invalid = |_| CryptoError::InvalidKeyLength(method);

    let transform: Box<dyn StreamTransform> = match direction {
        Direction::Encrypt => Box::new(CfbEncrypt(
            BufEncryptor::<C>::new_from_slices(key, iv).map_err(invalid)?,
        )),
        Direction::Decrypt => Box::new(CfbDecrypt(
            BufDecryptor::<C>::new_from_slices(key, iv).map_err(invalid)?,
        )),
    };
    Ok(transform)
}

fn rc4(method: Method, key: &[u8]) -> Result<Box<dyn StreamTransform>, CryptoError> {
    let cipher =
        Rc4::<U16>::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength(method))?;
    Ok(Box::new(Rc4Transform(cipher)))
}

/// Build the transform for `method`, keyed with `key` and seeded with `iv`
pub(crate) fn new_transform(
    method: Method,
    direction: Direction,
    key: &[u8],
    iv: &[u8],
) -> Result<Box<dyn StreamTransform>, CryptoError> {
    if key.len() != method.key_len() || iv.len() != method.iv_len() {
        return Err(CryptoError::InvalidKeyLength(method));
    }

    match method {
        Method::Aes128Cfb => cfb::<aes::Aes128>(method, direction, key, iv),
        Method::Aes192Cfb => cfb::<aes::Aes192>(method, direction, key, iv),
        Method::Aes256Cfb => cfb::<aes::Aes256>(method, direction, key, iv),
        Method::BfCfb => cfb::<blowfish::Blowfish>(method, direction, key, iv),
        Method::Camellia128Cfb => cfb::<camellia::Camellia128>(method, direction, key, iv),
        Method::Camellia192Cfb => cfb::<camellia::Camellia192>(method, direction, key, iv),
        Method::Camellia256Cfb => cfb::<camellia::Camellia256>(method, direction, key, iv),
        Method::Cast5Cfb => cfb::<cast5::Cast5>(method, direction, key, iv),
        Method::DesCfb => cfb::<des::Des>(method, direction, key, iv),
        Method::IdeaCfb => cfb::<idea::Idea>(method, direction, key, iv),
        Method::Rc2Cfb => cfb::<rc2::Rc2>(method, direction, key, iv),
        Method::Rc4 => rc4(method, key),
        // RC4 keystream keyed per session with MD5(key ‖ iv)
        Method::Rc4Md5 => {
            let mut hasher = Md5::new();
            hasher.update(key);
            hasher.update(iv);
            let session_key = hasher.finalize();
            rc4(method, &session_key)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    #[test]
    fn test_aes128_cfb_known_answer() {
        // NIST SP 800-38A, F.3.13 CFB128-AES128.Encrypt, first block
        let key = hex("2b7e151628aed2a6abf7158809cf4f3c");
        let iv = hex("000102030405060708090a0b0c0d0e0f");
        let mut data = hex("6bc1bee22e409f96e93d7e117393172a");

        let mut enc = new_transform(Method::Aes128Cfb, Direction::Encrypt, &key, &iv).unwrap();
        enc.apply(&mut data);
        assert_eq!(data, hex("3b3fd92eb72dad20333449f8e83cfb4a"));
    }

    #[test]
    fn test_every_method_roundtrip() {
        let plaintext = b"The quick brown fox jumps over the lazy dog".to_vec();

        for method in Method::all() {
            let key = vec![0x42u8; method.key_len()];
            let iv = vec![0x24u8; method.iv_len()];

            let mut enc = new_transform(method, Direction::Encrypt, &key, &iv).unwrap();
            let mut dec = new_transform(method, Direction::Decrypt, &key, &iv).unwrap();

            let mut data = plaintext.clone();
            enc.apply(&mut data);
            assert_ne!(data, plaintext, "{} left data unchanged", method);
            dec.apply(&mut data);
            assert_eq!(data, plaintext, "{} failed to roundtrip", method);
        }
    }

    #[test]
    fn test_split_equals_whole() {
        let key = [7u8; 16];
        let iv = [9u8; 16];
        let plaintext: Vec<u8> = (0..100u8).collect();

        let mut whole = plaintext.clone();
        new_transform(Method::Aes128Cfb, Direction::Encrypt, &key, &iv)
            .unwrap()
            .apply(&mut whole);

        let mut split = plaintext.clone();
        let mut enc = new_transform(Method::Aes128Cfb, Direction::Encrypt, &key, &iv).unwrap();
        let (head, tail) = split.split_at_mut(5);
        enc.apply(head);
        let (mid, rest) = tail.split_at_mut(33);
        enc.apply(mid);
        enc.apply(rest);

        assert_eq!(whole, split);
    }

    #[test]
    fn test_wrong_lengths_rejected() {
        assert!(matches!(
            new_transform(Method::Aes256Cfb, Direction::Encrypt, &[0u8; 16], &[0u8; 16]),
            Err(CryptoError::InvalidKeyLength(Method::Aes256Cfb))
        ));
        assert!(matches!(
            new_transform(Method::BfCfb, Direction::Decrypt, &[0u8; 16], &[0u8; 16]),
            Err(CryptoError::InvalidKeyLength(Method::BfCfb))
        ));
    }
}
