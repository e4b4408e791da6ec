//! Cipher method table

use super::CryptoError;
use std::fmt;
use std::str::FromStr;

/// Supported stream cipher methods
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Method {
    #[default]
    Aes128Cfb,
    Aes192Cfb,
    Aes256Cfb,
    BfCfb,
    Camellia128Cfb,
    Camellia192Cfb,
    Camellia256Cfb,
    Cast5Cfb,
    DesCfb,
    IdeaCfb,
    Rc2Cfb,
    Rc4,
    Rc4Md5,
}

/// Static parameters of a method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub method: Method,
    pub name: &'static str,
    pub key_len: usize,
    pub iv_len: usize,
}

const fn descriptor(method: Method, name: &'static str, key_len: usize, iv_len: usize) -> MethodDescriptor {
    MethodDescriptor {
        method,
        name,
        key_len,
        iv_len,
    }
}

static METHODS: [MethodDescriptor; 13] = [
    descriptor(Method::Aes128Cfb, "aes-128-cfb", 16, 16),
    descriptor(Method::Aes192Cfb, "aes-192-cfb", 24, 16),
    descriptor(Method::Aes256Cfb, "aes-256-cfb", 32, 16),
    descriptor(Method::BfCfb, "bf-cfb", 16, 8),
    descriptor(Method::Camellia128Cfb, "camellia-128-cfb", 16, 16),
    descriptor(Method::Camellia192Cfb, "camellia-192-cfb", 24, 16),
    descriptor(Method::Camellia256Cfb, "camellia-256-cfb", 32, 16),
    descriptor(Method::Cast5Cfb, "cast5-cfb", 16, 8),
    descriptor(Method::DesCfb, "des-cfb", 8, 8),
    descriptor(Method::IdeaCfb, "idea-cfb", 16, 8),
    descriptor(Method::Rc2Cfb, "rc2-cfb", 16, 8),
    descriptor(Method::Rc4, "rc4", 16, 0),
    descriptor(Method::Rc4Md5, "rc4-md5", 16, 16),
];

impl Method {
    /// Every supported method, in table order
    pub fn all() -> impl Iterator<Item = Method> {
        METHODS.iter().map(|d| d.method)
    }

    /// Table entry for this method
    pub fn descriptor(self) -> &'static MethodDescriptor {
        // Table order matches variant order
        &METHODS[self as usize]
    }

    /// Canonical method name
    pub fn name(self) -> &'static str {
        self.descriptor().name
    }

    /// Key length in bytes
    pub fn key_len(self) -> usize {
        self.descriptor().key_len
    }

    /// IV length in bytes
    pub fn iv_len(self) -> usize {
        self.descriptor().iv_len
    }
}

impl FromStr for Method {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        METHODS
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.method)
            .ok_or_else(|| CryptoError::UnsupportedMethod(s.to_string()))
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
