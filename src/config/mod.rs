//! Configuration management

use crate::crypto::Method;
use crate::protocol::{DEFAULT_LOCAL_PORT, DEFAULT_SERVER_PORT, DEFAULT_TIMEOUT};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Local agent configuration
    #[serde(default)]
    pub local: Option<LocalConfig>,
    /// Server agent configuration
    #[serde(default)]
    pub server: Option<ServerConfig>,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, crate::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config: {}", e)))?;

        Self::parse(&content)
    }

    /// Load configuration from file, falling back to defaults if it does not exist
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, crate::Error> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, crate::Error> {
        toml::from_str(content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), crate::Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::Error::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| crate::Error::Config(format!("Failed to write config: {}", e)))
    }
}

/// Local (SOCKS5 front-end) agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Server agent address
    #[serde(alias = "serverAddr", alias = "server")]
    pub server_addr: String,
    /// Server agent port
    #[serde(alias = "serverPort")]
    pub server_port: u16,
    /// SOCKS5 listen address
    #[serde(alias = "localAddr")]
    pub local_addr: String,
    /// SOCKS5 listen port
    #[serde(alias = "localPort")]
    pub local_port: u16,
    /// Shared secret
    pub password: String,
    /// Cipher method name
    pub method: String,
    /// Remote connect timeout in seconds (0 disables)
    pub timeout: u64,
    /// Destinations refused without a reply
    pub blocked_hosts: Vec<String>,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1".to_string(),
            server_port: DEFAULT_SERVER_PORT,
            local_addr: "127.0.0.1".to_string(),
            local_port: DEFAULT_LOCAL_PORT,
            password: String::new(),
            method: Method::default().name().to_string(),
            timeout: DEFAULT_TIMEOUT,
            blocked_hosts: Vec::new(),
        }
    }
}

impl LocalConfig {
    /// Parsed cipher method
    pub fn method(&self) -> Result<Method, crate::crypto::CryptoError> {
        self.method.parse()
    }

    /// Timeout as a duration; zero means none
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

/// Server agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    #[serde(alias = "serverAddr", alias = "server")]
    pub server_addr: String,
    /// Listen port
    #[serde(alias = "serverPort")]
    pub server_port: u16,
    /// Shared secret
    pub password: String,
    /// Cipher method name
    pub method: String,
    /// Per-connection watchdog in seconds (0 disables)
    pub timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_addr: "0.0.0.0".to_string(),
            server_port: DEFAULT_SERVER_PORT,
            password: String::new(),
            method: Method::default().name().to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ServerConfig {
    /// Parsed cipher method
    pub fn method(&self) -> Result<Method, crate::crypto::CryptoError> {
        self.method.parse()
    }

    /// Watchdog duration; zero means none
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (error, warn, verbose, info, debug, trace)
    pub level: String,
    /// Log file path (optional, appended to)
    #[serde(alias = "logPath")]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Filter directive for `tracing_subscriber::EnvFilter`
    pub fn filter_directive(&self) -> String {
        level_directive(&self.level)
    }
}

/// Map a configured level to a tracing directive; `verbose` means `info`
pub fn level_directive(level: &str) -> String {
    match level.trim().to_ascii_lowercase().as_str() {
        "verbose" => "info".to_string(),
        other => other.to_string(),
    }
}

/// Generate example configuration
pub fn generate_example_config() -> Config {
    Config {
        local: Some(LocalConfig {
            password: "change-me".to_string(),
            ..LocalConfig::default()
        }),
        server: Some(ServerConfig {
            password: "change-me".to_string(),
            ..ServerConfig::default()
        }),
        logging: LoggingConfig::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let local = LocalConfig::default();
        assert_eq!(local.local_addr, "127.0.0.1");
        assert_eq!(local.local_port, 1080);
        assert_eq!(local.server_port, 8083);
        assert_eq!(local.method, "aes-128-cfb");
        assert_eq!(local.timeout(), Duration::from_secs(600));

        let server = ServerConfig::default();
        assert_eq!(server.server_addr, "0.0.0.0");
        assert_eq!(server.method().unwrap(), Method::Aes128Cfb);

        assert_eq!(LoggingConfig::default().level, "warn");
    }

    #[test]
    fn test_parse_sections() {
        let config = Config::parse(
            r#"
            [local]
            server_addr = "203.0.113.7"
            server_port = 9000
            password = "secret"
            method = "rc4-md5"
            blocked_hosts = ["ads.example.com"]

            [server]
            server_port = 9000
            password = "secret"
            timeout = 0

            [logging]
            level = "verbose"
            "#,
        )
        .unwrap();

        let local = config.local.unwrap();
        assert_eq!(local.server_addr, "203.0.113.7");
        assert_eq!(local.local_port, 1080);
        assert_eq!(local.method().unwrap(), Method::Rc4Md5);
        assert_eq!(local.blocked_hosts, vec!["ads.example.com"]);

        let server = config.server.unwrap();
        assert!(server.timeout().is_zero());
        assert_eq!(config.logging.filter_directive(), "info");
    }

    #[test]
    fn test_camel_case_aliases() {
        let config = Config::parse(
            r#"
            [local]
            serverAddr = "example.net"
            serverPort = 8388
            localAddr = "0.0.0.0"
            localPort = 1090
            "#,
        )
        .unwrap();

        let local = config.local.unwrap();
        assert_eq!(local.server_addr, "example.net");
        assert_eq!(local.server_port, 8388);
        assert_eq!(local.local_addr, "0.0.0.0");
        assert_eq!(local.local_port, 1090);
    }

    #[test]
    fn test_unknown_method_rejected() {
        let config = LocalConfig {
            method: "chacha-unknown".to_string(),
            ..LocalConfig::default()
        };
        assert!(config.method().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("veilsocks-config-{}.toml", std::process::id()));
        let config = generate_example_config();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.local.unwrap().password, "change-me");
        assert_eq!(loaded.server.unwrap().server_port, 8083);

        std::fs::remove_file(&path).unwrap();
        assert!(Config::load_or_default(&path).unwrap().local.is_none());
    }

    #[test]
    fn test_malformed_config() {
        assert!(matches!(
            Config::parse("[local\nserver_port = 1"),
            Err(crate::Error::Config(_))
        ));
    }
}
