// ============================
// crates/gateway-lib/src/config.rs
// ============================
//! Configuration management.
use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Data directory path (message log + blobs)
    pub data_dir: PathBuf,
    /// Log level
    pub log_level: String,
    /// Maximum number of history messages returned by one read
    pub history_limit: usize,
    /// Inclusive per-attachment size ceiling in bytes
    pub max_attachment_bytes: u64,
    /// Maximum attachments on a single message
    pub max_attachments: usize,
    /// Maximum message body length in characters
    pub max_body_chars: usize,
    /// Typing-presence expiry in milliseconds
    pub typing_ttl_ms: u64,
    /// Bound on identity-verifier calls in milliseconds
    pub verify_timeout_ms: u64,
    /// Bound on message/blob store calls in milliseconds
    pub store_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".parse().unwrap(),
            data_dir: PathBuf::from("data"),
            log_level: "info".to_string(),
            history_limit: 200,
            max_attachment_bytes: 10 * 1024 * 1024, // 10 MiB
            max_attachments: 10,
            max_body_chars: 8 * 1024,
            typing_ttl_ms: 5_000,
            verify_timeout_ms: 5_000,
            store_timeout_ms: 5_000,
        }
    }
}

impl Settings {
    /// Load settings from `ticketchat.toml` and `TICKETCHAT_`-prefixed
    /// environment variables, on top of the defaults.
    pub fn load() -> Result<Self> {
        Self::load_from("ticketchat.toml")
    }

    /// Load settings from an explicit config file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("TICKETCHAT_"))
            .extract()?;
        Ok(settings)
    }

    pub fn typing_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.typing_ttl_ms)
    }

    pub fn verify_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.verify_timeout_ms)
    }

    pub fn store_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.store_timeout_ms)
    }
}
