//! configuration
//!
//! ```toml
//! [gateway]
//! rpc_url = "https://ethereum-sepolia-rpc.publicnode.com"
//! gateway_url = "https://gateway.sepolia.zama.ai"
//! allow_mock = true
//! signing_timeout_secs = 120
//!
//! [storage]
//! path = "/home/me/.sealbid/db"
//! ```
//!
//! every field is optional; missing ones take the defaults below.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const DEFAULT_RPC_URL: &str = "https://ethereum-sepolia-rpc.publicnode.com";
pub const DEFAULT_GATEWAY_URL: &str = "https://gateway.sepolia.zama.ai";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub storage: StorageConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// json-rpc endpoint queried for the network key
    pub rpc_url: String,
    /// re-encryption gateway
    pub gateway_url: String,
    /// fall back to mock encryption when the network is unavailable
    pub allow_mock: bool,
    pub signing_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.into(),
            gateway_url: DEFAULT_GATEWAY_URL.into(),
            allow_mock: true,
            signing_timeout_secs: 120,
        }
    }
}

impl GatewayConfig {
    pub fn signing_timeout(&self) -> Duration {
        Duration::from_secs(self.signing_timeout_secs)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// database path, `None` for `<data dir>/db`
    pub path: Option<PathBuf>,
}

impl Config {
    pub fn from_toml(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::Serialization(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// read a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Storage(format!("read {}: {}", path.display(), e)))?;
        Self::from_toml(&contents)
    }

    /// read a config file if it exists, defaults otherwise
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// database path, resolved against `data_dir`
    pub fn db_path(&self, data_dir: &Path) -> PathBuf {
        self.storage
            .path
            .clone()
            .unwrap_or_else(|| data_dir.join("db"))
    }
}

/// `~/.sealbid`, or `./.sealbid` without a home directory
pub fn default_data_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
    PathBuf::from(home).join(".sealbid")
}
