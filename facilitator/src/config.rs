//! Configuration for the facilitator binary.
//!
//! Settings come from an optional JSON file (path in the `CONFIG` env var,
//! default `config.json`) overridden by environment variables:
//!
//! - `HOST` / `PORT` - server bind address
//! - `SOL402_NETWORKS` - comma-separated network names to serve
//! - `SOL402_DEFAULT_NETWORK` - network the generic RPC override applies to
//! - `SOL402_SIGNER_KEY` - base58 keypair bytes for the legacy settlement path
//!
//! Per-network RPC endpoints configured here are resolution step one; the
//! connection pool handles env overrides and public fallbacks itself.

use serde::Deserialize;
use sol402_types::chain::ChainId;
use solana_keypair::Keypair;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use url::Url;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    host: IpAddr,
    port: u16,
    networks: Vec<String>,
    default_network: Option<String>,
    rpc: HashMap<String, Url>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 9090,
            networks: vec!["solana-devnet".to_string()],
            default_network: None,
            rpc: HashMap::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("malformed config {0}: {1}")]
    Malformed(String, String),
    #[error("invalid {0}: {1}")]
    InvalidValue(&'static str, String),
    #[error("unknown network in configuration: {0}")]
    UnknownNetwork(String),
}

impl Config {
    /// Loads the config file when present, then applies env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("CONFIG").unwrap_or_else(|_| "config.json".to_string());
        let mut config = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| ConfigError::Malformed(path.clone(), e.to_string()))?,
            Err(_) => Config::default(),
        };
        if let Ok(host) = std::env::var("HOST") {
            config.host = host
                .parse()
                .map_err(|_| ConfigError::InvalidValue("HOST", host))?;
        }
        if let Ok(port) = std::env::var("PORT") {
            config.port = port
                .parse()
                .map_err(|_| ConfigError::InvalidValue("PORT", port))?;
        }
        if let Ok(raw) = std::env::var("SOL402_NETWORKS") {
            config.networks = raw
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(String::from)
                .collect();
        }
        if let Ok(name) = std::env::var("SOL402_DEFAULT_NETWORK") {
            config.default_network = Some(name);
        }
        Ok(config)
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The configured networks as chain IDs.
    pub fn chain_ids(&self) -> Result<Vec<ChainId>, ConfigError> {
        self.networks
            .iter()
            .map(|name| {
                ChainId::from_network_name(name)
                    .ok_or_else(|| ConfigError::UnknownNetwork(name.clone()))
            })
            .collect()
    }

    /// The network the generic RPC override applies to; defaults to the first
    /// configured network.
    pub fn default_chain_id(&self) -> Result<ChainId, ConfigError> {
        let name = self
            .default_network
            .as_deref()
            .or_else(|| self.networks.first().map(String::as_str))
            .unwrap_or("solana-devnet");
        ChainId::from_network_name(name)
            .ok_or_else(|| ConfigError::UnknownNetwork(name.to_string()))
    }

    /// Explicit per-network RPC endpoints keyed by chain ID.
    pub fn rpc_endpoints(&self) -> Result<HashMap<ChainId, Url>, ConfigError> {
        self.rpc
            .iter()
            .map(|(name, url)| {
                ChainId::from_network_name(name)
                    .map(|chain_id| (chain_id, url.clone()))
                    .ok_or_else(|| ConfigError::UnknownNetwork(name.clone()))
            })
            .collect()
    }

    /// The settlement keypair from `SOL402_SIGNER_KEY`, when configured.
    pub fn signer(&self) -> Result<Option<Keypair>, ConfigError> {
        let Ok(raw) = std::env::var("SOL402_SIGNER_KEY") else {
            return Ok(None);
        };
        let bytes = bs58::decode(raw.trim())
            .into_vec()
            .map_err(|e| ConfigError::InvalidValue("SOL402_SIGNER_KEY", e.to_string()))?;
        let keypair = Keypair::try_from(bytes.as_slice())
            .map_err(|e| ConfigError::InvalidValue("SOL402_SIGNER_KEY", e.to_string()))?;
        Ok(Some(keypair))
    }
}
