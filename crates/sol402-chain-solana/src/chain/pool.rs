//! One live RPC handle per network id, created lazily.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use sol402_types::chain::ChainId;
use solana_keypair::Keypair;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

use crate::chain::{ConnectionError, RpcLedger, SolanaChainProvider};

/// Generic endpoint override, honored only for the configured default network.
const GENERIC_RPC_URL_ENV: &str = "SOL402_RPC_URL";

/// Lazy, idempotent cache mapping a network id to a live [`RpcLedger`].
///
/// Endpoint resolution order for a network:
/// 1. explicit per-network configuration,
/// 2. the network-specific `SOL402_RPC_URL_<NETWORK>` environment override,
/// 3. the generic `SOL402_RPC_URL` override, only when the requested network
///    is the pool's default network,
/// 4. the public well-known endpoint for that network.
///
/// Two lookups racing on the same network id resolve to the same handle; the
/// first creation wins.
pub struct RpcConnectionPool {
    networks: Vec<ChainId>,
    default_network: ChainId,
    endpoints: HashMap<ChainId, Url>,
    signer: Option<Keypair>,
    connections: DashMap<ChainId, Arc<RpcLedger>>,
}

impl RpcConnectionPool {
    pub fn new(networks: Vec<ChainId>, default_network: ChainId) -> Self {
        Self {
            networks,
            default_network,
            endpoints: HashMap::new(),
            signer: None,
            connections: DashMap::new(),
        }
    }

    /// Sets explicit per-network endpoints (resolution step 1).
    pub fn with_endpoints(mut self, endpoints: HashMap<ChainId, Url>) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Attaches the signing keypair used by the legacy settlement path.
    pub fn with_signer(mut self, signer: Keypair) -> Self {
        self.signer = Some(signer);
        self
    }

    fn endpoint(&self, chain_id: &ChainId) -> Result<Url, ConnectionError> {
        if let Some(endpoint) = self.endpoints.get(chain_id) {
            return Ok(endpoint.clone());
        }
        let network_name = chain_id
            .as_network_name()
            .ok_or_else(|| ConnectionError::UnknownNetwork(chain_id.to_string()))?;
        if let Ok(raw) = std::env::var(rpc_url_env_key(network_name)) {
            return parse_endpoint(network_name, &raw);
        }
        if *chain_id == self.default_network {
            if let Ok(raw) = std::env::var(GENERIC_RPC_URL_ENV) {
                return parse_endpoint(network_name, &raw);
            }
        }
        let public = public_endpoint(network_name)
            .ok_or_else(|| ConnectionError::UnknownNetwork(chain_id.to_string()))?;
        parse_endpoint(network_name, public)
    }
}

impl SolanaChainProvider for RpcConnectionPool {
    type Ledger = RpcLedger;

    fn connection(&self, chain_id: &ChainId) -> Result<Arc<RpcLedger>, ConnectionError> {
        if !self.networks.contains(chain_id) {
            return Err(ConnectionError::NotConfigured(chain_id.to_string()));
        }
        match self.connections.entry(chain_id.clone()) {
            Entry::Occupied(occupied) => Ok(Arc::clone(occupied.get())),
            Entry::Vacant(vacant) => {
                let endpoint = self.endpoint(chain_id)?;
                tracing::debug!(network = %chain_id, endpoint = %endpoint, "opening rpc connection");
                let handle = Arc::new(RpcLedger::new(endpoint));
                vacant.insert(Arc::clone(&handle));
                Ok(handle)
            }
        }
    }

    fn networks(&self) -> &[ChainId] {
        &self.networks
    }

    fn settlement_signer(&self) -> Option<&Keypair> {
        self.signer.as_ref()
    }
}

fn rpc_url_env_key(network_name: &str) -> String {
    format!(
        "SOL402_RPC_URL_{}",
        network_name.to_ascii_uppercase().replace('-', "_")
    )
}

fn parse_endpoint(network_name: &str, raw: &str) -> Result<Url, ConnectionError> {
    Url::parse(raw).map_err(|e| ConnectionError::InvalidEndpoint {
        network: network_name.to_string(),
        message: e.to_string(),
    })
}

fn public_endpoint(network_name: &str) -> Option<&'static str> {
    match network_name {
        "solana" => Some("https://api.mainnet-beta.solana.com"),
        "solana-devnet" => Some("https://api.devnet.solana.com"),
        "solana-testnet" => Some("https://api.testnet.solana.com"),
        _ => None,
    }
}
