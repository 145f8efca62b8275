//! Solana network access for sol402 payments.
//!
//! # Submodules
//!
//! - [`ledger`] - The [`SolanaLedger`] trait and its RPC-backed implementation
//! - [`pool`] - The [`RpcConnectionPool`], one live handle per network id
//!
//! The facilitator is generic over [`SolanaChainProvider`], so tests run
//! against an in-memory ledger while production runs against JSON-RPC.

pub mod ledger;
pub mod pool;

pub use ledger::*;
pub use pool::*;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use sol402_types::chain::ChainId;
use solana_keypair::Keypair;
use solana_pubkey::Pubkey;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// A Solana account address, serialized as its base58 string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address(pub Pubkey);

impl Address {
    pub fn as_pubkey(&self) -> &Pubkey {
        &self.0
    }
}

impl From<Pubkey> for Address {
    fn from(pubkey: Pubkey) -> Self {
        Self(pubkey)
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Pubkey::from_str(s)
            .map(Address)
            .map_err(|_| AddressParseError(s.to_string()))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned when a string is not a valid base58 Solana address.
#[derive(Debug, thiserror::Error)]
#[error("Invalid Solana address {0}")]
pub struct AddressParseError(String);

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Address::from_str(&s).map_err(de::Error::custom)
    }
}

/// Failure to produce a connection handle for a requested network.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("unknown network: {0}")]
    UnknownNetwork(String),
    #[error("network not enabled on this facilitator: {0}")]
    NotConfigured(String),
    #[error("invalid RPC endpoint for {network}: {message}")]
    InvalidEndpoint { network: String, message: String },
}

/// Access to the ledger backends this facilitator serves.
///
/// Implementations own the connection cache; `connection` is an idempotent
/// lookup-or-create with at most one live handle per network id.
pub trait SolanaChainProvider: Send + Sync {
    type Ledger: SolanaLedger + Send + Sync + 'static;

    /// Returns the handle for `chain_id`, creating it on first use.
    fn connection(&self, chain_id: &ChainId) -> Result<Arc<Self::Ledger>, ConnectionError>;

    /// Networks this provider is configured for, in capability-listing order.
    fn networks(&self) -> &[ChainId];

    /// Signing keypair for the legacy settlement path, when configured.
    fn settlement_signer(&self) -> Option<&Keypair>;
}
