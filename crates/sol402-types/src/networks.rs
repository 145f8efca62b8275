//! Registry of well-known Solana networks.
//!
//! The x402 v1 wire format addresses networks by short name (`"solana"`,
//! `"solana-devnet"`); CAIP-2 identifies them by genesis-hash reference. This
//! module maps between the two. The reference is the first 32 characters of
//! the base58 genesis hash, per the CAIP-2 Solana namespace.

use crate::chain::ChainId;
use std::sync::LazyLock;

/// (network name, CAIP-2 chain id) for every network this crate knows about.
static KNOWN_NETWORKS: LazyLock<Vec<(&'static str, ChainId)>> = LazyLock::new(|| {
    vec![
        (
            "solana",
            ChainId::new("solana", "5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp"),
        ),
        (
            "solana-devnet",
            ChainId::new("solana", "EtWTRABZaYq6iMfeYKouRu166VU2xqa1"),
        ),
        (
            "solana-testnet",
            ChainId::new("solana", "4uhcVJyU9pJkvQyS88uRDiswHXSCkY3z"),
        ),
    ]
});

/// Looks up the chain ID for a well-known network name.
pub fn chain_id_by_network_name(network_name: &str) -> Option<&'static ChainId> {
    KNOWN_NETWORKS
        .iter()
        .find(|(name, _)| *name == network_name)
        .map(|(_, chain_id)| chain_id)
}

/// Looks up the well-known network name for a chain ID.
pub fn network_name_by_chain_id(chain_id: &ChainId) -> Option<&'static str> {
    KNOWN_NETWORKS
        .iter()
        .find(|(_, known)| known == chain_id)
        .map(|(name, _)| *name)
}

/// All known network names, in registry order.
pub fn known_network_names() -> impl Iterator<Item = &'static str> {
    KNOWN_NETWORKS.iter().map(|(name, _)| *name)
}
