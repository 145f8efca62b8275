#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Solana chain support for the sol402 payment facilitator.
//!
//! This crate implements the `v1_solana_exact` payment scheme: verification
//! and settlement of exact-amount SPL token transfers authorized through the
//! x402 v1 wire format.
//!
//! # Key Types
//!
//! - [`chain::RpcConnectionPool`] - Lazy, idempotent cache of one RPC handle
//!   per configured network
//! - [`chain::SolanaLedger`] - The ledger-access seam: account parsing, block
//!   height, submission, confirmation
//! - [`nonce::NonceLedger`] - Replay-protection cache with expiry-based
//!   eviction
//! - [`V1SolanaExact`] - Scheme identity, with
//!   [`V1SolanaExactFacilitator`](v1_solana_exact::V1SolanaExactFacilitator)
//!   as its handler
//!
//! # Trust Models
//!
//! Settlement runs one of two mutually exclusive paths, selected by payload
//! shape. When the payload carries a pre-signed transaction, the payload
//! itself is the proof and the facilitator only submits it. When it does not,
//! the deprecated legacy path has the facilitator build and sign the transfer
//! with its own keypair.

pub mod chain;
pub mod nonce;
pub mod v1_solana_exact;

pub use v1_solana_exact::V1SolanaExact;
