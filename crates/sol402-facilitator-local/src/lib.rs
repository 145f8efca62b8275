#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Local facilitator implementation for the sol402 payment protocol.
//!
//! This crate provides [`FacilitatorLocal`], a
//! [`Facilitator`](sol402_types::facilitator::Facilitator) implementation that
//! validates payment payloads and performs on-chain settlements using
//! registered scheme handlers.
//!
//! This crate provides:
//! - scheme dispatch with boundary error downgrade
//! - route-level request handling via Axum handlers
//! - signal-driven graceful shutdown and tracing setup

pub mod facilitator_local;
pub mod handlers;
pub mod util;

pub use facilitator_local::*;
pub use handlers::*;
