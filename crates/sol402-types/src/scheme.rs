//! Payment scheme handler trait and registry.
//!
//! A scheme defines how verification and settlement work for one payment
//! type. Handlers implement [`X402SchemeFacilitator`] and are dispatched
//! through a [`SchemeRegistry`] keyed by scheme name.

use crate::proto;
use std::collections::HashMap;

/// Identity of a payment scheme: protocol version, chain namespace, and
/// scheme name.
pub trait X402SchemeId {
    fn x402_version(&self) -> u8;
    fn namespace(&self) -> &str;
    fn scheme(&self) -> &str;
}

/// Errors a scheme handler can raise past the response types.
///
/// Named verification and settlement failures never appear here; they travel
/// inside [`proto::VerifyResponse`] and [`proto::SettleResponse`]. This error
/// covers faults the handler cannot classify: ledger I/O problems and
/// requests addressed to a network the handler does not serve. The façade
/// downgrades both into generic results.
#[derive(Debug, thiserror::Error)]
pub enum X402SchemeFacilitatorError {
    #[error("ledger access failed: {0}")]
    Ledger(String),
    #[error("unsupported request: {0}")]
    Unsupported(String),
}

/// Facilitator-side handler for one payment scheme.
#[async_trait::async_trait]
pub trait X402SchemeFacilitator: Send + Sync {
    async fn verify(
        &self,
        request: &proto::VerifyRequest,
    ) -> Result<proto::VerifyResponse, X402SchemeFacilitatorError>;

    async fn settle(
        &self,
        request: &proto::SettleRequest,
    ) -> Result<proto::SettleResponse, X402SchemeFacilitatorError>;

    async fn supported(&self) -> Result<proto::SupportedResponse, X402SchemeFacilitatorError>;
}

/// Registry of scheme handlers, keyed by scheme name.
///
/// Registration order is preserved so that capability listings are stable
/// across calls.
#[derive(Default)]
pub struct SchemeRegistry {
    handlers: HashMap<String, Box<dyn X402SchemeFacilitator>>,
    order: Vec<String>,
}

impl SchemeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for the scheme identified by `id`. A later
    /// registration under the same scheme name replaces the earlier one.
    pub fn register<I: X402SchemeId>(&mut self, id: &I, handler: Box<dyn X402SchemeFacilitator>) {
        let scheme = id.scheme().to_string();
        if self.handlers.insert(scheme.clone(), handler).is_none() {
            self.order.push(scheme);
        }
    }

    /// Looks up the handler serving `scheme`.
    pub fn get(&self, scheme: &str) -> Option<&dyn X402SchemeFacilitator> {
        self.handlers.get(scheme).map(Box::as_ref)
    }

    /// Iterates handlers in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn X402SchemeFacilitator> {
        self.order
            .iter()
            .filter_map(|scheme| self.handlers.get(scheme).map(Box::as_ref))
    }
}
