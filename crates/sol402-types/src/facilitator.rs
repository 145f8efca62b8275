//! The outward-facing facilitator trait.

use crate::proto;

/// The three operations a facilitator exposes, and nothing else.
///
/// All three are infallible at this surface: verification and settlement
/// failures are structured results, and unexpected faults are downgraded into
/// them by the implementation before they reach a caller.
#[async_trait::async_trait]
pub trait Facilitator: Send + Sync {
    /// Decides whether `payment_payload` satisfies `payment_requirements`.
    async fn verify(&self, request: &proto::VerifyRequest) -> proto::VerifyResponse;

    /// Causes the ledger transfer backing an authorization to occur.
    ///
    /// Callers must verify before settling; settlement performs no replay
    /// defense of its own.
    async fn settle(&self, request: &proto::SettleRequest) -> proto::SettleResponse;

    /// The fixed, configuration-derived set of supported (scheme, network)
    /// kinds.
    async fn supported(&self) -> proto::SupportedResponse;
}
