//! Scheme dispatch and the outward façade.

use sol402_types::facilitator::Facilitator;
use sol402_types::proto;
use sol402_types::scheme::SchemeRegistry;

/// The local facilitator façade.
///
/// Dispatches each request to the scheme handler registered for its
/// `paymentRequirements.scheme` and downgrades anything the handler could not
/// classify into a generic invalid/failed result carrying the underlying
/// message. Nothing raises past this boundary.
pub struct FacilitatorLocal {
    schemes: SchemeRegistry,
}

impl FacilitatorLocal {
    pub fn new(schemes: SchemeRegistry) -> Self {
        Self { schemes }
    }

    /// The scheme named by the request's requirements, when present.
    fn requested_scheme(requirements: &serde_json::Value) -> Option<&str> {
        requirements.get("scheme").and_then(serde_json::Value::as_str)
    }
}

#[async_trait::async_trait]
impl Facilitator for FacilitatorLocal {
    async fn verify(&self, request: &proto::VerifyRequest) -> proto::VerifyResponse {
        let Some(scheme) = Self::requested_scheme(&request.payment_requirements) else {
            return proto::VerifyResponse::invalid("DecodeError");
        };
        let Some(handler) = self.schemes.get(scheme) else {
            return proto::VerifyResponse::invalid(format!("unsupported scheme: {scheme}"));
        };
        match handler.verify(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(scheme, error = %e, "verification fault downgraded");
                proto::VerifyResponse::invalid(e.to_string())
            }
        }
    }

    async fn settle(&self, request: &proto::SettleRequest) -> proto::SettleResponse {
        let Some(scheme) = Self::requested_scheme(&request.payment_requirements) else {
            return proto::SettleResponse::failed("DecodeError", None);
        };
        let Some(handler) = self.schemes.get(scheme) else {
            return proto::SettleResponse::failed(format!("unsupported scheme: {scheme}"), None);
        };
        match handler.settle(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(scheme, error = %e, "settlement fault downgraded");
                proto::SettleResponse::failed(e.to_string(), None)
            }
        }
    }

    async fn supported(&self) -> proto::SupportedResponse {
        let mut kinds = Vec::new();
        for handler in self.schemes.iter() {
            match handler.supported().await {
                Ok(response) => kinds.extend(response.kinds),
                Err(e) => tracing::error!(error = %e, "scheme skipped in capability listing"),
            }
        }
        proto::SupportedResponse { kinds }
    }
}
