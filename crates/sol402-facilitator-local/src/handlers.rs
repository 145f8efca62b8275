//! Axum route handlers for the facilitator protocol surface.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/verify` | Describe the verification endpoint |
//! | `POST` | `/verify` | Verify a payment payload against requirements |
//! | `GET` | `/settle` | Describe the settlement endpoint |
//! | `POST` | `/settle` | Settle an accepted payment payload on-chain |
//! | `GET` | `/supported` | List supported payment kinds (scheme/network) |
//! | `GET` | `/health` | Health check endpoint |

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use sol402_types::facilitator::Facilitator;
use sol402_types::proto;
use std::sync::Arc;

/// Builds the protocol router over any [`Facilitator`] implementation.
pub fn routes<F>() -> Router<Arc<F>>
where
    F: Facilitator + 'static,
{
    Router::new()
        .route("/verify", get(verify_info).post(verify::<F>))
        .route("/settle", get(settle_info).post(settle::<F>))
        .route("/supported", get(supported::<F>))
        .route("/health", get(health))
}

async fn verify<F: Facilitator>(
    State(facilitator): State<Arc<F>>,
    Json(request): Json<proto::VerifyRequest>,
) -> Json<proto::VerifyResponse> {
    Json(facilitator.verify(&request).await)
}

async fn settle<F: Facilitator>(
    State(facilitator): State<Arc<F>>,
    Json(request): Json<proto::SettleRequest>,
) -> Json<proto::SettleResponse> {
    Json(facilitator.settle(&request).await)
}

async fn supported<F: Facilitator>(
    State(facilitator): State<Arc<F>>,
) -> Json<proto::SupportedResponse> {
    Json(facilitator.supported().await)
}

async fn verify_info() -> Json<serde_json::Value> {
    Json(json!({
        "endpoint": "/verify",
        "description": "POST to verify x402 payments",
        "body": {
            "x402Version": 1,
            "paymentPayload": "PaymentPayload",
            "paymentRequirements": "PaymentRequirements"
        }
    }))
}

async fn settle_info() -> Json<serde_json::Value> {
    Json(json!({
        "endpoint": "/settle",
        "description": "POST to settle x402 payments",
        "body": {
            "x402Version": 1,
            "paymentPayload": "PaymentPayload",
            "paymentRequirements": "PaymentRequirements"
        }
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
