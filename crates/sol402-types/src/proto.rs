//! Wire messages and failure taxonomy for the sol402 facilitator protocol.
//!
//! The envelope types here are scheme-agnostic: `paymentPayload` and
//! `paymentRequirements` are carried as raw JSON and decoded by the scheme
//! handler that serves the request. This keeps decode failures inside the
//! verification flow, where they surface as a structured `DecodeError` reason
//! instead of a transport error.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A request to verify a payment payload against payment requirements.
///
/// `payment_payload` is either an inline JSON object or a base64-encoded JSON
/// string, as produced for the `X-PAYMENT` header. Scheme handlers decode it
/// with [`decode_payload`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub x402_version: u8,
    pub payment_payload: serde_json::Value,
    pub payment_requirements: serde_json::Value,
}

/// Settlement requests carry the same structure as verification requests.
pub type SettleRequest = VerifyRequest;

/// The outcome of payment verification: valid, or invalid with a named reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,
}

impl VerifyResponse {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            invalid_reason: None,
        }
    }

    pub fn invalid<R: Into<String>>(reason: R) -> Self {
        Self {
            is_valid: false,
            invalid_reason: Some(reason.into()),
        }
    }
}

/// The outcome of a settlement attempt.
///
/// `settlement_reference` is the ledger reference of the confirmed transfer
/// (for Solana, the transaction signature).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settlement_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_id: Option<String>,
}

impl SettleResponse {
    pub fn succeeded<R: Into<String>, N: Into<String>>(reference: R, network: N) -> Self {
        Self {
            success: true,
            error: None,
            settlement_reference: Some(reference.into()),
            network_id: Some(network.into()),
        }
    }

    pub fn failed<E: Into<String>>(error: E, network: Option<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            settlement_reference: None,
            network_id: network,
        }
    }
}

/// One (scheme, network) pair this facilitator serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedPaymentKind {
    pub scheme: String,
    pub network: String,
}

/// The fixed, configuration-derived capability set of a facilitator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedResponse {
    pub kinds: Vec<SupportedPaymentKind>,
}

/// Named reasons a payment payload can fail verification.
///
/// Every variant renders exactly as its name; the reason string is the wire
/// contract, so callers can match on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PaymentVerificationError {
    #[error("DecodeError")]
    DecodeError,
    #[error("VersionMismatch")]
    VersionMismatch,
    #[error("SchemeMismatch")]
    SchemeMismatch,
    #[error("NetworkMismatch")]
    NetworkMismatch,
    #[error("MissingAuthorization")]
    MissingAuthorization,
    #[error("AmountMismatch")]
    AmountMismatch,
    #[error("RecipientMismatch")]
    RecipientMismatch,
    #[error("AssetMismatch")]
    AssetMismatch,
    #[error("Expired")]
    Expired,
    #[error("InvalidValidityWindow")]
    InvalidValidityWindow,
    #[error("MissingNonce")]
    MissingNonce,
    #[error("ReplayDetected")]
    ReplayDetected,
    #[error("UnexpectedPrecision")]
    UnexpectedPrecision,
    #[error("BlockhashExpired")]
    BlockhashExpired,
    #[error("InvalidSignature")]
    InvalidSignature,
    #[error("MissingTransferInstruction")]
    MissingTransferInstruction,
    #[error("InvalidInstructionData")]
    InvalidInstructionData,
    #[error("DestinationNotFound")]
    DestinationNotFound,
    #[error("OwnerMismatch")]
    OwnerMismatch,
    #[error("MintMismatch")]
    MintMismatch,
}

/// Terminal settlement failures. None of these are retried: a semantic
/// failure implies an invalid request, not a transient condition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettlementError {
    #[error("InsufficientBalance")]
    InsufficientBalance,
    /// The retry budget was exhausted; carries the last underlying error.
    #[error("SubmissionFailure: {0}")]
    SubmissionFailure(String),
    /// The legacy path was selected but no signing keypair is configured.
    #[error("SigningUnavailable")]
    SigningUnavailable,
}

/// Decodes a payment payload or requirements value into a typed message.
///
/// Accepts either an inline JSON object or a base64-encoded JSON string (the
/// `X-PAYMENT` header form). Any failure is a [`DecodeFailure`]; scheme
/// handlers surface it as the `DecodeError` reason.
pub fn decode_payload<T: DeserializeOwned>(value: &serde_json::Value) -> Result<T, DecodeFailure> {
    match value {
        serde_json::Value::String(encoded) => {
            let bytes = BASE64_STANDARD
                .decode(encoded)
                .map_err(|e| DecodeFailure(e.to_string()))?;
            serde_json::from_slice(&bytes).map_err(|e| DecodeFailure(e.to_string()))
        }
        other => {
            serde_json::from_value(other.clone()).map_err(|e| DecodeFailure(e.to_string()))
        }
    }
}

/// A payload that could not be decoded into its typed form.
#[derive(Debug, thiserror::Error)]
#[error("malformed payload: {0}")]
pub struct DecodeFailure(String);

/// A `u64` amount that serializes as a decimal string.
///
/// Token amounts travel as strings on the wire so that JSON number precision
/// never truncates them. Deserialization also accepts a plain non-negative
/// integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct U64String(pub u64);

impl U64String {
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for U64String {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for U64String {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for U64String {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for U64String {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct U64StringVisitor;

        impl serde::de::Visitor<'_> for U64StringVisitor {
            type Value = U64String;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a u64 as a decimal string or integer")
            }

            fn visit_str<E: serde::de::Error>(self, value: &str) -> Result<Self::Value, E> {
                value
                    .parse::<u64>()
                    .map(U64String)
                    .map_err(|e| E::custom(format!("invalid u64 string: {e}")))
            }

            fn visit_u64<E: serde::de::Error>(self, value: u64) -> Result<Self::Value, E> {
                Ok(U64String(value))
            }
        }

        deserializer.deserialize_any(U64StringVisitor)
    }
}
