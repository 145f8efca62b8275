//! Wire format types for the V1 Solana "exact" payment scheme.

use serde::{Deserialize, Serialize};
use sol402_types::lit_str;
use sol402_types::proto;
use sol402_types::proto::{PaymentVerificationError, U64String};
use sol402_types::timestamp::UnixTimestamp;

use crate::chain::Address;

lit_str!(ExactScheme, "exact");

/// A fully decoded verification (or settlement) request.
#[derive(Debug, Clone)]
pub struct VerifyRequest {
    pub payment_payload: PaymentPayload,
    pub payment_requirements: PaymentRequirements,
}

/// Settlement requests decode identically to verification requests.
pub type SettleRequest = VerifyRequest;

impl VerifyRequest {
    /// Decodes the raw protocol envelope into typed scheme messages.
    ///
    /// This is the per-call parse step; any malformed field is the
    /// `DecodeError` reason. Protocol version and scheme fields decode as
    /// plain data here so their dedicated checks can fire in order.
    pub fn from_proto(request: &proto::VerifyRequest) -> Result<Self, PaymentVerificationError> {
        let payment_payload = proto::decode_payload(&request.payment_payload)
            .map_err(|_| PaymentVerificationError::DecodeError)?;
        let payment_requirements = proto::decode_payload(&request.payment_requirements)
            .map_err(|_| PaymentVerificationError::DecodeError)?;
        Ok(Self {
            payment_payload,
            payment_requirements,
        })
    }
}

/// The caller-supplied requirements a payment must satisfy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    pub scheme: String,
    /// Network constraint. When absent, the payload's self-declared network
    /// is trusted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    /// Mint of the asset the payment must move.
    pub asset: Address,
    /// The payee wallet.
    pub pay_to: Address,
    /// Required amount in the asset's smallest unit; exact, no tolerance.
    pub max_amount_required: U64String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_timeout_seconds: Option<u64>,
}

/// The ephemeral payment payload presented by a caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub x402_version: u8,
    pub scheme: String,
    pub network: String,
    pub payload: ExactSolanaPayload,
}

/// Scheme-specific payload contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactSolanaPayload {
    /// The payer-signed claim this payment fulfills.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization: Option<ExactSolanaAuthorization>,

    /// Base64-encoded, bincode-serialized signed transaction, ready for
    /// submission as-is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_transaction: Option<String>,

    /// Submission metadata for the pre-signed transaction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_meta: Option<TransactionMeta>,
}

/// The payer-signed authorization: who pays whom, how much of what, until
/// when, under which single-use nonce.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactSolanaAuthorization {
    pub from: Address,
    pub to: Address,
    pub value: U64String,
    pub asset: Address,
    /// End of the validity window, exclusive. Absence fails verification as
    /// `Expired`, not as a decode error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_before: Option<UnixTimestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

/// Blockhash context a payer captured when signing the transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blockhash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_valid_block_height: Option<u64>,
}
