//! Facilitator-side payment verification and settlement for the V1 Solana
//! exact scheme.
//!
//! Verification runs a fixed sequence of structural, semantic, replay, and
//! instruction-level checks, each short-circuiting with a named reason.
//! Settlement submits the pre-signed transaction carried by the payload, or
//! falls back to building and signing a transfer with the facilitator's own
//! keypair. Replay defense lives entirely in verification: settlement never
//! touches the nonce ledger, so callers must verify before settling.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use sol402_types::chain::ChainId;
use sol402_types::proto;
use sol402_types::proto::{PaymentVerificationError, SettlementError};
use sol402_types::scheme::{X402SchemeFacilitator, X402SchemeFacilitatorError};
use sol402_types::timestamp::UnixTimestamp;
use solana_signature::Signature;
use solana_signer::Signer;
use solana_transaction::Transaction;
use spl_associated_token_account::get_associated_token_address;
use spl_associated_token_account::instruction::create_associated_token_account;
use std::sync::Arc;
use std::time::Duration;

use crate::chain::{ConnectionError, LedgerError, SolanaChainProvider, SolanaLedger};
use crate::nonce::NonceLedger;
use crate::v1_solana_exact::types::{
    self as types, ExactScheme, ExactSolanaAuthorization, ExactSolanaPayload, PaymentPayload,
    PaymentRequirements, TransactionMeta,
};

/// Decimal precision every supported asset mint must carry.
const EXPECTED_ASSET_DECIMALS: u8 = 6;

/// Slack added on top of `maxTimeoutSeconds` when bounding `validBefore`.
const VALIDITY_GRACE_SECS: u64 = 30;

/// `TokenInstruction::Transfer` discriminant.
const TRANSFER_OPCODE: u8 = 3;

/// Transfer instruction data: one opcode byte plus a little-endian u64 amount.
const TRANSFER_DATA_LEN: usize = 9;

/// Backoff applied after each failed pre-signed submission attempt.
const SUBMIT_RETRY_DELAYS: [Duration; 3] = [
    Duration::from_millis(500),
    Duration::from_millis(1000),
    Duration::from_millis(1500),
];

/// Internal error of the exact-scheme flows.
///
/// `Verification` and `Settlement` become structured reasons in the response;
/// `Ledger` and `Connection` cross the scheme boundary for the façade to
/// downgrade.
#[derive(Debug, thiserror::Error)]
pub enum SolanaExactError {
    #[error(transparent)]
    Verification(#[from] PaymentVerificationError),
    #[error(transparent)]
    Settlement(#[from] SettlementError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Connection(ConnectionError),
}

/// Facilitator for V1 Solana exact scheme payments.
///
/// Generic over the chain provider so tests run against an in-memory ledger.
/// The nonce ledger is owned by the instance: separate facilitators never
/// share replay state.
pub struct V1SolanaExactFacilitator<P> {
    provider: P,
    nonces: NonceLedger,
}

impl<P> V1SolanaExactFacilitator<P> {
    /// Creates a new exact scheme facilitator with the given provider.
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            nonces: NonceLedger::new(),
        }
    }
}

impl<P> V1SolanaExactFacilitator<P>
where
    P: SolanaChainProvider + Send + Sync,
{
    fn connection_for(&self, chain_id: &ChainId) -> Result<Arc<P::Ledger>, SolanaExactError> {
        self.provider.connection(chain_id).map_err(|e| match e {
            ConnectionError::UnknownNetwork(_) | ConnectionError::NotConfigured(_) => {
                SolanaExactError::Verification(PaymentVerificationError::NetworkMismatch)
            }
            other => SolanaExactError::Connection(other),
        })
    }

    /// Runs the ordered verification checks against a decoded payment.
    ///
    /// The nonce registration inside is the only verification-time state
    /// mutation: verification spends the nonce, so a verify without a
    /// matching settle still consumes it.
    async fn assert_valid_payment(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<(), SolanaExactError> {
        if payload.x402_version != 1 {
            return Err(PaymentVerificationError::VersionMismatch.into());
        }
        if payload.scheme != requirements.scheme {
            return Err(PaymentVerificationError::SchemeMismatch.into());
        }
        let (_, chain_id) = resolve_network(payload, requirements)?;
        let authorization = payload
            .payload
            .authorization
            .as_ref()
            .ok_or(PaymentVerificationError::MissingAuthorization)?;
        if authorization.value != requirements.max_amount_required {
            return Err(PaymentVerificationError::AmountMismatch.into());
        }
        if authorization.to != requirements.pay_to {
            return Err(PaymentVerificationError::RecipientMismatch.into());
        }
        if authorization.asset != requirements.asset {
            return Err(PaymentVerificationError::AssetMismatch.into());
        }
        let now = UnixTimestamp::now();
        let valid_before = authorization
            .valid_before
            .ok_or(PaymentVerificationError::Expired)?;
        if valid_before <= now {
            return Err(PaymentVerificationError::Expired.into());
        }
        if let Some(max_timeout) = requirements.max_timeout_seconds {
            if valid_before > now + max_timeout + VALIDITY_GRACE_SECS {
                return Err(PaymentVerificationError::InvalidValidityWindow.into());
            }
        }
        let nonce = authorization
            .nonce
            .as_deref()
            .ok_or(PaymentVerificationError::MissingNonce)?;
        if !self.nonces.register(nonce, valid_before) {
            return Err(PaymentVerificationError::ReplayDetected.into());
        }

        let ledger = self.connection_for(&chain_id)?;
        let decimals = ledger.mint_decimals(authorization.asset.as_pubkey()).await?;
        if decimals != Some(EXPECTED_ASSET_DECIMALS) {
            return Err(PaymentVerificationError::UnexpectedPrecision.into());
        }
        if let Some(meta) = &payload.payload.transaction_meta {
            if let Some(last_valid) = meta.last_valid_block_height {
                // Early exit; submission would reject the stale blockhash anyway.
                if ledger.block_height().await? > last_valid {
                    return Err(PaymentVerificationError::BlockhashExpired.into());
                }
            }
        }
        if let Some(encoded) = &payload.payload.signed_transaction {
            let transaction = decode_signed_transaction(encoded)?;
            assert_transfer_instruction(ledger.as_ref(), &transaction, authorization).await?;
        }
        Ok(())
    }

    /// Pre-signed path: submit the payload's transaction as-is, retrying
    /// transient failures within a fixed budget.
    async fn settle_presigned<L: SolanaLedger + ?Sized>(
        &self,
        ledger: &L,
        encoded: &str,
        meta: Option<&TransactionMeta>,
    ) -> Result<Signature, SolanaExactError> {
        let transaction = decode_signed_transaction(encoded)?;
        let last_valid_block_height = meta.and_then(|m| m.last_valid_block_height);
        let mut last_error = String::new();
        for delay in SUBMIT_RETRY_DELAYS {
            match submit_and_confirm(ledger, &transaction, last_valid_block_height).await {
                Ok(signature) => return Ok(signature),
                Err(e) => {
                    tracing::warn!(error = %e, "submission attempt failed, backing off");
                    last_error = e.to_string();
                    tokio::time::sleep(delay).await;
                }
            }
        }
        Err(SettlementError::SubmissionFailure(last_error).into())
    }

    /// Legacy path: the facilitator holds signing authority and builds the
    /// transfer itself. Submits and confirms once; no retry loop, since the
    /// balance pre-check already covers the common failure.
    async fn settle_legacy<L: SolanaLedger + ?Sized>(
        &self,
        ledger: &L,
        authorization: &ExactSolanaAuthorization,
    ) -> Result<Signature, SolanaExactError> {
        let signer = self
            .provider
            .settlement_signer()
            .ok_or(SettlementError::SigningUnavailable)?;
        let mint = authorization.asset.as_pubkey();
        let source = get_associated_token_address(authorization.from.as_pubkey(), mint);
        let destination = get_associated_token_address(authorization.to.as_pubkey(), mint);

        let mut instructions = Vec::with_capacity(2);
        if ledger.token_account(&destination).await?.is_none() {
            instructions.push(create_associated_token_account(
                &signer.pubkey(),
                authorization.to.as_pubkey(),
                mint,
                &spl_token::id(),
            ));
        }

        let amount = authorization.value.as_u64();
        let balance = ledger
            .token_account(&source)
            .await?
            .map(|account| account.amount)
            .unwrap_or(0);
        if balance < amount {
            return Err(SettlementError::InsufficientBalance.into());
        }

        #[allow(deprecated)]
        let transfer = spl_token::instruction::transfer(
            &spl_token::id(),
            &source,
            &destination,
            &signer.pubkey(),
            &[],
            amount,
        )
        .map_err(|e| SettlementError::SubmissionFailure(e.to_string()))?;
        instructions.push(transfer);

        let blockhash = ledger.latest_blockhash().await?;
        let transaction = Transaction::new_signed_with_payer(
            &instructions,
            Some(&signer.pubkey()),
            &[signer],
            blockhash,
        );
        let signature = ledger.send_transaction(&transaction).await?;
        ledger.confirm_transaction(&signature, None).await?;
        Ok(signature)
    }
}

#[async_trait]
impl<P> X402SchemeFacilitator for V1SolanaExactFacilitator<P>
where
    P: SolanaChainProvider + Send + Sync,
{
    #[tracing::instrument(skip_all)]
    async fn verify(
        &self,
        request: &proto::VerifyRequest,
    ) -> Result<proto::VerifyResponse, X402SchemeFacilitatorError> {
        // Expired nonce entries ride along on every verification call.
        self.nonces.sweep();
        let request = match types::VerifyRequest::from_proto(request) {
            Ok(request) => request,
            Err(reason) => return Ok(proto::VerifyResponse::invalid(reason.to_string())),
        };
        match self
            .assert_valid_payment(&request.payment_payload, &request.payment_requirements)
            .await
        {
            Ok(()) => Ok(proto::VerifyResponse::valid()),
            Err(SolanaExactError::Verification(reason)) => {
                tracing::debug!(reason = %reason, "payment rejected");
                Ok(proto::VerifyResponse::invalid(reason.to_string()))
            }
            Err(SolanaExactError::Settlement(reason)) => {
                Ok(proto::VerifyResponse::invalid(reason.to_string()))
            }
            Err(SolanaExactError::Ledger(e)) => {
                Err(X402SchemeFacilitatorError::Ledger(e.to_string()))
            }
            Err(SolanaExactError::Connection(e)) => {
                Err(X402SchemeFacilitatorError::Unsupported(e.to_string()))
            }
        }
    }

    #[tracing::instrument(skip_all)]
    async fn settle(
        &self,
        request: &proto::SettleRequest,
    ) -> Result<proto::SettleResponse, X402SchemeFacilitatorError> {
        let request = match types::SettleRequest::from_proto(request) {
            Ok(request) => request,
            Err(reason) => return Ok(proto::SettleResponse::failed(reason.to_string(), None)),
        };
        let payload = &request.payment_payload;
        let (network, chain_id) = match resolve_network(payload, &request.payment_requirements) {
            Ok(resolved) => resolved,
            Err(reason) => return Ok(proto::SettleResponse::failed(reason.to_string(), None)),
        };
        let outcome = match self.connection_for(&chain_id) {
            Ok(ledger) => match SettlementKind::select(&payload.payload) {
                Ok(SettlementKind::PreSigned { encoded, meta }) => {
                    self.settle_presigned(ledger.as_ref(), encoded, meta).await
                }
                Ok(SettlementKind::Legacy { authorization }) => {
                    self.settle_legacy(ledger.as_ref(), authorization).await
                }
                Err(reason) => Err(reason.into()),
            },
            Err(e) => Err(e),
        };
        match outcome {
            Ok(signature) => {
                tracing::info!(signature = %signature, network = %network, "settlement confirmed");
                Ok(proto::SettleResponse::succeeded(signature.to_string(), network))
            }
            Err(SolanaExactError::Verification(reason)) => Ok(proto::SettleResponse::failed(
                reason.to_string(),
                Some(network.to_string()),
            )),
            Err(SolanaExactError::Settlement(error)) => Ok(proto::SettleResponse::failed(
                error.to_string(),
                Some(network.to_string()),
            )),
            Err(SolanaExactError::Ledger(e)) => {
                Err(X402SchemeFacilitatorError::Ledger(e.to_string()))
            }
            Err(SolanaExactError::Connection(e)) => {
                Err(X402SchemeFacilitatorError::Unsupported(e.to_string()))
            }
        }
    }

    async fn supported(&self) -> Result<proto::SupportedResponse, X402SchemeFacilitatorError> {
        let kinds = self
            .provider
            .networks()
            .iter()
            .filter_map(|chain_id| chain_id.as_network_name())
            .map(|network| proto::SupportedPaymentKind {
                scheme: ExactScheme.to_string(),
                network: network.to_string(),
            })
            .collect();
        Ok(proto::SupportedResponse { kinds })
    }
}

/// The two settlement trust models, selected by payload shape.
enum SettlementKind<'a> {
    /// The payload carries its own proof: a signed, submission-ready
    /// transaction. Preferred whenever present.
    PreSigned {
        encoded: &'a str,
        meta: Option<&'a TransactionMeta>,
    },
    /// Deprecated custodial fallback: the facilitator signs a transfer built
    /// from the authorization.
    Legacy {
        authorization: &'a ExactSolanaAuthorization,
    },
}

impl<'a> SettlementKind<'a> {
    fn select(payload: &'a ExactSolanaPayload) -> Result<Self, PaymentVerificationError> {
        if let Some(encoded) = payload.signed_transaction.as_deref() {
            Ok(SettlementKind::PreSigned {
                encoded,
                meta: payload.transaction_meta.as_ref(),
            })
        } else if let Some(authorization) = payload.authorization.as_ref() {
            Ok(SettlementKind::Legacy { authorization })
        } else {
            Err(PaymentVerificationError::MissingAuthorization)
        }
    }
}

/// Applies the network constraint: a constrained requirement must match the
/// payload exactly; an unconstrained one trusts the payload's self-declared
/// network.
fn resolve_network<'a>(
    payload: &'a PaymentPayload,
    requirements: &'a PaymentRequirements,
) -> Result<(&'a str, ChainId), PaymentVerificationError> {
    let network = match requirements.network.as_deref() {
        Some(required) => {
            if payload.network != required {
                return Err(PaymentVerificationError::NetworkMismatch);
            }
            required
        }
        None => payload.network.as_str(),
    };
    let chain_id = ChainId::from_network_name(network)
        .ok_or(PaymentVerificationError::NetworkMismatch)?;
    Ok((network, chain_id))
}

fn decode_signed_transaction(encoded: &str) -> Result<Transaction, PaymentVerificationError> {
    let bytes = BASE64_STANDARD
        .decode(encoded)
        .map_err(|_| PaymentVerificationError::DecodeError)?;
    bincode::deserialize(&bytes).map_err(|_| PaymentVerificationError::DecodeError)
}

async fn submit_and_confirm<L: SolanaLedger + ?Sized>(
    ledger: &L,
    transaction: &Transaction,
    last_valid_block_height: Option<u64>,
) -> Result<Signature, LedgerError> {
    let signature = ledger.send_transaction(transaction).await?;
    ledger
        .confirm_transaction(&signature, last_valid_block_height)
        .await?;
    Ok(signature)
}

/// Proves the opaque pre-signed transaction performs exactly the transfer the
/// authorization claims.
///
/// The decode is a bit-exact contract: byte 0 is the Transfer opcode, bytes
/// 1-8 the little-endian u64 amount, and the instruction's account list is
/// ordered [source, destination, authority]. Anything else would let an
/// envelope that looks valid smuggle a different transfer.
async fn assert_transfer_instruction<L: SolanaLedger + ?Sized>(
    ledger: &L,
    transaction: &Transaction,
    authorization: &ExactSolanaAuthorization,
) -> Result<(), SolanaExactError> {
    if transaction.verify().is_err() {
        return Err(PaymentVerificationError::InvalidSignature.into());
    }
    let message = &transaction.message;
    let instruction = message
        .instructions
        .iter()
        .find(|ix| {
            message
                .account_keys
                .get(ix.program_id_index as usize)
                .is_some_and(|program| *program == spl_token::id() || *program == spl_token_2022::id())
        })
        .ok_or(PaymentVerificationError::MissingTransferInstruction)?;

    let data = &instruction.data;
    if data.len() < TRANSFER_DATA_LEN || data[0] != TRANSFER_OPCODE {
        return Err(PaymentVerificationError::InvalidInstructionData.into());
    }
    let mut raw_amount = [0u8; 8];
    raw_amount.copy_from_slice(&data[1..TRANSFER_DATA_LEN]);
    let amount = u64::from_le_bytes(raw_amount);
    if amount != authorization.value.as_u64() {
        return Err(PaymentVerificationError::AmountMismatch.into());
    }

    let destination = instruction
        .accounts
        .get(1)
        .and_then(|index| message.account_keys.get(*index as usize))
        .ok_or(PaymentVerificationError::InvalidInstructionData)?;
    let destination = ledger
        .token_account(destination)
        .await?
        .ok_or(PaymentVerificationError::DestinationNotFound)?;
    if destination.owner != *authorization.to.as_pubkey() {
        return Err(PaymentVerificationError::OwnerMismatch.into());
    }
    if destination.mint != *authorization.asset.as_pubkey() {
        return Err(PaymentVerificationError::MintMismatch.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::TokenAccountInfo;
    use serde_json::json;
    use solana_hash::Hash;
    use solana_keypair::Keypair;
    use solana_pubkey::Pubkey;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct MockLedger {
        decimals: HashMap<Pubkey, u8>,
        token_accounts: HashMap<Pubkey, TokenAccountInfo>,
        block_height: u64,
        send_outcomes: Mutex<VecDeque<Result<(), String>>>,
        sends: AtomicU32,
    }

    impl MockLedger {
        fn with_mint(asset: &Pubkey) -> Self {
            let mut ledger = Self::default();
            ledger.decimals.insert(*asset, EXPECTED_ASSET_DECIMALS);
            ledger
        }

        fn script_sends(&self, outcomes: Vec<Result<(), String>>) {
            *self.send_outcomes.lock().unwrap() = outcomes.into();
        }

        fn send_count(&self) -> u32 {
            self.sends.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SolanaLedger for MockLedger {
        async fn token_account(
            &self,
            address: &Pubkey,
        ) -> Result<Option<TokenAccountInfo>, LedgerError> {
            Ok(self.token_accounts.get(address).copied())
        }

        async fn mint_decimals(&self, mint: &Pubkey) -> Result<Option<u8>, LedgerError> {
            Ok(self.decimals.get(mint).copied())
        }

        async fn block_height(&self) -> Result<u64, LedgerError> {
            Ok(self.block_height)
        }

        async fn latest_blockhash(&self) -> Result<Hash, LedgerError> {
            Ok(Hash::default())
        }

        async fn send_transaction(
            &self,
            transaction: &Transaction,
        ) -> Result<Signature, LedgerError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            match self.send_outcomes.lock().unwrap().pop_front() {
                Some(Err(message)) => Err(LedgerError::Rpc(message)),
                _ => Ok(transaction.signatures.first().copied().unwrap_or_default()),
            }
        }

        async fn confirm_transaction(
            &self,
            _signature: &Signature,
            _last_valid_block_height: Option<u64>,
        ) -> Result<(), LedgerError> {
            Ok(())
        }
    }

    struct MockProvider {
        networks: Vec<ChainId>,
        ledger: Arc<MockLedger>,
        signer: Option<Keypair>,
    }

    impl SolanaChainProvider for MockProvider {
        type Ledger = MockLedger;

        fn connection(&self, chain_id: &ChainId) -> Result<Arc<MockLedger>, ConnectionError> {
            if self.networks.contains(chain_id) {
                Ok(Arc::clone(&self.ledger))
            } else {
                Err(ConnectionError::NotConfigured(chain_id.to_string()))
            }
        }

        fn networks(&self) -> &[ChainId] {
            &self.networks
        }

        fn settlement_signer(&self) -> Option<&Keypair> {
            self.signer.as_ref()
        }
    }

    fn devnet() -> ChainId {
        ChainId::from_network_name("solana-devnet").unwrap()
    }

    fn facilitator(
        ledger: MockLedger,
        signer: Option<Keypair>,
    ) -> (V1SolanaExactFacilitator<MockProvider>, Arc<MockLedger>) {
        let ledger = Arc::new(ledger);
        let provider = MockProvider {
            networks: vec![devnet()],
            ledger: Arc::clone(&ledger),
            signer,
        };
        (V1SolanaExactFacilitator::new(provider), ledger)
    }

    fn now_plus(secs: u64) -> u64 {
        UnixTimestamp::now().as_secs() + secs
    }

    fn auth_json(
        payer: &Pubkey,
        payee: &Pubkey,
        asset: &Pubkey,
        value: &str,
        valid_before: Option<u64>,
        nonce: Option<&str>,
    ) -> serde_json::Value {
        let mut auth = json!({
            "from": payer.to_string(),
            "to": payee.to_string(),
            "value": value,
            "asset": asset.to_string(),
        });
        if let Some(valid_before) = valid_before {
            auth["validBefore"] = json!(valid_before);
        }
        if let Some(nonce) = nonce {
            auth["nonce"] = json!(nonce);
        }
        auth
    }

    fn payload_json(network: &str, auth: serde_json::Value) -> serde_json::Value {
        json!({
            "x402Version": 1,
            "scheme": "exact",
            "network": network,
            "payload": { "authorization": auth }
        })
    }

    fn requirements_json(asset: &Pubkey, payee: &Pubkey, amount: &str) -> serde_json::Value {
        json!({
            "scheme": "exact",
            "network": "solana-devnet",
            "asset": asset.to_string(),
            "payTo": payee.to_string(),
            "maxAmountRequired": amount,
            "maxTimeoutSeconds": 600
        })
    }

    fn request(
        payload: serde_json::Value,
        requirements: serde_json::Value,
    ) -> proto::VerifyRequest {
        proto::VerifyRequest {
            x402_version: 1,
            payment_payload: payload,
            payment_requirements: requirements,
        }
    }

    fn encode_tx(transaction: &Transaction) -> String {
        BASE64_STANDARD.encode(bincode::serialize(transaction).unwrap())
    }

    fn signed_transfer_tx(
        source: &Pubkey,
        destination: &Pubkey,
        authority: &Keypair,
        amount: u64,
    ) -> Transaction {
        #[allow(deprecated)]
        let instruction = spl_token::instruction::transfer(
            &spl_token::id(),
            source,
            destination,
            &authority.pubkey(),
            &[],
            amount,
        )
        .unwrap();
        Transaction::new_signed_with_payer(
            &[instruction],
            Some(&authority.pubkey()),
            &[authority],
            Hash::default(),
        )
    }

    async fn expect_invalid(
        facilitator: &V1SolanaExactFacilitator<MockProvider>,
        request: &proto::VerifyRequest,
        reason: &str,
    ) {
        let response = facilitator.verify(request).await.unwrap();
        assert!(!response.is_valid);
        assert_eq!(response.invalid_reason.as_deref(), Some(reason));
    }

    #[tokio::test]
    async fn scenario_a_valid_then_replay() {
        let asset = Pubkey::new_unique();
        let payer = Pubkey::new_unique();
        let payee = Pubkey::new_unique();
        let (facilitator, _) = facilitator(MockLedger::with_mint(&asset), None);
        let req = request(
            payload_json(
                "solana-devnet",
                auth_json(&payer, &payee, &asset, "1000000", Some(now_plus(120)), Some("abc")),
            ),
            requirements_json(&asset, &payee, "1000000"),
        );

        let first = facilitator.verify(&req).await.unwrap();
        assert!(first.is_valid);
        assert!(first.invalid_reason.is_none());

        expect_invalid(&facilitator, &req, "ReplayDetected").await;
    }

    #[tokio::test]
    async fn version_mismatch_regardless_of_other_fields() {
        let asset = Pubkey::new_unique();
        let payer = Pubkey::new_unique();
        let payee = Pubkey::new_unique();
        let (facilitator, _) = facilitator(MockLedger::with_mint(&asset), None);
        let mut payload = payload_json(
            "solana-devnet",
            auth_json(&payer, &payee, &asset, "1000000", Some(now_plus(120)), Some("v2")),
        );
        payload["x402Version"] = json!(2);
        let req = request(payload, requirements_json(&asset, &payee, "1000000"));
        expect_invalid(&facilitator, &req, "VersionMismatch").await;
    }

    #[tokio::test]
    async fn scenario_b_amount_mismatch() {
        let asset = Pubkey::new_unique();
        let payer = Pubkey::new_unique();
        let payee = Pubkey::new_unique();
        let (facilitator, _) = facilitator(MockLedger::with_mint(&asset), None);
        let req = request(
            payload_json(
                "solana-devnet",
                auth_json(&payer, &payee, &asset, "500000", Some(now_plus(120)), Some("b")),
            ),
            requirements_json(&asset, &payee, "1000000"),
        );
        expect_invalid(&facilitator, &req, "AmountMismatch").await;
    }

    #[tokio::test]
    async fn zero_amount_is_still_a_mismatch() {
        let asset = Pubkey::new_unique();
        let payer = Pubkey::new_unique();
        let payee = Pubkey::new_unique();
        let (facilitator, _) = facilitator(MockLedger::with_mint(&asset), None);
        let req = request(
            payload_json(
                "solana-devnet",
                auth_json(&payer, &payee, &asset, "0", Some(now_plus(120)), Some("z")),
            ),
            requirements_json(&asset, &payee, "1000000"),
        );
        expect_invalid(&facilitator, &req, "AmountMismatch").await;
    }

    #[tokio::test]
    async fn scenario_c_expired() {
        let asset = Pubkey::new_unique();
        let payer = Pubkey::new_unique();
        let payee = Pubkey::new_unique();
        let (facilitator, _) = facilitator(MockLedger::with_mint(&asset), None);
        let expired = UnixTimestamp::now().as_secs() - 1;
        let req = request(
            payload_json(
                "solana-devnet",
                auth_json(&payer, &payee, &asset, "1000000", Some(expired), Some("c")),
            ),
            requirements_json(&asset, &payee, "1000000"),
        );
        expect_invalid(&facilitator, &req, "Expired").await;
    }

    #[tokio::test]
    async fn missing_valid_before_reads_as_expired() {
        let asset = Pubkey::new_unique();
        let payer = Pubkey::new_unique();
        let payee = Pubkey::new_unique();
        let (facilitator, _) = facilitator(MockLedger::with_mint(&asset), None);
        let req = request(
            payload_json(
                "solana-devnet",
                auth_json(&payer, &payee, &asset, "1000000", None, Some("nv")),
            ),
            requirements_json(&asset, &payee, "1000000"),
        );
        expect_invalid(&facilitator, &req, "Expired").await;
    }

    #[tokio::test]
    async fn validity_window_beyond_timeout_plus_grace() {
        let asset = Pubkey::new_unique();
        let payer = Pubkey::new_unique();
        let payee = Pubkey::new_unique();
        let (facilitator, _) = facilitator(MockLedger::with_mint(&asset), None);
        // maxTimeoutSeconds is 600, grace 30; 700 is out of bounds.
        let req = request(
            payload_json(
                "solana-devnet",
                auth_json(&payer, &payee, &asset, "1000000", Some(now_plus(700)), Some("w")),
            ),
            requirements_json(&asset, &payee, "1000000"),
        );
        expect_invalid(&facilitator, &req, "InvalidValidityWindow").await;
    }

    #[tokio::test]
    async fn missing_nonce_and_missing_authorization() {
        let asset = Pubkey::new_unique();
        let payer = Pubkey::new_unique();
        let payee = Pubkey::new_unique();
        let (facilitator, _) = facilitator(MockLedger::with_mint(&asset), None);

        let no_nonce = request(
            payload_json(
                "solana-devnet",
                auth_json(&payer, &payee, &asset, "1000000", Some(now_plus(120)), None),
            ),
            requirements_json(&asset, &payee, "1000000"),
        );
        expect_invalid(&facilitator, &no_nonce, "MissingNonce").await;

        let no_auth = request(
            json!({
                "x402Version": 1,
                "scheme": "exact",
                "network": "solana-devnet",
                "payload": {}
            }),
            requirements_json(&asset, &payee, "1000000"),
        );
        expect_invalid(&facilitator, &no_auth, "MissingAuthorization").await;
    }

    #[tokio::test]
    async fn scheme_recipient_and_asset_mismatches() {
        let asset = Pubkey::new_unique();
        let payer = Pubkey::new_unique();
        let payee = Pubkey::new_unique();
        let (facilitator, _) = facilitator(MockLedger::with_mint(&asset), None);

        let mut wrong_scheme = payload_json(
            "solana-devnet",
            auth_json(&payer, &payee, &asset, "1000000", Some(now_plus(120)), Some("s")),
        );
        wrong_scheme["scheme"] = json!("deferred");
        let req = request(wrong_scheme, requirements_json(&asset, &payee, "1000000"));
        expect_invalid(&facilitator, &req, "SchemeMismatch").await;

        let other_payee = Pubkey::new_unique();
        let req = request(
            payload_json(
                "solana-devnet",
                auth_json(&payer, &other_payee, &asset, "1000000", Some(now_plus(120)), Some("r")),
            ),
            requirements_json(&asset, &payee, "1000000"),
        );
        expect_invalid(&facilitator, &req, "RecipientMismatch").await;

        let other_asset = Pubkey::new_unique();
        let req = request(
            payload_json(
                "solana-devnet",
                auth_json(&payer, &payee, &other_asset, "1000000", Some(now_plus(120)), Some("m")),
            ),
            requirements_json(&asset, &payee, "1000000"),
        );
        expect_invalid(&facilitator, &req, "AssetMismatch").await;
    }

    #[tokio::test]
    async fn network_mismatch_when_constrained() {
        let asset = Pubkey::new_unique();
        let payer = Pubkey::new_unique();
        let payee = Pubkey::new_unique();
        let (facilitator, _) = facilitator(MockLedger::with_mint(&asset), None);
        let req = request(
            payload_json(
                "solana",
                auth_json(&payer, &payee, &asset, "1000000", Some(now_plus(120)), Some("n")),
            ),
            requirements_json(&asset, &payee, "1000000"),
        );
        expect_invalid(&facilitator, &req, "NetworkMismatch").await;
    }

    #[tokio::test]
    async fn unconstrained_network_trusts_payload() {
        let asset = Pubkey::new_unique();
        let payer = Pubkey::new_unique();
        let payee = Pubkey::new_unique();
        let (facilitator, _) = facilitator(MockLedger::with_mint(&asset), None);
        let mut requirements = requirements_json(&asset, &payee, "1000000");
        requirements.as_object_mut().unwrap().remove("network");
        let req = request(
            payload_json(
                "solana-devnet",
                auth_json(&payer, &payee, &asset, "1000000", Some(now_plus(120)), Some("u")),
            ),
            requirements,
        );
        let response = facilitator.verify(&req).await.unwrap();
        assert!(response.is_valid);
    }

    #[tokio::test]
    async fn unexpected_precision() {
        let asset = Pubkey::new_unique();
        let payer = Pubkey::new_unique();
        let payee = Pubkey::new_unique();
        let mut ledger = MockLedger::default();
        ledger.decimals.insert(asset, 9);
        let (facilitator, _) = facilitator(ledger, None);
        let req = request(
            payload_json(
                "solana-devnet",
                auth_json(&payer, &payee, &asset, "1000000", Some(now_plus(120)), Some("p")),
            ),
            requirements_json(&asset, &payee, "1000000"),
        );
        expect_invalid(&facilitator, &req, "UnexpectedPrecision").await;
    }

    #[tokio::test]
    async fn blockhash_expired_early_exit() {
        let asset = Pubkey::new_unique();
        let payer = Pubkey::new_unique();
        let payee = Pubkey::new_unique();
        let mut ledger = MockLedger::with_mint(&asset);
        ledger.block_height = 50;
        let (facilitator, _) = facilitator(ledger, None);
        let mut payload = payload_json(
            "solana-devnet",
            auth_json(&payer, &payee, &asset, "1000000", Some(now_plus(120)), Some("bh")),
        );
        payload["payload"]["transactionMeta"] = json!({
            "blockhash": Hash::default().to_string(),
            "lastValidBlockHeight": 40
        });
        let req = request(payload, requirements_json(&asset, &payee, "1000000"));
        expect_invalid(&facilitator, &req, "BlockhashExpired").await;
    }

    #[tokio::test]
    async fn embedded_transfer_matching_authorization_is_valid() {
        let asset = Pubkey::new_unique();
        let payee = Pubkey::new_unique();
        let authority = Keypair::new();
        let source = Pubkey::new_unique();
        let destination = Pubkey::new_unique();

        let mut ledger = MockLedger::with_mint(&asset);
        ledger.token_accounts.insert(
            destination,
            TokenAccountInfo { owner: payee, mint: asset, amount: 0 },
        );
        let (facilitator, _) = facilitator(ledger, None);

        let transaction = signed_transfer_tx(&source, &destination, &authority, 1_000_000);
        let mut payload = payload_json(
            "solana-devnet",
            auth_json(
                &authority.pubkey(),
                &payee,
                &asset,
                "1000000",
                Some(now_plus(120)),
                Some("tx-ok"),
            ),
        );
        payload["payload"]["signedTransaction"] = json!(encode_tx(&transaction));
        let req = request(payload, requirements_json(&asset, &payee, "1000000"));
        let response = facilitator.verify(&req).await.unwrap();
        assert!(response.is_valid, "unexpected: {:?}", response.invalid_reason);
    }

    #[tokio::test]
    async fn embedded_transfer_amount_mismatch() {
        let asset = Pubkey::new_unique();
        let payee = Pubkey::new_unique();
        let authority = Keypair::new();
        let destination = Pubkey::new_unique();

        let mut ledger = MockLedger::with_mint(&asset);
        ledger.token_accounts.insert(
            destination,
            TokenAccountInfo { owner: payee, mint: asset, amount: 0 },
        );
        let (facilitator, _) = facilitator(ledger, None);

        // Authorization is internally self-consistent; the embedded transfer
        // moves a different amount.
        let transaction =
            signed_transfer_tx(&Pubkey::new_unique(), &destination, &authority, 999_999);
        let mut payload = payload_json(
            "solana-devnet",
            auth_json(
                &authority.pubkey(),
                &payee,
                &asset,
                "1000000",
                Some(now_plus(120)),
                Some("tx-amt"),
            ),
        );
        payload["payload"]["signedTransaction"] = json!(encode_tx(&transaction));
        let req = request(payload, requirements_json(&asset, &payee, "1000000"));
        expect_invalid(&facilitator, &req, "AmountMismatch").await;
    }

    #[tokio::test]
    async fn embedded_transfer_signature_owner_and_mint_failures() {
        let asset = Pubkey::new_unique();
        let payee = Pubkey::new_unique();
        let authority = Keypair::new();
        let destination = Pubkey::new_unique();
        let stranger_owned = Pubkey::new_unique();
        let wrong_mint_account = Pubkey::new_unique();

        let mut ledger = MockLedger::with_mint(&asset);
        ledger.token_accounts.insert(
            stranger_owned,
            TokenAccountInfo { owner: Pubkey::new_unique(), mint: asset, amount: 0 },
        );
        ledger.token_accounts.insert(
            wrong_mint_account,
            TokenAccountInfo { owner: payee, mint: Pubkey::new_unique(), amount: 0 },
        );
        let (facilitator, _) = facilitator(ledger, None);

        let base_payload = |nonce: &str, tx: &Transaction| {
            let mut payload = payload_json(
                "solana-devnet",
                auth_json(
                    &authority.pubkey(),
                    &payee,
                    &asset,
                    "1000000",
                    Some(now_plus(120)),
                    Some(nonce),
                ),
            );
            payload["payload"]["signedTransaction"] = json!(encode_tx(tx));
            payload
        };
        let requirements = || requirements_json(&asset, &payee, "1000000");

        // Tampered signature.
        let mut tampered = signed_transfer_tx(&Pubkey::new_unique(), &destination, &authority, 1_000_000);
        tampered.signatures[0] = Signature::default();
        let req = request(base_payload("sig", &tampered), requirements());
        expect_invalid(&facilitator, &req, "InvalidSignature").await;

        // Destination account unknown on ledger.
        let missing = signed_transfer_tx(&Pubkey::new_unique(), &destination, &authority, 1_000_000);
        let req = request(base_payload("dst", &missing), requirements());
        expect_invalid(&facilitator, &req, "DestinationNotFound").await;

        // Destination owned by someone other than the payee.
        let owner = signed_transfer_tx(&Pubkey::new_unique(), &stranger_owned, &authority, 1_000_000);
        let req = request(base_payload("own", &owner), requirements());
        expect_invalid(&facilitator, &req, "OwnerMismatch").await;

        // Destination holds a different mint.
        let mint = signed_transfer_tx(&Pubkey::new_unique(), &wrong_mint_account, &authority, 1_000_000);
        let req = request(base_payload("mnt", &mint), requirements());
        expect_invalid(&facilitator, &req, "MintMismatch").await;
    }

    #[tokio::test]
    async fn embedded_transfer_instruction_shape_failures() {
        let asset = Pubkey::new_unique();
        let payee = Pubkey::new_unique();
        let authority = Keypair::new();
        let destination = Pubkey::new_unique();
        let (facilitator, _) = facilitator(MockLedger::with_mint(&asset), None);

        let requirements = || requirements_json(&asset, &payee, "1000000");
        let wrap = |nonce: &str, tx: &Transaction| {
            let mut payload = payload_json(
                "solana-devnet",
                auth_json(
                    &authority.pubkey(),
                    &payee,
                    &asset,
                    "1000000",
                    Some(now_plus(120)),
                    Some(nonce),
                ),
            );
            payload["payload"]["signedTransaction"] = json!(encode_tx(tx));
            payload
        };

        // No instruction targets a token program.
        #[allow(deprecated)]
        let mut foreign = spl_token::instruction::transfer(
            &spl_token::id(),
            &Pubkey::new_unique(),
            &destination,
            &authority.pubkey(),
            &[],
            1_000_000,
        )
        .unwrap();
        foreign.program_id = Pubkey::new_unique();
        let tx = Transaction::new_signed_with_payer(
            &[foreign],
            Some(&authority.pubkey()),
            &[&authority],
            Hash::default(),
        );
        let req = request(wrap("no-ix", &tx), requirements());
        expect_invalid(&facilitator, &req, "MissingTransferInstruction").await;

        // Truncated instruction data.
        #[allow(deprecated)]
        let mut truncated = spl_token::instruction::transfer(
            &spl_token::id(),
            &Pubkey::new_unique(),
            &destination,
            &authority.pubkey(),
            &[],
            1_000_000,
        )
        .unwrap();
        truncated.data = vec![TRANSFER_OPCODE];
        let tx = Transaction::new_signed_with_payer(
            &[truncated],
            Some(&authority.pubkey()),
            &[&authority],
            Hash::default(),
        );
        let req = request(wrap("short", &tx), requirements());
        expect_invalid(&facilitator, &req, "InvalidInstructionData").await;

        // Wrong opcode (TransferChecked instead of Transfer).
        #[allow(deprecated)]
        let mut wrong_op = spl_token::instruction::transfer(
            &spl_token::id(),
            &Pubkey::new_unique(),
            &destination,
            &authority.pubkey(),
            &[],
            1_000_000,
        )
        .unwrap();
        wrong_op.data[0] = 12;
        let tx = Transaction::new_signed_with_payer(
            &[wrong_op],
            Some(&authority.pubkey()),
            &[&authority],
            Hash::default(),
        );
        let req = request(wrap("opcode", &tx), requirements());
        expect_invalid(&facilitator, &req, "InvalidInstructionData").await;

        // Garbage base64 is a decode failure.
        let mut payload = payload_json(
            "solana-devnet",
            auth_json(
                &authority.pubkey(),
                &payee,
                &asset,
                "1000000",
                Some(now_plus(120)),
                Some("garbage"),
            ),
        );
        payload["payload"]["signedTransaction"] = json!("not a transaction");
        let req = request(payload, requirements());
        expect_invalid(&facilitator, &req, "DecodeError").await;
    }

    #[tokio::test]
    async fn supported_is_pure() {
        let asset = Pubkey::new_unique();
        let (facilitator, _) = facilitator(MockLedger::with_mint(&asset), None);
        let first = facilitator.supported().await.unwrap();
        let second = facilitator.supported().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.kinds.len(), 1);
        assert_eq!(first.kinds[0].scheme, "exact");
        assert_eq!(first.kinds[0].network, "solana-devnet");
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_d_presigned_succeeds_on_third_attempt() {
        let asset = Pubkey::new_unique();
        let payee = Pubkey::new_unique();
        let authority = Keypair::new();
        let transaction =
            signed_transfer_tx(&Pubkey::new_unique(), &Pubkey::new_unique(), &authority, 1_000_000);
        let expected_reference = transaction.signatures[0].to_string();

        let ledger = MockLedger::with_mint(&asset);
        ledger.script_sends(vec![
            Err("blockhash not found".into()),
            Err("node is behind".into()),
            Ok(()),
        ]);
        let (facilitator, ledger) = facilitator(ledger, None);

        let mut payload = payload_json(
            "solana-devnet",
            auth_json(
                &authority.pubkey(),
                &payee,
                &asset,
                "1000000",
                Some(now_plus(120)),
                Some("d"),
            ),
        );
        payload["payload"]["signedTransaction"] = json!(encode_tx(&transaction));
        let req = request(payload, requirements_json(&asset, &payee, "1000000"));

        let response = facilitator.settle(&req).await.unwrap();
        assert!(response.success, "unexpected: {:?}", response.error);
        assert_eq!(response.settlement_reference.as_deref(), Some(expected_reference.as_str()));
        assert_eq!(response.network_id.as_deref(), Some("solana-devnet"));
        assert_eq!(ledger.send_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn presigned_retries_exhausted_is_submission_failure() {
        let asset = Pubkey::new_unique();
        let payee = Pubkey::new_unique();
        let authority = Keypair::new();
        let transaction =
            signed_transfer_tx(&Pubkey::new_unique(), &Pubkey::new_unique(), &authority, 1_000_000);

        let ledger = MockLedger::with_mint(&asset);
        ledger.script_sends(vec![
            Err("one".into()),
            Err("two".into()),
            Err("three".into()),
        ]);
        let (facilitator, ledger) = facilitator(ledger, None);

        let mut payload = payload_json(
            "solana-devnet",
            auth_json(
                &authority.pubkey(),
                &payee,
                &asset,
                "1000000",
                Some(now_plus(120)),
                Some("x"),
            ),
        );
        payload["payload"]["signedTransaction"] = json!(encode_tx(&transaction));
        let req = request(payload, requirements_json(&asset, &payee, "1000000"));

        let response = facilitator.settle(&req).await.unwrap();
        assert!(!response.success);
        let error = response.error.unwrap();
        assert!(error.starts_with("SubmissionFailure"), "{error}");
        assert!(error.contains("three"), "{error}");
        assert_eq!(ledger.send_count(), 3);
    }

    #[tokio::test]
    async fn legacy_path_transfers_and_confirms_once() {
        let asset = Pubkey::new_unique();
        let payer = Pubkey::new_unique();
        let payee = Pubkey::new_unique();
        let signer = Keypair::new();

        let source = get_associated_token_address(&payer, &asset);
        let destination = get_associated_token_address(&payee, &asset);
        let mut ledger = MockLedger::with_mint(&asset);
        ledger.token_accounts.insert(
            source,
            TokenAccountInfo { owner: payer, mint: asset, amount: 2_000_000 },
        );
        ledger.token_accounts.insert(
            destination,
            TokenAccountInfo { owner: payee, mint: asset, amount: 0 },
        );
        let (facilitator, ledger) = facilitator(ledger, Some(signer));

        let req = request(
            payload_json(
                "solana-devnet",
                auth_json(&payer, &payee, &asset, "1000000", Some(now_plus(120)), Some("l")),
            ),
            requirements_json(&asset, &payee, "1000000"),
        );
        let response = facilitator.settle(&req).await.unwrap();
        assert!(response.success, "unexpected: {:?}", response.error);
        assert!(response.settlement_reference.is_some());
        assert_eq!(ledger.send_count(), 1);
    }

    #[tokio::test]
    async fn legacy_path_insufficient_balance_sends_nothing() {
        let asset = Pubkey::new_unique();
        let payer = Pubkey::new_unique();
        let payee = Pubkey::new_unique();
        let signer = Keypair::new();

        let source = get_associated_token_address(&payer, &asset);
        let destination = get_associated_token_address(&payee, &asset);
        let mut ledger = MockLedger::with_mint(&asset);
        ledger.token_accounts.insert(
            source,
            TokenAccountInfo { owner: payer, mint: asset, amount: 10 },
        );
        ledger.token_accounts.insert(
            destination,
            TokenAccountInfo { owner: payee, mint: asset, amount: 0 },
        );
        let (facilitator, ledger) = facilitator(ledger, Some(signer));

        let req = request(
            payload_json(
                "solana-devnet",
                auth_json(&payer, &payee, &asset, "1000000", Some(now_plus(120)), Some("i")),
            ),
            requirements_json(&asset, &payee, "1000000"),
        );
        let response = facilitator.settle(&req).await.unwrap();
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("InsufficientBalance"));
        assert_eq!(ledger.send_count(), 0);
    }

    #[tokio::test]
    async fn legacy_path_without_signer_is_unavailable() {
        let asset = Pubkey::new_unique();
        let payer = Pubkey::new_unique();
        let payee = Pubkey::new_unique();
        let (facilitator, _) = facilitator(MockLedger::with_mint(&asset), None);
        let req = request(
            payload_json(
                "solana-devnet",
                auth_json(&payer, &payee, &asset, "1000000", Some(now_plus(120)), Some("ns")),
            ),
            requirements_json(&asset, &payee, "1000000"),
        );
        let response = facilitator.settle(&req).await.unwrap();
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("SigningUnavailable"));
    }

    #[tokio::test]
    async fn settle_never_touches_the_nonce_ledger() {
        let asset = Pubkey::new_unique();
        let payee = Pubkey::new_unique();
        let authority = Keypair::new();
        let destination = Pubkey::new_unique();
        let transaction =
            signed_transfer_tx(&Pubkey::new_unique(), &destination, &authority, 1_000_000);
        let mut ledger = MockLedger::with_mint(&asset);
        ledger.token_accounts.insert(
            destination,
            TokenAccountInfo { owner: payee, mint: asset, amount: 0 },
        );
        let (facilitator, _) = facilitator(ledger, None);

        let mut payload = payload_json(
            "solana-devnet",
            auth_json(
                &authority.pubkey(),
                &payee,
                &asset,
                "1000000",
                Some(now_plus(120)),
                Some("shared"),
            ),
        );
        payload["payload"]["signedTransaction"] = json!(encode_tx(&transaction));
        let req = request(payload, requirements_json(&asset, &payee, "1000000"));

        assert!(facilitator.settle(&req).await.unwrap().success);
        assert!(facilitator.settle(&req).await.unwrap().success);
        // The nonce is still free for verification to spend.
        assert!(facilitator.verify(&req).await.unwrap().is_valid);
    }
}
