//! The ledger-access seam between the facilitator and Solana.
//!
//! [`SolanaLedger`] is everything the validator and settlement executor need
//! from a network: token account parsing, mint precision, block height,
//! blockhash, submission, and confirmation. Production uses [`RpcLedger`]
//! over JSON-RPC; tests substitute an in-memory implementation.

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_commitment_config::CommitmentConfig;
use solana_hash::Hash;
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_transaction::Transaction;
use spl_token_2022::extension::StateWithExtensions;
use spl_token_2022::state::{Account as TokenAccountState, Mint as MintState};
use std::time::Duration;
use url::Url;

/// The parsed state of an SPL token account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAccountInfo {
    /// The wallet that owns the token account.
    pub owner: Pubkey,
    /// The mint the account holds balances of.
    pub mint: Pubkey,
    /// Current balance in the mint's smallest unit.
    pub amount: u64,
}

/// A fault reaching the ledger. These are I/O-level failures, distinct from
/// the named verification and settlement reasons.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("rpc: {0}")]
    Rpc(String),
    #[error("confirmation timed out for {0}")]
    ConfirmationTimeout(Signature),
    #[error("blockhash expired before confirmation of {0}")]
    BlockhashExpired(Signature),
}

/// Ledger operations consumed by the facilitator.
#[async_trait]
pub trait SolanaLedger {
    /// Parses the token account at `address`. Returns `None` when the account
    /// does not exist or does not hold SPL token account state.
    async fn token_account(&self, address: &Pubkey) -> Result<Option<TokenAccountInfo>, LedgerError>;

    /// Returns the decimal precision of `mint`, or `None` when the account is
    /// missing or is not a mint.
    async fn mint_decimals(&self, mint: &Pubkey) -> Result<Option<u8>, LedgerError>;

    /// Current block height at confirmed commitment.
    async fn block_height(&self) -> Result<u64, LedgerError>;

    /// A recent blockhash for building a transaction.
    async fn latest_blockhash(&self) -> Result<Hash, LedgerError>;

    /// Submits a signed transaction and returns its signature.
    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, LedgerError>;

    /// Waits for `signature` to reach confirmed commitment.
    ///
    /// With `last_valid_block_height` the wait is bounded by ledger height;
    /// without it, by a fixed polling budget.
    async fn confirm_transaction(
        &self,
        signature: &Signature,
        last_valid_block_height: Option<u64>,
    ) -> Result<(), LedgerError>;
}

const CONFIRM_POLL_INTERVAL: Duration = Duration::from_millis(400);
const CONFIRM_POLL_BUDGET: u32 = 75;

/// JSON-RPC implementation of [`SolanaLedger`].
pub struct RpcLedger {
    rpc: RpcClient,
}

impl RpcLedger {
    pub fn new(endpoint: Url) -> Self {
        Self {
            rpc: RpcClient::new_with_commitment(
                endpoint.to_string(),
                CommitmentConfig::confirmed(),
            ),
        }
    }

    async fn account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, LedgerError> {
        let response = self
            .rpc
            .get_account_with_commitment(address, CommitmentConfig::confirmed())
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))?;
        Ok(response.value.map(|account| account.data))
    }
}

#[async_trait]
impl SolanaLedger for RpcLedger {
    async fn token_account(&self, address: &Pubkey) -> Result<Option<TokenAccountInfo>, LedgerError> {
        let Some(data) = self.account_data(address).await? else {
            return Ok(None);
        };
        // Token-2022 account state is a superset of the classic layout, so a
        // single unpack covers both token programs.
        let parsed = match StateWithExtensions::<TokenAccountState>::unpack(&data) {
            Ok(state) => state.base,
            Err(_) => return Ok(None),
        };
        Ok(Some(TokenAccountInfo {
            owner: parsed.owner,
            mint: parsed.mint,
            amount: parsed.amount,
        }))
    }

    async fn mint_decimals(&self, mint: &Pubkey) -> Result<Option<u8>, LedgerError> {
        let Some(data) = self.account_data(mint).await? else {
            return Ok(None);
        };
        let parsed = match StateWithExtensions::<MintState>::unpack(&data) {
            Ok(state) => state.base,
            Err(_) => return Ok(None),
        };
        Ok(Some(parsed.decimals))
    }

    async fn block_height(&self) -> Result<u64, LedgerError> {
        self.rpc
            .get_block_height()
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))
    }

    async fn latest_blockhash(&self) -> Result<Hash, LedgerError> {
        self.rpc
            .get_latest_blockhash()
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))
    }

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, LedgerError> {
        self.rpc
            .send_transaction(transaction)
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))
    }

    async fn confirm_transaction(
        &self,
        signature: &Signature,
        last_valid_block_height: Option<u64>,
    ) -> Result<(), LedgerError> {
        let mut polls_left = CONFIRM_POLL_BUDGET;
        loop {
            let statuses = self
                .rpc
                .get_signature_statuses(&[*signature])
                .await
                .map_err(|e| LedgerError::Rpc(e.to_string()))?;
            if let Some(Some(status)) = statuses.value.first() {
                if let Some(err) = &status.err {
                    return Err(LedgerError::Rpc(format!("transaction failed: {err}")));
                }
                if status.satisfies_commitment(CommitmentConfig::confirmed()) {
                    return Ok(());
                }
            }
            match last_valid_block_height {
                Some(height) => {
                    if self.block_height().await? > height {
                        return Err(LedgerError::BlockhashExpired(*signature));
                    }
                }
                None => {
                    polls_left = polls_left.saturating_sub(1);
                    if polls_left == 0 {
                        return Err(LedgerError::ConfirmationTimeout(*signature));
                    }
                }
            }
            tokio::time::sleep(CONFIRM_POLL_INTERVAL).await;
        }
    }
}
