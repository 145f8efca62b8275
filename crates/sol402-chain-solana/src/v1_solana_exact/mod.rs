//! V1 Solana "exact" payment scheme implementation.
//!
//! The exact scheme requires the transferred amount to equal the required
//! amount with zero tolerance. Payments are SPL token transfers: either a
//! pre-signed transaction embedded in the payload (preferred) or, as a
//! deprecated fallback, a transfer the facilitator builds and signs itself.
//!
//! # Verification
//!
//! Verification binds the opaque pre-signed transaction to the semantic claim
//! in its authorization block: signatures are checked cryptographically, the
//! transfer instruction is decoded at the byte level, and the destination
//! account is resolved on-ledger to its owner and mint. The byte layout
//! (opcode position, amount width and endianness, account-key ordering) is a
//! bit-exact contract.

use sol402_types::scheme::X402SchemeId;

pub mod facilitator;
pub use facilitator::*;

pub mod types;
pub use types::*;

pub struct V1SolanaExact;

impl X402SchemeId for V1SolanaExact {
    fn x402_version(&self) -> u8 {
        1
    }
    fn namespace(&self) -> &str {
        "solana"
    }
    fn scheme(&self) -> &str {
        ExactScheme.as_ref()
    }
}
