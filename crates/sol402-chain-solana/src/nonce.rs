//! Replay-protection cache keyed by single-use nonce.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use sol402_types::timestamp::UnixTimestamp;

/// In-memory ledger of spent nonces.
///
/// Each entry maps a nonce to the `validBefore` that registered it. A nonce
/// accepted once cannot be accepted again before that expiry; entries past
/// expiry are evictable and the nonce becomes reusable. Owned by the
/// facilitator instance, never shared process-wide.
#[derive(Debug, Default)]
pub struct NonceLedger {
    entries: DashMap<String, UnixTimestamp>,
}

impl NonceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claims `nonce` until `expiry`.
    ///
    /// Returns `false` when the nonce is already registered and unexpired
    /// (a replay). An expired entry is replaced in place, making the nonce
    /// reusable. The entry lock makes the check-then-set atomic: two racing
    /// callers cannot both claim the same nonce.
    pub fn register(&self, nonce: &str, expiry: UnixTimestamp) -> bool {
        match self.entries.entry(nonce.to_string()) {
            Entry::Occupied(mut occupied) => {
                if *occupied.get() > UnixTimestamp::now() {
                    false
                } else {
                    occupied.insert(expiry);
                    true
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(expiry);
                true
            }
        }
    }

    /// Evicts every entry whose expiry has passed.
    ///
    /// Invoked opportunistically on each verification call; there is no
    /// background cadence.
    pub fn sweep(&self) {
        let now = UnixTimestamp::now();
        self.entries.retain(|_, expiry| *expiry > now);
    }

    /// Number of live entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
