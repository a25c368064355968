//! Claim orchestration: validate, check eligibility, allocate, record.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, warn};

use crate::allocator::allocate_one;
use crate::eligibility::check_eligibility;
use crate::error::ClaimError;
use crate::traits::CouponStore;
use crate::types::{ClaimId, NewClaim};

/// Outcome of a successful claim. Carries the redeemable value only —
/// the code's internal id never reaches the requester.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClaimReceipt {
    pub code_value: String,
    pub claim_id: ClaimId,
}

/// One entry in a session's claim history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryEntry {
    pub code_value: String,
    pub timestamp: DateTime<Utc>,
}

/// Composes the eligibility checker, allocator, and ledger write into
/// one logical claim operation.
#[derive(Clone)]
pub struct ClaimService {
    store: Arc<dyn CouponStore>,
    cooldown: Duration,
}

impl ClaimService {
    pub fn new(store: Arc<dyn CouponStore>, cooldown: Duration) -> Self {
        Self { store, cooldown }
    }

    /// Claim one code for the requester, at the current time.
    pub fn claim(&self, network_address: &str, session_id: &str) -> Result<ClaimReceipt, ClaimError> {
        self.claim_at(network_address, session_id, Utc::now())
    }

    /// Claim one code for the requester as of `now`.
    ///
    /// Stages: validate input, check eligibility, allocate, record. Each
    /// of the first three stages rejects terminally with no store
    /// mutation; allocation is the first (and only) mutation before the
    /// ledger write.
    ///
    /// If the ledger write fails after allocation, the write is retried
    /// once; a second failure is logged at `error` and surfaced as
    /// [`ClaimError::ClaimRecordFailed`]. The code's `claimed_by` field
    /// is the durable source of truth in that state, so the claim can be
    /// reconstructed by an operator rather than lost.
    pub fn claim_at(
        &self,
        network_address: &str,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ClaimReceipt, ClaimError> {
        if session_id.trim().is_empty() {
            return Err(ClaimError::SessionRequired);
        }

        if let Err(denial) =
            check_eligibility(self.store.as_ref(), network_address, session_id, self.cooldown, now)
        {
            debug!(address = %network_address, %denial, "claim denied");
            return Err(denial);
        }

        let code = allocate_one(self.store.as_ref(), network_address)?
            .ok_or(ClaimError::NoCodesAvailable)?;

        let record = NewClaim {
            code_id: code.id,
            network_address: network_address.to_string(),
            session_id: session_id.to_string(),
            timestamp: now,
        };

        let claim_id = match self.store.insert_claim(record.clone()) {
            Ok(id) => id,
            Err(first) => {
                warn!(code_id = %code.id, error = %first, "claim record write failed, retrying");
                match self.store.insert_claim(record) {
                    Ok(id) => id,
                    Err(second) => {
                        error!(
                            code_id = %code.id,
                            claimant = %network_address,
                            error = %second,
                            "claim record write failed after allocation; \
                             code remains claimed, reconstruct the claim from claimed_by"
                        );
                        return Err(ClaimError::ClaimRecordFailed { code_id: code.id });
                    }
                }
            }
        };

        info!(address = %network_address, claim_id = %claim_id, "code claimed");
        Ok(ClaimReceipt { code_value: code.value, claim_id })
    }

    /// The session's claim history, newest first, joined with each
    /// code's redeemable value. Claims whose code has since been deleted
    /// are omitted here; the admin audit listing still shows them.
    pub fn history(&self, session_id: &str) -> Result<Vec<HistoryEntry>, ClaimError> {
        if session_id.trim().is_empty() {
            return Err(ClaimError::SessionRequired);
        }

        let claims = self.store.claims_by_session(session_id)?;
        let mut entries = Vec::with_capacity(claims.len());
        for claim in claims {
            if let Some(code) = self.store.get_code(&claim.code_id)? {
                entries.push(HistoryEntry {
                    code_value: code.value,
                    timestamp: claim.timestamp,
                });
            }
        }
        Ok(entries)
    }
}
