//! Claim eligibility rules.
//!
//! Read-only checks against the claim ledger. These are best-effort:
//! two concurrent first-time requests can both pass before either
//! records a claim. The strict at-most-once-per-code guarantee lives in
//! the allocator's conditional update, not here.

use chrono::{DateTime, Duration, Utc};

use crate::error::ClaimError;
use crate::traits::CouponStore;

/// Decide whether a requester may claim right now.
///
/// Rule order is fixed: the address cooldown is evaluated before
/// session uniqueness, and the first violated rule's error is returned.
///
/// * `CooldownActive` — a claim from `network_address` exists with
///   `timestamp >= now - cooldown`.
/// * `SessionAlreadyClaimed` — any claim exists under `session_id`,
///   regardless of age. Sessions are one-shot for their lifetime.
///
/// An empty `session_id` is a caller precondition violation and is
/// rejected by the orchestrator before this check runs.
pub fn check_eligibility(
    store: &dyn CouponStore,
    network_address: &str,
    session_id: &str,
    cooldown: Duration,
    now: DateTime<Utc>,
) -> Result<(), ClaimError> {
    let cutoff = now - cooldown;
    let recent = store.claims_by_address_since(network_address, cutoff)?;
    if !recent.is_empty() {
        return Err(ClaimError::CooldownActive);
    }

    if store.claim_by_session(session_id)?.is_some() {
        return Err(ClaimError::SessionAlreadyClaimed);
    }

    Ok(())
}
