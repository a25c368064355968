//! Persistence trait consumed by the claim workflow and admin handlers.
//!
//! [`CouponStore`] is the contract between the core and its storage
//! backends (coupon-store implements it in-memory and on RocksDB). The
//! only synchronization primitive the core relies on is
//! [`mark_claimed`](CouponStore::mark_claimed): a conditional
//! Available -> Claimed transition that must be atomic with respect to
//! concurrent callers.

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::types::{Administrator, Claim, ClaimId, Code, CodeId, CodeStatus, NewClaim};

/// Storage backend for codes, claims, and administrators.
pub trait CouponStore: Send + Sync {
    /// All codes with status `Available`, ordered by creation (`seq`
    /// ascending). The allocator walks this in order.
    fn available_codes(&self) -> Result<Vec<Code>, StoreError>;

    /// Atomically transition a code from `Available` to `Claimed`,
    /// recording `claimant` as its claimer.
    ///
    /// Returns `true` iff the transition applied. `false` means the code
    /// was not in the `Available` state (typically because a concurrent
    /// allocation won it); an unknown id is also reported as `false`
    /// since the precondition cannot hold.
    fn mark_claimed(&self, code_id: &CodeId, claimant: &str) -> Result<bool, StoreError>;

    /// Append a claim record, assigning its id.
    fn insert_claim(&self, claim: NewClaim) -> Result<ClaimId, StoreError>;

    /// Claims made from `address` with `timestamp >= cutoff`.
    fn claims_by_address_since(
        &self,
        address: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Claim>, StoreError>;

    /// The claim made under exactly this session id, if any.
    fn claim_by_session(&self, session_id: &str) -> Result<Option<Claim>, StoreError>;

    /// All claims made under this session id, newest first.
    fn claims_by_session(&self, session_id: &str) -> Result<Vec<Claim>, StoreError>;

    /// Create a code with the given redeemable value, status `Available`.
    /// Fails with [`StoreError::DuplicateValue`] if the value exists.
    fn insert_code(&self, value: &str) -> Result<Code, StoreError>;

    /// Full inventory, `seq` ascending.
    fn all_codes(&self) -> Result<Vec<Code>, StoreError>;

    /// Look up a single code by id.
    fn get_code(&self, code_id: &CodeId) -> Result<Option<Code>, StoreError>;

    /// Replace a code's redeemable value. Fails with
    /// [`StoreError::CodeNotFound`] if absent, or
    /// [`StoreError::DuplicateValue`] if another code owns the value.
    fn update_code_value(&self, code_id: &CodeId, value: &str) -> Result<(), StoreError>;

    /// Flip a code's status, returning the new status. Reverting to
    /// `Available` clears `claimed_by`, making the code eligible for
    /// allocation again.
    fn toggle_code(&self, code_id: &CodeId) -> Result<CodeStatus, StoreError>;

    /// Delete a code and cascade-delete its claim records.
    fn delete_code(&self, code_id: &CodeId) -> Result<(), StoreError>;

    /// Every claim on record, newest first (audit order).
    fn all_claims(&self) -> Result<Vec<Claim>, StoreError>;

    /// Look up an administrator by username.
    fn find_admin(&self, username: &str) -> Result<Option<Administrator>, StoreError>;

    /// Create an administrator account.
    fn insert_admin(&self, admin: Administrator) -> Result<(), StoreError>;

    /// Number of administrator accounts (used by the startup bootstrap).
    fn admin_count(&self) -> Result<usize, StoreError>;
}
