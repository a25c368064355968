//! In-memory [`CouponStore`] backed by a `parking_lot` read-write lock.
//!
//! Used by tests and by ephemeral deployments. The conditional
//! Available -> Claimed transition holds the write lock for the whole
//! check-and-set, which gives [`CouponStore::mark_claimed`] its
//! atomicity.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use coupon_core::error::StoreError;
use coupon_core::traits::CouponStore;
use coupon_core::types::{
    Administrator, Claim, ClaimId, Code, CodeId, CodeStatus, NewClaim,
};

#[derive(Default)]
struct Inner {
    /// Insertion order, which is also `seq` order.
    codes: Vec<Code>,
    /// Append-only; newest entries last.
    claims: Vec<Claim>,
    admins: HashMap<String, Administrator>,
    next_seq: u64,
}

/// In-memory coupon store.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CouponStore for MemoryStore {
    fn available_codes(&self) -> Result<Vec<Code>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .codes
            .iter()
            .filter(|c| c.status == CodeStatus::Available)
            .cloned()
            .collect())
    }

    fn mark_claimed(&self, code_id: &CodeId, claimant: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.write();
        let Some(code) = inner.codes.iter_mut().find(|c| c.id == *code_id) else {
            return Ok(false);
        };
        if code.status != CodeStatus::Available {
            return Ok(false);
        }
        code.status = CodeStatus::Claimed;
        code.claimed_by = Some(claimant.to_string());
        Ok(true)
    }

    fn insert_claim(&self, claim: NewClaim) -> Result<ClaimId, StoreError> {
        let id = ClaimId::generate();
        let mut inner = self.inner.write();
        inner.claims.push(Claim {
            id,
            code_id: claim.code_id,
            network_address: claim.network_address,
            session_id: claim.session_id,
            timestamp: claim.timestamp,
        });
        Ok(id)
    }

    fn claims_by_address_since(
        &self,
        address: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Claim>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .claims
            .iter()
            .filter(|c| c.network_address == address && c.timestamp >= cutoff)
            .cloned()
            .collect())
    }

    fn claim_by_session(&self, session_id: &str) -> Result<Option<Claim>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .claims
            .iter()
            .find(|c| c.session_id == session_id)
            .cloned())
    }

    fn claims_by_session(&self, session_id: &str) -> Result<Vec<Claim>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .claims
            .iter()
            .rev()
            .filter(|c| c.session_id == session_id)
            .cloned()
            .collect())
    }

    fn insert_code(&self, value: &str) -> Result<Code, StoreError> {
        let mut inner = self.inner.write();
        if inner.codes.iter().any(|c| c.value == value) {
            return Err(StoreError::DuplicateValue(value.to_string()));
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        let code = Code {
            id: CodeId::generate(),
            value: value.to_string(),
            status: CodeStatus::Available,
            claimed_by: None,
            seq,
            created_at: Utc::now(),
        };
        inner.codes.push(code.clone());
        Ok(code)
    }

    fn all_codes(&self) -> Result<Vec<Code>, StoreError> {
        Ok(self.inner.read().codes.clone())
    }

    fn get_code(&self, code_id: &CodeId) -> Result<Option<Code>, StoreError> {
        let inner = self.inner.read();
        Ok(inner.codes.iter().find(|c| c.id == *code_id).cloned())
    }

    fn update_code_value(&self, code_id: &CodeId, value: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if inner
            .codes
            .iter()
            .any(|c| c.value == value && c.id != *code_id)
        {
            return Err(StoreError::DuplicateValue(value.to_string()));
        }
        let code = inner
            .codes
            .iter_mut()
            .find(|c| c.id == *code_id)
            .ok_or(StoreError::CodeNotFound(*code_id))?;
        code.value = value.to_string();
        Ok(())
    }

    fn toggle_code(&self, code_id: &CodeId) -> Result<CodeStatus, StoreError> {
        let mut inner = self.inner.write();
        let code = inner
            .codes
            .iter_mut()
            .find(|c| c.id == *code_id)
            .ok_or(StoreError::CodeNotFound(*code_id))?;
        code.status = match code.status {
            CodeStatus::Available => CodeStatus::Claimed,
            CodeStatus::Claimed => {
                code.claimed_by = None;
                CodeStatus::Available
            }
        };
        Ok(code.status)
    }

    fn delete_code(&self, code_id: &CodeId) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let before = inner.codes.len();
        inner.codes.retain(|c| c.id != *code_id);
        if inner.codes.len() == before {
            return Err(StoreError::CodeNotFound(*code_id));
        }
        inner.claims.retain(|c| c.code_id != *code_id);
        Ok(())
    }

    fn all_claims(&self) -> Result<Vec<Claim>, StoreError> {
        let inner = self.inner.read();
        Ok(inner.claims.iter().rev().cloned().collect())
    }

    fn find_admin(&self, username: &str) -> Result<Option<Administrator>, StoreError> {
        Ok(self.inner.read().admins.get(username).cloned())
    }

    fn insert_admin(&self, admin: Administrator) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        inner.admins.insert(admin.username.clone(), admin);
        Ok(())
    }

    fn admin_count(&self) -> Result<usize, StoreError> {
        Ok(self.inner.read().admins.len())
    }
}
