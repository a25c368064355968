//! Atomic selection of one available code for a requester.

use tracing::debug;

use crate::error::StoreError;
use crate::traits::CouponStore;
use crate::types::{Code, CodeStatus};

/// Pick the oldest available code and atomically mark it claimed by
/// `requester_address`.
///
/// Selection is FIFO by creation order (`seq` ascending), ties broken by
/// insertion — never randomly. The read-select-and-mark sequence leans
/// entirely on [`CouponStore::mark_claimed`]: a failed conditional
/// update means a concurrent allocation won that code, and the next
/// candidate is tried instead. When a whole pass loses every candidate
/// the available set is refetched; every lost candidate has left the
/// `Available` state, so the set shrinks and the loop terminates.
///
/// Returns `Ok(None)` only when no code anywhere in the store is
/// currently available.
pub fn allocate_one(
    store: &dyn CouponStore,
    requester_address: &str,
) -> Result<Option<Code>, StoreError> {
    loop {
        let candidates = store.available_codes()?;
        if candidates.is_empty() {
            return Ok(None);
        }

        for mut code in candidates {
            if store.mark_claimed(&code.id, requester_address)? {
                code.status = CodeStatus::Claimed;
                code.claimed_by = Some(requester_address.to_string());
                return Ok(Some(code));
            }
            debug!(code_id = %code.id, "allocation conflict, trying next code");
        }
    }
}
