//! Shared test helpers: pre-seeded stores and claim services.

use std::sync::Arc;

use chrono::Duration;

use coupon_core::claim::ClaimService;
use coupon_core::traits::CouponStore;
use coupon_store::MemoryStore;

/// An in-memory store pre-loaded with one available code per value, in
/// the given order.
pub fn store_with_codes(values: &[&str]) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for value in values {
        store.insert_code(value).unwrap();
    }
    store
}

/// A claim service over `store` with a 24-hour cooldown.
pub fn claim_service(store: Arc<dyn CouponStore>) -> ClaimService {
    ClaimService::new(store, Duration::hours(24))
}
