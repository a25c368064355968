//! # coupon-store
//! Storage backends implementing [`coupon_core::traits::CouponStore`]:
//! an in-memory store for tests and ephemeral deployments, and a
//! RocksDB-backed store for production.

pub mod memory;
pub mod rocks;

pub use memory::MemoryStore;
pub use rocks::RocksStore;
