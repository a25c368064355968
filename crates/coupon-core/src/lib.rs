//! # coupon-core
//! Domain types and claim-allocation logic for the coupon service.
//!
//! The correctness-sensitive path is `eligibility` -> `allocator` ->
//! `claim`; everything else is ordinary data access behind the
//! [`traits::CouponStore`] interface.

pub mod allocator;
pub mod auth;
pub mod claim;
pub mod eligibility;
pub mod error;
pub mod traits;
pub mod types;
