//! Shared helpers for the coupon service integration tests.

pub mod helpers;
