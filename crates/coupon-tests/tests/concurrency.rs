//! Adversarial concurrency tests for the allocation guarantee: under
//! racing claim requests, no code is ever handed out twice, and the
//! number of successes exactly matches the pool size.

use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

use coupon_core::error::ClaimError;
use coupon_core::traits::CouponStore;
use coupon_core::types::CodeStatus;
use coupon_tests::helpers::{claim_service, store_with_codes};

#[test]
fn more_requesters_than_codes_allocates_each_code_once() {
    const CODES: usize = 3;
    const REQUESTERS: usize = 8;

    let store = store_with_codes(&["C0", "C1", "C2"]);
    let service = claim_service(store.clone());
    let barrier = Arc::new(Barrier::new(REQUESTERS));

    let handles: Vec<_> = (0..REQUESTERS)
        .map(|i| {
            let service = service.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                service.claim(&format!("10.0.0.{i}"), &format!("sess-{i}"))
            })
        })
        .collect();

    let mut winners = Vec::new();
    let mut exhausted = 0;
    for handle in handles {
        match handle.join().unwrap() {
            Ok(receipt) => winners.push(receipt.code_value),
            Err(ClaimError::NoCodesAvailable) => exhausted += 1,
            Err(other) => panic!("unexpected claim error: {other}"),
        }
    }

    assert_eq!(winners.len(), CODES);
    assert_eq!(exhausted, REQUESTERS - CODES);

    // Every success is a distinct code value.
    let distinct: HashSet<&String> = winners.iter().collect();
    assert_eq!(distinct.len(), CODES);

    assert!(store.available_codes().unwrap().is_empty());
}

#[test]
fn two_racing_requesters_split_the_pool() {
    let store = store_with_codes(&["A", "B"]);
    let service = claim_service(store.clone());
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = (0..2)
        .map(|i| {
            let service = service.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                service
                    .claim(&format!("10.0.0.{i}"), &format!("sess-{i}"))
                    .unwrap()
            })
        })
        .collect();

    let values: HashSet<String> = handles
        .into_iter()
        .map(|h| h.join().unwrap().code_value)
        .collect();

    assert_eq!(values, HashSet::from(["A".to_string(), "B".to_string()]));
    assert!(store.available_codes().unwrap().is_empty());
}

#[test]
fn conditional_update_on_one_code_has_one_winner() {
    const CONTENDERS: usize = 16;

    let store = store_with_codes(&["ONLY"]);
    let code_id = store.all_codes().unwrap()[0].id;
    let barrier = Arc::new(Barrier::new(CONTENDERS));

    let handles: Vec<_> = (0..CONTENDERS)
        .map(|i| {
            let store = store.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                store.mark_claimed(&code_id, &format!("10.0.0.{i}")).unwrap()
            })
        })
        .collect();

    let wins = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(wins, 1);

    let code = store.get_code(&code_id).unwrap().unwrap();
    assert_eq!(code.status, CodeStatus::Claimed);
    assert!(code.claimed_by.is_some());
}
