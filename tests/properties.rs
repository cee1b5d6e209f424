//! Property-based tests for the per-message crypto parameters
//!
//! 1. **Round-trip**: decoding `partial_iv(n)` yields `n`, with no leading zero byte
//! 2. **Nonce uniqueness**: distinct sequence numbers give distinct nonces
//! 3. **Replay monotonicity**: a recorded number is a replay, later unseen ones are not
//! 4. **Sender uniqueness**: concurrent senders never share a nonce

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use oscore_context::context::{
    decode_partial_iv, derive_entity_context, encode_partial_iv, ContextCounter, Role,
};
use oscore_context::core::MAX_SEQUENCE_NUMBER_CEILING;
use oscore_context::{MasterKeying, ReplayWindow, SecurityContext};
use proptest::prelude::*;

fn keying() -> MasterKeying {
    MasterKeying::new(vec![0x01; 16]).with_id_context(vec![0x37, 0xcb])
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_partial_iv_roundtrip(n in 0..=MAX_SEQUENCE_NUMBER_CEILING) {
        let piv = encode_partial_iv(n);
        prop_assert!(!piv.is_empty());
        prop_assert!(piv.len() <= 5);
        if n != 0 {
            prop_assert_ne!(piv[0], 0);
        }
        prop_assert_eq!(decode_partial_iv(&piv).unwrap(), n);
    }

    #[test]
    fn prop_nonce_uniqueness(
        a in 0..=MAX_SEQUENCE_NUMBER_CEILING,
        b in 0..=MAX_SEQUENCE_NUMBER_CEILING,
        id in prop::collection::vec(any::<u8>(), 0..=7),
    ) {
        prop_assume!(a != b);
        let entity = derive_entity_context(&keying(), &id, Role::Sender).unwrap();
        let nonce_a = entity.full_iv(&encode_partial_iv(a)).unwrap();
        let nonce_b = entity.full_iv(&encode_partial_iv(b)).unwrap();
        prop_assert_ne!(nonce_a, nonce_b);
    }

    #[test]
    fn prop_replay_monotonicity(
        hits in prop::collection::vec(0u64..10_000, 1..64),
        size in prop::sample::select(vec![8usize, 32, 64, 100, 128]),
    ) {
        let mut window = ReplayWindow::new(0, size).unwrap();
        let mut highest = 0u64;
        for &k in &hits {
            window.set_hit(k);
            highest = highest.max(k);
            if k >= window.base_value() {
                prop_assert!(window.hit_test(k));
            }
        }
        // everything beyond the highest recorded number is fresh
        prop_assert!(!window.hit_test(highest + 1));
        prop_assert!(!window.hit_test(highest + size as u64));
    }

    #[test]
    fn prop_base_never_decreases(hits in prop::collection::vec(0u64..1_000, 1..128)) {
        let mut window = ReplayWindow::new(0, 64).unwrap();
        let mut base = window.base_value();
        for k in hits {
            window.set_hit(k);
            prop_assert!(window.base_value() >= base);
            base = window.base_value();
        }
    }
}

#[test]
fn test_concurrent_senders_never_share_a_nonce() {
    let counter = ContextCounter::new();
    let ctx = Arc::new(SecurityContext::derive(keying(), &[0x01], &[0x02], &counter).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let ctx = Arc::clone(&ctx);
            thread::spawn(move || {
                (0..250)
                    .map(|_| ctx.next_nonce().unwrap().nonce)
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        for nonce in handle.join().unwrap() {
            assert!(seen.insert(nonce), "nonce reused");
        }
    }
    assert_eq!(seen.len(), 2_000);
    assert_eq!(ctx.sender().lock().sequence_number(), 2_000);
}
