//! Group context derivation and pairwise sub-contexts.

use oscore_context::context::ContextCounter;
use oscore_context::crypto::{CounterSignKey, SignatureAlgorithm};
use oscore_context::{ContextError, GroupParams, GroupSecurityContext, MasterKeying};

const P256_SECRET: &str = "FEA2190084748436543C5EC8E329D2AFBD7068054F595CA1F987B9E43E2205E6";

fn keying() -> MasterKeying {
    MasterKeying::new(hex::decode("0102030405060708090a0b0c0d0e0f10").unwrap())
        .with_salt(hex::decode("9e7ca92223786340").unwrap())
        .with_id_context(hex::decode("37cbf3210017a2d3").unwrap())
}

/// Two members `0x0A` and `0x0B` holding each other's public keys.
fn members(
    alice: &CounterSignKey,
    bob: &CounterSignKey,
    counter: &ContextCounter,
) -> (GroupSecurityContext, GroupSecurityContext) {
    let alg = alice.key_type().cose_value();
    let a = GroupSecurityContext::derive(
        GroupParams::new(keying(), vec![0x0A], alg, alice.clone())
            .with_recipients([(vec![0x0B], bob.public_key())]),
        counter,
    )
    .unwrap();
    let b = GroupSecurityContext::derive(
        GroupParams::new(keying(), vec![0x0B], alg, bob.clone())
            .with_recipients([(vec![0x0A], alice.public_key())]),
        counter,
    )
    .unwrap();
    (a, b)
}

fn assert_pair_mirror(alice: CounterSignKey, bob: CounterSignKey) {
    let counter = ContextCounter::new();
    let (a, b) = members(&alice, &bob, &counter);

    let a_to_b = a.derive_pair_context(&[0x0B], &counter).unwrap();
    let b_to_a = b.derive_pair_context(&[0x0A], &counter).unwrap();

    // local member in the sender slot
    assert_eq!(a_to_b.sender().lock().id(), &[0x0A]);
    assert_eq!(b_to_a.sender().lock().id(), &[0x0B]);

    let a_sender = a_to_b.sender();
    let b_recipient = b_to_a.recipient(&[0x0A]).unwrap();
    assert_eq!(a_sender.lock().key(), b_recipient.lock().key());
    assert_eq!(a_sender.lock().base_iv(), b_recipient.lock().base_iv());

    let b_sender = b_to_a.sender();
    let a_recipient = a_to_b.recipient(&[0x0B]).unwrap();
    assert_eq!(b_sender.lock().key(), a_recipient.lock().key());
    assert_eq!(b_sender.lock().base_iv(), a_recipient.lock().base_iv());

    // pairwise keys are not the group keys
    assert_ne!(a_sender.lock().key(), a.sender().lock().key());
    assert_ne!(a_to_b.context_number(), a.context_number());
}

#[test]
fn test_pairwise_mirror_es256() {
    let alice = CounterSignKey::es256_from_secret(&hex::decode(P256_SECRET).unwrap()).unwrap();
    let bob = CounterSignKey::generate(SignatureAlgorithm::Es256);
    assert_pair_mirror(alice, bob);
}

#[test]
fn test_pairwise_mirror_eddsa() {
    let alice = CounterSignKey::ed25519_from_secret(&[0x11; 32]).unwrap();
    let bob = CounterSignKey::ed25519_from_secret(&[0x22; 32]).unwrap();
    assert_pair_mirror(alice, bob);
}

#[test]
fn test_pairwise_is_deterministic() {
    let counter = ContextCounter::new();
    let alice = CounterSignKey::ed25519_from_secret(&[0x11; 32]).unwrap();
    let bob = CounterSignKey::ed25519_from_secret(&[0x22; 32]).unwrap();
    let (a, _) = members(&alice, &bob, &counter);

    let first = a.derive_pair_context(&[0x0B], &counter).unwrap();
    let second = a.derive_pair_context(&[0x0B], &counter).unwrap();
    assert_eq!(first.sender().lock().key(), second.sender().lock().key());
    assert_eq!(first.sender().lock().base_iv(), second.sender().lock().base_iv());
    assert_ne!(first.context_number(), second.context_number());
}

#[test]
fn test_pairwise_needs_private_key() {
    let counter = ContextCounter::new();
    let alice = CounterSignKey::generate(SignatureAlgorithm::EdDsa);
    let bob = CounterSignKey::generate(SignatureAlgorithm::EdDsa);

    // local member configured with its public key only
    let a = GroupSecurityContext::derive(
        GroupParams::new(keying(), vec![0x0A], -8, alice.public_key())
            .with_recipients([(vec![0x0B], bob.public_key())]),
        &counter,
    )
    .unwrap();
    assert!(matches!(
        a.derive_pair_context(&[0x0B], &counter),
        Err(ContextError::Crypto(_))
    ));
}

#[test]
fn test_group_members_share_group_keys() {
    let counter = ContextCounter::new();
    let alice = CounterSignKey::generate(SignatureAlgorithm::Es256);
    let bob = CounterSignKey::generate(SignatureAlgorithm::Es256);
    let (a, b) = members(&alice, &bob, &counter);

    let a_sender = a.sender();
    let b_view = b.recipient(&[0x0A]).unwrap();
    assert_eq!(a_sender.lock().key(), b_view.lock().key());
    assert_eq!(a_sender.lock().base_iv(), b_view.lock().base_iv());
}

#[test]
fn test_capability_defaults_per_algorithm() {
    let counter = ContextCounter::new();
    for (alg, key, alg_caps, key_caps) in [
        (-7, CounterSignKey::generate(SignatureAlgorithm::Es256), "8281028202 01", "820201"),
        (-8, CounterSignKey::generate(SignatureAlgorithm::EdDsa), "8281018201 06", "820106"),
    ] {
        let group = GroupSecurityContext::derive(GroupParams::new(keying(), vec![0x01], alg, key), &counter)
            .unwrap();
        assert_eq!(
            hex::encode(group.capabilities().alg_bytes().unwrap()),
            alg_caps.replace(' ', "")
        );
        assert_eq!(hex::encode(group.capabilities().key_bytes().unwrap()), key_caps);
    }
}

#[test]
fn test_unsupported_signature_algorithm() {
    let counter = ContextCounter::new();
    for alg in [-35, -36, 0, 42] {
        let params = GroupParams::new(keying(), vec![0x01], alg, CounterSignKey::generate(SignatureAlgorithm::Es256));
        let err = GroupSecurityContext::derive(params, &counter).unwrap_err();
        assert!(err.is_unsupported_signature_algorithm(), "{alg}: {err:?}");
    }
}

#[test]
fn test_replace_sender_in_group() {
    let counter = ContextCounter::new();
    let alice = CounterSignKey::generate(SignatureAlgorithm::EdDsa);
    let bob = CounterSignKey::generate(SignatureAlgorithm::EdDsa);
    let (a, _) = members(&alice, &bob, &counter);

    a.record(&[0x0B], 12).unwrap();
    assert_eq!(
        a.replace_sender(&[0x0C], CounterSignKey::generate(SignatureAlgorithm::Es256)),
        Err(ContextError::AlgorithmMismatch)
    );
    a.replace_sender(&[0x0C], CounterSignKey::generate(SignatureAlgorithm::EdDsa))
        .unwrap();
    assert_eq!(a.sender().lock().id(), &[0x0C]);
    assert!(a.is_replay(&[0x0B], 12).unwrap());
}

#[test]
fn test_duplicate_group() {
    let counter = ContextCounter::new();
    let alice = CounterSignKey::generate(SignatureAlgorithm::EdDsa);
    let bob = CounterSignKey::generate(SignatureAlgorithm::EdDsa);
    let (a, _) = members(&alice, &bob, &counter);
    a.record(&[0x0B], 3).unwrap();

    let copy = a.duplicate();
    assert_eq!(copy.context_number(), a.context_number());
    assert_eq!(copy.capabilities(), a.capabilities());
    assert_eq!(copy.recipient_count(), 1);
    assert!(!copy.is_replay(&[0x0B], 3).unwrap());
    assert!(copy.recipient(&[0x0B]).unwrap().lock().signing_key().is_some());
}

#[test]
fn test_replace_sender_cannot_reuse_nonces() {
    let counter = ContextCounter::new();
    let alice = CounterSignKey::ed25519_from_secret(&[0x11; 32]).unwrap();
    let bob = CounterSignKey::ed25519_from_secret(&[0x22; 32]).unwrap();
    let (a, _) = members(&alice, &bob, &counter);

    let sent = a.next_nonce().unwrap();
    assert_eq!(sent.sequence_number, 0);

    // same id would re-derive the same key and IV at sequence number 0
    assert_eq!(
        a.replace_sender(&[0x0A], alice.clone()),
        Err(ContextError::SenderIdInUse(vec![0x0A]))
    );
    // a recipient's id would take over that peer's nonce space
    assert_eq!(
        a.replace_sender(&[0x0B], alice.clone()),
        Err(ContextError::SenderIdInUse(vec![0x0B]))
    );

    let next = a.next_nonce().unwrap();
    assert_eq!(next.sequence_number, 1);
    assert_ne!(next.nonce, sent.nonce);
}
