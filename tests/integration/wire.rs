//! Textual wire formats: public keys, ciphertexts and ballots.

use num_bigint::BigUint;
use rand::thread_rng;

use hom_tally::{
    group::GroupParams, sharing::Params, Ballot, Ciphertext, DiscreteLogTable, Keypair, ParseError,
    PublicKey,
};

use crate::run_key_generation;

#[test]
fn public_key_components_parse_in_fixed_order() {
    let key: PublicKey = "p123g135h246f234".parse().unwrap();
    assert_eq!(key.params().modulus(), &BigUint::from(123_u32));
    assert_eq!(key.params().order(), &BigUint::from(61_u32));
    assert_eq!(key.params().g().value(), &BigUint::from(135_u32));
    assert_eq!(key.element().value(), &BigUint::from(246_u32));
    assert_eq!(key.params().f().value(), &BigUint::from(234_u32));
    assert_eq!(key.to_string(), "p123g135h246f234");

    let err = "p123g123h123p123".parse::<PublicKey>().unwrap_err();
    assert!(matches!(err, ParseError::InvalidPublicKey(_)));
}

#[test]
fn generated_key_survives_text_round_trip() {
    let mut rng = thread_rng();
    let group = GroupParams::generate(32, &mut rng);
    let keypair = Keypair::generate(&group, &mut rng);

    let restored: PublicKey = keypair.public().to_string().parse().unwrap();
    assert_eq!(&restored, keypair.public());
    assert_eq!(restored.params().order(), group.order());

    // Encrypting under the restored key decrypts with the original secret.
    let table = DiscreteLogTable::new(&group, 0..=10);
    let ciphertext = restored.encrypt(7, &mut rng);
    assert_eq!(
        keypair.secret().decrypt(&ciphertext, &group, &table),
        Some(7)
    );
}

#[test]
fn ciphertext_round_trip_reduces_components() {
    let ciphertext: Ciphertext = "p23G35H41".parse().unwrap();
    assert_eq!(ciphertext.to_string(), "p23G12H18");
    assert_eq!(ciphertext.short_hash().len(), 16);

    for input in ["p23G12", "p0G1H1", "p23G12H18 "] {
        assert!(input.parse::<Ciphertext>().is_err(), "{input}");
    }
}

#[test]
fn ballot_rendering_is_canonical() {
    let mut rng = thread_rng();
    let group = GroupParams::generate(32, &mut rng);
    let outputs = run_key_generation(Params::new(1, 1), &group, &mut rng);
    let key_set = outputs[0].1.clone();

    let ballot = Ballot::new(
        &[0, 1],
        vec!["alice".to_owned(), "bob".to_owned()],
        "mayor".to_owned(),
        key_set.shared_key(),
        1..=1,
        &mut rng,
    )
    .unwrap();

    let canonical = ballot.to_string();
    assert!(canonical.starts_with("(ballot (vote ("));
    assert!(canonical.ends_with("(title mayor))"));

    // Parsing tolerates extra whitespace; rendering restores the canonical form.
    let sloppy = canonical.replace(' ', "  ").replace(')', " )");
    let restored: Ballot = sloppy.parse().unwrap();
    assert_eq!(restored, ballot);
    assert_eq!(restored.to_string(), canonical);
    assert!(restored.verify(key_set.shared_key(), 1..=1));
}

#[test]
fn serde_round_trips_for_published_objects() {
    let mut rng = thread_rng();
    let group = GroupParams::generate(32, &mut rng);
    let outputs = run_key_generation(Params::new(2, 2), &group, &mut rng);
    let key_set = outputs[0].1.clone();

    let json = serde_json::to_string(&key_set).unwrap();
    let restored: hom_tally::sharing::KeySet = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, key_set);

    let ballot = Ballot::new(
        &[1, 0],
        vec!["alice".to_owned(), "bob".to_owned()],
        "mayor".to_owned(),
        key_set.shared_key(),
        1..=1,
        &mut rng,
    )
    .unwrap();
    let json = serde_json::to_string(&ballot).unwrap();
    let restored: Ballot = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, ballot);
    assert!(restored.verify(key_set.shared_key(), 1..=1));
}

#[test]
fn tampered_ballot_text_is_rejected_or_fails_verification() {
    let mut rng = thread_rng();
    let group = GroupParams::generate(32, &mut rng);
    let outputs = run_key_generation(Params::new(1, 1), &group, &mut rng);
    let key_set = outputs[0].1.clone();

    let ballot = Ballot::new(
        &[0, 1],
        vec!["alice".to_owned(), "bob".to_owned()],
        "mayor".to_owned(),
        key_set.shared_key(),
        1..=1,
        &mut rng,
    )
    .unwrap();
    let canonical = ballot.to_string();

    // Structurally broken texts fail to parse at all.
    assert!(canonical[..canonical.len() - 1].parse::<Ballot>().is_err());
    assert!(canonical.replace("(ballot", "(vote").parse::<Ballot>().is_err());

    // A swapped title parses fine but the proof no longer verifies.
    let renamed = canonical.replace("(title mayor)", "(title treasurer)");
    let parsed: Ballot = renamed.parse().unwrap();
    assert!(!parsed.verify(key_set.shared_key(), 1..=1));
}
