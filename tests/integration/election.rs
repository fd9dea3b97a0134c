//! Full election flows: key generation, ballot casting, threshold decryption.

use rand::{thread_rng, Rng};

use hom_tally::{
    group::GroupParams, sharing::Params, Ballot, PartialDecryption, Tally, TallyError,
};

use crate::run_key_generation;

fn labels() -> Vec<String> {
    vec!["alice".to_owned(), "bob".to_owned(), "carol".to_owned()]
}

#[test]
fn single_winner_election_with_random_ballots() {
    const BALLOTS: u64 = 15;

    let mut rng = thread_rng();
    let group = GroupParams::generate(32, &mut rng);
    let outputs = run_key_generation(Params::new(1, 1), &group, &mut rng);
    let (key_share, key_set) = &outputs[0];

    let mut tally = Tally::new(key_set.clone(), labels(), "mayor".to_owned(), 1..=1);
    let mut expected = [0_u64; 3];
    for _ in 0..BALLOTS {
        let winner = rng.gen_range(0..3);
        expected[winner] += 1;
        let mut choices = [0_u64; 3];
        choices[winner] = 1;
        let ballot = Ballot::new(
            &choices,
            labels(),
            "mayor".to_owned(),
            key_set.shared_key(),
            1..=1,
            &mut rng,
        )
        .unwrap();
        tally.cast(ballot).unwrap();
    }

    let partial = PartialDecryption::new(key_share, &tally.encrypted_sum(), key_set, &mut rng);
    let counts = tally.decrypt(&[partial], BALLOTS).unwrap();
    assert_eq!(counts, expected);
    assert_eq!(counts.iter().sum::<u64>(), BALLOTS);
}

#[test]
fn approval_election_with_threshold_decryption() {
    let mut rng = thread_rng();
    let group = GroupParams::generate(32, &mut rng);
    let outputs = run_key_generation(Params::new(3, 2), &group, &mut rng);
    let key_set = outputs[0].1.clone();

    let mut tally = Tally::new(key_set.clone(), labels(), "board".to_owned(), 0..=2);
    let votes = [[1, 1, 0], [0, 0, 0], [1, 0, 1], [0, 1, 1], [1, 1, 0]];
    for choices in votes {
        let ballot = Ballot::new(
            &choices,
            labels(),
            "board".to_owned(),
            key_set.shared_key(),
            0..=2,
            &mut rng,
        )
        .unwrap();
        tally.cast(ballot).unwrap();
    }

    let aggregate = tally.encrypted_sum();
    let partials: Vec<_> = outputs
        .iter()
        .map(|(share, _)| PartialDecryption::new(share, &aggregate, &key_set, &mut rng))
        .collect();

    // Any authority pair decrypts to the same counts; order does not matter.
    for pair in [[0, 1], [2, 0], [1, 2]] {
        let subset = [partials[pair[0]].clone(), partials[pair[1]].clone()];
        assert_eq!(tally.decrypt(&subset, 5).unwrap(), vec![3, 3, 2]);
    }
    assert_eq!(
        tally.decrypt(&partials[2..], 5).unwrap_err(),
        TallyError::InsufficientPartials { got: 1, needed: 2 }
    );
}

#[test]
fn ballots_travel_as_strings() {
    let mut rng = thread_rng();
    let group = GroupParams::generate(32, &mut rng);
    let outputs = run_key_generation(Params::new(2, 2), &group, &mut rng);
    let key_set = outputs[0].1.clone();
    let mut tally = Tally::new(key_set.clone(), labels(), "mayor".to_owned(), 1..=1);

    for choices in [[0, 1, 0], [0, 1, 0], [1, 0, 0]] {
        let ballot = Ballot::new(
            &choices,
            labels(),
            "mayor".to_owned(),
            key_set.shared_key(),
            1..=1,
            &mut rng,
        )
        .unwrap();
        // The voter's client ships the ballot as text; the server re-parses it.
        let wire = ballot.to_string();
        let received: Ballot = wire.parse().unwrap();
        tally.cast(received).unwrap();
    }

    let aggregate = tally.encrypted_sum();
    let partials: Vec<_> = outputs
        .iter()
        .map(|(share, _)| PartialDecryption::new(share, &aggregate, &key_set, &mut rng))
        .collect();
    assert_eq!(tally.decrypt(&partials, 3).unwrap(), vec![1, 2, 0]);
}

#[test]
fn selection_range_is_enforced_at_cast_time() {
    let mut rng = thread_rng();
    let group = GroupParams::generate(32, &mut rng);
    let outputs = run_key_generation(Params::new(1, 1), &group, &mut rng);
    let key_set = outputs[0].1.clone();
    let mut tally = Tally::new(key_set.clone(), labels(), "mayor".to_owned(), 1..=1);

    // A ballot proven for a wider range is not acceptable for this race,
    // even though its selection count would be.
    let ballot = Ballot::new(
        &[0, 1, 0],
        labels(),
        "mayor".to_owned(),
        key_set.shared_key(),
        0..=2,
        &mut rng,
    )
    .unwrap();
    assert_eq!(tally.cast(ballot), Err(TallyError::InvalidBallot));

    // Mismatched labels fail as well.
    let ballot = Ballot::new(
        &[0, 1],
        vec!["alice".to_owned(), "bob".to_owned()],
        "mayor".to_owned(),
        key_set.shared_key(),
        1..=1,
        &mut rng,
    )
    .unwrap();
    assert_eq!(tally.cast(ballot), Err(TallyError::InvalidBallot));
    assert!(tally.ballots().is_empty());
}

#[test]
fn bulletin_board_fingerprints_match_reparsed_ballots() {
    let mut rng = thread_rng();
    let group = GroupParams::generate(32, &mut rng);
    let outputs = run_key_generation(Params::new(1, 1), &group, &mut rng);
    let key_set = outputs[0].1.clone();
    let mut tally = Tally::new(key_set.clone(), labels(), "mayor".to_owned(), 1..=1);

    let ballot = Ballot::new(
        &[1, 0, 0],
        labels(),
        "mayor".to_owned(),
        key_set.shared_key(),
        1..=1,
        &mut rng,
    )
    .unwrap();
    let wire = ballot.to_string();
    tally.cast(ballot).unwrap();

    let reparsed: Ballot = wire.parse().unwrap();
    assert_eq!(tally.fingerprints(), vec![reparsed.fingerprints()]);
    for fingerprint in &tally.fingerprints()[0] {
        assert_eq!(fingerprint.len(), 16);
    }
}
