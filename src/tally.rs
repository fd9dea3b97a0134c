//! Homomorphic tallying and verifiable threshold decryption.

use merlin::Transcript;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::ops::RangeInclusive;

use crate::{
    encryption::DiscreteLogTable,
    error::ArithmeticError,
    group::ModInt,
    proofs::{LogEqualityProof, TranscriptForGroup, VerificationError},
    sharing::{lagrange_coefficients, KeySet, KeyShare},
    Ballot, Ciphertext,
};

/// Errors that can occur when collecting or decrypting a tally.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum TallyError {
    /// The cast ballot failed verification. Deliberately carries no detail;
    /// voters get no oracle about which check failed.
    #[error("ballot failed verification")]
    InvalidBallot,

    /// A partial decryption failed verification against the authority's
    /// committed key share.
    #[error("partial decryption from authority #{authority} failed verification")]
    InvalidPartial {
        /// Zero-based index of the offending authority.
        authority: usize,
    },

    /// Fewer distinct partial decryptions than the threshold were supplied.
    #[error("insufficient partial decryptions: got {got}, needed {needed}")]
    InsufficientPartials {
        /// Number of distinct partial decryptions supplied.
        got: usize,
        /// Decryption threshold.
        needed: usize,
    },

    /// A decrypted count exceeds the search bound. The caller can retry with
    /// a larger bound.
    #[error("decrypted tally exceeds the search bound")]
    SearchSpaceExhausted,

    /// Arithmetic failure, e.g. a non-invertible Lagrange denominator.
    #[error(transparent)]
    Arithmetic(#[from] ArithmeticError),
}

/// Per-slot decryption shares of one authority for an aggregate tally,
/// each accompanied by a [`LogEqualityProof`] tying it to the authority's
/// committed key share.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialDecryption {
    authority_index: usize,
    shares: Vec<ModInt>,
    proofs: Vec<LogEqualityProof>,
}

impl PartialDecryption {
    /// Computes decryption shares `a_i^{s_j}` for every slot of `aggregate`
    /// together with validity proofs.
    pub fn new<R: CryptoRng + RngCore>(
        key_share: &KeyShare,
        aggregate: &[Ciphertext],
        key_set: &KeySet,
        rng: &mut R,
    ) -> Self {
        let params = key_set.params();
        let secret = key_share.secret().exponent();
        let public_share = params.g().pow(secret.value());

        let mut shares = Vec::with_capacity(aggregate.len());
        let mut proofs = Vec::with_capacity(aggregate.len());
        for (slot, ciphertext) in aggregate.iter().enumerate() {
            let share = ciphertext.random_element().pow(secret.value());
            let proof = LogEqualityProof::new(
                params,
                ciphertext.random_element(),
                secret,
                (&public_share, &share),
                &mut Self::transcript(key_set, key_share.index(), slot),
                rng,
            );
            shares.push(share);
            proofs.push(proof);
        }

        Self {
            authority_index: key_share.index(),
            shares,
            proofs,
        }
    }

    fn transcript(key_set: &KeySet, authority: usize, slot: usize) -> Transcript {
        let mut transcript = Transcript::new(b"partial_decryption");
        transcript.append_element(b"K", key_set.shared_key().element());
        transcript.append_u64(b"authority", authority as u64);
        transcript.append_u64(b"slot", slot as u64);
        transcript
    }

    /// Zero-based index of the authority that produced this decryption.
    pub fn authority_index(&self) -> usize {
        self.authority_index
    }

    /// Verifies all share proofs against the aggregate ciphertexts and the
    /// authority's public key share.
    ///
    /// # Errors
    ///
    /// Fails if sizes do not match the aggregate or any proof is invalid.
    pub fn verify(
        &self,
        aggregate: &[Ciphertext],
        key_set: &KeySet,
    ) -> Result<(), VerificationError> {
        let params = key_set.params();
        let public_share = key_set
            .authority_element(self.authority_index)
            .ok_or(VerificationError::LenMismatch {
                collection: "authority key shares",
                expected: key_set.sharing().authorities,
                actual: self.authority_index + 1,
            })?;
        VerificationError::check_lengths("decryption shares", self.shares.len(), aggregate.len())?;
        VerificationError::check_lengths("share proofs", self.proofs.len(), aggregate.len())?;

        for (slot, (ciphertext, (share, proof))) in aggregate
            .iter()
            .zip(self.shares.iter().zip(&self.proofs))
            .enumerate()
        {
            proof.verify(
                params,
                ciphertext.random_element(),
                (public_share, share),
                &mut Self::transcript(key_set, self.authority_index, slot),
            )?;
        }
        Ok(())
    }
}

/// Running tally of one race: verified encrypted ballots and their
/// homomorphic aggregate, plus the threshold decryption of the final counts.
///
/// # Workflow
///
/// 1. Create the tally from the [`KeySet`] produced by key generation and
///    the race configuration.
/// 2. [`Self::cast()`] each incoming ballot; invalid ballots are rejected
///    with a generic error and leave the tally untouched.
/// 3. Hand [`Self::encrypted_sum()`] to each authority, which answers with a
///    [`PartialDecryption`].
/// 4. [`Self::decrypt()`] any threshold-sized subset of the partial
///    decryptions into per-choice counts.
#[derive(Debug, Clone)]
pub struct Tally {
    key_set: KeySet,
    choice_labels: Vec<String>,
    race_title: String,
    allowed: RangeInclusive<u64>,
    ballots: Vec<Ballot>,
}

impl Tally {
    /// Creates an empty tally for a race.
    ///
    /// # Panics
    ///
    /// Panics if `choice_labels` is empty or `allowed` is an empty range.
    pub fn new(
        key_set: KeySet,
        choice_labels: Vec<String>,
        race_title: String,
        allowed: RangeInclusive<u64>,
    ) -> Self {
        assert!(!choice_labels.is_empty(), "race without choices");
        assert!(!allowed.is_empty(), "empty selection range");
        Self {
            key_set,
            choice_labels,
            race_title,
            allowed,
            ballots: Vec::new(),
        }
    }

    /// Verifies a ballot against this race's key, labels, title and
    /// selection range, and adds it to the tally.
    ///
    /// # Errors
    ///
    /// Fails with the generic [`TallyError::InvalidBallot`] for any defect.
    pub fn cast(&mut self, ballot: Ballot) -> Result<(), TallyError> {
        let valid = ballot.race_title() == self.race_title
            && ballot.choice_labels() == &self.choice_labels[..]
            && ballot.verify(self.key_set.shared_key(), self.allowed.clone());
        if !valid {
            return Err(TallyError::InvalidBallot);
        }
        self.ballots.push(ballot);
        Ok(())
    }

    /// Ballots accepted so far, in cast order.
    pub fn ballots(&self) -> &[Ballot] {
        &self.ballots
    }

    /// Ciphertext fingerprints of every accepted ballot, in cast order, for
    /// publication on a bulletin board.
    pub fn fingerprints(&self) -> Vec<Vec<String>> {
        self.ballots.iter().map(Ballot::fingerprints).collect()
    }

    /// Slot-wise homomorphic combination of all accepted ballots. With no
    /// ballots cast, every slot is the identity ciphertext (an encryption
    /// of zero with zero randomness).
    pub fn encrypted_sum(&self) -> Vec<Ciphertext> {
        let params = self.key_set.params();
        (0..self.choice_labels.len())
            .map(|slot| {
                self.ballots
                    .iter()
                    .fold(Ciphertext::identity(params), |acc, ballot| {
                        &acc * &ballot.ciphertexts()[slot]
                    })
            })
            .collect()
    }

    /// Decrypts the aggregate into per-choice counts from a threshold-sized
    /// subset of partial decryptions. Duplicate submissions from the same
    /// authority are ignored; `bound` caps the discrete-log search, so it
    /// must be at least the number of cast ballots.
    ///
    /// # Errors
    ///
    /// Fails if fewer than `threshold` distinct valid partial decryptions
    /// are supplied, any of the used ones does not verify, or a count
    /// exceeds `bound`.
    pub fn decrypt(
        &self,
        partials: &[PartialDecryption],
        bound: u64,
    ) -> Result<Vec<u64>, TallyError> {
        let params = self.key_set.params();
        let aggregate = self.encrypted_sum();
        let threshold = self.key_set.sharing().threshold;

        let mut selected = Vec::<&PartialDecryption>::with_capacity(threshold);
        for partial in partials {
            let duplicate = selected
                .iter()
                .any(|other| other.authority_index == partial.authority_index);
            if !duplicate {
                selected.push(partial);
            }
            if selected.len() == threshold {
                break;
            }
        }
        if selected.len() < threshold {
            return Err(TallyError::InsufficientPartials {
                got: selected.len(),
                needed: threshold,
            });
        }
        for partial in &selected {
            partial
                .verify(&aggregate, &self.key_set)
                .map_err(|_| TallyError::InvalidPartial {
                    authority: partial.authority_index,
                })?;
        }

        let indexes: Vec<_> = selected
            .iter()
            .map(|partial| partial.authority_index)
            .collect();
        let coefficients = lagrange_coefficients(params, &indexes)?;
        let lookup_table = DiscreteLogTable::new(params, 0..=bound);

        aggregate
            .iter()
            .enumerate()
            .map(|(slot, ciphertext)| {
                let combined = selected.iter().zip(&coefficients).fold(
                    params.one(),
                    |acc, (partial, coefficient)| {
                        &acc * &partial.shares[slot].pow(coefficient.value())
                    },
                );
                let plaintext_element =
                    ciphertext.blinded_element() * &params.subgroup_inv(&combined);
                lookup_table
                    .get(&plaintext_element)
                    .ok_or(TallyError::SearchSpaceExhausted)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use rand::{thread_rng, Rng};

    use super::*;
    use crate::{
        group::GroupParams,
        sharing::{run_key_generation, Params},
    };

    fn labels() -> Vec<String> {
        vec!["alice".to_owned(), "bob".to_owned(), "carol".to_owned()]
    }

    fn sample_tally(key_set: KeySet) -> Tally {
        Tally::new(key_set, labels(), "mayor".to_owned(), 1..=1)
    }

    #[test]
    fn single_authority_tally_end_to_end() {
        const BALLOTS: u64 = 5;

        let mut rng = thread_rng();
        let group = GroupParams::generate(32, &mut rng);
        let outputs = run_key_generation(Params::new(1, 1), &group, &mut rng);
        let (key_share, key_set) = &outputs[0];
        let mut tally = sample_tally(key_set.clone());

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

        let partial =
            PartialDecryption::new(key_share, &tally.encrypted_sum(), key_set, &mut rng);
        let counts = tally.decrypt(&[partial], BALLOTS).unwrap();
        assert_eq!(counts, expected);
        assert_eq!(counts.iter().sum::<u64>(), BALLOTS);
    }

    #[test]
    fn threshold_decryption_with_any_two_of_three() {
        let mut rng = thread_rng();
        let group = GroupParams::generate(32, &mut rng);
        let outputs = run_key_generation(Params::new(3, 2), &group, &mut rng);
        let key_set = outputs[0].1.clone();
        let mut tally = sample_tally(key_set.clone());

        for choices in [[1, 0, 0], [0, 0, 1], [0, 0, 1]] {
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

        let aggregate = tally.encrypted_sum();
        let partials: Vec<_> = outputs
            .iter()
            .map(|(share, _)| PartialDecryption::new(share, &aggregate, &key_set, &mut rng))
            .collect();

        for pair in [[0, 1], [0, 2], [1, 2]] {
            let subset = [partials[pair[0]].clone(), partials[pair[1]].clone()];
            assert_eq!(tally.decrypt(&subset, 3).unwrap(), vec![1, 0, 2]);
        }

        let err = tally.decrypt(&partials[..1], 3).unwrap_err();
        assert_eq!(
            err,
            TallyError::InsufficientPartials { got: 1, needed: 2 }
        );
        // Duplicate submissions from one authority count once.
        let duplicated = [partials[0].clone(), partials[0].clone()];
        let err = tally.decrypt(&duplicated, 3).unwrap_err();
        assert_eq!(
            err,
            TallyError::InsufficientPartials { got: 1, needed: 2 }
        );
    }

    #[test]
    fn invalid_ballots_are_rejected_without_detail() {
        let mut rng = thread_rng();
        let group = GroupParams::generate(32, &mut rng);
        let outputs = run_key_generation(Params::new(1, 1), &group, &mut rng);
        let key_set = outputs[0].1.clone();
        let mut tally = sample_tally(key_set.clone());

        // Wrong race title.
        let ballot = Ballot::new(
            &[1, 0, 0],
            labels(),
            "treasurer".to_owned(),
            key_set.shared_key(),
            1..=1,
            &mut rng,
        )
        .unwrap();
        assert_eq!(tally.cast(ballot), Err(TallyError::InvalidBallot));

        // Ballot encrypted for a different key.
        let foreign_keypair = crate::Keypair::generate(&group, &mut rng);
        let ballot = Ballot::new(
            &[1, 0, 0],
            labels(),
            "mayor".to_owned(),
            foreign_keypair.public(),
            1..=1,
            &mut rng,
        )
        .unwrap();
        assert_eq!(tally.cast(ballot), Err(TallyError::InvalidBallot));
        assert!(tally.ballots().is_empty());
    }

    #[test]
    fn tampered_partial_decryption_is_rejected() {
        let mut rng = thread_rng();
        let group = GroupParams::generate(32, &mut rng);
        let outputs = run_key_generation(Params::new(2, 2), &group, &mut rng);
        let key_set = outputs[0].1.clone();
        let mut tally = sample_tally(key_set.clone());

        let ballot = Ballot::new(
            &[0, 1, 0],
            labels(),
            "mayor".to_owned(),
            key_set.shared_key(),
            1..=1,
            &mut rng,
        )
        .unwrap();
        tally.cast(ballot).unwrap();

        let aggregate = tally.encrypted_sum();
        let honest = PartialDecryption::new(&outputs[0].0, &aggregate, &key_set, &mut rng);
        let mut tampered =
            PartialDecryption::new(&outputs[1].0, &aggregate, &key_set, &mut rng);
        let bogus_share = &tampered.shares[1] * group.g();
        tampered.shares[1] = bogus_share;

        let err = tally.decrypt(&[honest, tampered], 1).unwrap_err();
        assert_eq!(err, TallyError::InvalidPartial { authority: 1 });
    }

    #[test]
    fn zero_bound_exhausts_search_space() {
        let mut rng = thread_rng();
        let group = GroupParams::generate(32, &mut rng);
        let outputs = run_key_generation(Params::new(1, 1), &group, &mut rng);
        let (key_share, key_set) = &outputs[0];
        let mut tally = sample_tally(key_set.clone());

        let ballot = Ballot::new(
            &[0, 1, 0],
            labels(),
            "mayor".to_owned(),
            key_set.shared_key(),
            1..=1,
            &mut rng,
        )
        .unwrap();
        tally.cast(ballot).unwrap();

        let partial =
            PartialDecryption::new(key_share, &tally.encrypted_sum(), key_set, &mut rng);
        let err = tally.decrypt(&[partial.clone()], 0).unwrap_err();
        assert_eq!(err, TallyError::SearchSpaceExhausted);
        // A sufficient bound succeeds on the same inputs.
        assert_eq!(tally.decrypt(&[partial], 1).unwrap(), vec![0, 1, 0]);
    }

    #[test]
    fn empty_tally_decrypts_to_zeros() {
        let mut rng = thread_rng();
        let group = GroupParams::generate(32, &mut rng);
        let outputs = run_key_generation(Params::new(1, 1), &group, &mut rng);
        let (key_share, key_set) = &outputs[0];
        let tally = sample_tally(key_set.clone());

        let partial =
            PartialDecryption::new(key_share, &tally.encrypted_sum(), key_set, &mut rng);
        assert_eq!(tally.decrypt(&[partial], 0).unwrap(), vec![0, 0, 0]);
    }
}
