//! Ring proofs.

use merlin::Transcript;
use num_bigint::BigUint;
use num_traits::Zero;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use std::fmt;

use crate::{
    encryption::ExtendedCiphertext,
    group::{GroupParams, ModInt},
    proofs::TranscriptForGroup,
    Ciphertext, PublicKey,
};

/// An incomplete ring proving that the encrypted value is in the a priori
/// known set of admissible values.
struct Ring<'a> {
    // Public parameters of the ring.
    index: usize,
    params: &'a GroupParams,
    key_element: &'a ModInt,
    admissible_values: &'a [ModInt],
    ciphertext: Ciphertext,

    // ZKP-related public values.
    transcript: Transcript,
    responses: Vec<ModInt>,
    terminal_commitments: (ModInt, ModInt),

    // Secret values.
    value_index: usize,
    discrete_log: ModInt,
    random_scalar: ModInt,
}

impl fmt::Debug for Ring<'_> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Ring")
            .field("index", &self.index)
            .field("admissible_values", &self.admissible_values)
            .field("ciphertext", &self.ciphertext)
            .field("responses", &self.responses)
            .field("terminal_commitments", &self.terminal_commitments)
            .finish()
    }
}

impl<'a> Ring<'a> {
    #[allow(clippy::too_many_arguments)]
    fn new<R: CryptoRng + RngCore>(
        index: usize,
        params: &'a GroupParams,
        key_element: &'a ModInt,
        ciphertext: ExtendedCiphertext,
        admissible_values: &'a [ModInt],
        value_index: usize,
        transcript: &Transcript,
        rng: &mut R,
    ) -> Self {
        assert!(
            !admissible_values.is_empty(),
            "No admissible values supplied"
        );
        assert!(
            value_index < admissible_values.len(),
            "Specified value index is out of bounds"
        );

        let random_element = ciphertext.inner().random_element().clone();
        let blinded_value = ciphertext.inner().blinded_element().clone();
        debug_assert!(
            {
                let expected_blinded_value = &key_element
                    .pow(ciphertext.random_scalar().value())
                    * &admissible_values[value_index];
                expected_blinded_value == blinded_value
            },
            "Specified ciphertext does not match the specified `value_index`"
        );

        let mut transcript = transcript.clone();
        transcript.start_proof(b"ring_enc");
        transcript.append_element_bytes(b"enc", &ciphertext.inner().to_transcript_bytes());
        // NB: we don't add `admissible_values` to the transcript since we assume that
        // they are fixed in the higher-level protocol.
        transcript.append_u64(b"i", index as u64);

        // Choose a random scalar to use in the equation matching the known discrete log.
        let random_scalar = params.random_exponent(rng);
        let mut commitments = (
            params.g().pow(random_scalar.value()),
            key_element.pow(random_scalar.value()),
        );

        // We create the entire response vector at once to prevent timing attack possibilities.
        let mut responses = vec![params.exponent(BigUint::zero()); admissible_values.len()];

        let it = admissible_values.iter().enumerate().skip(value_index + 1);
        for (eq_index, admissible_value) in it {
            let mut eq_transcript = transcript.clone();
            eq_transcript.append_u64(b"j", eq_index as u64 - 1);
            eq_transcript.append_element(b"R_G", &commitments.0);
            eq_transcript.append_element(b"R_K", &commitments.1);
            let challenge = eq_transcript.challenge_exponent(b"c", params);

            let response = params.random_exponent(rng);
            responses[eq_index] = response.clone();
            let dh_element = &blinded_value * &params.subgroup_inv(admissible_value);
            let neg_challenge = params.neg_exponent(&challenge);
            commitments = (
                &params.g().pow(response.value()) * &random_element.pow(neg_challenge.value()),
                &key_element.pow(response.value()) * &dh_element.pow(neg_challenge.value()),
            );
        }

        Self {
            index,
            params,
            key_element,
            value_index,
            admissible_values,
            ciphertext: ciphertext.inner().clone(),
            transcript,
            responses,
            terminal_commitments: commitments,
            discrete_log: ciphertext.random_scalar().clone(),
            random_scalar,
        }
    }

    /// Completes the ring by calculating the common challenge and closing all
    /// rings using it.
    fn aggregate<R: CryptoRng + RngCore>(
        rings: Vec<Self>,
        params: &GroupParams,
        transcript: &mut Transcript,
        rng: &mut R,
    ) -> RingProof {
        debug_assert!(
            rings.iter().enumerate().all(|(i, ring)| i == ring.index),
            "Rings have bogus indexes"
        );

        for ring in &rings {
            let commitments = &ring.terminal_commitments;
            transcript.append_element(b"R_G", &commitments.0);
            transcript.append_element(b"R_K", &commitments.1);
        }

        let common_challenge = transcript.challenge_exponent(b"c", params);
        let mut proof = RingProof {
            common_challenge: common_challenge.clone(),
            ring_responses: Vec::with_capacity(rings.len()),
        };
        for ring in rings {
            proof
                .ring_responses
                .extend(ring.finalize(&common_challenge, rng));
        }
        proof
    }

    fn finalize<R: CryptoRng + RngCore>(
        mut self,
        common_challenge: &ModInt,
        rng: &mut R,
    ) -> Vec<ModInt> {
        // Compute remaining responses for non-reversible equations.
        let mut challenge = common_challenge.clone();
        let it = self.admissible_values[..self.value_index]
            .iter()
            .enumerate();
        for (eq_index, admissible_value) in it {
            let response = self.params.random_exponent(rng);
            self.responses[eq_index] = response.clone();
            let dh_element =
                self.ciphertext.blinded_element() * &self.params.subgroup_inv(admissible_value);
            let neg_challenge = self.params.neg_exponent(&challenge);
            let commitments = (
                &self.params.g().pow(response.value())
                    * &self.ciphertext.random_element().pow(neg_challenge.value()),
                &self.key_element.pow(response.value())
                    * &dh_element.pow(neg_challenge.value()),
            );

            let mut eq_transcript = self.transcript.clone();
            eq_transcript.append_u64(b"j", eq_index as u64);
            eq_transcript.append_element(b"R_G", &commitments.0);
            eq_transcript.append_element(b"R_K", &commitments.1);
            challenge = eq_transcript.challenge_exponent(b"c", self.params);
        }

        // Finally, compute the response for equation #`value_index`, using our
        // knowledge of the trapdoor.
        debug_assert!(self.responses[self.value_index].value().is_zero());
        self.responses[self.value_index] =
            &self.random_scalar + &(&challenge * &self.discrete_log);
        self.responses
    }
}

/// Zero-knowledge proof that one or more encrypted values is each in an
/// a priori known set of admissible values. (Admissible values may differ
/// among encrypted values.)
///
/// # Construction
///
/// A proof is constructed almost identically to Borromean ring signatures by
/// Maxwell and Poelstra, with the major difference that it works on ElGamal
/// ciphertexts instead of group elements (= public keys).
///
/// A proof consists of one or more *rings*. Each ring proves that a certain
/// ElGamal ciphertext `E = (R, B)` for public key `K` in a group with
/// generator `g` encrypts one of distinct admissible values
/// `v_0`, `v_1`, ..., `v_n`. `K` and `g` are shared among rings, admissible
/// values are generally not.
///
/// ## Single ring
///
/// A ring is a challenge `e_0` and a set of responses `s_0`, ..., `s_n`
/// satisfying the following verification procedure. For each `j` in `0..=n`,
/// compute
///
/// ```text
/// R_G(j) = g^{s_j} * R^{-e_j};
/// R_K(j) = K^{s_j} * (B / v_j)^{-e_j};
/// e_{j+1} = H(j, R_G(j), R_K(j));
/// ```
///
/// where `H` is a cryptographic hash function. The ring is valid if
/// `e_0 = e_{n+1}`. Negative exponents are computed as `q - e` for the
/// subgroup order `q`.
///
/// This construction mirrors Abe–Ohkubo–Suzuki ring signatures, with the only
/// difference that two group elements are hashed on each iteration instead of
/// one. If admissible values consist of a single value, the protocol reduces
/// to the Chaum–Pedersen protocol ([`LogEqualityProof`]).
///
/// Constructing a ring requires knowing the trapdoor
/// `r = dlog_g(R) = dlog_K(B / v_j)` for a certain `j`, i.e. the random
/// scalar used in ElGamal encryption. The prover starts at equation `j` with
/// a random commitment, wraps around deriving challenges per the verification
/// formulas with random responses, and closes the ring at `j` as
/// `s_j = x + e_j * r`.
///
/// ## Multiple rings
///
/// The challenge `e_0` is shared among all rings and is computed by hashing
/// the values of `R_G` and `R_K` with the maximum index for each ring, which
/// shrinks the proof by one challenge per ring.
///
/// # Applications
///
/// [`Ballot`](crate::Ballot) uses a single `RingProof` with a two-value ring
/// per slot, proving that every encrypted choice is Boolean, plus one final
/// ring over the homomorphic slot product, proving that the number of
/// selected choices is within the allowed range.
///
/// # Implementation details
///
/// - The proof is serialized as the common challenge `e_0` followed by `s_i`
///   responses for all the rings.
/// - The proof context is set using [`Transcript`] APIs. The proof itself
///   commits to the encrypted values and ring indexes, but not to the
///   admissible values across the rings; those must be fixed in the
///   higher-level protocol, as they are for the protocols in this crate.
///
/// [`LogEqualityProof`]: crate::LogEqualityProof
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RingProof {
    common_challenge: ModInt,
    ring_responses: Vec<ModInt>,
}

impl RingProof {
    fn initialize_transcript(transcript: &mut Transcript, receiver: &PublicKey) {
        transcript.start_proof(b"multi_ring_enc");
        transcript.append_element_bytes(b"K", &receiver.element().to_bytes_be());
    }

    pub(crate) fn verify(
        &self,
        receiver: &PublicKey,
        admissible_values: &[&[ModInt]],
        ciphertexts: &[Ciphertext],
        transcript: &mut Transcript,
    ) -> bool {
        // Do quick preliminary checks.
        assert_eq!(ciphertexts.len(), admissible_values.len());
        let total_rings_size: usize = admissible_values.iter().map(|values| values.len()).sum();
        if total_rings_size != self.total_rings_size() {
            return false;
        }

        let params = receiver.params();
        Self::initialize_transcript(transcript, receiver);
        // We add common commitments to the `transcript` as we cycle through
        // rings, so we need a separate transcript copy to initialize ring
        // transcripts.
        let initial_ring_transcript = transcript.clone();

        let it = admissible_values.iter().zip(ciphertexts).enumerate();
        let mut starting_response = 0;
        for (ring_index, (values, ciphertext)) in it {
            let mut challenge = self.common_challenge.clone();
            let mut commitments = (params.one(), params.one());

            let mut ring_transcript = initial_ring_transcript.clone();
            ring_transcript.start_proof(b"ring_enc");
            ring_transcript.append_element_bytes(b"enc", &ciphertext.to_transcript_bytes());
            ring_transcript.append_u64(b"i", ring_index as u64);

            for (eq_index, (admissible_value, response)) in values
                .iter()
                .zip(&self.ring_responses[starting_response..])
                .enumerate()
            {
                let dh_element =
                    ciphertext.blinded_element() * &params.subgroup_inv(admissible_value);
                let neg_challenge = params.neg_exponent(&challenge);

                commitments = (
                    &params.g().pow(response.value())
                        * &ciphertext.random_element().pow(neg_challenge.value()),
                    &receiver.element().pow(response.value())
                        * &dh_element.pow(neg_challenge.value()),
                );

                // We can skip deriving the challenge for the last equation;
                // it's not used anyway.
                if eq_index + 1 < values.len() {
                    let mut eq_transcript = ring_transcript.clone();
                    eq_transcript.append_u64(b"j", eq_index as u64);
                    eq_transcript.append_element(b"R_G", &commitments.0);
                    eq_transcript.append_element(b"R_K", &commitments.1);
                    challenge = eq_transcript.challenge_exponent(b"c", params);
                }
            }

            starting_response += values.len();
            transcript.append_element(b"R_G", &commitments.0);
            transcript.append_element(b"R_K", &commitments.1);
        }

        let expected_challenge = transcript.challenge_exponent(b"c", params);
        expected_challenge == self.common_challenge
    }

    pub(crate) fn total_rings_size(&self) -> usize {
        self.ring_responses.len()
    }

    pub(crate) fn parts(&self) -> (&ModInt, &[ModInt]) {
        (&self.common_challenge, &self.ring_responses)
    }

    pub(crate) fn from_parts(common_challenge: ModInt, ring_responses: Vec<ModInt>) -> Self {
        Self {
            common_challenge,
            ring_responses,
        }
    }
}

/// **NB.** Separate method calls of the builder depend on the position of the
/// encrypted values within admissible ones. This means that if a proof is
/// constructed with interruptions between method calls, there is a chance for
/// an adversary to perform a timing attack.
pub(crate) struct RingProofBuilder<'a, R> {
    receiver: &'a PublicKey,
    transcript: &'a mut Transcript,
    rings: Vec<Ring<'a>>,
    rng: &'a mut R,
}

impl<R: fmt::Debug> fmt::Debug for RingProofBuilder<'_, R> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RingProofBuilder")
            .field("receiver", self.receiver)
            .field("rings", &self.rings)
            .field("rng", self.rng)
            .finish()
    }
}

impl<'a, R: RngCore + CryptoRng> RingProofBuilder<'a, R> {
    /// Starts building a [`RingProof`].
    pub fn new(receiver: &'a PublicKey, transcript: &'a mut Transcript, rng: &'a mut R) -> Self {
        RingProof::initialize_transcript(transcript, receiver);
        Self {
            receiver,
            transcript,
            rings: vec![],
            rng,
        }
    }

    /// Encrypts a value from `admissible_values` and adds it as a new ring
    /// to this proof.
    pub fn add_value(
        &mut self,
        admissible_values: &'a [ModInt],
        value_index: usize,
    ) -> ExtendedCiphertext {
        let ext_ciphertext = ExtendedCiphertext::new(
            &admissible_values[value_index],
            self.receiver,
            self.rng,
        );
        self.add_precomputed(ext_ciphertext.clone(), admissible_values, value_index);
        ext_ciphertext
    }

    /// Adds a ring for an existing ciphertext with known randomness, e.g. a
    /// homomorphic combination of ciphertexts added previously.
    pub fn add_precomputed(
        &mut self,
        ciphertext: ExtendedCiphertext,
        admissible_values: &'a [ModInt],
        value_index: usize,
    ) {
        let ring = Ring::new(
            self.rings.len(),
            self.receiver.params(),
            self.receiver.element(),
            ciphertext,
            admissible_values,
            value_index,
            &*self.transcript,
            self.rng,
        );
        self.rings.push(ring);
    }

    /// Finishes building a [`RingProof`].
    pub fn build(self) -> RingProof {
        Ring::aggregate(
            self.rings,
            self.receiver.params(),
            self.transcript,
            self.rng,
        )
    }
}
