//! [`LogEqualityProof`] and related logic.

use merlin::Transcript;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::{
    group::{GroupParams, ModInt},
    proofs::{TranscriptForGroup, VerificationError},
};

/// Zero-knowledge proof of equality of two discrete logs in different bases,
/// a.k.a. Chaum–Pedersen protocol.
///
/// # Construction
///
/// The prover knows an exponent `x` and proves that two public elements
/// `X = g^x` and `Y = k^x` share it, where `k` is an agreed-upon second base.
/// The protocol is made non-interactive with [`Transcript`]-based
/// Fiat–Shamir:
///
/// 1. The prover samples a random exponent `t` and commits to `g^t` and
///    `k^t` in the transcript.
/// 2. The challenge `c` is derived from the transcript.
/// 3. The response is `s = t + c * x mod q`.
///
/// Verification recomputes the commitments as `g^s * X^(-c)` and
/// `k^s * Y^(-c)` and checks that the re-derived challenge matches `c`.
/// The negated exponent is taken as `q - c`, which is valid for any
/// order-`q` element.
///
/// In this crate the proof accompanies every partial decryption: the second
/// base is the aggregate ciphertext's randomness component, which ties the
/// published decryption share to the authority's committed key share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEqualityProof {
    challenge: ModInt,
    response: ModInt,
}

impl LogEqualityProof {
    /// Creates a proof that `powers == (g^secret, log_base^secret)`.
    pub(crate) fn new<R: CryptoRng + RngCore>(
        params: &GroupParams,
        log_base: &ModInt,
        secret: &ModInt,
        powers: (&ModInt, &ModInt),
        transcript: &mut Transcript,
        rng: &mut R,
    ) -> Self {
        transcript.start_proof(b"log_eq");
        transcript.append_element(b"K", log_base);
        transcript.append_element(b"[r]G", powers.0);
        transcript.append_element(b"[r]K", powers.1);

        let random_scalar = params.random_exponent(rng);
        transcript.append_element(b"[x]G", &params.g().pow(random_scalar.value()));
        transcript.append_element(b"[x]K", &log_base.pow(random_scalar.value()));
        let challenge = transcript.challenge_exponent(b"c", params);
        let response = &(&challenge * secret) + &random_scalar;

        Self {
            challenge,
            response,
        }
    }

    /// Verifies the proof against the claimed `powers`.
    ///
    /// # Errors
    ///
    /// Fails if the proof does not verify.
    pub(crate) fn verify(
        &self,
        params: &GroupParams,
        log_base: &ModInt,
        powers: (&ModInt, &ModInt),
        transcript: &mut Transcript,
    ) -> Result<(), VerificationError> {
        let neg_challenge = params.neg_exponent(&self.challenge);
        let commitments = (
            &params.g().pow(self.response.value()) * &powers.0.pow(neg_challenge.value()),
            &log_base.pow(self.response.value()) * &powers.1.pow(neg_challenge.value()),
        );

        transcript.start_proof(b"log_eq");
        transcript.append_element(b"K", log_base);
        transcript.append_element(b"[r]G", powers.0);
        transcript.append_element(b"[r]K", powers.1);
        transcript.append_element(b"[x]G", &commitments.0);
        transcript.append_element(b"[x]K", &commitments.1);
        let expected_challenge = transcript.challenge_exponent(b"c", params);

        if expected_challenge == self.challenge {
            Ok(())
        } else {
            Err(VerificationError::ChallengeMismatch)
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::thread_rng;

    use super::*;
    use crate::group::GroupParams;

    #[test]
    fn proof_verifies_for_matching_logs() {
        let mut rng = thread_rng();
        let params = GroupParams::generate(32, &mut rng);
        let log_base = params.random_exponent(&mut rng);
        let log_base = params.g().pow(log_base.value());

        let secret = params.random_exponent(&mut rng);
        let powers = (
            params.g().pow(secret.value()),
            log_base.pow(secret.value()),
        );
        let proof = LogEqualityProof::new(
            &params,
            &log_base,
            &secret,
            (&powers.0, &powers.1),
            &mut Transcript::new(b"log_eq_test"),
            &mut rng,
        );

        proof
            .verify(
                &params,
                &log_base,
                (&powers.0, &powers.1),
                &mut Transcript::new(b"log_eq_test"),
            )
            .unwrap();
    }

    #[test]
    fn proof_fails_for_wrong_powers() {
        let mut rng = thread_rng();
        let params = GroupParams::generate(32, &mut rng);
        let log_base = params.random_exponent(&mut rng);
        let log_base = params.g().pow(log_base.value());

        let secret = params.random_exponent(&mut rng);
        let powers = (
            params.g().pow(secret.value()),
            log_base.pow(secret.value()),
        );
        let proof = LogEqualityProof::new(
            &params,
            &log_base,
            &secret,
            (&powers.0, &powers.1),
            &mut Transcript::new(b"log_eq_test"),
            &mut rng,
        );

        let bogus = &powers.1 * params.g();
        let err = proof
            .verify(
                &params,
                &log_base,
                (&powers.0, &bogus),
                &mut Transcript::new(b"log_eq_test"),
            )
            .unwrap_err();
        assert_eq!(err, VerificationError::ChallengeMismatch);
    }

    #[test]
    fn proof_is_context_bound() {
        let mut rng = thread_rng();
        let params = GroupParams::generate(32, &mut rng);
        let log_base = params.g().pow(params.random_exponent(&mut rng).value());

        let secret = params.random_exponent(&mut rng);
        let powers = (
            params.g().pow(secret.value()),
            log_base.pow(secret.value()),
        );
        let proof = LogEqualityProof::new(
            &params,
            &log_base,
            &secret,
            (&powers.0, &powers.1),
            &mut Transcript::new(b"log_eq_test"),
            &mut rng,
        );

        let err = proof
            .verify(
                &params,
                &log_base,
                (&powers.0, &powers.1),
                &mut Transcript::new(b"other_context"),
            )
            .unwrap_err();
        assert_eq!(err, VerificationError::ChallengeMismatch);
    }
}
