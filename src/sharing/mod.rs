//! Distributed key generation with [Feldman's verifiable secret sharing][feldman-vss]
//! (VSS).
//!
//! The scheme distributes an election secret among `n` authorities so that any
//! `t` of them (but not fewer) can jointly decrypt the aggregate tally, while
//! no single authority ever learns the full secret. There is no trusted
//! dealer: every authority deals its own random polynomial and the joint key
//! is the sum of all dealt secrets.
//!
//! # Protocol
//!
//! 1. Each authority `i` samples a secret polynomial `poly_i` of degree
//!    `t - 1` over `Z_q` and broadcasts the Feldman commitment vector
//!    `g^{c_{i,k}}` for its coefficients.
//! 2. Authority `i` sends `poly_i(j + 1)` to every authority `j`, encrypted
//!    under the recipient's personal transport key.
//! 3. Each recipient decrypts the received shares and checks them against the
//!    sender's commitment vector; a mismatch publicly incriminates the sender.
//! 4. Authority `j`'s key share is `sum_i poly_i(j + 1) mod q`, and the joint
//!    public key element is the product of all constant-term commitments
//!    `g^{poly_i(0)}`.
//!
//! The [`Authority`] state machine drives steps 1 through 4; it hands out a
//! [`KeyShare`] and the public [`KeySet`] once all messages are exchanged.
//! Partial decryptions produced from key shares are recombined with Lagrange
//! interpolation in the exponent, see [`PartialDecryption`].
//!
//! [feldman-vss]: https://www.cs.umd.edu/~gasarch/TOPICS/secretsharing/feldmanVSS.pdf
//! [`PartialDecryption`]: crate::PartialDecryption
//!
//! # Examples
//!
//! See [`Authority`] docs for an end-to-end key generation example.

use num_bigint::BigUint;
use num_traits::{One, Zero};
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    error::ArithmeticError,
    group::{GroupParams, ModInt},
};

mod authority;

pub use self::authority::{Authority, EncryptedShare, KeySet, KeyShare};

/// Errors that can occur during distributed key generation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum Error {
    /// Received key share does not match the sender's public commitments.
    #[error("received key share does not match the sender's public commitments")]
    InvalidShare,

    /// A message from the same authority was already processed.
    #[error("duplicate message from authority #{index}")]
    DuplicateMessage {
        /// Zero-based index of the offending authority.
        index: usize,
    },

    /// A share arrived before the sender's commitment vector.
    #[error("commitments from authority #{index} have not been received yet")]
    MissingCommitments {
        /// Zero-based index of the sender.
        index: usize,
    },

    /// A commitment vector has a length other than the threshold.
    #[error("commitment vector has unexpected length: expected {expected}, got {actual}")]
    MalformedCommitments {
        /// Expected number of commitments (the threshold).
        expected: usize,
        /// Actual number of commitments.
        actual: usize,
    },

    /// An authority index is out of bounds.
    #[error("authority index {index} out of bounds (there are {authorities} authorities)")]
    InvalidIndex {
        /// The offending index.
        index: usize,
        /// Total number of authorities.
        authorities: usize,
    },

    /// Key generation was finalized before all messages arrived.
    #[error("cannot finalize: messages from {missing} authorities are still missing")]
    InsufficientShares {
        /// Number of authorities whose messages are missing.
        missing: usize,
    },
}

/// Parameters of a threshold key generation ceremony.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params {
    /// Total number of authorities.
    pub authorities: usize,
    /// Number of authorities necessary to jointly decrypt the tally.
    pub threshold: usize,
}

impl Params {
    /// Creates new parameters.
    ///
    /// # Panics
    ///
    /// Panics if `authorities` is zero or if `threshold` is not in
    /// `1..=authorities`.
    pub const fn new(authorities: usize, threshold: usize) -> Self {
        assert!(authorities > 0);
        assert!(threshold > 0 && threshold <= authorities);
        Self {
            authorities,
            threshold,
        }
    }
}

/// Computes Lagrange coefficients at zero for interpolation points
/// `index + 1` over `Z_q`: `lambda_j = prod_k x_k / (x_k - x_j)`.
///
/// # Errors
///
/// Fails with [`ArithmeticError::DivisionByZero`] if `indexes` contains
/// duplicates.
pub(crate) fn lagrange_coefficients(
    params: &GroupParams,
    indexes: &[usize],
) -> Result<Vec<ModInt>, ArithmeticError> {
    indexes
        .iter()
        .map(|&index| {
            let x_j = params.exponent(BigUint::from(index as u64 + 1));
            let mut coefficient = params.exponent(BigUint::one());
            for &other in indexes {
                if other == index {
                    continue;
                }
                let x_k = params.exponent(BigUint::from(other as u64 + 1));
                let denominator = (&x_k - &x_j).invert()?;
                coefficient = &coefficient * &(&x_k * &denominator);
            }
            Ok(coefficient)
        })
        .collect()
}

/// Secret sharing polynomial of an authority: `threshold` coefficients
/// over `Z_q`, the constant term being the dealt secret.
#[derive(Debug, Clone)]
pub(crate) struct SharingPolynomial {
    coefficients: Vec<ModInt>,
}

impl SharingPolynomial {
    pub fn random<R: CryptoRng + RngCore>(
        params: &GroupParams,
        threshold: usize,
        rng: &mut R,
    ) -> Self {
        let coefficients = (0..threshold)
            .map(|_| params.random_exponent(rng))
            .collect();
        Self { coefficients }
    }

    /// Evaluates the polynomial at `x` in `Z_q` (Horner's method).
    pub fn evaluate(&self, params: &GroupParams, x: u64) -> ModInt {
        let x = params.exponent(BigUint::from(x));
        let mut value = params.exponent(BigUint::zero());
        for coefficient in self.coefficients.iter().rev() {
            value = &(&value * &x) + coefficient;
        }
        value
    }

    /// Feldman commitments `g^{c_k}` to all coefficients.
    pub fn commit(&self, params: &GroupParams) -> PublicPolynomial {
        let commitments = self
            .coefficients
            .iter()
            .map(|coefficient| params.g().pow(coefficient.value()))
            .collect();
        PublicPolynomial { commitments }
    }
}

/// Public image of a sharing polynomial: Feldman commitments to its
/// coefficients, published by the dealing authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicPolynomial {
    commitments: Vec<ModInt>,
}

impl PublicPolynomial {
    pub(crate) fn len(&self) -> usize {
        self.commitments.len()
    }

    /// `g^{poly(x)}` computed from the commitments alone.
    pub(crate) fn value_at(&self, params: &GroupParams, x: u64) -> ModInt {
        let x = params.exponent(BigUint::from(x));
        let mut exponent = params.exponent(BigUint::one());
        let mut value = params.one();
        for commitment in &self.commitments {
            value = &value * &commitment.pow(exponent.value());
            exponent = &exponent * &x;
        }
        value
    }

    /// Element-wise product, the commitment vector of the summed polynomials.
    pub(crate) fn combine(&self, other: &Self) -> Self {
        debug_assert_eq!(self.commitments.len(), other.commitments.len());
        let commitments = self
            .commitments
            .iter()
            .zip(&other.commitments)
            .map(|(lhs, rhs)| lhs * rhs)
            .collect();
        Self { commitments }
    }
}

/// Runs a complete key generation ceremony with in-memory message passing.
#[cfg(test)]
pub(crate) fn run_key_generation<R: CryptoRng + RngCore>(
    sharing: Params,
    group: &GroupParams,
    rng: &mut R,
) -> Vec<(KeyShare, KeySet)> {
    let count = sharing.authorities;
    let mut authorities: Vec<_> = (0..count)
        .map(|index| Authority::new(sharing, group.clone(), index, rng))
        .collect();

    for sender in 0..count {
        let commitments = authorities[sender].commitments().clone();
        for receiver in 0..count {
            if sender != receiver {
                authorities[receiver]
                    .insert_commitments(sender, commitments.clone())
                    .unwrap();
            }
        }
    }
    for sender in 0..count {
        for receiver in 0..count {
            if sender == receiver {
                continue;
            }
            let key = authorities[receiver].transport_key().clone();
            let share = authorities[sender]
                .encrypted_share_for(receiver, &key, rng)
                .unwrap();
            authorities[receiver].receive_share(sender, &share).unwrap();
        }
    }

    authorities
        .into_iter()
        .map(|authority| authority.finalize().unwrap())
        .collect()
}

#[cfg(test)]
mod tests {
    use rand::thread_rng;

    use super::*;

    #[test]
    fn lagrange_coefficients_interpolate_at_zero() {
        let mut rng = thread_rng();
        let params = GroupParams::generate(32, &mut rng);
        let polynomial = SharingPolynomial::random(&params, 2, &mut rng);
        let secret = polynomial.evaluate(&params, 0);

        // Interpolate from authorities #0 and #2 (points 1 and 3).
        let coefficients = lagrange_coefficients(&params, &[0, 2]).unwrap();
        let restored = &(&coefficients[0] * &polynomial.evaluate(&params, 1))
            + &(&coefficients[1] * &polynomial.evaluate(&params, 3));
        assert_eq!(restored, secret);
    }

    #[test]
    fn duplicate_indexes_fail_interpolation() {
        let mut rng = thread_rng();
        let params = GroupParams::generate(32, &mut rng);
        assert_eq!(
            lagrange_coefficients(&params, &[1, 1]).unwrap_err(),
            ArithmeticError::DivisionByZero
        );
    }

    #[test]
    fn public_polynomial_tracks_secret_polynomial() {
        let mut rng = thread_rng();
        let params = GroupParams::generate(32, &mut rng);
        let polynomial = SharingPolynomial::random(&params, 3, &mut rng);
        let commitments = polynomial.commit(&params);

        for x in 0..5 {
            let expected = params.g().pow(polynomial.evaluate(&params, x).value());
            assert_eq!(commitments.value_at(&params, x), expected);
        }
    }

    #[test]
    fn combined_polynomials_commit_to_summed_secrets() {
        let mut rng = thread_rng();
        let params = GroupParams::generate(32, &mut rng);
        let first = SharingPolynomial::random(&params, 2, &mut rng);
        let second = SharingPolynomial::random(&params, 2, &mut rng);
        let combined = first.commit(&params).combine(&second.commit(&params));

        let summed_value =
            &first.evaluate(&params, 4) + &second.evaluate(&params, 4);
        assert_eq!(
            combined.value_at(&params, 4),
            params.g().pow(summed_value.value())
        );
    }
}
