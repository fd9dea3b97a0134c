//! Zero-knowledge proofs used in the voting protocol.

use merlin::Transcript;
use num_bigint::BigUint;
use thiserror::Error;

use crate::group::{GroupParams, ModInt};

mod log_equality;
mod ring;

pub use self::{log_equality::LogEqualityProof, ring::RingProof};
pub(crate) use self::ring::RingProofBuilder;

/// Extension trait for [`Transcript`] for appending group elements and
/// deriving challenges as exponents.
pub(crate) trait TranscriptForGroup {
    fn start_proof(&mut self, proof_label: &'static [u8]);

    fn append_element_bytes(&mut self, label: &'static [u8], element_bytes: &[u8]);

    fn append_element(&mut self, label: &'static [u8], element: &ModInt);

    /// Derives a challenge in `Z_q`. 512 bits of transcript output are
    /// reduced modulo `q`, which keeps the bias negligible for any group
    /// size this crate is used with.
    fn challenge_exponent(&mut self, label: &'static [u8], params: &GroupParams) -> ModInt;
}

impl TranscriptForGroup for Transcript {
    fn start_proof(&mut self, proof_label: &'static [u8]) {
        self.append_message(b"dom-sep", proof_label);
    }

    fn append_element_bytes(&mut self, label: &'static [u8], element_bytes: &[u8]) {
        self.append_message(label, element_bytes);
    }

    fn append_element(&mut self, label: &'static [u8], element: &ModInt) {
        self.append_element_bytes(label, &element.to_bytes_be());
    }

    fn challenge_exponent(&mut self, label: &'static [u8], params: &GroupParams) -> ModInt {
        let mut challenge_bytes = [0_u8; 64];
        self.challenge_bytes(label, &mut challenge_bytes);
        params.exponent(BigUint::from_bytes_be(&challenge_bytes))
    }
}

/// Error verifying base proofs or high-level protocol objects built on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum VerificationError {
    /// Restored challenge does not match the one provided in the proof,
    /// meaning that the proof itself or some of the data it commits to
    /// were tampered with.
    #[error("restored challenge does not match the one in the proof")]
    ChallengeMismatch,

    /// A collection in the verified object has an unexpected number of items.
    #[error("{collection} has unexpected size: expected {expected}, got {actual}")]
    LenMismatch {
        /// Human-readable collection name, such as `"ciphertexts"`.
        collection: &'static str,
        /// Expected number of items.
        expected: usize,
        /// Actual number of items.
        actual: usize,
    },
}

impl VerificationError {
    pub(crate) fn check_lengths(
        collection: &'static str,
        actual: usize,
        expected: usize,
    ) -> Result<(), Self> {
        if actual == expected {
            Ok(())
        } else {
            Err(Self::LenMismatch {
                collection,
                expected,
                actual,
            })
        }
    }
}
