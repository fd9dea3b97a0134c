//! Crate-wide error types for parsing and modular arithmetic.

use thiserror::Error;

/// Errors of [`ModInt`](crate::group::ModInt) arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ArithmeticError {
    /// Attempt to invert zero or a residue sharing a factor with the modulus.
    #[error("attempt to invert zero or a non-invertible residue")]
    DivisionByZero,

    /// An operation requiring a modulus was called on a plain integer.
    #[error("operation requires a modulus, but the value carries none")]
    MissingModulus,
}

/// Errors restoring protocol objects from their textual encodings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// Malformed public key string.
    #[error("invalid public key string: {0}")]
    InvalidPublicKey(&'static str),

    /// Malformed ciphertext string.
    #[error("invalid ciphertext string: {0}")]
    InvalidCiphertext(&'static str),

    /// Malformed serialized ballot.
    #[error("invalid serialized ballot: {0}")]
    InvalidVote(&'static str),
}
