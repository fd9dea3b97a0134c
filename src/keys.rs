//! Cryptographic keys for exponential ElGamal encryption.

use num_bigint::BigUint;
use num_traits::Zero;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use std::{fmt, str::FromStr};

use crate::{
    encryption::{Ciphertext, DiscreteLogTable, ExtendedCiphertext},
    error::ParseError,
    group::{GroupParams, ModInt},
};

/// Reads a `tag` prefix followed by one or more decimal digits, returning the
/// parsed number and the remaining input.
pub(crate) fn tagged_uint<'a>(input: &'a str, tag: &str) -> Option<(BigUint, &'a str)> {
    let rest = input.strip_prefix(tag)?;
    let digits_len = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    if digits_len == 0 {
        return None;
    }
    let value = BigUint::parse_bytes(rest[..digits_len].as_bytes(), 10)?;
    Some((value, &rest[digits_len..]))
}

/// Secret key of an authority: an exponent modulo the group order.
///
/// The value is never printed and does not appear in [`fmt::Debug`] output.
#[derive(Clone, Serialize, Deserialize)]
pub struct SecretKey {
    exponent: ModInt,
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("SecretKey").finish_non_exhaustive()
    }
}

impl SecretKey {
    pub(crate) fn new(exponent: ModInt) -> Self {
        Self { exponent }
    }

    /// Generates a random secret key for the given group.
    pub fn generate<R: CryptoRng + RngCore>(params: &GroupParams, rng: &mut R) -> Self {
        Self {
            exponent: params.random_exponent(rng),
        }
    }

    pub(crate) fn exponent(&self) -> &ModInt {
        &self.exponent
    }

    /// Decrypts a ciphertext down to the blinded group element, without
    /// undoing the `f^m` encoding. Exact, so it also serves multiplicative
    /// ElGamal where the element itself is the message.
    pub fn decrypt_element(&self, ciphertext: &Ciphertext, params: &GroupParams) -> ModInt {
        let shared = ciphertext.random_element().pow(self.exponent.value());
        ciphertext.blinded_element() * &params.subgroup_inv(&shared)
    }

    /// Decrypts a ciphertext and recovers the plaintext integer via the
    /// lookup table. Returns `None` if the plaintext is outside the range
    /// the table covers.
    pub fn decrypt(
        &self,
        ciphertext: &Ciphertext,
        params: &GroupParams,
        lookup_table: &DiscreteLogTable,
    ) -> Option<u64> {
        lookup_table.get(&self.decrypt_element(ciphertext, params))
    }
}

/// Public key: the group parameters together with the key element
/// `h = g^x`.
///
/// # Textual encoding
///
/// A public key renders as `p<P>g<G>h<H>f<F>` with all four components in
/// decimal and in exactly that order. Parsing is strict about the tag order
/// and rejects trailing input, but performs no number-theoretic validation;
/// the subgroup order is re-derived as `(p - 1) / 2`.
///
/// ```
/// # use hom_tally::PublicKey;
/// let key: PublicKey = "p123g135h246f234".parse()?;
/// assert_eq!(key.to_string(), "p123g135h246f234");
/// # Ok::<_, hom_tally::ParseError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    params: GroupParams,
    element: ModInt,
}

impl PublicKey {
    pub(crate) fn from_element(params: GroupParams, element: ModInt) -> Self {
        Self { params, element }
    }

    /// The group this key lives in.
    pub fn params(&self) -> &GroupParams {
        &self.params
    }

    /// The key element `h`.
    pub fn element(&self) -> &ModInt {
        &self.element
    }

    /// Encrypts an integer as `(g^r, h^r * f^value)`.
    pub fn encrypt<R: CryptoRng + RngCore>(&self, value: u64, rng: &mut R) -> Ciphertext {
        ExtendedCiphertext::new(&self.params.f_pow(value), self, rng).into_inner()
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "p{}g{}h{}f{}",
            self.params.modulus(),
            self.params.g(),
            self.element,
            self.params.f()
        )
    }
}

impl FromStr for PublicKey {
    type Err = ParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (p, rest) =
            tagged_uint(input, "p").ok_or(ParseError::InvalidPublicKey("missing `p` component"))?;
        let (g, rest) =
            tagged_uint(rest, "g").ok_or(ParseError::InvalidPublicKey("missing `g` component"))?;
        let (h, rest) =
            tagged_uint(rest, "h").ok_or(ParseError::InvalidPublicKey("missing `h` component"))?;
        let (f, rest) =
            tagged_uint(rest, "f").ok_or(ParseError::InvalidPublicKey("missing `f` component"))?;
        if !rest.is_empty() {
            return Err(ParseError::InvalidPublicKey("trailing characters"));
        }
        if p.is_zero() {
            return Err(ParseError::InvalidPublicKey("zero modulus"));
        }

        let q = (&p - 1_u32) >> 1_u32;
        let element = ModInt::raw(h, p.clone());
        Ok(Self {
            params: GroupParams::from_components(p, q, g, f),
            element,
        })
    }
}

/// A matching secret / public key pair.
#[derive(Debug, Clone)]
pub struct Keypair {
    secret: SecretKey,
    public: PublicKey,
}

impl Keypair {
    /// Generates a random keypair in the given group.
    pub fn generate<R: CryptoRng + RngCore>(params: &GroupParams, rng: &mut R) -> Self {
        let secret = SecretKey::generate(params, rng);
        let element = params.g().pow(secret.exponent().value());
        Self {
            secret,
            public: PublicKey::from_element(params.clone(), element),
        }
    }

    /// Public part of the pair.
    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    /// Secret part of the pair.
    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }

    /// Splits the pair into its parts.
    pub fn into_tuple(self) -> (SecretKey, PublicKey) {
        (self.secret, self.public)
    }
}
