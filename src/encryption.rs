//! ElGamal ciphertexts and the bounded discrete-log lookup table.

use num_bigint::BigUint;
use num_traits::Zero;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use std::{collections::HashMap, fmt, ops, str::FromStr};

use crate::{
    error::ParseError,
    group::{GroupParams, ModInt},
    keys::{tagged_uint, PublicKey},
};

/// ElGamal ciphertext `(a, b) = (g^r, h^r * m)`.
///
/// Ciphertexts combine homomorphically: multiplying two ciphertexts
/// component-wise yields an encryption of the product of their plaintext
/// elements, i.e. the sum of the encoded integers when messages are `f^m`.
/// Use the `Mul` impl or [`Self::identity()`] as the fold seed.
///
/// # Textual encoding
///
/// A ciphertext renders as `p<P>G<a>H<b>` in decimal. Parsing reduces both
/// components modulo `P` and rejects trailing input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ciphertext {
    random_element: ModInt,
    blinded_element: ModInt,
}

impl Ciphertext {
    pub(crate) fn from_parts(random_element: ModInt, blinded_element: ModInt) -> Self {
        Self {
            random_element,
            blinded_element,
        }
    }

    /// The randomness component `a = g^r`.
    pub fn random_element(&self) -> &ModInt {
        &self.random_element
    }

    /// The blinded message component `b = h^r * m`.
    pub fn blinded_element(&self) -> &ModInt {
        &self.blinded_element
    }

    /// Encryption of the identity element, the neutral ciphertext of
    /// homomorphic combination.
    pub fn identity(params: &GroupParams) -> Self {
        Self {
            random_element: params.one(),
            blinded_element: params.one(),
        }
    }

    /// Injective byte encoding for transcript commitment: each component
    /// big-endian and length-prefixed.
    pub(crate) fn to_transcript_bytes(&self) -> Vec<u8> {
        let a = self.random_element.to_bytes_be();
        let b = self.blinded_element.to_bytes_be();
        let mut bytes = Vec::with_capacity(a.len() + b.len() + 8);
        bytes.extend_from_slice(&(a.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&a);
        bytes.extend_from_slice(&(b.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&b);
        bytes
    }

    /// First 8 bytes of the SHA-256 digest of the textual encoding, as a
    /// 16-character hex string. Stable across sessions, so it can serve as
    /// a human-checkable ballot fingerprint.
    pub fn short_hash(&self) -> String {
        let digest = Sha256::digest(self.to_string().as_bytes());
        hex::encode(&digest[..8])
    }
}

impl ops::Mul for &Ciphertext {
    type Output = Ciphertext;

    fn mul(self, rhs: &Ciphertext) -> Ciphertext {
        Ciphertext {
            random_element: &self.random_element * &rhs.random_element,
            blinded_element: &self.blinded_element * &rhs.blinded_element,
        }
    }
}

impl fmt::Display for Ciphertext {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let modulus = self
            .random_element
            .modulus()
            .expect("ciphertext components always carry a modulus");
        write!(
            formatter,
            "p{}G{}H{}",
            modulus, self.random_element, self.blinded_element
        )
    }
}

impl FromStr for Ciphertext {
    type Err = ParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (p, rest) = tagged_uint(input, "p")
            .ok_or(ParseError::InvalidCiphertext("missing `p` component"))?;
        let (a, rest) = tagged_uint(rest, "G")
            .ok_or(ParseError::InvalidCiphertext("missing `G` component"))?;
        let (b, rest) = tagged_uint(rest, "H")
            .ok_or(ParseError::InvalidCiphertext("missing `H` component"))?;
        if !rest.is_empty() {
            return Err(ParseError::InvalidCiphertext("trailing characters"));
        }
        if p.is_zero() {
            return Err(ParseError::InvalidCiphertext("zero modulus"));
        }

        Ok(Self {
            random_element: ModInt::new(a, p.clone()),
            blinded_element: ModInt::new(b, p),
        })
    }
}

/// Ciphertext together with the randomness used to produce it. The scalar is
/// needed once more when proving statements about the ciphertext and is
/// dropped as soon as the proof is built.
#[derive(Debug, Clone)]
pub(crate) struct ExtendedCiphertext {
    inner: Ciphertext,
    random_scalar: ModInt,
}

impl ExtendedCiphertext {
    /// Encrypts a group element for `receiver` with fresh randomness.
    pub fn new<R: CryptoRng + RngCore>(
        message: &ModInt,
        receiver: &PublicKey,
        rng: &mut R,
    ) -> Self {
        let params = receiver.params();
        let random_scalar = params.random_exponent(rng);
        let random_element = params.g().pow(random_scalar.value());
        let blinded_element = &receiver.element().pow(random_scalar.value()) * message;
        Self {
            inner: Ciphertext::from_parts(random_element, blinded_element),
            random_scalar,
        }
    }

    pub fn inner(&self) -> &Ciphertext {
        &self.inner
    }

    pub fn into_inner(self) -> Ciphertext {
        self.inner
    }

    pub fn random_scalar(&self) -> &ModInt {
        &self.random_scalar
    }
}

impl ops::Mul for &ExtendedCiphertext {
    type Output = ExtendedCiphertext;

    fn mul(self, rhs: &ExtendedCiphertext) -> ExtendedCiphertext {
        ExtendedCiphertext {
            inner: &self.inner * &rhs.inner,
            random_scalar: &self.random_scalar + &rhs.random_scalar,
        }
    }
}

/// Lookup table for decrypting small integer plaintexts: maps `f^v` back to
/// `v` for every value in the covered range.
#[derive(Debug, Clone)]
pub struct DiscreteLogTable {
    inner: HashMap<BigUint, u64>,
}

impl DiscreteLogTable {
    /// Creates a table for the given plaintext values.
    pub fn new(params: &GroupParams, values: impl IntoIterator<Item = u64>) -> Self {
        let inner = values
            .into_iter()
            .map(|value| (params.f_pow(value).value().clone(), value))
            .collect();
        Self { inner }
    }

    /// Looks up the integer whose encoding is `element`, if the table
    /// covers it.
    pub fn get(&self, element: &ModInt) -> Option<u64> {
        self.inner.get(element.value()).copied()
    }
}

#[cfg(test)]
mod tests {
    use rand::thread_rng;

    use super::*;
    use crate::keys::Keypair;

    #[test]
    fn ciphertext_string_round_trip() {
        let ct: Ciphertext = "p23G12H18".parse().unwrap();
        assert_eq!(ct.to_string(), "p23G12H18");

        // Oversized components are reduced on parse.
        let reduced: Ciphertext = "p23G35H41".parse().unwrap();
        assert_eq!(reduced.to_string(), "p23G12H18");
        assert_eq!(ct, reduced);
    }

    #[test]
    fn parsing_rejects_malformed_ciphertexts() {
        for input in ["p23G12", "G12H18p23", "p23G12H18x", "p0G1H1", ""] {
            let err = input.parse::<Ciphertext>().unwrap_err();
            assert!(
                matches!(err, ParseError::InvalidCiphertext(_)),
                "{input}: {err}"
            );
        }
    }

    #[test]
    fn short_hash_is_stable_and_sized() {
        let ct: Ciphertext = "p23G12H18".parse().unwrap();
        let hash = ct.short_hash();
        assert_eq!(hash.len(), 16);
        assert_eq!(hash, ct.clone().short_hash());
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn ciphertexts_combine_homomorphically() {
        let mut rng = thread_rng();
        let params = GroupParams::generate(32, &mut rng);
        let keypair = Keypair::generate(&params, &mut rng);
        let table = DiscreteLogTable::new(&params, 0..=30);

        let encrypted_sum = [3_u64, 5, 11]
            .iter()
            .map(|&value| keypair.public().encrypt(value, &mut rng))
            .fold(Ciphertext::identity(&params), |acc, ct| &acc * &ct);
        let decrypted = keypair.secret().decrypt(&encrypted_sum, &params, &table);
        assert_eq!(decrypted, Some(19));
    }
}
