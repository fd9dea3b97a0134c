//! Authority state machine for distributed key generation.

use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::{
    encryption::ExtendedCiphertext,
    group::{GroupParams, ModInt},
    keys::{Keypair, PublicKey, SecretKey},
    sharing::{Error, Params, PublicPolynomial, SharingPolynomial},
    Ciphertext,
};

/// Key share sent from one authority to another, encrypted under the
/// recipient's personal transport key.
///
/// The share is an exponent in `Z_q` and is transported with multiplicative
/// ElGamal rather than lifted into the exponent, so the recipient decrypts
/// it exactly, with no discrete-log search. The share is squared into the
/// order-`q` subgroup first; blinding a non-residue with the always-residue
/// mask `h^r` would leak the share's quadratic residuosity to any observer.
/// Since `p = 2q + 1`, exactly one of the two roots is below `q`, so the
/// recipient recovers the share unambiguously.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptedShare {
    ciphertext: Ciphertext,
}

impl EncryptedShare {
    fn new<R: CryptoRng + RngCore>(
        share: &ModInt,
        recipient: &PublicKey,
        rng: &mut R,
    ) -> Self {
        let element = recipient.params().element(share.value().clone());
        let message = &element * &element;
        Self {
            ciphertext: ExtendedCiphertext::new(&message, recipient, rng).into_inner(),
        }
    }

    /// The underlying ciphertext, e.g. for posting to a bulletin board.
    pub fn ciphertext(&self) -> &Ciphertext {
        &self.ciphertext
    }
}

/// Secret output of key generation for one authority: its index and the
/// summed share of the joint election secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyShare {
    index: usize,
    secret: SecretKey,
}

impl KeyShare {
    /// Zero-based index of the authority this share belongs to.
    pub fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn secret(&self) -> &SecretKey {
        &self.secret
    }
}

/// Public output of key generation: the joint election key and the public
/// key shares of all authorities, against which their partial decryptions
/// can be verified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeySet {
    sharing: Params,
    shared_key: PublicKey,
    authority_elements: Vec<ModInt>,
}

impl KeySet {
    fn from_polynomial(sharing: Params, group: &GroupParams, polynomial: &PublicPolynomial) -> Self {
        let shared_element = polynomial.value_at(group, 0);
        let authority_elements = (0..sharing.authorities)
            .map(|index| polynomial.value_at(group, index as u64 + 1))
            .collect();
        Self {
            sharing,
            shared_key: PublicKey::from_element(group.clone(), shared_element),
            authority_elements,
        }
    }

    /// Threshold parameters of the ceremony this set came from.
    pub fn sharing(&self) -> Params {
        self.sharing
    }

    /// The joint election key; ballots are encrypted for it.
    pub fn shared_key(&self) -> &PublicKey {
        &self.shared_key
    }

    /// The group all keys live in.
    pub fn params(&self) -> &GroupParams {
        self.shared_key.params()
    }

    /// Public key share `g^{s_j}` of the authority with the given index.
    pub fn authority_element(&self, index: usize) -> Option<&ModInt> {
        self.authority_elements.get(index)
    }
}

/// State machine of one authority during distributed key generation.
///
/// The authority deals its own polynomial and absorbs commitment vectors and
/// encrypted shares from all other authorities. [`Self::finalize()`] checks
/// completeness and yields the authority's [`KeyShare`] together with the
/// public [`KeySet`]; all honest authorities arrive at the same key set.
///
/// # Examples
///
/// 2-of-3 key generation with all messages passed in memory:
///
/// ```
/// # use hom_tally::{group::GroupParams, sharing::{Authority, Params}};
/// # use rand::thread_rng;
/// # fn main() -> Result<(), hom_tally::sharing::Error> {
/// let mut rng = thread_rng();
/// let group = GroupParams::generate(32, &mut rng);
/// let params = Params::new(3, 2);
/// let mut authorities: Vec<_> = (0..3)
///     .map(|index| Authority::new(params, group.clone(), index, &mut rng))
///     .collect();
///
/// // Broadcast commitment vectors.
/// for sender in 0..3 {
///     let commitments = authorities[sender].commitments().clone();
///     for receiver in 0..3 {
///         if sender != receiver {
///             authorities[receiver].insert_commitments(sender, commitments.clone())?;
///         }
///     }
/// }
/// // Exchange encrypted shares.
/// for sender in 0..3 {
///     for receiver in 0..3 {
///         if sender == receiver {
///             continue;
///         }
///         let key = authorities[receiver].transport_key().clone();
///         let share = authorities[sender].encrypted_share_for(receiver, &key, &mut rng)?;
///         authorities[receiver].receive_share(sender, &share)?;
///     }
/// }
///
/// let outputs = authorities
///     .into_iter()
///     .map(Authority::finalize)
///     .collect::<Result<Vec<_>, _>>()?;
/// // All authorities agree on the joint key.
/// assert!(outputs.windows(2).all(|pair| pair[0].1 == pair[1].1));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Authority {
    sharing: Params,
    group: GroupParams,
    index: usize,
    keypair: Keypair,
    polynomial: SharingPolynomial,
    commitments: Vec<Option<PublicPolynomial>>,
    shares: Vec<Option<ModInt>>,
}

impl Authority {
    /// Creates a new authority with a fresh transport keypair and sharing
    /// polynomial.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a valid authority index in `sharing`.
    pub fn new<R: CryptoRng + RngCore>(
        sharing: Params,
        group: GroupParams,
        index: usize,
        rng: &mut R,
    ) -> Self {
        assert!(
            index < sharing.authorities,
            "authority index {index} out of bounds"
        );

        let keypair = Keypair::generate(&group, rng);
        let polynomial = SharingPolynomial::random(&group, sharing.threshold, rng);
        let mut commitments = vec![None; sharing.authorities];
        commitments[index] = Some(polynomial.commit(&group));
        let mut shares = vec![None; sharing.authorities];
        shares[index] = Some(polynomial.evaluate(&group, index as u64 + 1));

        Self {
            sharing,
            group,
            index,
            keypair,
            polynomial,
            commitments,
            shares,
        }
    }

    /// Zero-based index of this authority.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Personal key under which other authorities encrypt shares for this
    /// authority.
    pub fn transport_key(&self) -> &PublicKey {
        self.keypair.public()
    }

    /// Commitment vector of this authority's own polynomial, to be broadcast
    /// to all other authorities.
    pub fn commitments(&self) -> &PublicPolynomial {
        self.commitments[self.index]
            .as_ref()
            .expect("own commitments are filled at construction")
    }

    /// Records the commitment vector broadcast by another authority.
    ///
    /// # Errors
    ///
    /// Fails on an invalid sender index, a repeated broadcast, or a vector
    /// of the wrong length.
    pub fn insert_commitments(
        &mut self,
        from: usize,
        commitments: PublicPolynomial,
    ) -> Result<(), Error> {
        let slot = self
            .commitments
            .get_mut(from)
            .ok_or(Error::InvalidIndex {
                index: from,
                authorities: self.sharing.authorities,
            })?;
        if slot.is_some() {
            return Err(Error::DuplicateMessage { index: from });
        }
        if commitments.len() != self.sharing.threshold {
            return Err(Error::MalformedCommitments {
                expected: self.sharing.threshold,
                actual: commitments.len(),
            });
        }
        *slot = Some(commitments);
        Ok(())
    }

    /// Produces the encrypted share of this authority's polynomial for the
    /// authority with the given index.
    ///
    /// # Errors
    ///
    /// Fails if `recipient` is not a valid authority index.
    pub fn encrypted_share_for<R: CryptoRng + RngCore>(
        &self,
        recipient: usize,
        recipient_key: &PublicKey,
        rng: &mut R,
    ) -> Result<EncryptedShare, Error> {
        if recipient >= self.sharing.authorities {
            return Err(Error::InvalidIndex {
                index: recipient,
                authorities: self.sharing.authorities,
            });
        }
        let share = self.polynomial.evaluate(&self.group, recipient as u64 + 1);
        Ok(EncryptedShare::new(&share, recipient_key, rng))
    }

    /// Decrypts a received share and verifies it against the sender's
    /// commitment vector.
    ///
    /// # Errors
    ///
    /// Fails if the sender's commitments have not arrived yet, the message is
    /// a duplicate, or the share does not match the commitments. The latter
    /// error publicly incriminates the sender.
    pub fn receive_share(&mut self, from: usize, share: &EncryptedShare) -> Result<(), Error> {
        if from >= self.sharing.authorities {
            return Err(Error::InvalidIndex {
                index: from,
                authorities: self.sharing.authorities,
            });
        }
        if self.shares[from].is_some() {
            return Err(Error::DuplicateMessage { index: from });
        }
        let commitments = self.commitments[from]
            .as_ref()
            .ok_or(Error::MissingCommitments { index: from })?;

        let decrypted = self
            .keypair
            .secret()
            .decrypt_element(&share.ciphertext, &self.group);
        let root = self.group.subgroup_sqrt(&decrypted);
        if &root * &root != decrypted {
            return Err(Error::InvalidShare);
        }
        let expected = commitments.value_at(&self.group, self.index as u64 + 1);
        if self.group.g().pow(root.value()) != expected {
            return Err(Error::InvalidShare);
        }

        self.shares[from] = Some(self.group.exponent(root.value().clone()));
        Ok(())
    }

    /// Indexes of authorities whose commitments or shares are still missing.
    pub fn missing_messages(&self) -> impl Iterator<Item = usize> + '_ {
        self.commitments
            .iter()
            .zip(&self.shares)
            .enumerate()
            .filter_map(|(index, (commitments, share))| {
                (commitments.is_none() || share.is_none()).then_some(index)
            })
    }

    /// Completes key generation, consuming the authority.
    ///
    /// # Errors
    ///
    /// Fails if messages from some authorities are still missing.
    pub fn finalize(self) -> Result<(KeyShare, KeySet), Error> {
        let missing = self.missing_messages().count();
        if missing > 0 {
            return Err(Error::InsufficientShares { missing });
        }

        let mut shares = self.shares.into_iter().flatten();
        let first = shares.next().expect("at least one authority");
        let secret = shares.fold(first, |acc, share| &acc + &share);

        let mut commitments = self.commitments.into_iter().flatten();
        let combined_first = commitments.next().expect("at least one authority");
        let combined = commitments.fold(combined_first, |acc, polynomial| {
            acc.combine(&polynomial)
        });

        let key_set = KeySet::from_polynomial(self.sharing, &self.group, &combined);
        debug_assert_eq!(
            self.group.g().pow(secret.value()),
            combined.value_at(&self.group, self.index as u64 + 1),
            "summed shares do not match combined commitments"
        );

        let key_share = KeyShare {
            index: self.index,
            secret: SecretKey::new(secret),
        };
        Ok((key_share, key_set))
    }
}
