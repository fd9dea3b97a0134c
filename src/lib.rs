//! Homomorphic threshold [ElGamal encryption] for tallying electronic votes.
//!
//! # ⚠ Warnings
//!
//! While the logic in this crate relies on standard cryptographic assumptions
//! (complexity of discrete log and computational / decisional Diffie–Hellman problems
//! in safe-prime groups), it has not been independently verified for correctness or
//! absence of side-channel attack vectors. **Use at your own risk.**
//!
//! # Overview
//!
//! The crate implements the cryptographic core of an election in which voters
//! submit encrypted ballots, anyone can homomorphically aggregate them, and a
//! threshold of tallying authorities jointly decrypts nothing but the final
//! per-choice counts:
//!
//! - [`group`] module provides the numeric substrate: [`ModInt`](group::ModInt)
//!   arbitrary-precision modular integers and safe-prime
//!   [`GroupParams`](group::GroupParams) with two independent generators, the key
//!   base `g` and the message base `f`.
//! - [`Ciphertext`] is an exponential ElGamal ciphertext `(g^r, h^r * f^m)`.
//!   Ciphertexts combine by component-wise multiplication, which adds the
//!   encrypted values; [`DiscreteLogTable`] recovers small plaintexts after
//!   decryption.
//! - [`Ballot`] encrypts one 0/1 flag per choice and carries a [`RingProof`]
//!   that every flag is Boolean and that the number of selected choices is in
//!   the allowed range. Ballots render to a textual S-expression for transport.
//! - [`sharing`] module implements dealerless distributed key generation with
//!   Feldman's verifiable secret sharing: each [`Authority`](sharing::Authority)
//!   deals a polynomial, and any `t` of `n` authorities can later decrypt.
//! - [`Tally`] verifies and aggregates ballots and recombines authorities'
//!   [`PartialDecryption`]s (each backed by a [`LogEqualityProof`]) into the
//!   final counts.
//!
//! # Example
//!
//! A complete 2-of-3 election with two ballots:
//!
//! ```
//! use hom_tally::{
//!     group::GroupParams,
//!     sharing::{Authority, Params},
//!     Ballot, PartialDecryption, Tally,
//! };
//! use rand::thread_rng;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut rng = thread_rng();
//! let group = GroupParams::generate(32, &mut rng);
//! let params = Params::new(3, 2);
//!
//! // Run distributed key generation (commitments and encrypted shares
//! // would normally travel over the wire; see `sharing::Authority` docs).
//! let mut authorities: Vec<_> = (0..3)
//!     .map(|i| Authority::new(params, group.clone(), i, &mut rng))
//!     .collect();
//! for sender in 0..3 {
//!     let commitments = authorities[sender].commitments().clone();
//!     for receiver in 0..3 {
//!         if sender != receiver {
//!             authorities[receiver].insert_commitments(sender, commitments.clone())?;
//!         }
//!     }
//! }
//! for sender in 0..3 {
//!     for receiver in 0..3 {
//!         if sender == receiver {
//!             continue;
//!         }
//!         let key = authorities[receiver].transport_key().clone();
//!         let share = authorities[sender].encrypted_share_for(receiver, &key, &mut rng)?;
//!         authorities[receiver].receive_share(sender, &share)?;
//!     }
//! }
//! let outputs = authorities
//!     .into_iter()
//!     .map(Authority::finalize)
//!     .collect::<Result<Vec<_>, _>>()?;
//! let key_set = outputs[0].1.clone();
//!
//! // Collect ballots for a single-winner race.
//! let labels = vec!["alice".to_owned(), "bob".to_owned()];
//! let mut tally = Tally::new(key_set.clone(), labels.clone(), "mayor".to_owned(), 1..=1);
//! for choices in [[0, 1], [0, 1]] {
//!     let ballot = Ballot::new(
//!         &choices,
//!         labels.clone(),
//!         "mayor".to_owned(),
//!         key_set.shared_key(),
//!         1..=1,
//!         &mut rng,
//!     )?;
//!     tally.cast(ballot)?;
//! }
//!
//! // Any two authorities decrypt the aggregate.
//! let aggregate = tally.encrypted_sum();
//! let partials: Vec<_> = outputs[..2]
//!     .iter()
//!     .map(|(share, _)| PartialDecryption::new(share, &aggregate, &key_set, &mut rng))
//!     .collect();
//! assert_eq!(tally.decrypt(&partials, 2)?, vec![0, 2]);
//! # Ok(())
//! # }
//! ```
//!
//! [ElGamal encryption]: https://en.wikipedia.org/wiki/ElGamal_encryption

#![warn(missing_debug_implementations, missing_docs, bare_trait_objects)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::similar_names
)]

mod ballot;
mod encryption;
mod error;
pub mod group;
mod keys;
mod proofs;
pub mod sharing;
mod tally;

pub use crate::{
    ballot::{Ballot, BallotError},
    encryption::{Ciphertext, DiscreteLogTable},
    error::{ArithmeticError, ParseError},
    keys::{Keypair, PublicKey, SecretKey},
    proofs::{LogEqualityProof, RingProof, VerificationError},
    tally::{PartialDecryption, Tally, TallyError},
};
