//! Encrypted ballots with zero-knowledge validity proofs.

use merlin::Transcript;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::{fmt, ops::RangeInclusive, str::FromStr};

use crate::{
    encryption::ExtendedCiphertext,
    error::ParseError,
    group::ModInt,
    proofs::{RingProof, RingProofBuilder},
    Ciphertext, PublicKey,
};

/// Error creating a [`Ballot`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum BallotError {
    /// The ballot contains no choices.
    #[error("ballot contains no choices")]
    EmptyChoices,

    /// A choice flag is neither 0 nor 1.
    #[error("choice #{index} is not 0 or 1")]
    NonBinaryChoice {
        /// Zero-based index of the offending choice.
        index: usize,
    },

    /// The number of labels differs from the number of choices.
    #[error("{labels} labels supplied for {choices} choices")]
    LabelMismatch {
        /// Number of choices.
        choices: usize,
        /// Number of labels.
        labels: usize,
    },

    /// The number of selected choices falls outside the allowed range.
    #[error("{sum} choices selected, allowed range is {min}..={max}")]
    SumOutOfRange {
        /// Number of selected choices.
        sum: u64,
        /// Minimum allowed number of selections.
        min: u64,
        /// Maximum allowed number of selections.
        max: u64,
    },

    /// A label or the race title is empty or contains characters that do not
    /// survive the textual ballot encoding.
    #[error("{field} is empty or contains whitespace or parentheses")]
    InvalidText {
        /// Name of the offending field.
        field: &'static str,
    },
}

fn check_atom(text: &str, field: &'static str) -> Result<(), BallotError> {
    let ok = !text.is_empty()
        && !text
            .chars()
            .any(|c| c.is_whitespace() || c == '(' || c == ')');
    if ok {
        Ok(())
    } else {
        Err(BallotError::InvalidText { field })
    }
}

/// Encrypted single-race ballot: one ElGamal ciphertext per choice, each
/// encrypting 0 or 1, together with a ring proof of validity.
///
/// # Validity proof
///
/// The proof is a single [`RingProof`] with a two-value ring (`f^0` / `f^1`)
/// per choice slot plus one extra ring over the homomorphic combination of
/// all slots, whose admissible values are `f^min ..= f^max` for the allowed
/// selection range. Sharing the common challenge across all rings makes the
/// proof roughly a third smaller than independent per-slot proofs.
///
/// # Textual encoding
///
/// A ballot renders as an S-expression
///
/// ```text
/// (ballot
///   (vote (p..G..H.. p..G..H..))
///   (vote-ids (alice bob))
///   (proof (challenge 123) (responses (4 5 6)))
///   (title mayor))
/// ```
///
/// with single spaces between tokens. Labels and the title must be non-empty
/// and free of whitespace and parentheses, which [`Self::new()`] enforces.
/// Parsing accepts arbitrary whitespace between tokens; rendering a parsed
/// ballot produces the canonical single-space form. The proof field may be
/// empty, rendered as `(proof)`; such a ballot parses and round-trips but
/// never passes [`Self::verify()`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ballot {
    ciphertexts: Vec<Ciphertext>,
    choice_labels: Vec<String>,
    race_title: String,
    proof: Option<RingProof>,
}

impl Ballot {
    /// Encrypts `choices` (one 0/1 flag per choice) for `receiver` and
    /// attaches a validity proof for the given selection range.
    ///
    /// # Errors
    ///
    /// Fails if the choices are empty or non-binary, the labels do not match
    /// the choices, any text field does not encode, or the number of selected
    /// choices falls outside `allowed`.
    ///
    /// # Panics
    ///
    /// Panics if `allowed` is an empty range.
    pub fn new<R: CryptoRng + RngCore>(
        choices: &[u64],
        choice_labels: Vec<String>,
        race_title: String,
        receiver: &PublicKey,
        allowed: RangeInclusive<u64>,
        rng: &mut R,
    ) -> Result<Self, BallotError> {
        let (min, max) = (*allowed.start(), *allowed.end());
        assert!(min <= max, "empty selection range");

        if choices.is_empty() {
            return Err(BallotError::EmptyChoices);
        }
        if choice_labels.len() != choices.len() {
            return Err(BallotError::LabelMismatch {
                choices: choices.len(),
                labels: choice_labels.len(),
            });
        }
        if let Some(index) = choices.iter().position(|&choice| choice > 1) {
            return Err(BallotError::NonBinaryChoice { index });
        }
        check_atom(&race_title, "race title")?;
        for label in &choice_labels {
            check_atom(label, "choice label")?;
        }
        let sum: u64 = choices.iter().sum();
        if sum < min || sum > max {
            return Err(BallotError::SumOutOfRange { sum, min, max });
        }

        let params = receiver.params();
        let boolean_values = [params.one(), params.f().clone()];
        let sum_values: Vec<_> = (min..=max).map(|value| params.f_pow(value)).collect();

        let mut transcript = Self::proof_transcript(&race_title, &choice_labels, min, max);
        let mut builder = RingProofBuilder::new(receiver, &mut transcript, rng);
        let extended: Vec<_> = choices
            .iter()
            .map(|&choice| builder.add_value(&boolean_values, choice as usize))
            .collect();

        let encrypted_sum = extended
            .iter()
            .skip(1)
            .fold(extended[0].clone(), |acc, ciphertext| &acc * ciphertext);
        builder.add_precomputed(encrypted_sum, &sum_values, (sum - min) as usize);
        let proof = builder.build();

        Ok(Self {
            ciphertexts: extended
                .into_iter()
                .map(ExtendedCiphertext::into_inner)
                .collect(),
            choice_labels,
            race_title,
            proof: Some(proof),
        })
    }

    pub(crate) fn from_parts(
        ciphertexts: Vec<Ciphertext>,
        choice_labels: Vec<String>,
        race_title: String,
        proof: Option<RingProof>,
    ) -> Self {
        Self {
            ciphertexts,
            choice_labels,
            race_title,
            proof,
        }
    }

    fn proof_transcript(
        race_title: &str,
        choice_labels: &[String],
        min: u64,
        max: u64,
    ) -> Transcript {
        let mut transcript = Transcript::new(b"ballot");
        transcript.append_message(b"title", race_title.as_bytes());
        transcript.append_u64(b"n", choice_labels.len() as u64);
        for label in choice_labels {
            transcript.append_message(b"choice_label", label.as_bytes());
        }
        transcript.append_u64(b"min", min);
        transcript.append_u64(b"max", max);
        transcript
    }

    /// Verifies the validity proof against the key and selection range the
    /// election was set up with. Structural defects (wrong sizes, foreign
    /// group, missing labels, an absent proof) fail verification just like a
    /// forged proof.
    pub fn verify(&self, receiver: &PublicKey, allowed: RangeInclusive<u64>) -> bool {
        let Some(proof) = &self.proof else {
            return false;
        };
        let (min, max) = (*allowed.start(), *allowed.end());
        let params = receiver.params();
        let well_formed = min <= max
            && !self.ciphertexts.is_empty()
            && self.choice_labels.len() == self.ciphertexts.len()
            && self.ciphertexts.iter().all(|ciphertext| {
                ciphertext.random_element().modulus() == Some(params.modulus())
                    && ciphertext.blinded_element().modulus() == Some(params.modulus())
            });
        if !well_formed {
            return false;
        }

        let boolean_values = [params.one(), params.f().clone()];
        let sum_values: Vec<_> = (min..=max).map(|value| params.f_pow(value)).collect();
        let mut admissible_values: Vec<&[ModInt]> =
            vec![&boolean_values; self.ciphertexts.len()];
        admissible_values.push(&sum_values);

        let encrypted_sum = self
            .ciphertexts
            .iter()
            .skip(1)
            .fold(self.ciphertexts[0].clone(), |acc, ciphertext| {
                &acc * ciphertext
            });
        let mut ciphertexts = self.ciphertexts.clone();
        ciphertexts.push(encrypted_sum);

        let mut transcript =
            Self::proof_transcript(&self.race_title, &self.choice_labels, min, max);
        proof.verify(receiver, &admissible_values, &ciphertexts, &mut transcript)
    }

    /// Per-choice ciphertexts, in label order.
    pub fn ciphertexts(&self) -> &[Ciphertext] {
        &self.ciphertexts
    }

    /// Choice labels, parallel to [`Self::ciphertexts()`].
    pub fn choice_labels(&self) -> &[String] {
        &self.choice_labels
    }

    /// Title of the race this ballot belongs to.
    pub fn race_title(&self) -> &str {
        &self.race_title
    }

    /// Fingerprints of the per-choice ciphertexts, suitable for publishing
    /// on a bulletin board for voters to check their ballot was recorded.
    pub fn fingerprints(&self) -> Vec<String> {
        self.ciphertexts
            .iter()
            .map(Ciphertext::short_hash)
            .collect()
    }
}

impl fmt::Display for Ballot {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("(ballot (vote (")?;
        for (i, ciphertext) in self.ciphertexts.iter().enumerate() {
            if i > 0 {
                formatter.write_str(" ")?;
            }
            write!(formatter, "{ciphertext}")?;
        }
        formatter.write_str(")) (vote-ids (")?;
        for (i, label) in self.choice_labels.iter().enumerate() {
            if i > 0 {
                formatter.write_str(" ")?;
            }
            formatter.write_str(label)?;
        }
        formatter.write_str(")) ")?;
        match &self.proof {
            Some(proof) => {
                let (challenge, responses) = proof.parts();
                write!(formatter, "(proof (challenge {challenge}) (responses (")?;
                for (i, response) in responses.iter().enumerate() {
                    if i > 0 {
                        formatter.write_str(" ")?;
                    }
                    write!(formatter, "{response}")?;
                }
                formatter.write_str(")))")?;
            }
            None => formatter.write_str("(proof)")?,
        }
        write!(formatter, " (title {}))", self.race_title)
    }
}

impl FromStr for Ballot {
    type Err = ParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let sexp = sexp::parse(input)?;
        let items = sexp.list()?;
        let [tag, vote, vote_ids, proof, title] = items else {
            return Err(ParseError::InvalidVote("expected 5-element ballot form"));
        };
        if tag.atom()? != "ballot" {
            return Err(ParseError::InvalidVote("expected `ballot` tag"));
        }

        let ciphertexts = vote
            .tagged("vote")?
            .list()?
            .iter()
            .map(|item| item.atom()?.parse::<Ciphertext>())
            .collect::<Result<Vec<_>, _>>()?;
        let choice_labels = vote_ids
            .tagged("vote-ids")?
            .list()?
            .iter()
            .map(|item| item.atom().map(String::from))
            .collect::<Result<Vec<_>, _>>()?;

        let proof = match proof.tagged_items("proof")? {
            [] => None,
            [challenge, responses] => {
                let challenge = sexp::number(challenge.tagged("challenge")?)?;
                let responses = responses
                    .tagged("responses")?
                    .list()?
                    .iter()
                    .map(sexp::number)
                    .collect::<Result<Vec<_>, _>>()?;
                Some(RingProof::from_parts(challenge, responses))
            }
            _ => return Err(ParseError::InvalidVote("expected empty or 2-element proof form")),
        };

        let race_title = title.tagged("title")?.atom()?.to_owned();
        Ok(Self::from_parts(
            ciphertexts,
            choice_labels,
            race_title,
            proof,
        ))
    }
}

/// Minimal S-expression reader for the ballot wire format.
mod sexp {
    use num_bigint::BigUint;

    use crate::{error::ParseError, group::ModInt};

    #[derive(Debug)]
    pub enum Sexp {
        Atom(String),
        List(Vec<Sexp>),
    }

    impl Sexp {
        pub fn atom(&self) -> Result<&str, ParseError> {
            match self {
                Self::Atom(atom) => Ok(atom),
                Self::List(_) => Err(ParseError::InvalidVote("expected atom, got list")),
            }
        }

        pub fn list(&self) -> Result<&[Sexp], ParseError> {
            match self {
                Self::List(items) => Ok(items),
                Self::Atom(_) => Err(ParseError::InvalidVote("expected list, got atom")),
            }
        }

        /// Unwraps a `(tag value)` form, returning the value.
        pub fn tagged(&self, tag: &'static str) -> Result<&Sexp, ParseError> {
            let [value] = self.tagged_items(tag)? else {
                return Err(ParseError::InvalidVote("expected single-value form"));
            };
            Ok(value)
        }

        /// Unwraps a `(tag item*)` form, returning the items.
        pub fn tagged_items(&self, tag: &'static str) -> Result<&[Sexp], ParseError> {
            let items = self.list()?;
            let Some((first, rest)) = items.split_first() else {
                return Err(ParseError::InvalidVote("empty form"));
            };
            if first.atom()? != tag {
                return Err(ParseError::InvalidVote("unexpected form tag"));
            }
            Ok(rest)
        }
    }

    pub fn number(item: &Sexp) -> Result<ModInt, ParseError> {
        let digits = item.atom()?;
        BigUint::parse_bytes(digits.as_bytes(), 10)
            .map(ModInt::plain)
            .ok_or(ParseError::InvalidVote("expected decimal number"))
    }

    pub fn parse(input: &str) -> Result<Sexp, ParseError> {
        let mut stack: Vec<Vec<Sexp>> = vec![];
        let mut chars = input.char_indices().peekable();
        let mut top_level = None;

        while let Some(&(start, c)) = chars.peek() {
            let item = if c.is_whitespace() {
                chars.next();
                continue;
            } else if c == '(' {
                chars.next();
                stack.push(vec![]);
                continue;
            } else if c == ')' {
                chars.next();
                let items = stack
                    .pop()
                    .ok_or(ParseError::InvalidVote("unbalanced `)`"))?;
                Sexp::List(items)
            } else {
                let mut end = input.len();
                while let Some(&(i, c)) = chars.peek() {
                    if c.is_whitespace() || c == '(' || c == ')' {
                        end = i;
                        break;
                    }
                    chars.next();
                }
                Sexp::Atom(input[start..end].to_owned())
            };

            match stack.last_mut() {
                Some(current) => current.push(item),
                None if top_level.is_none() => top_level = Some(item),
                None => return Err(ParseError::InvalidVote("trailing input")),
            }
        }

        if !stack.is_empty() {
            return Err(ParseError::InvalidVote("unbalanced `(`"));
        }
        top_level.ok_or(ParseError::InvalidVote("empty input"))
    }
}
