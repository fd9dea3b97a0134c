//! Numeric substrate: arbitrary-precision modular integers and the
//! safe-prime group every protocol object lives in.

use num_bigint::{BigInt, BigUint, RandBigInt, Sign};
use num_integer::Integer;
use num_prime::nt_funcs::is_prime;
use num_prime::PrimalityTestConfig;
use num_traits::{One, Pow, ToPrimitive, Zero};
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use std::{fmt, ops};

use crate::error::ArithmeticError;

/// An arbitrary-precision non-negative integer, optionally paired with a modulus.
///
/// When a modulus is attached, every operation that returns a new `ModInt`
/// normalizes the result into `[0, modulus)`. Equality compares the value
/// only; the modulus governs how operations are carried out, not identity.
/// Values are immutable: arithmetic always produces a new `ModInt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModInt {
    value: BigUint,
    modulus: Option<BigUint>,
}

impl ModInt {
    /// Creates a value reduced modulo `modulus`.
    pub fn new(value: BigUint, modulus: BigUint) -> Self {
        Self {
            value: value % &modulus,
            modulus: Some(modulus),
        }
    }

    /// Creates a plain integer without a modulus.
    pub fn plain(value: BigUint) -> Self {
        Self {
            value,
            modulus: None,
        }
    }

    /// Attaches a modulus without reducing the value. Used when restoring
    /// values from a textual encoding that must survive round-tripping
    /// verbatim.
    pub(crate) fn raw(value: BigUint, modulus: BigUint) -> Self {
        Self {
            value,
            modulus: Some(modulus),
        }
    }

    /// Returns the integer value, normalized if a modulus is attached.
    pub fn value(&self) -> &BigUint {
        &self.value
    }

    /// Returns the attached modulus, if any.
    pub fn modulus(&self) -> Option<&BigUint> {
        self.modulus.as_ref()
    }

    pub(crate) fn to_bytes_be(&self) -> Vec<u8> {
        self.value.to_bytes_be()
    }

    fn common_modulus<'a>(&'a self, rhs: &'a Self) -> Option<&'a BigUint> {
        debug_assert!(
            match (&self.modulus, &rhs.modulus) {
                (Some(lhs), Some(rhs)) => lhs == rhs,
                _ => true,
            },
            "mixing values with different moduli"
        );
        self.modulus.as_ref().or(rhs.modulus.as_ref())
    }

    /// Raises the value to a non-negative power. Uses square-and-multiply
    /// (`modpow`) when a modulus is attached.
    ///
    /// # Panics
    ///
    /// Panics if no modulus is attached and the exponent does not fit `u32`
    /// (plain exponentiation of that size is always a caller bug).
    pub fn pow(&self, exponent: &BigUint) -> Self {
        match &self.modulus {
            Some(modulus) => Self {
                value: self.value.modpow(exponent, modulus),
                modulus: Some(modulus.clone()),
            },
            None => {
                let exponent = exponent
                    .to_u32()
                    .expect("exponent too large for modulus-free exponentiation");
                Self {
                    value: Pow::pow(&self.value, exponent),
                    modulus: None,
                }
            }
        }
    }

    /// Raises the value to a signed power. A negative exponent inverts
    /// the value first and thus can fail like [`Self::invert()`].
    pub fn pow_signed(&self, exponent: &BigInt) -> Result<Self, ArithmeticError> {
        let base = if exponent.sign() == Sign::Minus {
            self.invert()?
        } else {
            self.clone()
        };
        Ok(base.pow(exponent.magnitude()))
    }

    /// Computes the modular inverse via the extended Euclidean algorithm.
    ///
    /// # Errors
    ///
    /// Fails with [`ArithmeticError::DivisionByZero`] if the value is zero or
    /// shares a factor with the modulus, and with
    /// [`ArithmeticError::MissingModulus`] if no modulus is attached.
    pub fn invert(&self) -> Result<Self, ArithmeticError> {
        let modulus = self
            .modulus
            .as_ref()
            .ok_or(ArithmeticError::MissingModulus)?;
        if self.value.is_zero() {
            return Err(ArithmeticError::DivisionByZero);
        }

        let signed_modulus = BigInt::from(modulus.clone());
        let ext = BigInt::from(self.value.clone()).extended_gcd(&signed_modulus);
        if !ext.gcd.is_one() {
            return Err(ArithmeticError::DivisionByZero);
        }
        let inverse = ext.x.mod_floor(&signed_modulus);
        Ok(Self {
            value: inverse
                .to_biguint()
                .expect("`mod_floor` by a positive modulus is non-negative"),
            modulus: Some(modulus.clone()),
        })
    }

    /// Samples a value uniformly from `[low, high)` using a cryptographically
    /// strong `rng`, attaching `modulus` to the result.
    ///
    /// # Panics
    ///
    /// Panics if `low >= high`.
    pub fn sample<R: CryptoRng + RngCore>(
        low: &BigUint,
        high: &BigUint,
        modulus: &BigUint,
        rng: &mut R,
    ) -> Self {
        assert!(low < high, "empty sampling range");
        Self::new(rng.gen_biguint_range(low, high), modulus.clone())
    }
}

impl PartialEq for ModInt {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for ModInt {}

impl fmt::Display for ModInt {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.value, formatter)
    }
}

impl ops::Add for &ModInt {
    type Output = ModInt;

    fn add(self, rhs: &ModInt) -> ModInt {
        let modulus = self.common_modulus(rhs).cloned();
        let mut value = &self.value + &rhs.value;
        if let Some(modulus) = &modulus {
            value %= modulus;
        }
        ModInt { value, modulus }
    }
}

impl ops::Sub for &ModInt {
    type Output = ModInt;

    /// Modular subtraction with wrap-around below zero. Without a modulus the
    /// left operand must not be smaller than the right one.
    fn sub(self, rhs: &ModInt) -> ModInt {
        let modulus = self.common_modulus(rhs).cloned();
        match &modulus {
            Some(modulus) => {
                let lhs = &self.value % modulus;
                let rhs = &rhs.value % modulus;
                let value = if lhs >= rhs {
                    lhs - rhs
                } else {
                    modulus - rhs + lhs
                };
                ModInt {
                    value,
                    modulus: Some(modulus.clone()),
                }
            }
            None => ModInt {
                value: &self.value - &rhs.value,
                modulus: None,
            },
        }
    }
}

impl ops::Mul for &ModInt {
    type Output = ModInt;

    fn mul(self, rhs: &ModInt) -> ModInt {
        let modulus = self.common_modulus(rhs).cloned();
        let mut value = &self.value * &rhs.value;
        if let Some(modulus) = &modulus {
            value %= modulus;
        }
        ModInt { value, modulus }
    }
}

impl ops::Add for ModInt {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        &self + &rhs
    }
}

impl ops::Sub for ModInt {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        &self - &rhs
    }
}

impl ops::Mul for ModInt {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        &self * &rhs
    }
}

fn probably_prime(candidate: &BigUint) -> bool {
    is_prime(candidate, Some(PrimalityTestConfig::default())).probably()
}

/// Public parameters of the safe-prime group all protocol objects live in:
/// a prime `p = 2q + 1` with `q` prime, and two generators `g`, `f` of the
/// order-`q` subgroup sampled independently (so neither is an
/// efficiently-computable power of the other). `g` is the key base, `f` the
/// message base of exponential ElGamal.
///
/// Created once at election setup and treated as read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupParams {
    p: BigUint,
    q: BigUint,
    g: ModInt,
    f: ModInt,
}

impl GroupParams {
    /// Generates fresh group parameters with a safe prime of `bit_length`
    /// bits. Candidates are rejection-sampled until both `q` and
    /// `p = 2q + 1` pass a Miller–Rabin check, so the call is probabilistic
    /// but terminating.
    ///
    /// # Panics
    ///
    /// Panics if `bit_length < 8`.
    pub fn generate<R: CryptoRng + RngCore>(bit_length: u64, rng: &mut R) -> Self {
        assert!(bit_length >= 8, "group modulus too small");

        let (p, q) = loop {
            // Force the top bit so `p` really has `bit_length` bits,
            // and the low bit so `q` is odd.
            let q = rng.gen_biguint(bit_length - 1)
                | BigUint::one()
                | (BigUint::one() << (bit_length - 2));
            if !probably_prime(&q) {
                continue;
            }
            let p: BigUint = &q * 2_u32 + 1_u32;
            if probably_prime(&p) {
                break (p, q);
            }
        };

        let g = Self::sample_generator(&p, rng);
        let f = loop {
            let candidate = Self::sample_generator(&p, rng);
            if candidate != g {
                break candidate;
            }
        };
        Self { p, q, g, f }
    }

    /// Restores parameters from raw components without validity checks;
    /// use [`Self::validate()`] for parameters received from outside.
    pub fn from_components(p: BigUint, q: BigUint, g: BigUint, f: BigUint) -> Self {
        let g = ModInt::raw(g, p.clone());
        let f = ModInt::raw(f, p.clone());
        Self { p, q, g, f }
    }

    // Squaring a random unit yields an element of the order-`q` subgroup;
    // anything except 1 generates the whole subgroup since `q` is prime.
    fn sample_generator<R: CryptoRng + RngCore>(p: &BigUint, rng: &mut R) -> ModInt {
        let two = BigUint::from(2_u32);
        loop {
            let unit = rng.gen_biguint_range(&two, &(p - BigUint::one()));
            let squared = unit.modpow(&two, p);
            if !squared.is_one() {
                break ModInt::new(squared, p.clone());
            }
        }
    }

    /// Checks all structural invariants: primality of `p` and `q`,
    /// `p = 2q + 1`, and subgroup membership of both generators.
    pub fn validate(&self) -> bool {
        self.q.clone() * 2_u32 + BigUint::one() == self.p
            && probably_prime(&self.p)
            && probably_prime(&self.q)
            && !self.g.value().is_one()
            && !self.f.value().is_one()
            && self.g != self.f
            && self.g.pow(&self.q).value().is_one()
            && self.f.pow(&self.q).value().is_one()
    }

    /// The prime modulus `p`.
    pub fn modulus(&self) -> &BigUint {
        &self.p
    }

    /// The prime subgroup order `q = (p - 1) / 2`.
    pub fn order(&self) -> &BigUint {
        &self.q
    }

    /// The key base `g`.
    pub fn g(&self) -> &ModInt {
        &self.g
    }

    /// The message base `f`.
    pub fn f(&self) -> &ModInt {
        &self.f
    }

    /// Wraps a value as a group element modulo `p`.
    pub fn element(&self, value: BigUint) -> ModInt {
        ModInt::new(value, self.p.clone())
    }

    /// Wraps a value as an exponent modulo `q`.
    pub fn exponent(&self, value: BigUint) -> ModInt {
        ModInt::new(value, self.q.clone())
    }

    /// The multiplicative identity modulo `p`.
    pub fn one(&self) -> ModInt {
        ModInt::new(BigUint::one(), self.p.clone())
    }

    /// Samples an exponent uniformly from `Z_q`.
    pub fn random_exponent<R: CryptoRng + RngCore>(&self, rng: &mut R) -> ModInt {
        ModInt::sample(&BigUint::zero(), &self.q, &self.q, rng)
    }

    /// `f^value` for small plaintext integers.
    pub fn f_pow(&self, value: u64) -> ModInt {
        self.f.pow(&BigUint::from(value))
    }

    /// Exponent negation: `(q - e) mod q`. Raising an order-`q` element to
    /// this power yields its inverse without a fallible division.
    pub(crate) fn neg_exponent(&self, exponent: &ModInt) -> ModInt {
        let reduced = exponent.value() % &self.q;
        ModInt::new((&self.q - reduced) % &self.q, self.q.clone())
    }

    /// Inverse of an order-`q` element, computed as `x^(q - 1)`.
    pub(crate) fn subgroup_inv(&self, element: &ModInt) -> ModInt {
        element.pow(&(&self.q - BigUint::one()))
    }

    /// Square root of an order-`q` element. `p = 2q + 1` with odd `q` implies
    /// `p ≡ 3 (mod 4)`, so a root is `x^((q + 1) / 2)`; of the two integer
    /// roots, the one below `q` is returned. For inputs outside the subgroup
    /// the result squares to something else, which callers must check.
    pub(crate) fn subgroup_sqrt(&self, element: &ModInt) -> ModInt {
        let exponent = (&self.q + BigUint::one()) >> 1_u32;
        let root = element.pow(&exponent);
        if root.value() < &self.q {
            root
        } else {
            ModInt::new(&self.p - root.value(), self.p.clone())
        }
    }
}
