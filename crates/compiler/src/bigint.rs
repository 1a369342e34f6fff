//! Unbounded signed integers for compile-time arithmetic
//!
//! Decimal and based literals are evaluated exactly; folding only falls back
//! to `i64` when a value is consumed by the emitter. Representation is a
//! little-endian vector of 64-bit digits plus a sign, normalized so the most
//! significant digit is nonzero (zero is the empty vector, non-negative).
//!
//! Multiplication switches from schoolbook to Karatsuba at 20 digits.

use std::cmp::Ordering;
use std::fmt;

/// Digit count at or above which multiplication splits via Karatsuba.
const KARATSUBA_CUTOFF: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BigInt {
    neg: bool,
    digits: Vec<u64>,
}

impl BigInt {
    pub fn zero() -> Self {
        BigInt {
            neg: false,
            digits: Vec::new(),
        }
    }

    pub fn from_i64(v: i64) -> Self {
        if v == 0 {
            return BigInt::zero();
        }
        let neg = v < 0;
        let mag = v.unsigned_abs();
        BigInt {
            neg,
            digits: vec![mag],
        }
    }

    pub fn from_u64(v: u64) -> Self {
        if v == 0 {
            return BigInt::zero();
        }
        BigInt {
            neg: false,
            digits: vec![v],
        }
    }

    pub fn is_zero(&self) -> bool {
        self.digits.is_empty()
    }

    pub fn is_negative(&self) -> bool {
        self.neg
    }

    fn normalize(mut self) -> Self {
        while let Some(&0) = self.digits.last() {
            self.digits.pop();
        }
        if self.digits.is_empty() {
            self.neg = false;
        }
        self
    }

    /// Compare magnitudes, ignoring sign.
    pub fn cmp_abs(&self, other: &BigInt) -> Ordering {
        if self.digits.len() != other.digits.len() {
            return self.digits.len().cmp(&other.digits.len());
        }
        for i in (0..self.digits.len()).rev() {
            match self.digits[i].cmp(&other.digits[i]) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }

    pub fn cmp_signed(&self, other: &BigInt) -> Ordering {
        match (self.neg, other.neg) {
            (false, true) => Ordering::Greater,
            (true, false) => Ordering::Less,
            (false, false) => self.cmp_abs(other),
            (true, true) => other.cmp_abs(self),
        }
    }

    fn add_abs(a: &[u64], b: &[u64]) -> Vec<u64> {
        let (long, short) = if a.len() >= b.len() { (a, b) } else { (b, a) };
        let mut out = Vec::with_capacity(long.len() + 1);
        let mut carry = 0u64;
        for i in 0..long.len() {
            let x = long[i];
            let y = if i < short.len() { short[i] } else { 0 };
            let (s1, c1) = x.overflowing_add(y);
            let (s2, c2) = s1.overflowing_add(carry);
            out.push(s2);
            carry = (c1 as u64) + (c2 as u64);
        }
        if carry != 0 {
            out.push(carry);
        }
        out
    }

    /// Magnitude subtraction; requires |a| >= |b|.
    fn sub_abs(a: &[u64], b: &[u64]) -> Vec<u64> {
        let mut out = Vec::with_capacity(a.len());
        let mut borrow = 0u64;
        for i in 0..a.len() {
            let x = a[i];
            let y = if i < b.len() { b[i] } else { 0 };
            let (d1, b1) = x.overflowing_sub(y);
            let (d2, b2) = d1.overflowing_sub(borrow);
            out.push(d2);
            borrow = (b1 as u64) + (b2 as u64);
        }
        out
    }

    pub fn add(&self, other: &BigInt) -> BigInt {
        if self.neg == other.neg {
            return BigInt {
                neg: self.neg,
                digits: Self::add_abs(&self.digits, &other.digits),
            }
            .normalize();
        }
        match self.cmp_abs(other) {
            Ordering::Equal => BigInt::zero(),
            Ordering::Greater => BigInt {
                neg: self.neg,
                digits: Self::sub_abs(&self.digits, &other.digits),
            }
            .normalize(),
            Ordering::Less => BigInt {
                neg: other.neg,
                digits: Self::sub_abs(&other.digits, &self.digits),
            }
            .normalize(),
        }
    }

    pub fn sub(&self, other: &BigInt) -> BigInt {
        let negated = BigInt {
            neg: !other.neg && !other.is_zero(),
            digits: other.digits.clone(),
        };
        self.add(&negated)
    }

    fn mul_schoolbook(a: &[u64], b: &[u64]) -> Vec<u64> {
        if a.is_empty() || b.is_empty() {
            return Vec::new();
        }
        let mut out = vec![0u64; a.len() + b.len()];
        for (i, &x) in a.iter().enumerate() {
            let mut carry = 0u128;
            for (j, &y) in b.iter().enumerate() {
                let t = (x as u128) * (y as u128) + (out[i + j] as u128) + carry;
                out[i + j] = t as u64;
                carry = t >> 64;
            }
            let mut k = i + b.len();
            while carry != 0 {
                let t = (out[k] as u128) + carry;
                out[k] = t as u64;
                carry = t >> 64;
                k += 1;
            }
        }
        out
    }

    /// Karatsuba split on the digit vectors. Temporaries are ordinary
    /// `Vec`s; the recursion bottoms out in the schoolbook routine below
    /// the cutoff.
    fn mul_abs(a: &[u64], b: &[u64]) -> Vec<u64> {
        if a.len() < KARATSUBA_CUTOFF || b.len() < KARATSUBA_CUTOFF {
            return Self::mul_schoolbook(a, b);
        }
        let half = a.len().max(b.len()) / 2;
        let (a0, a1) = a.split_at(half.min(a.len()));
        let (b0, b1) = b.split_at(half.min(b.len()));

        let z0 = Self::mul_abs(a0, b0);
        let z2 = Self::mul_abs(a1, b1);
        let a01 = Self::add_abs(a0, a1);
        let b01 = Self::add_abs(b0, b1);
        let mut z1 = Self::mul_abs(&a01, &b01);
        // z1 = (a0+a1)(b0+b1) - z0 - z2
        z1 = Self::sub_abs(&z1, &z0);
        z1 = Self::sub_abs(&z1, &z2);

        let mut out = vec![0u64; a.len() + b.len()];
        Self::add_into(&mut out, &z0, 0);
        Self::add_into(&mut out, &z1, half);
        Self::add_into(&mut out, &z2, 2 * half);
        out
    }

    fn add_into(acc: &mut Vec<u64>, v: &[u64], shift: usize) {
        let mut carry = 0u64;
        for (i, &d) in v.iter().enumerate() {
            let k = i + shift;
            if k >= acc.len() {
                acc.push(0);
            }
            let (s1, c1) = acc[k].overflowing_add(d);
            let (s2, c2) = s1.overflowing_add(carry);
            acc[k] = s2;
            carry = (c1 as u64) + (c2 as u64);
        }
        let mut k = v.len() + shift;
        while carry != 0 {
            if k >= acc.len() {
                acc.push(0);
            }
            let (s, c) = acc[k].overflowing_add(carry);
            acc[k] = s;
            carry = c as u64;
            k += 1;
        }
    }

    pub fn mul(&self, other: &BigInt) -> BigInt {
        if self.is_zero() || other.is_zero() {
            return BigInt::zero();
        }
        BigInt {
            neg: self.neg != other.neg,
            digits: Self::mul_abs(&self.digits, &other.digits),
        }
        .normalize()
    }

    pub fn negate(&self) -> BigInt {
        if self.is_zero() {
            return BigInt::zero();
        }
        BigInt {
            neg: !self.neg,
            digits: self.digits.clone(),
        }
    }

    /// Multiply-accumulate by a small factor plus addend, in place.
    /// The literal parsers build values one digit at a time with this.
    pub fn mul_add_small(&mut self, factor: u64, addend: u64) {
        let mut carry = addend as u128;
        for d in self.digits.iter_mut() {
            let t = (*d as u128) * (factor as u128) + carry;
            *d = t as u64;
            carry = t >> 64;
        }
        while carry != 0 {
            self.digits.push(carry as u64);
            carry >>= 64;
        }
    }

    /// Parse a decimal digit string (no sign, no underscores).
    pub fn from_decimal_str(text: &str) -> Option<BigInt> {
        let mut v = BigInt::zero();
        for c in text.chars() {
            let d = c.to_digit(10)?;
            v.mul_add_small(10, d as u64);
        }
        Some(v)
    }

    /// The value as `i64`, when it fits.
    pub fn to_i64(&self) -> Option<i64> {
        match self.digits.len() {
            0 => Some(0),
            1 => {
                let mag = self.digits[0];
                if self.neg {
                    if mag <= (i64::MAX as u64) + 1 {
                        Some((mag as i128).wrapping_neg() as i64)
                    } else {
                        None
                    }
                } else if mag <= i64::MAX as u64 {
                    Some(mag as i64)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Divide in place by a small divisor, returning the remainder.
    fn divmod_small(&mut self, divisor: u64) -> u64 {
        let mut rem = 0u128;
        for d in self.digits.iter_mut().rev() {
            let cur = (rem << 64) | (*d as u128);
            *d = (cur / divisor as u128) as u64;
            rem = cur % divisor as u128;
        }
        while let Some(&0) = self.digits.last() {
            self.digits.pop();
        }
        rem as u64
    }
}

impl fmt::Display for BigInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return write!(f, "0");
        }
        let mut v = self.clone();
        let mut chunks: Vec<u64> = Vec::new();
        while !v.is_zero() {
            chunks.push(v.divmod_small(10_000_000_000_000_000_000));
        }
        let mut s = String::new();
        if self.neg {
            s.push('-');
        }
        s.push_str(&chunks.pop().unwrap_or(0).to_string());
        while let Some(c) = chunks.pop() {
            s.push_str(&format!("{:019}", c));
        }
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_arithmetic() {
        let a = BigInt::from_i64(1234);
        let b = BigInt::from_i64(-234);
        assert_eq!(a.add(&b).to_i64(), Some(1000));
        assert_eq!(a.sub(&b).to_i64(), Some(1468));
        assert_eq!(a.mul(&b).to_i64(), Some(-288756));
    }

    #[test]
    fn test_decimal_parse_round_trip() {
        let v = BigInt::from_decimal_str("340282366920938463463374607431768211456").unwrap();
        assert_eq!(v.to_string(), "340282366920938463463374607431768211456");
        assert_eq!(v.to_i64(), None);
    }

    #[test]
    fn test_one_past_i64_max() {
        let v = BigInt::from_decimal_str("9223372036854775808").unwrap();
        assert_eq!(v.to_i64(), None);
        assert_eq!(v.negate().to_i64(), Some(i64::MIN));
    }

    #[test]
    fn test_karatsuba_matches_schoolbook() {
        // Build operands wide enough to cross the Karatsuba cutoff.
        let mut a = BigInt::from_u64(0xdead_beef_0123_4567);
        let mut b = BigInt::from_u64(0xfeed_face_89ab_cdef);
        for _ in 0..25 {
            a.digits.push(0x1111_2222_3333_4444);
            b.digits.push(0x5555_6666_7777_8888);
        }
        let fast = BigInt::mul_abs(&a.digits, &b.digits);
        let slow = BigInt::mul_schoolbook(&a.digits, &b.digits);
        let fast = BigInt {
            neg: false,
            digits: fast,
        }
        .normalize();
        let slow = BigInt {
            neg: false,
            digits: slow,
        }
        .normalize();
        assert_eq!(fast, slow);
    }

    #[test]
    fn test_signed_compare() {
        let a = BigInt::from_i64(-5);
        let b = BigInt::from_i64(3);
        assert_eq!(a.cmp_signed(&b), Ordering::Less);
        assert_eq!(b.cmp_signed(&a), Ordering::Greater);
        assert_eq!(a.cmp_abs(&b), Ordering::Greater);
    }
}
