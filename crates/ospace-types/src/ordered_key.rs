//! Order-preserving integer keys.
//!
//! Sequence artifacts key their elements by position. The store only knows
//! string keys, so positions are written as digit strings over a caller
//! chosen alphabet. For two values of the same sign whose encodings have the
//! same length, string order equals integer order. Negative values carry a
//! leading [`SEPARATOR`]; there is no two's-complement form.

use crate::error::TypeError;

/// Reserved sign character; never part of an alphabet.
pub const SEPARATOR: char = '-';

/// Default alphabet: plain decimal digits.
pub const DECIMAL_ALPHABET: &str = "0123456789";

/// Converts `i64` values to and from positional strings over an alphabet.
///
/// The first alphabet character is the zero digit, the second is one, and so
/// on; the base is the alphabet length.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderedKeyCodec {
    digits: Vec<char>,
}

impl OrderedKeyCodec {
    /// Build a codec from an alphabet string.
    pub fn new(alphabet: &str) -> Result<Self, TypeError> {
        Self::from_chars(alphabet.chars())
    }

    /// Build a codec from an ordered sequence of distinct characters.
    ///
    /// Fails if there are fewer than two characters, any duplicate, or the
    /// reserved separator.
    pub fn from_chars(chars: impl IntoIterator<Item = char>) -> Result<Self, TypeError> {
        let digits: Vec<char> = chars.into_iter().collect();
        if digits.len() < 2 {
            return Err(TypeError::InvalidAlphabet(format!(
                "need at least 2 characters, got {}",
                digits.len()
            )));
        }
        if digits.contains(&SEPARATOR) {
            return Err(TypeError::InvalidAlphabet(format!(
                "alphabet must not contain the separator {SEPARATOR:?}"
            )));
        }
        for (i, c) in digits.iter().enumerate() {
            if digits[..i].contains(c) {
                return Err(TypeError::InvalidAlphabet(format!("duplicate character {c:?}")));
            }
        }
        Ok(Self { digits })
    }

    /// The decimal codec (`0123456789`).
    pub fn decimal() -> Self {
        Self {
            digits: DECIMAL_ALPHABET.chars().collect(),
        }
    }

    /// Number of digits in the alphabet.
    pub fn base(&self) -> usize {
        self.digits.len()
    }

    /// The digits as a string, zero digit first.
    pub fn alphabet(&self) -> String {
        self.digits.iter().collect()
    }

    /// Encode `value`, most significant digit first.
    pub fn encode(&self, value: i64) -> String {
        let base = self.digits.len() as u64;
        let mut magnitude = value.unsigned_abs();
        if magnitude == 0 {
            return self.digits[0].to_string();
        }

        let mut reversed = Vec::new();
        while magnitude > 0 {
            reversed.push(self.digits[(magnitude % base) as usize]);
            magnitude /= base;
        }
        if value < 0 {
            reversed.push(SEPARATOR);
        }
        reversed.into_iter().rev().collect()
    }

    /// Decode a string produced by [`encode`](Self::encode).
    pub fn decode(&self, key: &str) -> Result<i64, TypeError> {
        let invalid = |reason: &str| TypeError::InvalidOrderedKey {
            key: key.to_string(),
            reason: reason.to_string(),
        };

        let (negative, body) = match key.strip_prefix(SEPARATOR) {
            Some(rest) => (true, rest),
            None => (false, key),
        };
        if body.is_empty() {
            return Err(invalid("no digits"));
        }

        let base = self.digits.len() as u64;
        let mut magnitude: u64 = 0;
        for c in body.chars() {
            let digit = self
                .digit_value(c)
                .ok_or_else(|| invalid(&format!("character {c:?} is not in the alphabet")))?;
            magnitude = magnitude
                .checked_mul(base)
                .and_then(|m| m.checked_add(digit))
                .ok_or_else(|| invalid("value does not fit in 64 bits"))?;
        }

        if negative {
            if magnitude > i64::MIN.unsigned_abs() {
                return Err(invalid("value does not fit in 64 bits"));
            }
            // 2^63 wraps onto i64::MIN, which is exactly its negation.
            Ok((magnitude as i64).wrapping_neg())
        } else {
            i64::try_from(magnitude).map_err(|_| invalid("value does not fit in 64 bits"))
        }
    }

    fn digit_value(&self, c: char) -> Option<u64> {
        self.digits.iter().position(|d| *d == c).map(|p| p as u64)
    }
}

impl Default for OrderedKeyCodec {
    fn default() -> Self {
        Self::decimal()
    }
}
