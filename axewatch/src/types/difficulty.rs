//! Best-difficulty values as reported by AxeOS firmware.
//!
//! Devices report their best share difficulty as a short human string such
//! as `"1.5M"` or `"900K"`. The numeric prefix is a plain decimal and the
//! optional trailing letter scales it:
//!
//! ```text
//! "900K" -> 900 x 10^3 =           900,000
//! "1.5M" -> 1.5 x 10^6 =         1,500,000
//! "2G"   ->   2 x 10^9 =     2,000,000,000
//! "500"  ->                            500
//! ```
//!
//! Comparisons between values use the parsed magnitude only; the suffix is
//! kept for display.

use std::fmt;
use std::iter;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

/// SI multiplier letter on a difficulty string.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum Suffix {
    K,
    M,
    G,
}

impl Suffix {
    /// Power of ten this suffix stands for.
    pub fn exponent(self) -> u32 {
        match self {
            Suffix::K => 3,
            Suffix::M => 6,
            Suffix::G => 9,
        }
    }

    fn from_char(c: char) -> Option<Self> {
        let mut buf = [0u8; 4];
        c.encode_utf8(&mut buf).parse().ok()
    }
}

/// Reasons a difficulty string has no usable value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseBestDiffError {
    #[error("empty difficulty")]
    Empty,

    /// The firmware (or the normalizer default) reports `-` when no share
    /// has been found yet.
    #[error("no difficulty reported")]
    Placeholder,

    #[error("malformed difficulty {0:?}")]
    Malformed(String),
}

/// A parsed best-difficulty value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BestDiff {
    magnitude: u64,
    suffix: Option<Suffix>,
}

impl BestDiff {
    /// Integer magnitude, truncated toward zero.
    pub fn magnitude(self) -> u64 {
        self.magnitude
    }

    pub fn suffix(self) -> Option<Suffix> {
        self.suffix
    }
}

impl FromStr for BestDiff {
    type Err = ParseBestDiffError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseBestDiffError::Empty);
        }
        if s == "-" {
            return Err(ParseBestDiffError::Placeholder);
        }

        let malformed = || ParseBestDiffError::Malformed(s.to_string());

        let (number, suffix) = match s.chars().last().and_then(Suffix::from_char) {
            // Suffix letters are ASCII, so dropping one byte is a char boundary.
            Some(suffix) => (&s[..s.len() - 1], Some(suffix)),
            None => (s, None),
        };

        if !is_plain_decimal(number) {
            return Err(malformed());
        }

        let exponent = suffix.map_or(0, Suffix::exponent);
        let magnitude = scale_decimal(number, exponent).ok_or_else(malformed)?;

        Ok(BestDiff { magnitude, suffix })
    }
}

impl fmt::Display for BestDiff {
    /// Thousands-grouped magnitude with the suffix in parentheses, e.g.
    /// `2,100,000 (M)`. Unsuffixed values print the bare grouped number.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.suffix {
            Some(suffix) => write!(f, "{} ({})", group_thousands(self.magnitude), suffix),
            None => write!(f, "{}", group_thousands(self.magnitude)),
        }
    }
}

/// Digits with at most one decimal point and at least one digit.
fn is_plain_decimal(s: &str) -> bool {
    let mut seen_digit = false;
    let mut seen_point = false;
    for c in s.chars() {
        match c {
            '0'..='9' => seen_digit = true,
            '.' if !seen_point => seen_point = true,
            _ => return false,
        }
    }
    seen_digit
}

/// `number * 10^exponent`, truncated, or `None` when it overflows `u64`.
///
/// `number` must already satisfy [`is_plain_decimal`].
fn scale_decimal(number: &str, exponent: u32) -> Option<u64> {
    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    let whole: u64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let scaled = whole.checked_mul(10u64.checked_pow(exponent)?)?;

    // The fraction contributes its first `exponent` digits, zero padded.
    let kept: String = fraction
        .chars()
        .chain(iter::repeat('0'))
        .take(exponent as usize)
        .collect();
    if kept.is_empty() {
        return Some(scaled);
    }
    scaled.checked_add(kept.parse().ok()?)
}

/// Format an integer with `,` between groups of three digits.
pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
