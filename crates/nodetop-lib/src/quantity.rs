//! Kubernetes resource quantities
//!
//! Parses the Kubernetes quantity notation (`250m`, `1.5Gi`, `2e3`, ...) into an
//! exact milli-unit amount. Amounts are kept as signed 128-bit integers so that
//! summing every container in a cluster cannot silently overflow; additions are
//! checked anyway and report [`QuantityError::Overflow`].

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced while parsing or combining quantities
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("empty quantity")]
    Empty,

    #[error("invalid quantity {input:?}: {reason}")]
    Invalid { input: String, reason: &'static str },

    #[error("quantity overflow: {0}")]
    Overflow(String),
}

/// Notation a quantity was written in, used to render sums the same way
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuantityFormat {
    /// Powers of ten with SI suffixes (`m`, `k`, `M`, ...)
    DecimalSI,
    /// Powers of two (`Ki`, `Mi`, `Gi`, ...)
    BinarySI,
    /// Scientific notation (`1e3`)
    DecimalExponent,
}

const BINARY_SUFFIXES: &[(&str, u32)] = &[
    ("Ki", 10),
    ("Mi", 20),
    ("Gi", 30),
    ("Ti", 40),
    ("Pi", 50),
    ("Ei", 60),
];

const DECIMAL_SUFFIXES: &[(&str, i32)] = &[
    ("n", -9),
    ("u", -6),
    ("m", -3),
    ("", 0),
    ("k", 3),
    ("M", 6),
    ("G", 9),
    ("T", 12),
    ("P", 15),
    ("E", 18),
];

/// An exact resource amount
///
/// Equality and ordering compare the amount only; the notation is carried
/// along for display.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Quantity {
    milli: i128,
    format: QuantityFormat,
}

impl Quantity {
    /// Zero in the given notation
    pub fn zero(format: QuantityFormat) -> Self {
        Self { milli: 0, format }
    }

    /// Build a quantity from a milli-unit amount
    pub fn from_milli(milli: i128, format: QuantityFormat) -> Self {
        Self { milli, format }
    }

    /// Build a quantity from a whole-unit amount (bytes, cores, ...)
    pub fn from_units(units: i128, format: QuantityFormat) -> Result<Self, QuantityError> {
        units
            .checked_mul(1000)
            .map(|milli| Self { milli, format })
            .ok_or_else(|| QuantityError::Overflow(format!("{} units", units)))
    }

    /// Amount in milli-units (millicores for CPU)
    pub fn milli_value(&self) -> i128 {
        self.milli
    }

    /// Amount in whole units, rounded up (bytes for memory)
    pub fn value(&self) -> i128 {
        ceil_div(self.milli, 1000)
    }

    pub fn format(&self) -> QuantityFormat {
        self.format
    }

    pub fn is_zero(&self) -> bool {
        self.milli == 0
    }

    /// Checked addition; the result keeps the notation of `self`
    pub fn checked_add(&self, other: &Quantity) -> Result<Quantity, QuantityError> {
        self.milli
            .checked_add(other.milli)
            .map(|milli| Quantity {
                milli,
                format: self.format,
            })
            .ok_or_else(|| QuantityError::Overflow(format!("{} + {}", self, other)))
    }
}

/// Division rounding towards positive infinity
fn ceil_div(numerator: i128, denominator: i128) -> i128 {
    let quotient = numerator / denominator;
    if numerator % denominator != 0 && (numerator > 0) == (denominator > 0) {
        quotient + 1
    } else {
        quotient
    }
}

fn pow10(exponent: u32) -> Option<i128> {
    10i128.checked_pow(exponent)
}

/// Scale `mantissa * 10^exp10 * 2^exp2` into milli-units, rounding up
fn scale_to_milli(mantissa: i128, exp10: i32, exp2: u32, input: &str) -> Result<i128, QuantityError> {
    let overflow = || QuantityError::Overflow(input.to_string());

    let mut value = mantissa
        .checked_mul(1i128.checked_shl(exp2).ok_or_else(overflow)?)
        .ok_or_else(overflow)?;

    // milli-units add three decimal places
    let exp10 = exp10.checked_add(3).ok_or_else(overflow)?;
    if exp10 >= 0 {
        let factor = pow10(exp10 as u32).ok_or_else(overflow)?;
        value = value.checked_mul(factor).ok_or_else(overflow)?;
    } else {
        value = match pow10(exp10.unsigned_abs()) {
            Some(divisor) => ceil_div(value, divisor),
            None if value > 0 => 1,
            None => 0,
        };
    }
    Ok(value)
}

impl FromStr for Quantity {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        if input.is_empty() {
            return Err(QuantityError::Empty);
        }
        let invalid = |reason| QuantityError::Invalid {
            input: input.to_string(),
            reason,
        };

        let (negative, rest) = match input.as_bytes()[0] {
            b'-' => (true, &input[1..]),
            b'+' => (false, &input[1..]),
            _ => (false, input),
        };

        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, suffix) = rest.split_at(number_len);

        let (whole, fraction) = match number.split_once('.') {
            Some((w, f)) => (w, f),
            None => (number, ""),
        };
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid("missing number"));
        }
        if fraction.contains('.') {
            return Err(invalid("more than one decimal point"));
        }

        let mut mantissa: i128 = 0;
        for digit in whole.bytes().chain(fraction.bytes()) {
            mantissa = mantissa
                .checked_mul(10)
                .and_then(|m| m.checked_add(i128::from(digit - b'0')))
                .ok_or_else(|| QuantityError::Overflow(input.to_string()))?;
        }
        if negative {
            mantissa = -mantissa;
        }
        let fraction_digits =
            i32::try_from(fraction.len()).map_err(|_| invalid("fraction too long"))?;

        let (format, exp10, exp2) = if let Some(&(_, shift)) =
            BINARY_SUFFIXES.iter().find(|(name, _)| *name == suffix)
        {
            (QuantityFormat::BinarySI, 0, shift)
        } else if let Some(&(_, exp)) = DECIMAL_SUFFIXES.iter().find(|(name, _)| *name == suffix) {
            (QuantityFormat::DecimalSI, exp, 0)
        } else if suffix.len() > 1 && (suffix.starts_with('e') || suffix.starts_with('E')) {
            let exp = suffix[1..]
                .parse::<i32>()
                .map_err(|_| invalid("malformed exponent"))?;
            (QuantityFormat::DecimalExponent, exp, 0)
        } else {
            return Err(invalid("unknown suffix"));
        };

        let exp10 = exp10
            .checked_sub(fraction_digits)
            .ok_or_else(|| invalid("exponent out of range"))?;
        let milli = scale_to_milli(mantissa, exp10, exp2, input)?;

        Ok(Quantity { milli, format })
    }
}

impl TryFrom<String> for Quantity {
    type Error = QuantityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl TryFrom<&k8s_openapi::apimachinery::pkg::api::resource::Quantity> for Quantity {
    type Error = QuantityError;

    fn try_from(
        value: &k8s_openapi::apimachinery::pkg::api::resource::Quantity,
    ) -> Result<Self, Self::Error> {
        value.0.parse()
    }
}

impl From<Quantity> for String {
    fn from(value: Quantity) -> Self {
        value.to_string()
    }
}

impl PartialEq for Quantity {
    fn eq(&self, other: &Self) -> bool {
        self.milli == other.milli
    }
}

impl Eq for Quantity {}

impl PartialOrd for Quantity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Quantity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.milli.cmp(&other.milli)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.milli % 1000 != 0 {
            return write!(f, "{}m", self.milli);
        }
        let units = self.milli / 1000;
        if units == 0 {
            return write!(f, "0");
        }

        match self.format {
            QuantityFormat::BinarySI => {
                for (suffix, shift) in BINARY_SUFFIXES.iter().rev() {
                    let step = 1i128 << shift;
                    if units % step == 0 {
                        return write!(f, "{}{}", units / step, suffix);
                    }
                }
                write!(f, "{}", units)
            }
            QuantityFormat::DecimalSI => {
                for (suffix, exp) in DECIMAL_SUFFIXES.iter().rev().filter(|(_, e)| *e > 0) {
                    let step = 10i128.pow(*exp as u32);
                    if units % step == 0 {
                        return write!(f, "{}{}", units / step, suffix);
                    }
                }
                write!(f, "{}", units)
            }
            QuantityFormat::DecimalExponent => {
                for exp in (3..=18u32).rev().step_by(3) {
                    let step = 10i128.pow(exp);
                    if units % step == 0 {
                        return write!(f, "{}e{}", units / step, exp);
                    }
                }
                write!(f, "{}", units)
            }
        }
    }
}
