//! Amounts as reported by a metric type after transformation.

use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Sub};

/// A transformed amount.
///
/// Amounts are always stored as decimals; a type may report them as integers
/// through [`MetricType::transform_amount`](crate::types::MetricType::transform_amount).
/// Arithmetic between two integers stays integral, anything else is decimal.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(untagged)]
pub enum Amount {
    Integer(i64),
    Decimal(f64),
}

impl Amount {
    pub fn as_f64(&self) -> f64 {
        match *self {
            Amount::Integer(value) => value as f64,
            Amount::Decimal(value) => value,
        }
    }

    pub fn is_zero(&self) -> bool {
        match *self {
            Amount::Integer(value) => value == 0,
            Amount::Decimal(value) => value == 0.0,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Amount::Integer(_))
    }
}

impl Default for Amount {
    fn default() -> Self {
        Amount::Decimal(0.0)
    }
}

impl From<f64> for Amount {
    fn from(value: f64) -> Self {
        Amount::Decimal(value)
    }
}

impl From<i64> for Amount {
    fn from(value: i64) -> Self {
        Amount::Integer(value)
    }
}

impl From<i32> for Amount {
    fn from(value: i32) -> Self {
        Amount::Integer(i64::from(value))
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        match (self, rhs) {
            (Amount::Integer(a), Amount::Integer(b)) => Amount::Integer(a.saturating_add(b)),
            (a, b) => Amount::Decimal(a.as_f64() + b.as_f64()),
        }
    }
}

impl Sub for Amount {
    type Output = Amount;

    fn sub(self, rhs: Amount) -> Amount {
        match (self, rhs) {
            (Amount::Integer(a), Amount::Integer(b)) => Amount::Integer(a.saturating_sub(b)),
            (a, b) => Amount::Decimal(a.as_f64() - b.as_f64()),
        }
    }
}

impl PartialEq for Amount {
    fn eq(&self, other: &Amount) -> bool {
        match (self, other) {
            (Amount::Integer(a), Amount::Integer(b)) => a == b,
            (a, b) => a.as_f64() == b.as_f64(),
        }
    }
}

impl PartialEq<f64> for Amount {
    fn eq(&self, other: &f64) -> bool {
        self.as_f64() == *other
    }
}

impl PartialEq<i64> for Amount {
    fn eq(&self, other: &i64) -> bool {
        match *self {
            Amount::Integer(value) => value == *other,
            Amount::Decimal(value) => value == *other as f64,
        }
    }
}

impl PartialOrd for Amount {
    fn partial_cmp(&self, other: &Amount) -> Option<Ordering> {
        match (self, other) {
            (Amount::Integer(a), Amount::Integer(b)) => a.partial_cmp(b),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Amount::Integer(value) => write!(f, "{value}"),
            Amount::Decimal(value) => write!(f, "{value}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_arithmetic_stays_integral() {
        let total = Amount::Integer(15) + Amount::Integer(2);
        assert!(total.is_integer());
        assert_eq!(total, 17i64);

        let diff = Amount::Integer(15) - Amount::Decimal(2.5);
        assert!(!diff.is_integer());
        assert_eq!(diff, 12.5);
    }

    #[test]
    fn test_mixed_equality() {
        assert_eq!(Amount::Integer(10), Amount::Decimal(10.0));
        assert!(Amount::Decimal(0.0).is_zero());
        assert!(Amount::Integer(3) > Amount::Decimal(2.9));
    }
}
