//! Period over period comparison.

use crate::aggregation::set::{Point, Set};
use crate::error::{Result, RollupError};
use crate::types::Amount;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Two values of the same measure, `a` being the current one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Comparison {
    pub a: Amount,
    pub b: Amount,
    pub difference: Amount,
    /// `None` when `b` is zero and the values differ
    pub percentage_change: Option<f64>,
}

impl Comparison {
    pub fn new(a: impl Into<Amount>, b: impl Into<Amount>) -> Self {
        let (a, b) = (a.into(), b.into());
        let difference = a - b;
        let percentage_change = if difference.is_zero() {
            Some(0.0)
        } else if b.is_zero() {
            None
        } else {
            Some(difference.as_f64() / b.as_f64() * 100.0)
        };
        Self {
            a,
            b,
            difference,
            percentage_change,
        }
    }
}

/// A bucket of the current window against the same bucket of the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ComparedPoint {
    pub a: Point,
    pub b: Point,
}

impl ComparedPoint {
    pub fn new(a: Point, b: Point) -> Self {
        Self { a, b }
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.a.time
    }

    pub fn sum(&self) -> Comparison {
        Comparison::new(self.a.sum, self.b.sum)
    }

    pub fn count(&self) -> Comparison {
        Comparison::new(self.a.count, self.b.count)
    }

    pub fn last(&self) -> Comparison {
        Comparison::new(self.a.last, self.b.last)
    }
}

/// Two filled sets paired bucket by bucket.
#[derive(Debug)]
pub struct ComparedSet {
    a: Set,
    b: Set,
    points: Vec<ComparedPoint>,
}

impl ComparedSet {
    pub async fn new(a: Set, b: Set) -> Result<Self> {
        let points = {
            let filled_a = a.filled().await?;
            let filled_b = b.filled().await?;
            if filled_a.len() != filled_b.len() {
                return Err(RollupError::IncomparableSets(format!(
                    "Cannot compare a set of {} points with a set of {} points",
                    filled_a.len(),
                    filled_b.len()
                )));
            }
            filled_a
                .iter()
                .zip(filled_b)
                .map(|(a, b)| ComparedPoint::new(*a, *b))
                .collect()
        };
        Ok(Self { a, b, points })
    }

    pub fn a(&self) -> &Set {
        &self.a
    }

    pub fn b(&self) -> &Set {
        &self.b
    }

    pub fn points(&self) -> &[ComparedPoint] {
        &self.points
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_values_have_no_change() {
        let comparison = Comparison::new(100.0, 100.0);
        assert_eq!(comparison.difference, 0.0);
        assert_eq!(comparison.percentage_change, Some(0.0));

        let comparison = Comparison::new(0.0, 0.0);
        assert_eq!(comparison.percentage_change, Some(0.0));
    }

    #[test]
    fn test_change_from_zero_is_undefined() {
        let comparison = Comparison::new(100.0, 0.0);
        assert_eq!(comparison.difference, 100.0);
        assert_eq!(comparison.percentage_change, None);
    }

    #[test]
    fn test_percentage_change() {
        assert_eq!(Comparison::new(100.0, 50.0).percentage_change, Some(100.0));
        assert_eq!(Comparison::new(50.0, 100.0).percentage_change, Some(-50.0));

        let comparison = Comparison::new(35.0, 15.0);
        assert_eq!(comparison.difference, 20.0);
        let change = comparison.percentage_change.unwrap();
        assert!((change - 133.33).abs() < 0.01);
    }

    #[test]
    fn test_integer_counts_stay_integers() {
        let comparison = Comparison::new(7_i64, 3_i64);
        assert_eq!(comparison.difference, Amount::Integer(4));
        assert!(comparison.difference.is_integer());
    }
}
