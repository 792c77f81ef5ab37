//! Half-open interval representation and Allen's Interval Algebra classifier.
//!
//! Unboundedness is a first-class part of the type (`Bound::NegInf`/`PosInf`)
//! rather than a string convention like `"-infinity"`/`"infinity"`.

use std::cmp::Ordering;

/// One side of an interval. `NegInf`/`PosInf` only ever appear on the side
/// allowed to be unbounded (`valid_from` may be `-inf`, `valid_until` may be
/// `+inf`, and only for discrete/date-like subtypes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bound<T> {
    NegInf,
    Finite(T),
    PosInf,
}

impl<T: Ord> PartialOrd for Bound<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: Ord> Ord for Bound<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Bound::NegInf, Bound::NegInf) => Ordering::Equal,
            (Bound::NegInf, _) => Ordering::Less,
            (_, Bound::NegInf) => Ordering::Greater,
            (Bound::PosInf, Bound::PosInf) => Ordering::Equal,
            (Bound::PosInf, _) => Ordering::Greater,
            (_, Bound::PosInf) => Ordering::Less,
            (Bound::Finite(a), Bound::Finite(b)) => a.cmp(b),
        }
    }
}

impl<T> Bound<T> {
    pub fn finite(v: T) -> Self {
        Bound::Finite(v)
    }
}

/// A half-open interval `[valid_from, valid_until)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interval<T> {
    pub valid_from: Bound<T>,
    pub valid_until: Bound<T>,
}

impl<T: Ord + Clone> Interval<T> {
    /// Construct an interval, rejecting an empty or inverted range. This is
    /// a configuration error (malformed source/target data), not an internal
    /// invariant violation, so it returns a `Result` rather than panicking.
    pub fn new(valid_from: Bound<T>, valid_until: Bound<T>) -> Result<Self, String> {
        if valid_from >= valid_until {
            return Err(format!(
                "invalid interval: valid_from must precede valid_until"
            ));
        }
        Ok(Interval {
            valid_from,
            valid_until,
        })
    }

    pub fn contains_point(&self, p: &Bound<T>) -> bool {
        &self.valid_from <= p && p < &self.valid_until
    }

    pub fn intersects(&self, other: &Interval<T>) -> bool {
        self.valid_from < other.valid_until && other.valid_from < self.valid_until
    }
}

/// The 13 Allen relations (7 base relations plus their 6 inverses).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllenRelation {
    Precedes,
    Meets,
    Overlaps,
    Starts,
    During,
    Finishes,
    Equals,
    PrecededBy,
    MetBy,
    OverlappedBy,
    StartedBy,
    Contains,
    FinishedBy,
}

impl AllenRelation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Precedes => "precedes",
            Self::Meets => "meets",
            Self::Overlaps => "overlaps",
            Self::Starts => "starts",
            Self::During => "during",
            Self::Finishes => "finishes",
            Self::Equals => "equals",
            Self::PrecededBy => "preceded_by",
            Self::MetBy => "met_by",
            Self::OverlappedBy => "overlapped_by",
            Self::StartedBy => "started_by",
            Self::Contains => "contains",
            Self::FinishedBy => "finished_by",
        }
    }

    /// Classify the relation between two half-open intervals `x` and `y`.
    /// Total over any two non-empty intervals.
    pub fn compute<T: Ord + Clone>(x: &Interval<T>, y: &Interval<T>) -> Self {
        let (xf, xu) = (&x.valid_from, &x.valid_until);
        let (yf, yu) = (&y.valid_from, &y.valid_until);

        if xu < yf {
            Self::Precedes
        } else if xu == yf {
            Self::Meets
        } else if xf < yf && yf < xu && xu < yu {
            Self::Overlaps
        } else if xf == yf && xu < yu {
            Self::Starts
        } else if xf > yf && xu < yu {
            Self::During
        } else if xf > yf && xu == yu {
            Self::Finishes
        } else if xf == yf && xu == yu {
            Self::Equals
        } else if yu < xf {
            Self::PrecededBy
        } else if yu == xf {
            Self::MetBy
        } else if yf < xf && xf < yu && yu < xu {
            Self::OverlappedBy
        } else if xf == yf && xu > yu {
            Self::StartedBy
        } else if xf < yf && xu > yu {
            Self::Contains
        } else {
            // xf < yf && xu == yu is the only remaining case given totality above.
            Self::FinishedBy
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iv(from: i64, until: i64) -> Interval<i64> {
        Interval::new(Bound::finite(from), Bound::finite(until)).unwrap()
    }

    #[test]
    fn meets_is_not_overlaps() {
        let a = iv(0, 10);
        let b = iv(10, 20);
        assert_eq!(AllenRelation::compute(&a, &b), AllenRelation::Meets);
        assert_eq!(AllenRelation::compute(&b, &a), AllenRelation::MetBy);
    }

    #[test]
    fn overlaps_requires_strict_interleave() {
        let a = iv(0, 10);
        let b = iv(5, 15);
        assert_eq!(AllenRelation::compute(&a, &b), AllenRelation::Overlaps);
        assert_eq!(AllenRelation::compute(&b, &a), AllenRelation::OverlappedBy);
    }

    #[test]
    fn equals_is_symmetric() {
        let a = iv(0, 10);
        let b = iv(0, 10);
        assert_eq!(AllenRelation::compute(&a, &b), AllenRelation::Equals);
    }

    #[test]
    fn contains_vs_during() {
        let outer = iv(0, 10);
        let inner = iv(2, 5);
        assert_eq!(AllenRelation::compute(&outer, &inner), AllenRelation::Contains);
        assert_eq!(AllenRelation::compute(&inner, &outer), AllenRelation::During);
    }

    #[test]
    fn unbounded_precedes() {
        let a: Interval<i64> = Interval::new(Bound::NegInf, Bound::finite(5)).unwrap();
        let b: Interval<i64> = Interval::new(Bound::finite(5), Bound::PosInf).unwrap();
        assert_eq!(AllenRelation::compute(&a, &b), AllenRelation::Meets);
    }

    #[test]
    fn rejects_inverted_interval() {
        assert!(Interval::new(Bound::finite(10), Bound::finite(0)).is_err());
    }
}
