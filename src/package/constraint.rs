//! Version-constraint intervals and their algebra.
//!
//! A constraint is a half-open interval over versions with explicit bound
//! operators, written `1.0.0 <= v < 2.0.0`. Constraints form a
//! meet-semilattice under [`Constraint::intersect`]; the solver relies on
//! that structure when it merges the dependency maps of candidate releases.
//!
//! # Parsing
//! Parsers in this module assume their inputs come from manifests that the
//! ecosystem's own tooling accepted, so the grammar is exactly
//! `VERSION OP v OP VERSION` with `OP ∈ {<, <=}` and single spaces between
//! tokens tolerated as arbitrary runs of spaces.

use std::{cmp::Ordering, fmt, str::FromStr};

use semver::Version;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use winnow::{
    ascii::{dec_uint, space0},
    combinator::alt,
    PResult, Parser,
};

/// A bound operator; `Less` excludes the bound itself.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum Op {
    Less,
    LessEq,
}

impl Op {
    /// Whether `lhs OP rhs` holds.
    pub fn admits(self, lhs: &Version, rhs: &Version) -> bool {
        match self {
            Op::Less => lhs < rhs,
            Op::LessEq => lhs <= rhs,
        }
    }

    fn is_strict(self) -> bool {
        matches!(self, Op::Less)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Less => write!(f, "<"),
            Op::LessEq => write!(f, "<="),
        }
    }
}

/// A half-open version interval `lower OP v OP upper`.
///
/// INVARIANT: `lower < upper`. Constructed values always satisfy this; the
/// constructor rejects everything else.
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Constraint {
    lower: Version,
    lower_op: Op,
    upper: Version,
    upper_op: Op,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConstraintError {
    #[error("malformed constraint \"{0}\"")]
    Malformed(Box<str>),
    #[error("empty constraint interval: {lower} is not below {upper}")]
    EmptyInterval { lower: Version, upper: Version },
}

impl Constraint {
    pub fn new(
        lower: Version,
        lower_op: Op,
        upper: Version,
        upper_op: Op,
    ) -> Result<Self, ConstraintError> {
        if lower >= upper {
            return Err(ConstraintError::EmptyInterval { lower, upper });
        }

        Ok(Self {
            lower,
            lower_op,
            upper,
            upper_op,
        })
    }

    /// The constraint admitting exactly `v` among published versions:
    /// `v <= x < v.patch+1`. Used to pin versions that a manifest or a
    /// partial solution has already fixed.
    pub fn exactly(v: &Version) -> Self {
        let upper = Version::new(v.major, v.minor, v.patch + 1);
        Self {
            lower: v.clone(),
            lower_op: Op::LessEq,
            upper,
            upper_op: Op::Less,
        }
    }

    /// The conventional `v <= x < (v.major + 1).0.0` interval.
    pub fn until_next_major(v: &Version) -> Self {
        let upper = Version::new(v.major + 1, 0, 0);
        Self {
            lower: v.clone(),
            lower_op: Op::LessEq,
            upper,
            upper_op: Op::Less,
        }
    }

    pub fn lower(&self) -> &Version {
        &self.lower
    }

    pub fn upper(&self) -> &Version {
        &self.upper
    }

    /// Whether `v` lies inside the interval.
    pub fn satisfies(&self, v: &Version) -> bool {
        self.lower_op.admits(&self.lower, v)
            && self.upper_op.admits(v, &self.upper)
    }

    /// The meet of two constraints, or `None` if they are disjoint.
    ///
    /// The new lower bound is the greater of the two lower bounds; when they
    /// coincide the strict operator wins, since `<` excludes more than `<=`.
    /// Symmetrically for the upper bound with the lesser of the two.
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        let (lower, lower_op) = match self.lower.cmp(&other.lower) {
            Ordering::Greater => (&self.lower, self.lower_op),
            Ordering::Less => (&other.lower, other.lower_op),
            Ordering::Equal => {
                let op = match self.lower_op.is_strict()
                    || other.lower_op.is_strict()
                {
                    true => Op::Less,
                    false => Op::LessEq,
                };
                (&self.lower, op)
            }
        };

        let (upper, upper_op) = match self.upper.cmp(&other.upper) {
            Ordering::Less => (&self.upper, self.upper_op),
            Ordering::Greater => (&other.upper, other.upper_op),
            Ordering::Equal => {
                let op = match self.upper_op.is_strict()
                    || other.upper_op.is_strict()
                {
                    true => Op::Less,
                    false => Op::LessEq,
                };
                (&self.upper, op)
            }
        };

        Constraint::new(lower.clone(), lower_op, upper.clone(), upper_op)
            .ok()
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} v {} {}",
            self.lower, self.lower_op, self.upper_op, self.upper
        )
    }
}

impl FromStr for Constraint {
    type Err = ConstraintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lower, lower_op, upper_op, upper) = constraint
            .parse(s.trim())
            .map_err(|_| ConstraintError::Malformed(s.into()))?;

        Constraint::new(lower, lower_op, upper, upper_op)
    }
}

impl TryFrom<String> for Constraint {
    type Error = ConstraintError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Constraint> for String {
    fn from(value: Constraint) -> Self {
        value.to_string()
    }
}

fn version(input: &mut &str) -> PResult<Version> {
    let (major, _, minor, _, patch) =
        (dec_uint, '.', dec_uint, '.', dec_uint).parse_next(input)?;
    Ok(Version::new(major, minor, patch))
}

fn op(input: &mut &str) -> PResult<Op> {
    alt(("<=".value(Op::LessEq), "<".value(Op::Less))).parse_next(input)
}

fn constraint(input: &mut &str) -> PResult<(Version, Op, Op, Version)> {
    let (lower, _, lower_op, _, _, _, upper_op, _, upper) = (
        version, space0, op, space0, 'v', space0, op, space0, version,
    )
        .parse_next(input)?;

    Ok((lower, lower_op, upper_op, upper))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn parse(s: &str) -> Constraint {
        s.parse().unwrap()
    }

    #[test]
    fn parse_and_display_round_trip() {
        for text in [
            "1.0.0 <= v < 2.0.0",
            "1.0.0 < v <= 2.0.0",
            "0.19.0 <= v <= 0.19.1",
        ] {
            assert_eq!(parse(text).to_string(), text);
        }
    }

    #[test]
    fn rejects_garbage_and_empty_intervals() {
        assert!(matches!(
            "one <= v < 2.0.0".parse::<Constraint>(),
            Err(ConstraintError::Malformed(_))
        ));
        assert!(matches!(
            "2.0.0 <= v < 2.0.0".parse::<Constraint>(),
            Err(ConstraintError::EmptyInterval { .. })
        ));
        assert!(matches!(
            "3.0.0 <= v < 2.0.0".parse::<Constraint>(),
            Err(ConstraintError::EmptyInterval { .. })
        ));
    }

    #[test]
    fn membership_respects_operators() {
        let c = parse("1.0.0 <= v < 2.0.0");
        assert!(c.satisfies(&Version::new(1, 0, 0)));
        assert!(c.satisfies(&Version::new(1, 9, 9)));
        assert!(!c.satisfies(&Version::new(2, 0, 0)));
        assert!(!c.satisfies(&Version::new(0, 9, 9)));

        let c = parse("1.0.0 < v <= 2.0.0");
        assert!(!c.satisfies(&Version::new(1, 0, 0)));
        assert!(c.satisfies(&Version::new(2, 0, 0)));
    }

    #[test]
    fn intersect_takes_the_tighter_bounds() {
        let lhs = parse("1.0.0 <= v < 2.0.0");
        let rhs = parse("1.2.0 <= v <= 3.0.0");

        let met = lhs.intersect(&rhs).unwrap();
        assert_eq!(met, parse("1.2.0 <= v < 2.0.0"));
    }

    #[test]
    fn intersect_of_disjoint_intervals_is_none() {
        let lhs = parse("1.0.0 <= v < 2.0.0");
        let rhs = parse("2.0.0 <= v < 3.0.0");
        assert_eq!(lhs.intersect(&rhs), None);
    }

    #[test]
    fn strict_operator_wins_on_equal_bounds() {
        let lhs = parse("1.0.0 <= v < 2.0.0");
        let rhs = parse("1.0.0 < v <= 2.0.0");

        let met = lhs.intersect(&rhs).unwrap();
        assert_eq!(met, parse("1.0.0 < v < 2.0.0"));
    }

    #[test]
    fn exactly_pins_a_single_version() {
        let pin = Constraint::exactly(&Version::new(1, 0, 5));
        assert!(pin.satisfies(&Version::new(1, 0, 5)));
        assert!(!pin.satisfies(&Version::new(1, 0, 4)));
        assert!(!pin.satisfies(&Version::new(1, 0, 6)));
    }

    fn version_strategy() -> impl Strategy<Value = Version> {
        (0u64..6, 0u64..6, 0u64..6)
            .prop_map(|(major, minor, patch)| Version::new(major, minor, patch))
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![Just(Op::Less), Just(Op::LessEq)]
    }

    fn constraint_strategy() -> impl Strategy<Value = Constraint> {
        (version_strategy(), version_strategy(), op_strategy(), op_strategy())
            .prop_filter_map("bounds must be ordered", |(a, b, lo, hi)| {
                let (lower, upper) = match a.cmp(&b) {
                    Ordering::Less => (a, b),
                    Ordering::Greater => (b, a),
                    Ordering::Equal => return None,
                };
                Constraint::new(lower, lo, upper, hi).ok()
            })
    }

    /// Constraints in the shape the ecosystem actually publishes:
    /// `lower <= v < upper`. In this shape two intervals can never touch in
    /// a single admissible point, so `intersect` returning `None` coincides
    /// exactly with the conjunction being unsatisfiable.
    fn published_constraint_strategy() -> impl Strategy<Value = Constraint> {
        (version_strategy(), version_strategy()).prop_filter_map(
            "bounds must be ordered",
            |(a, b)| {
                let (lower, upper) = match a.cmp(&b) {
                    Ordering::Less => (a, b),
                    Ordering::Greater => (b, a),
                    Ordering::Equal => return None,
                };
                Constraint::new(lower, Op::LessEq, upper, Op::Less).ok()
            },
        )
    }

    proptest! {
        #[test]
        fn intersect_is_idempotent(
            c in constraint_strategy(),
            v in version_strategy(),
        ) {
            let met = c.intersect(&c).unwrap();
            prop_assert_eq!(met.satisfies(&v), c.satisfies(&v));
        }

        #[test]
        fn intersect_agrees_with_conjunction(
            c1 in published_constraint_strategy(),
            c2 in published_constraint_strategy(),
            v in version_strategy(),
        ) {
            let both = c1.satisfies(&v) && c2.satisfies(&v);
            match c1.intersect(&c2) {
                Some(met) => prop_assert_eq!(met.satisfies(&v), both),
                None => prop_assert!(!both),
            }
        }

        #[test]
        fn intersect_is_commutative(
            c1 in constraint_strategy(),
            c2 in constraint_strategy(),
        ) {
            prop_assert_eq!(c1.intersect(&c2), c2.intersect(&c1));
        }

        #[test]
        fn intersect_is_associative(
            c1 in constraint_strategy(),
            c2 in constraint_strategy(),
            c3 in constraint_strategy(),
        ) {
            let lhs = c1
                .intersect(&c2)
                .and_then(|met| met.intersect(&c3));
            let rhs = c2
                .intersect(&c3)
                .and_then(|met| c1.intersect(&met));
            prop_assert_eq!(lhs, rhs);
        }
    }
}
