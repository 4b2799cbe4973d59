use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Comparison operator of a numeric split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparator {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
}

impl Comparator {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "<" => Some(Comparator::Lt),
            "<=" => Some(Comparator::Le),
            ">" => Some(Comparator::Gt),
            ">=" => Some(Comparator::Ge),
            _ => None,
        }
    }

    pub fn negate(self) -> Self {
        match self {
            Comparator::Lt => Comparator::Ge,
            Comparator::Le => Comparator::Gt,
            Comparator::Gt => Comparator::Le,
            Comparator::Ge => Comparator::Lt,
        }
    }

    #[inline(always)]
    pub fn holds(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Comparator::Lt => lhs < rhs,
            Comparator::Le => lhs <= rhs,
            Comparator::Gt => lhs > rhs,
            Comparator::Ge => lhs >= rhs,
        }
    }

    /// `true` for `<` and `<=`, which bound a variable from above.
    #[inline(always)]
    pub fn is_upper_bound(self) -> bool {
        matches!(self, Comparator::Lt | Comparator::Le)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Branch a case is routed to by a split rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

/// The test of a non-terminal node. The rule describes the condition that
/// routes a case to the left child.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SplitRule {
    Numeric {
        variable: SmolStr,
        comparator: Comparator,
        threshold: f64,
    },
    Categorical {
        variable: SmolStr,
        left: Vec<SmolStr>,
        right: Vec<SmolStr>,
    },
}

impl SplitRule {
    pub fn variable(&self) -> &SmolStr {
        match self {
            SplitRule::Numeric { variable, .. } | SplitRule::Categorical { variable, .. } => variable,
        }
    }

    pub fn is_categorical(&self) -> bool {
        matches!(self, SplitRule::Categorical { .. })
    }

    /// Two rules test the same thing when they read the same variable the same way.
    pub fn same_test(&self, other: &SplitRule) -> bool {
        self.variable() == other.variable() && self.is_categorical() == other.is_categorical()
    }

    /// Side an answer is routed to, `None` for levels absent from the split.
    pub fn route(&self, value: &str) -> Option<Side> {
        match self {
            SplitRule::Numeric {
                comparator,
                threshold,
                ..
            } => {
                let value = value.trim().parse::<f64>().ok()?;
                if comparator.holds(value, *threshold) {
                    Some(Side::Left)
                } else {
                    Some(Side::Right)
                }
            }
            SplitRule::Categorical { left, right, .. } => {
                if left.iter().any(|l| l == value) {
                    Some(Side::Left)
                } else if right.iter().any(|r| r == value) {
                    Some(Side::Right)
                } else {
                    None
                }
            }
        }
    }

    /// Levels a categorical split sends to either side.
    pub fn levels(&self) -> Vec<&SmolStr> {
        match self {
            SplitRule::Numeric { .. } => Vec::new(),
            SplitRule::Categorical { left, right, .. } => left.iter().chain(right.iter()).collect(),
        }
    }

    /// The condition for one side without the variable name, e.g. `< 4.5` or `a, b`.
    pub fn side_label(&self, side: Side) -> String {
        match (self, side) {
            (
                SplitRule::Numeric {
                    comparator,
                    threshold,
                    ..
                },
                Side::Left,
            ) => format!("{} {}", comparator, threshold),
            (
                SplitRule::Numeric {
                    comparator,
                    threshold,
                    ..
                },
                Side::Right,
            ) => format!("{} {}", comparator.negate(), threshold),
            (SplitRule::Categorical { left, .. }, Side::Left) => left.iter().join(", "),
            (SplitRule::Categorical { right, .. }, Side::Right) => right.iter().join(", "),
        }
    }
}

impl fmt::Display for SplitRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitRule::Numeric { variable, .. } => {
                write!(f, "{} {}", variable, self.side_label(Side::Left))
            }
            SplitRule::Categorical { variable, left, .. } => {
                write!(f, "{} in {{{}}}", variable, left.iter().join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn numeric(comparator: Comparator, threshold: f64) -> SplitRule {
        SplitRule::Numeric {
            variable: "hh_size".into(),
            comparator,
            threshold,
        }
    }

    fn region() -> SplitRule {
        SplitRule::Categorical {
            variable: "region".into(),
            left: vec!["north".into(), "east".into()],
            right: vec!["south".into()],
        }
    }

    #[rstest]
    #[case(Comparator::Lt, Comparator::Ge)]
    #[case(Comparator::Le, Comparator::Gt)]
    #[case(Comparator::Gt, Comparator::Le)]
    #[case(Comparator::Ge, Comparator::Lt)]
    fn test_negate(#[case] comparator: Comparator, #[case] expected: Comparator) {
        assert_eq!(comparator.negate(), expected);
        assert_eq!(comparator.negate().negate(), comparator);
    }

    #[rstest]
    #[case::below(numeric(Comparator::Lt, 4.5), "3", Some(Side::Left))]
    #[case::above(numeric(Comparator::Lt, 4.5), "5", Some(Side::Right))]
    #[case::inclusive(numeric(Comparator::Le, 4.0), "4", Some(Side::Left))]
    #[case::not_a_number(numeric(Comparator::Le, 4.0), "four", None)]
    #[case::left_level(region(), "east", Some(Side::Left))]
    #[case::right_level(region(), "south", Some(Side::Right))]
    #[case::absent_level(region(), "west", None)]
    fn test_route(#[case] rule: SplitRule, #[case] value: &str, #[case] expected: Option<Side>) {
        assert_eq!(rule.route(value), expected);
    }

    #[rstest]
    #[case(numeric(Comparator::Lt, 4.5), "hh_size < 4.5")]
    #[case(numeric(Comparator::Le, 4.0), "hh_size <= 4")]
    #[case(region(), "region in {north, east}")]
    fn test_display(#[case] rule: SplitRule, #[case] expected: &str) {
        assert_eq!(rule.to_string(), expected);
    }

    #[test]
    fn test_side_label() {
        let rule = numeric(Comparator::Le, 6.0);
        assert_eq!(rule.side_label(Side::Left), "<= 6");
        assert_eq!(rule.side_label(Side::Right), "> 6");
        assert_eq!(region().side_label(Side::Right), "south");
    }

    #[test]
    fn test_same_test() {
        assert!(numeric(Comparator::Lt, 4.5).same_test(&numeric(Comparator::Le, 6.0)));
        assert!(!numeric(Comparator::Lt, 4.5).same_test(&region()));
    }
}
