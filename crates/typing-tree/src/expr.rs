use std::fmt;

use itertools::Itertools;
use rustc_hash::{FxHashMap, FxHashSet};
use smol_str::SmolStr;

use crate::rule::Comparator;
use crate::stratum::Stratum;
use crate::tree::NodeId;

/// A single test over one answer or over the respondent's stratum.
#[derive(Debug, Clone, PartialEq)]
pub enum Atom {
    Compare {
        source: NodeId,
        variable: SmolStr,
        comparator: Comparator,
        value: f64,
    },
    Member {
        source: NodeId,
        variable: SmolStr,
        values: Vec<SmolStr>,
    },
    Stratum {
        strata: Vec<Stratum>,
    },
    Selected {
        source: NodeId,
        variable: SmolStr,
        value: SmolStr,
    },
}

impl Atom {
    pub fn source(&self) -> Option<NodeId> {
        match self {
            Atom::Compare { source, .. } | Atom::Member { source, .. } | Atom::Selected { source, .. } => {
                Some(*source)
            }
            Atom::Stratum { .. } => None,
        }
    }

    fn source_mut(&mut self) -> Option<&mut NodeId> {
        match self {
            Atom::Compare { source, .. } | Atom::Member { source, .. } | Atom::Selected { source, .. } => {
                Some(source)
            }
            Atom::Stratum { .. } => None,
        }
    }

    fn key(&self) -> Option<ClauseKey> {
        match self {
            Atom::Compare {
                variable, comparator, ..
            } => Some(ClauseKey::Bound(variable.clone(), comparator.is_upper_bound())),
            Atom::Member { variable, .. } => Some(ClauseKey::Member(variable.clone())),
            Atom::Stratum { .. } => Some(ClauseKey::Stratum),
            Atom::Selected { .. } => None,
        }
    }

    fn eval(&self, respondent: &Respondent) -> bool {
        match self {
            Atom::Compare {
                variable,
                comparator,
                value,
                ..
            } => matches!(
                respondent.answers.get(variable),
                Some(Answer::Number(n)) if comparator.holds(*n, *value)
            ),
            Atom::Member { variable, values, .. } => matches!(
                respondent.answers.get(variable),
                Some(Answer::Choice(c)) if values.contains(c)
            ),
            Atom::Selected { variable, value, .. } => matches!(
                respondent.answers.get(variable),
                Some(Answer::Choice(c)) if c == value
            ),
            Atom::Stratum { strata } => strata.contains(&respondent.stratum),
        }
    }
}

/// Bucket used to keep only the deepest of several atoms constraining the
/// same thing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ClauseKey {
    Bound(SmolStr, bool),
    Member(SmolStr),
    Stratum,
}

/// Visibility condition of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(bool),
    Atom(Atom),
    And(Vec<Expr>),
    Or(Vec<Expr>),
}

impl Default for Expr {
    fn default() -> Self {
        Expr::Const(true)
    }
}

impl Expr {
    pub fn is_true(&self) -> bool {
        matches!(self, Expr::Const(true))
    }

    /// Conjuncts of the expression. `true` has none.
    pub fn clauses(&self) -> &[Expr] {
        match self {
            Expr::Const(true) => &[],
            Expr::And(clauses) => clauses,
            other => std::slice::from_ref(other),
        }
    }

    /// Appends one clause, keeping the existing ones untouched.
    pub fn conjoin(&self, clause: Expr) -> Expr {
        let mut clauses = self.clauses().to_vec();
        clauses.push(clause);
        Expr::And(clauses)
    }

    pub fn atoms(&self) -> Vec<&Atom> {
        let mut atoms = Vec::new();
        let mut stack = vec![self];
        while let Some(expr) = stack.pop() {
            match expr {
                Expr::Const(_) => {}
                Expr::Atom(atom) => atoms.push(atom),
                Expr::And(items) | Expr::Or(items) => stack.extend(items.iter().rev()),
            }
        }
        atoms
    }

    pub fn references(&self, id: NodeId) -> bool {
        self.atoms().iter().any(|atom| atom.source() == Some(id))
    }

    /// Rewrites the node every atom reads from.
    pub fn redirect(&mut self, mapping: &FxHashMap<NodeId, NodeId>) {
        let mut stack = vec![self];
        while let Some(expr) = stack.pop() {
            match expr {
                Expr::Const(_) => {}
                Expr::Atom(atom) => {
                    if let Some(source) = atom.source_mut()
                        && let Some(target) = mapping.get(source)
                    {
                        *source = *target;
                    }
                }
                Expr::And(items) | Expr::Or(items) => stack.extend(items.iter_mut()),
            }
        }
    }

    pub fn eval(&self, respondent: &Respondent) -> bool {
        match self {
            Expr::Const(value) => *value,
            Expr::Atom(atom) => atom.eval(respondent),
            Expr::And(items) => items.iter().all(|item| item.eval(respondent)),
            Expr::Or(items) => items.iter().any(|item| item.eval(respondent)),
        }
    }

    /// Canonical form of the expression.
    ///
    /// Nested conjunctions and disjunctions are flattened and constants folded.
    /// A stratum atom covering every stratum in `universe` is `true`. Within a
    /// conjunction only the deepest atom per variable and bound side is kept,
    /// and disjuncts implied by a shorter disjunct are absorbed. Applying it
    /// twice gives the same expression.
    pub fn simplify(&self, universe: &[Stratum]) -> Expr {
        match self {
            Expr::Const(_) => self.clone(),
            Expr::Atom(Atom::Stratum { strata }) => {
                if strata.is_empty() {
                    Expr::Const(false)
                } else if !universe.is_empty() && universe.iter().all(|s| strata.contains(s)) {
                    Expr::Const(true)
                } else {
                    self.clone()
                }
            }
            Expr::Atom(_) => self.clone(),
            Expr::And(items) => {
                let mut clauses = Vec::with_capacity(items.len());
                for item in items {
                    match item.simplify(universe) {
                        Expr::Const(true) => {}
                        Expr::Const(false) => return Expr::Const(false),
                        Expr::And(inner) => clauses.extend(inner),
                        other => clauses.push(other),
                    }
                }
                if let Some(pruned) = prune_strata(&clauses) {
                    return Expr::And(pruned).simplify(universe);
                }
                Self::collect(keep_deepest(clauses), Expr::And, true)
            }
            Expr::Or(items) => {
                let mut alternatives = Vec::with_capacity(items.len());
                for item in items {
                    match item.simplify(universe) {
                        Expr::Const(false) => {}
                        Expr::Const(true) => return Expr::Const(true),
                        Expr::Or(inner) => alternatives.extend(inner),
                        other => alternatives.push(other),
                    }
                }
                Self::collect(absorb(alternatives), Expr::Or, false)
            }
        }
    }

    fn collect(mut items: Vec<Expr>, wrap: fn(Vec<Expr>) -> Expr, empty: bool) -> Expr {
        match items.len() {
            0 => Expr::Const(empty),
            1 => items.remove(0),
            _ => wrap(items),
        }
    }
}

/// Keeps the last atom of every key, and the last of identical clauses.
fn keep_deepest(clauses: Vec<Expr>) -> Vec<Expr> {
    let mut seen_keys: FxHashSet<ClauseKey> = FxHashSet::default();
    let mut kept: Vec<Expr> = Vec::with_capacity(clauses.len());

    for clause in clauses.into_iter().rev() {
        let key = match &clause {
            Expr::Atom(atom) => atom.key(),
            _ => None,
        };
        let keep = match key {
            Some(key) => seen_keys.insert(key),
            None => !kept.contains(&clause),
        };
        if keep {
            kept.push(clause);
        }
    }

    kept.reverse();
    kept
}

/// Drops the disjuncts of nested disjunctions that are guarded by strata the
/// conjunction already excludes. `None` when nothing is dropped.
fn prune_strata(clauses: &[Expr]) -> Option<Vec<Expr>> {
    let allowed = clauses
        .iter()
        .filter_map(|clause| match clause {
            Expr::Atom(Atom::Stratum { strata }) => Some(strata),
            _ => None,
        })
        .last()?;
    let excluded = |alternative: &Expr| {
        alternative.clauses().iter().any(|clause| {
            matches!(clause, Expr::Atom(Atom::Stratum { strata }) if !strata.iter().any(|s| allowed.contains(s)))
        })
    };

    let mut changed = false;
    let pruned = clauses
        .iter()
        .map(|clause| match clause {
            Expr::Or(alternatives) if alternatives.iter().any(excluded) => {
                changed = true;
                Expr::Or(alternatives.iter().filter(|alt| !excluded(*alt)).cloned().collect())
            }
            other => other.clone(),
        })
        .collect();
    changed.then_some(pruned)
}

/// Drops duplicate disjuncts and disjuncts whose clauses contain all the
/// clauses of another one.
fn absorb(alternatives: Vec<Expr>) -> Vec<Expr> {
    let mut kept: Vec<Expr> = Vec::with_capacity(alternatives.len());

    for (i, alternative) in alternatives.iter().enumerate() {
        let clauses = alternative.clauses();
        let absorbed = alternatives.iter().enumerate().any(|(j, other)| {
            if i == j {
                return false;
            }
            let other_clauses = other.clauses();
            let covers = other_clauses.iter().all(|c| clauses.contains(c));
            // identical disjuncts keep the first one
            covers && (other_clauses.len() < clauses.len() || j < i)
        });
        if !absorbed {
            kept.push(alternative.clone());
        }
    }

    kept
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::Compare {
                variable,
                comparator,
                value,
                ..
            } => write!(f, "{} {} {}", variable, comparator, value),
            Atom::Member { variable, values, .. } => {
                write!(f, "{} in {{{}}}", variable, values.iter().join(", "))
            }
            Atom::Selected { variable, value, .. } => write!(f, "{} = {}", variable, value),
            Atom::Stratum { strata } => write!(f, "stratum in {{{}}}", strata.iter().join(", ")),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(value) => write!(f, "{}", value),
            Expr::Atom(atom) => write!(f, "{}", atom),
            Expr::And(items) => write!(f, "({})", items.iter().join(" and ")),
            Expr::Or(items) => write!(f, "({})", items.iter().join(" or ")),
        }
    }
}

/// An answer given to one question.
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    Number(f64),
    Choice(SmolStr),
}

/// A respondent's stratum and answers, keyed by question identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Respondent {
    pub stratum: Stratum,
    pub answers: FxHashMap<SmolStr, Answer>,
}

impl Respondent {
    pub fn new(stratum: Stratum) -> Self {
        Self {
            stratum,
            answers: FxHashMap::default(),
        }
    }

    pub fn with_number(mut self, variable: &str, value: f64) -> Self {
        self.answers.insert(variable.into(), Answer::Number(value));
        self
    }

    pub fn with_choice(mut self, variable: &str, value: &str) -> Self {
        self.answers.insert(variable.into(), Answer::Choice(value.into()));
        self
    }
}
