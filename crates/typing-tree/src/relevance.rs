use crate::expr::{Atom, Expr};
use crate::rule::{Side, SplitRule};
use crate::stratum::Stratum;
use crate::tree::{BranchKind, Node, NodeId, NodeKind, Tree};

/// Gives every node the conjunction of the edge conditions on its path from
/// the root. The stored relevance keeps exactly one clause per edge; use
/// [`Expr::simplify`] to drop the redundant ones.
pub fn compile_relevance(mut tree: Tree) -> Tree {
    let root = tree.root();
    tree.node_mut(root).relevance = Expr::Const(true);

    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        let node = tree.node(id);
        let edges = node
            .branches
            .iter()
            .map(|branch| (branch.child, node.relevance.conjoin(edge_condition(id, node, &branch.kind))))
            .collect::<Vec<_>>();

        for (child, relevance) in edges.into_iter().rev() {
            tree.node_mut(child).relevance = relevance;
            stack.push(child);
        }
    }

    tree
}

/// Condition for following one branch of `node`.
///
/// When the strata reaching a split do not all split the same way, the
/// condition is guarded by stratum so that each stratum follows its own rule.
pub fn edge_condition(id: NodeId, node: &Node, kind: &BranchKind) -> Expr {
    let atom_for = |rule: &SplitRule| match kind {
        BranchKind::Left => Some(side_atom(id, rule, Side::Left)),
        BranchKind::Right => Some(side_atom(id, rule, Side::Right)),
        BranchKind::Choice(value) => Some(Expr::Atom(Atom::Selected {
            source: id,
            variable: rule.variable().clone(),
            value: value.clone(),
        })),
        BranchKind::Stratum(_) => None,
    };

    if let BranchKind::Stratum(strata) = kind {
        return Expr::Atom(Atom::Stratum {
            strata: strata.clone(),
        });
    }
    if !matches!(node.kind, NodeKind::Split { .. }) {
        return Expr::Const(true);
    }

    let groups = node.kind.rule_groups();
    let reaching = node.strata();
    let splitting: Vec<Stratum> = groups.iter().flat_map(|(strata, _)| strata.iter().cloned()).collect();
    let covers_reaching = reaching.iter().all(|s| splitting.contains(s));

    let uniform = groups.len() == 1 || matches!(kind, BranchKind::Choice(_));
    match groups.first() {
        Some((_, rule)) if uniform => {
            let Some(atom) = atom_for(rule) else {
                return Expr::Const(true);
            };
            if covers_reaching {
                atom
            } else {
                Expr::And(vec![stratum_atom(&splitting), atom])
            }
        }
        Some(_) => Expr::Or(
            groups
                .iter()
                .filter_map(|(strata, rule)| Some(Expr::And(vec![stratum_atom(strata), atom_for(rule)?])))
                .collect(),
        ),
        None => Expr::Const(true),
    }
}

/// The strata a split applies to, or `None` when every stratum reaching the
/// node is routed by it.
pub fn split_guard(node: &Node) -> Option<Vec<Stratum>> {
    let NodeKind::Split { rules } = &node.kind else {
        return None;
    };
    let splitting = crate::stratum::unique_strata(rules.iter().map(|(stratum, _)| stratum));
    let reaching = node.strata();
    (!reaching.iter().all(|s| splitting.contains(s))).then_some(splitting)
}

fn stratum_atom(strata: &[Stratum]) -> Expr {
    Expr::Atom(Atom::Stratum {
        strata: strata.to_vec(),
    })
}

fn side_atom(id: NodeId, rule: &SplitRule, side: Side) -> Expr {
    match rule {
        SplitRule::Numeric {
            variable,
            comparator,
            threshold,
        } => Expr::Atom(Atom::Compare {
            source: id,
            variable: variable.clone(),
            comparator: match side {
                Side::Left => *comparator,
                Side::Right => comparator.negate(),
            },
            value: *threshold,
        }),
        SplitRule::Categorical { variable, left, right } => Expr::Atom(Atom::Member {
            source: id,
            variable: variable.clone(),
            values: match side {
                Side::Left => left.clone(),
                Side::Right => right.clone(),
            },
        }),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::expr::Respondent;
    use crate::rule::Comparator;
    use crate::tree::{Origin, Outcome};

    fn rule(threshold: f64) -> SplitRule {
        SplitRule::Numeric {
            variable: "hh_size".into(),
            comparator: Comparator::Le,
            threshold,
        }
    }

    fn leaf(stratum: Stratum) -> Node {
        Node::new(
            NodeKind::Leaf {
                outcomes: vec![Outcome {
                    stratum: stratum.clone(),
                    class: "a".into(),
                    n: 1,
                    probabilities: Vec::new(),
                }],
            },
            vec![Origin::new(stratum, 2)],
        )
    }

    /// Root split on `hh_size` with the given rules and strata reaching it.
    fn tree(rules: Vec<(Stratum, SplitRule)>, reaching: Vec<Stratum>) -> Tree {
        let provenance = reaching.iter().map(|s| Origin::new(s.clone(), 1)).collect();
        let mut tree = Tree::new(Node::new(NodeKind::Split { rules }, provenance), vec!["hh_size".into()]);
        let root = tree.root();
        tree.add_child(root, BranchKind::Left, leaf(Stratum::rural()));
        tree.add_child(root, BranchKind::Right, leaf(Stratum::rural()));
        compile_relevance(tree)
    }

    fn left_relevance(tree: &Tree) -> &Expr {
        let root = tree.node(tree.root());
        &tree.node(root.branches[0].child).relevance
    }

    #[test]
    fn test_uniform_rule_is_unguarded() {
        let tree = tree(
            vec![(Stratum::rural(), rule(4.0)), (Stratum::urban(), rule(4.0))],
            vec![Stratum::rural(), Stratum::urban()],
        );
        assert_eq!(
            left_relevance(&tree),
            &Expr::And(vec![Expr::Atom(Atom::Compare {
                source: tree.root(),
                variable: "hh_size".into(),
                comparator: Comparator::Le,
                value: 4.0,
            })])
        );
        let right = tree.node(tree.root()).branches[1].child;
        assert!(matches!(
            &tree.node(right).relevance.clauses()[0],
            Expr::Atom(Atom::Compare { comparator: Comparator::Gt, .. })
        ));
    }

    #[rstest]
    #[case::rural_small(Stratum::rural(), 4.0, true)]
    #[case::rural_large(Stratum::rural(), 5.0, false)]
    #[case::urban_large(Stratum::urban(), 5.0, true)]
    #[case::urban_larger(Stratum::urban(), 7.0, false)]
    fn test_rules_differ_by_stratum(#[case] stratum: Stratum, #[case] hh_size: f64, #[case] expected: bool) {
        let tree = tree(
            vec![(Stratum::rural(), rule(4.0)), (Stratum::urban(), rule(6.0))],
            vec![Stratum::rural(), Stratum::urban()],
        );
        let respondent = Respondent::new(stratum).with_number("hh_size", hh_size);
        assert_eq!(left_relevance(&tree).eval(&respondent), expected);
        assert!(matches!(left_relevance(&tree).clauses()[0], Expr::Or(_)));
    }

    #[test]
    fn test_partial_split_is_guarded() {
        let tree = tree(
            vec![(Stratum::rural(), rule(4.0))],
            vec![Stratum::rural(), Stratum::urban()],
        );
        let urban = Respondent::new(Stratum::urban()).with_number("hh_size", 1.0);
        assert!(!left_relevance(&tree).eval(&urban));
        assert_eq!(
            split_guard(tree.node(tree.root())),
            Some(vec![Stratum::rural()])
        );
    }

    #[test]
    fn test_stratum_branch() {
        let mut tree = tree(
            vec![(Stratum::rural(), rule(4.0))],
            vec![Stratum::rural(), Stratum::urban()],
        );
        let root = tree.root();
        tree.add_child(root, BranchKind::Stratum(vec![Stratum::urban()]), leaf(Stratum::urban()));
        let tree = compile_relevance(tree);
        let attached = tree.node(tree.root()).branches[2].child;
        assert_eq!(
            tree.node(attached).relevance,
            Expr::And(vec![Expr::Atom(Atom::Stratum {
                strata: vec![Stratum::urban()]
            })])
        );
    }

    #[test]
    fn test_monotonic_path() {
        let mut tree = tree(
            vec![(Stratum::rural(), rule(4.0))],
            vec![Stratum::rural()],
        );
        let left = tree.node(tree.root()).branches[0].child;
        let node = tree.node_mut(left);
        node.kind = NodeKind::Split {
            rules: vec![(Stratum::rural(), rule(2.0))],
        };
        node.provenance = vec![Origin::new(Stratum::rural(), 2)];
        tree.add_child(left, BranchKind::Left, leaf(Stratum::rural()));
        tree.add_child(left, BranchKind::Right, leaf(Stratum::rural()));
        let tree = compile_relevance(tree);

        for id in tree.preorder() {
            let node = tree.node(id);
            assert_eq!(node.relevance.clauses().len(), tree.depth(id));
            if let Some(parent) = node.parent {
                let parent_clauses = tree.node(parent).relevance.clauses();
                assert_eq!(&node.relevance.clauses()[..parent_clauses.len()], parent_clauses);
            }
        }
    }
}
