use smol_str::SmolStr;

use crate::expr::{Atom, Expr};
use crate::tree::{NodeId, NodeKind, Tree};

/// Records, for categorical questions, the choices that can still lead
/// somewhere: the levels the split routes, narrowed by the deepest ancestor
/// membership test on the same variable. Under a per-stratum condition the
/// levels any stratum admits are kept. Hidden choices are dropped at emission.
pub(super) fn filter_choices(mut tree: Tree) -> Tree {
    let universe = tree.strata();
    let ids = tree.preorder().collect::<Vec<NodeId>>();

    for id in ids {
        let node = tree.node(id);
        let (NodeKind::Split { rules }, Some(binding)) = (&node.kind, node.question.as_ref()) else {
            continue;
        };
        if !binding.kind.is_select() || !rules.iter().all(|(_, rule)| rule.is_categorical()) {
            continue;
        }

        let routed: Vec<&SmolStr> = rules.iter().flat_map(|(_, rule)| rule.levels()).collect();
        let variable = binding.question.clone();
        let simplified = node.relevance.simplify(&universe);
        let ancestor = admitted(&simplified, &variable);

        let available = binding
            .choices
            .iter()
            .map(|choice| choice.name.clone())
            .filter(|name| routed.contains(&name))
            .filter(|name| ancestor.as_ref().is_none_or(|values| values.contains(name)))
            .collect::<Vec<_>>();

        let unfiltered = available.len() == binding.choices.len();
        if let Some(binding) = tree.node_mut(id).question.as_mut() {
            binding.available = (!unfiltered).then_some(available);
        }
    }

    tree
}

/// Levels of `variable` admitted by the deepest membership test in `expr`.
/// A disjunction counts only when every alternative tests the variable.
fn admitted(expr: &Expr, variable: &SmolStr) -> Option<Vec<SmolStr>> {
    expr.clauses().iter().rev().find_map(|clause| match clause {
        Expr::Atom(Atom::Member { variable: v, values, .. }) if v == variable => Some(values.clone()),
        Expr::Or(alternatives) => {
            let mut union: Vec<SmolStr> = Vec::new();
            for alternative in alternatives {
                for value in admitted(alternative, variable)? {
                    if !union.contains(&value) {
                        union.push(value);
                    }
                }
            }
            Some(union)
        }
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Choice, Config, Question, QuestionType};
    use crate::options::{OptionEngine, Transform};
    use crate::relevance::compile_relevance;
    use crate::rule::SplitRule;
    use crate::stratum::Stratum;
    use crate::tree::{BranchKind, Node, Origin, Outcome};

    fn region(left: &[&str], right: &[&str], source: u64) -> Node {
        Node::new(
            NodeKind::Split {
                rules: vec![(
                    Stratum::rural(),
                    SplitRule::Categorical {
                        variable: "region".into(),
                        left: left.iter().map(|v| SmolStr::new(v)).collect(),
                        right: right.iter().map(|v| SmolStr::new(v)).collect(),
                    },
                )],
            },
            vec![Origin::new(Stratum::rural(), source)],
        )
    }

    fn leaf(source: u64) -> Node {
        Node::new(
            NodeKind::Leaf {
                outcomes: vec![Outcome {
                    stratum: Stratum::rural(),
                    class: "poor".into(),
                    n: 1,
                    probabilities: Vec::new(),
                }],
            },
            vec![Origin::new(Stratum::rural(), source)],
        )
    }

    #[test]
    fn test_filter_choices() {
        let mut tree = Tree::new(region(&["a", "b", "c"], &["d"], 1), vec!["region".into()]);
        let root = tree.root();
        let inner = tree.add_child(root, BranchKind::Left, region(&["a"], &["b"], 2));
        tree.add_child(inner, BranchKind::Left, leaf(4));
        tree.add_child(inner, BranchKind::Right, leaf(5));
        tree.add_child(root, BranchKind::Right, leaf(3));
        let tree = compile_relevance(tree);

        let config = Config::default()
            .with_question(Question::new("region", QuestionType::SelectOne))
            .with_choices(
                "region",
                ["a", "b", "c", "d", "e"].into_iter().map(Choice::new).collect(),
            );
        let tree = OptionEngine::new(&config)
            .run(tree, &[Transform::FilterChoices])
            .unwrap();

        let available = |id: NodeId| tree.node(id).question.as_ref().unwrap().available.clone();
        assert_eq!(
            available(root),
            Some(vec!["a".into(), "b".into(), "c".into(), "d".into()])
        );
        assert_eq!(available(inner), Some(vec!["a".into(), "b".into()]));
        // the question stays
        assert!(tree.node(inner).question.is_some());
    }

    #[test]
    fn test_filter_keeps_complete_lists_unfiltered() {
        let mut tree = Tree::new(region(&["a"], &["b"], 1), vec!["region".into()]);
        let root = tree.root();
        tree.add_child(root, BranchKind::Left, leaf(2));
        tree.add_child(root, BranchKind::Right, leaf(3));
        let config = Config::default()
            .with_question(Question::new("region", QuestionType::SelectOne))
            .with_choices("region", vec![Choice::new("a"), Choice::new("b")]);
        let tree = OptionEngine::new(&config)
            .run(compile_relevance(tree), &[Transform::FilterChoices])
            .unwrap();
        assert_eq!(tree.node(root).question.as_ref().unwrap().available, None);
    }

    #[test]
    fn test_filter_under_stratified_split() {
        let rule = |left: &[&str], right: &[&str]| SplitRule::Categorical {
            variable: "region".into(),
            left: left.iter().map(|v| SmolStr::new(v)).collect(),
            right: right.iter().map(|v| SmolStr::new(v)).collect(),
        };
        let provenance = |source: u64| {
            vec![
                Origin::new(Stratum::rural(), source),
                Origin::new(Stratum::urban(), source),
            ]
        };

        let root = Node::new(
            NodeKind::Split {
                rules: vec![
                    (Stratum::rural(), rule(&["a", "b"], &["c", "d"])),
                    (Stratum::urban(), rule(&["a", "c"], &["b", "d"])),
                ],
            },
            provenance(1),
        );
        let inner = Node::new(
            NodeKind::Split {
                rules: vec![
                    (Stratum::rural(), rule(&["a"], &["b", "d"])),
                    (Stratum::urban(), rule(&["a"], &["b", "d"])),
                ],
            },
            provenance(2),
        );
        let mut tree = Tree::new(root, vec!["region".into()]);
        let root = tree.root();
        let inner = tree.add_child(root, BranchKind::Left, inner);
        tree.add_child(inner, BranchKind::Left, leaf(4));
        tree.add_child(inner, BranchKind::Right, leaf(5));
        tree.add_child(root, BranchKind::Right, leaf(3));

        let config = Config::default()
            .with_question(Question::new("region", QuestionType::SelectOne))
            .with_choices(
                "region",
                ["a", "b", "c", "d", "e"].into_iter().map(Choice::new).collect(),
            );
        let tree = OptionEngine::new(&config)
            .run(compile_relevance(tree), &[Transform::FilterChoices])
            .unwrap();

        // `d` goes right at the root for both strata
        assert_eq!(
            tree.node(inner).question.as_ref().unwrap().available,
            Some(vec!["a".into(), "b".into()])
        );
    }
}
