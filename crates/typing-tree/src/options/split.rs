use smol_str::SmolStr;

use super::bound_or_missing;
use crate::error::{Error, Result};
use crate::relevance::compile_relevance;
use crate::rule::Side;
use crate::tree::{Branch, BranchKind, NodeId, NodeKind, Tree};

/// Expands every yes/no node asking `src_question` into one branch per choice.
pub(super) fn split(mut tree: Tree, src_question: &SmolStr) -> Result<Tree> {
    bound_or_missing(&tree, src_question, "split")?;

    // copies of a split subtree may contain further nodes to expand
    while let Some(id) = next_target(&tree, src_question) {
        expand(&mut tree, id, src_question)?;
    }

    Ok(compile_relevance(tree))
}

fn next_target(tree: &Tree, src_question: &str) -> Option<NodeId> {
    tree.preorder().find(|id| {
        let node = tree.node(*id);
        node.kind.is_split()
            && node.question.as_ref().is_some_and(|q| q.question == src_question)
            && node
                .branches
                .iter()
                .any(|branch| matches!(branch.kind, BranchKind::Left | BranchKind::Right))
    })
}

fn expand(tree: &mut Tree, id: NodeId, src_question: &SmolStr) -> Result<()> {
    let node = tree.node(id);
    let NodeKind::Split { rules } = &node.kind else {
        return Ok(());
    };
    let (Some(left), Some(right)) = (node.child(&BranchKind::Left), node.child(&BranchKind::Right)) else {
        return Err(Error::incomplete(
            node.provenance.first().map(|o| o.source).unwrap_or_default(),
            "has lost one of its yes/no branches",
        ));
    };
    let choices = node
        .question
        .as_ref()
        .map(|q| q.choices.iter().map(|c| c.name.clone()).collect::<Vec<_>>())
        .unwrap_or_default();

    let mut routes: Vec<(SmolStr, Side)> = Vec::with_capacity(choices.len());
    for choice in choices {
        let sides = rules.iter().map(|(_, rule)| rule.route(&choice)).collect::<Vec<_>>();
        match sides.first().copied().flatten() {
            Some(side) if sides.iter().all(|s| *s == Some(side)) => routes.push((choice, side)),
            Some(_) => {
                return Err(Error::config(
                    "options",
                    format!(
                        "cannot split `{}` at {}: strata route choice `{}` differently",
                        src_question,
                        node.describe(),
                        choice
                    ),
                ));
            }
            None => {
                tracing::warn!(
                    question = %src_question,
                    choice = %choice,
                    at = %node.describe(),
                    "choice is routed to neither branch"
                );
            }
        }
    }

    for (side, name) in [(Side::Left, "left"), (Side::Right, "right")] {
        if !routes.iter().any(|(_, routed)| *routed == side) {
            return Err(Error::incomplete(
                node.provenance.first().map(|o| o.source).unwrap_or_default(),
                format!("no choice of `{}` leads to its {} branch", src_question, name),
            ));
        }
    }

    let mut branches = Vec::with_capacity(routes.len());
    for (choice, side) in routes {
        let source = match side {
            Side::Left => left,
            Side::Right => right,
        };
        let copy = tree.duplicate(source);
        tree.node_mut(copy).parent = Some(id);
        branches.push(Branch::new(BranchKind::Choice(choice), copy));
    }

    tree.remove_subtree(left);
    tree.remove_subtree(right);

    let node = tree.node_mut(id);
    let extra = std::mem::take(&mut node.branches);
    node.branches = branches;
    node.branches.extend(extra);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Choice, Config, OptionSpec, Question, QuestionType};
    use crate::expr::{Atom, Expr};
    use crate::options::{OptionEngine, Transform};
    use crate::rule::{Comparator, SplitRule};
    use crate::stratum::Stratum;
    use crate::tree::{Node, Origin, Outcome};

    fn leaf(class: &str, source: u64) -> Node {
        Node::new(
            NodeKind::Leaf {
                outcomes: vec![Outcome {
                    stratum: Stratum::rural(),
                    class: class.into(),
                    n: 1,
                    probabilities: Vec::new(),
                }],
            },
            vec![Origin::new(Stratum::rural(), source)],
        )
    }

    fn split_node(rule: SplitRule, source: u64) -> Node {
        Node::new(
            NodeKind::Split {
                rules: vec![(Stratum::rural(), rule)],
            },
            vec![Origin::new(Stratum::rural(), source)],
        )
    }

    /// `region` at the root, `hh_size` under its left branch.
    fn tree() -> Tree {
        let region = SplitRule::Categorical {
            variable: "region".into(),
            left: vec!["north".into(), "east".into()],
            right: vec!["south".into()],
        };
        let hh_size = SplitRule::Numeric {
            variable: "hh_size".into(),
            comparator: Comparator::Lt,
            threshold: 4.5,
        };
        let mut tree = Tree::new(split_node(region, 1), vec!["region".into(), "hh_size".into()]);
        let root = tree.root();
        let inner = tree.add_child(root, BranchKind::Left, split_node(hh_size, 2));
        tree.add_child(inner, BranchKind::Left, leaf("poor", 4));
        tree.add_child(inner, BranchKind::Right, leaf("rich", 5));
        tree.add_child(root, BranchKind::Right, leaf("rich", 3));
        compile_relevance(tree)
    }

    fn config() -> Config {
        Config::default()
            .with_question(Question::new("region", QuestionType::SelectOne))
            .with_question(Question::new("hh_size", QuestionType::Integer))
            .with_choices(
                "region",
                vec![Choice::new("north"), Choice::new("south"), Choice::new("east"), Choice::new("west")],
            )
            .with_option(OptionSpec::Split {
                src_question: "region".into(),
            })
    }

    #[test]
    fn test_split_into_choices() {
        let config = config();
        let engine = OptionEngine::new(&config);
        let tree = engine
            .run(
                tree(),
                &[Transform::Split {
                    src_question: "region".into(),
                }],
            )
            .unwrap();

        let root = tree.node(tree.root());
        let kinds = root.branches.iter().map(|b| b.kind.clone()).collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![
                BranchKind::Choice("north".into()),
                BranchKind::Choice("south".into()),
                BranchKind::Choice("east".into()),
            ]
        );
        // root + 2 copies of the hh_size subtree + 1 copy of the leaf
        assert_eq!(tree.len(), 8);

        let east = root.branches[2].child;
        assert!(tree.node(east).kind.is_split());
        assert_eq!(
            tree.node(east).relevance.clauses(),
            &[Expr::Atom(Atom::Selected {
                source: tree.root(),
                variable: "region".into(),
                value: "east".into(),
            })]
        );
        for id in tree.preorder_from(east) {
            assert!(tree.node(id).question.is_some());
        }
    }

    #[test]
    fn test_split_unknown_question() {
        let config = config();
        let engine = OptionEngine::new(&config);
        let result = engine.run(
            tree(),
            &[Transform::Split {
                src_question: "tenure".into(),
            }],
        );
        assert!(matches!(result, Err(Error::ConfigReference { .. })));
    }

    #[test]
    fn test_split_numeric_choices() {
        let config = Config::default()
            .with_question(Question::new("region", QuestionType::SelectOne))
            .with_question(Question::new("hh_size", QuestionType::SelectOne))
            .with_choices("region", vec![Choice::new("north"), Choice::new("south")])
            .with_choices("hh_size", vec![Choice::new("2"), Choice::new("6"), Choice::new("many")]);
        let engine = OptionEngine::new(&config);
        let tree = engine
            .run(
                tree(),
                &[Transform::Split {
                    src_question: "hh_size".into(),
                }],
            )
            .unwrap();

        let inner = tree.node(tree.root()).branches[0].child;
        let kinds = tree
            .node(inner)
            .branches
            .iter()
            .map(|b| b.kind.clone())
            .collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![BranchKind::Choice("2".into()), BranchKind::Choice("6".into())]
        );
    }

    #[test]
    fn test_split_without_routable_choices() {
        let config = Config::default()
            .with_question(Question::new("region", QuestionType::SelectOne))
            .with_question(Question::new("hh_size", QuestionType::SelectOne))
            .with_choices("region", vec![Choice::new("north"), Choice::new("south")])
            .with_choices("hh_size", vec![Choice::new("few"), Choice::new("many")]);
        let engine = OptionEngine::new(&config);
        let result = engine.run(
            tree(),
            &[Transform::Split {
                src_question: "hh_size".into(),
            }],
        );
        assert!(matches!(
            result,
            Err(Error::IncompleteTree { node: 2, ref reason }) if reason.contains("hh_size")
        ));
    }

    #[test]
    fn test_split_with_one_sided_choices() {
        let config = Config::default()
            .with_question(Question::new("region", QuestionType::SelectOne))
            .with_question(Question::new("hh_size", QuestionType::SelectOne))
            .with_choices("region", vec![Choice::new("north"), Choice::new("south")])
            .with_choices("hh_size", vec![Choice::new("1"), Choice::new("3")]);
        let engine = OptionEngine::new(&config);
        let result = engine.run(
            tree(),
            &[Transform::Split {
                src_question: "hh_size".into(),
            }],
        );
        assert!(matches!(
            result,
            Err(Error::IncompleteTree { ref reason, .. }) if reason.contains("right")
        ));
    }
}
