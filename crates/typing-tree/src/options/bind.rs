use crate::config::{Config, QuestionType};
use crate::error::{Error, Result};
use crate::question::{QuestionBinding, SEGMENT_QUESTION};
use crate::relevance::split_guard;
use crate::tree::{NodeId, NodeKind, Tree};

/// Binds every split to the question of its variable and every leaf to a
/// segment `calculate` row. Nodes that are already bound are left as they are.
pub fn bind_questions(mut tree: Tree, config: &Config) -> Result<Tree> {
    let ids = tree.preorder().collect::<Vec<NodeId>>();

    for id in ids {
        let node = tree.node(id);
        if node.question.is_some() {
            continue;
        }

        let binding = match &node.kind {
            NodeKind::Split { .. } => {
                let Some(variable) = node.kind.variable() else {
                    continue;
                };
                let question = config.question(variable).ok_or_else(|| {
                    Error::missing("question", variable.clone(), format!("split at {}", node.describe()))
                })?;

                let mut binding = QuestionBinding::new(question.name.clone(), question.kind);
                binding.list_name = question.list_name.clone();
                binding.labels = question.labels.clone();
                binding.hints = question.hints.clone();
                binding.choices = config.choices_of(question).to_vec();
                binding.guard = split_guard(node);
                binding
            }
            NodeKind::Leaf { .. } => {
                let mut binding = QuestionBinding::new(SEGMENT_QUESTION, QuestionType::Calculate);
                binding.segments = node.kind.class_groups();
                binding.numbered = true;
                binding
            }
            // notes are bound when they are added
            NodeKind::Note { .. } => continue,
        };

        tree.node_mut(id).question = Some(binding);
    }

    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Choice, Question};
    use crate::rule::{Comparator, SplitRule};
    use crate::stratum::Stratum;
    use crate::tree::{BranchKind, Node, Origin, Outcome};

    fn tree(variable: &str) -> Tree {
        let rule = SplitRule::Categorical {
            variable: variable.into(),
            left: vec!["north".into()],
            right: vec!["south".into()],
        };
        let mut tree = Tree::new(
            Node::new(
                NodeKind::Split {
                    rules: vec![(Stratum::rural(), rule)],
                },
                vec![Origin::new(Stratum::rural(), 1)],
            ),
            vec![variable.into()],
        );
        let root = tree.root();
        for (side, source, class) in [(BranchKind::Left, 2, "poor"), (BranchKind::Right, 3, "rich")] {
            let leaf = Node::new(
                NodeKind::Leaf {
                    outcomes: vec![Outcome {
                        stratum: Stratum::rural(),
                        class: class.into(),
                        n: 1,
                        probabilities: Vec::new(),
                    }],
                },
                vec![Origin::new(Stratum::rural(), source)],
            );
            tree.add_child(root, side, leaf);
        }
        tree
    }

    fn config() -> Config {
        Config::default()
            .with_question(Question::new("region", QuestionType::SelectOne).with_label("English (en)", "Region"))
            .with_choices("region", vec![Choice::new("north"), Choice::new("south")])
    }

    #[test]
    fn test_bind() {
        let tree = bind_questions(tree("region"), &config()).unwrap();
        let root = tree.node(tree.root()).question.as_ref().unwrap();
        assert_eq!(root.question, "region");
        assert_eq!(root.kind, QuestionType::SelectOne);
        assert_eq!(root.choices.len(), 2);
        assert_eq!(root.guard, None);
        assert!(root.required);

        let leaves = tree
            .leaves()
            .map(|id| tree.node(id).question.clone().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(leaves.len(), 2);
        assert!(leaves.iter().all(|b| b.question == SEGMENT_QUESTION && b.numbered && !b.required));
        assert_eq!(leaves[1].segments, vec![("rich".into(), vec![Stratum::rural()])]);
    }

    #[test]
    fn test_missing_question() {
        let result = bind_questions(tree("tenure"), &config());
        assert!(matches!(
            result,
            Err(Error::ConfigReference { kind: "question", ref name, .. }) if name == "tenure"
        ));
    }

    #[test]
    fn test_numeric_split_is_bound() {
        let mut tree = tree("region");
        let root = tree.root();
        tree.node_mut(root).kind = NodeKind::Split {
            rules: vec![(
                Stratum::rural(),
                SplitRule::Numeric {
                    variable: "hh_size".into(),
                    comparator: Comparator::Lt,
                    threshold: 4.5,
                },
            )],
        };
        let config = config().with_question(Question::new("hh_size", QuestionType::Integer));
        let tree = bind_questions(tree, &config).unwrap();
        let binding = tree.node(root).question.as_ref().unwrap();
        assert_eq!(binding.kind, QuestionType::Integer);
        assert!(binding.choices.is_empty());
    }
}
