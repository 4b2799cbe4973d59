use rustc_hash::FxHashSet;

use crate::error::{Error, Result};
use crate::rpart::ParsedModel;
use crate::stratum::Stratum;
use crate::tree::{BranchKind, Node, NodeId, NodeKind, Origin, Outcome, Tree};

const ROOT: u64 = 1;

/// Rebuilds the tree of one stratum from the implicit heap numbering of the
/// node rows (`2·id` left, `2·id + 1` right). The resulting tree carries
/// explicit branches only.
pub fn build_tree(model: &ParsedModel, stratum: &Stratum) -> Result<Tree> {
    if !model.distributions.contains_key(&ROOT) {
        return Err(Error::incomplete(ROOT, "(root) is missing from the model"));
    }

    let mut tree = Tree::new(node(model, stratum, ROOT), model.variable_names());
    let mut visited = FxHashSet::default();
    visited.insert(ROOT);

    let mut stack: Vec<(u64, NodeId)> = vec![(ROOT, tree.root())];
    while let Some((id, parent)) = stack.pop() {
        if !model.rules.contains_key(&id) {
            continue;
        }

        let left = id
            .checked_mul(2)
            .ok_or_else(|| Error::incomplete(id, "has a child id beyond the numbering range"))?;
        let right = left
            .checked_add(1)
            .ok_or_else(|| Error::incomplete(id, "has a child id beyond the numbering range"))?;

        for child in [left, right] {
            if !model.distributions.contains_key(&child) {
                return Err(Error::incomplete(id, format!("is missing child {}", child)));
            }
        }

        let left_id = tree.add_child(parent, BranchKind::Left, node(model, stratum, left));
        let right_id = tree.add_child(parent, BranchKind::Right, node(model, stratum, right));
        visited.insert(left);
        visited.insert(right);

        stack.push((right, right_id));
        stack.push((left, left_id));
    }

    for id in model.distributions.keys().filter(|id| !visited.contains(id)) {
        tracing::debug!(node = id, stratum = %stratum, "ignoring unreachable node");
    }

    tracing::debug!(stratum = %stratum, nodes = tree.len(), "built tree");
    Ok(tree)
}

fn node(model: &ParsedModel, stratum: &Stratum, id: u64) -> Node {
    let provenance = vec![Origin::new(stratum.clone(), id)];
    let kind = match model.rules.get(&id) {
        Some(rule) => NodeKind::Split {
            rules: vec![(stratum.clone(), rule.clone())],
        },
        None => {
            let outcomes = model
                .distributions
                .get(&id)
                .map(|distribution| Outcome {
                    stratum: stratum.clone(),
                    class: distribution.class.clone(),
                    n: distribution.n,
                    probabilities: distribution.probabilities.clone(),
                })
                .into_iter()
                .collect();
            NodeKind::Leaf { outcomes }
        }
    };
    Node::new(kind, provenance)
}
