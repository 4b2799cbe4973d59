use std::collections::BTreeSet;

use smol_str::SmolStr;

use crate::error::{Error, Result};
use crate::stratum::Stratum;
use crate::tree::{BranchKind, Node, NodeId, NodeKind, Origin, Tree};

/// Merges per-stratum trees into one, folding left to right.
///
/// Positions where both trees split on the same variable become one node with
/// a rule per stratum. Elsewhere the first-listed split survives and the other
/// tree's subtree hangs off it behind a `Stratum` branch, so every original
/// path is still reachable for its own stratum.
pub fn merge_trees(trees: Vec<(Stratum, Tree)>) -> Result<Tree> {
    let mut trees = trees.into_iter();
    let Some((first_stratum, mut merged)) = trees.next() else {
        return Err(Error::config("models", "no tree to merge"));
    };

    for (stratum, tree) in trees {
        let left: BTreeSet<&SmolStr> = merged.variables().iter().collect();
        let right: BTreeSet<&SmolStr> = tree.variables().iter().collect();
        if left != right {
            let missing = left
                .symmetric_difference(&right)
                .map(|v| v.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(Error::MergeConflict {
                left: first_stratum,
                right: stratum,
                reason: format!("candidate variables differ ({})", missing),
            });
        }

        merged = merge_pair(&merged, &tree).map_err(|reason| Error::MergeConflict {
            left: first_stratum.clone(),
            right: stratum.clone(),
            reason,
        })?;
        tracing::debug!(stratum = %stratum, nodes = merged.len(), "merged tree");
    }

    Ok(merged)
}

fn merge_pair(a: &Tree, b: &Tree) -> std::result::Result<Tree, String> {
    let placeholder = || Node::new(NodeKind::Leaf { outcomes: Vec::new() }, Vec::new());
    let mut merged = Tree::new(placeholder(), a.variables().to_vec());
    let mut stack: Vec<(NodeId, NodeId, NodeId)> = vec![(a.root(), b.root(), merged.root())];

    while let Some((x, y, target)) = stack.pop() {
        let (nx, ny) = (a.node(x), b.node(y));
        let mut provenance = nx.provenance.clone();
        provenance.extend(ny.provenance.iter().cloned());

        match (&nx.kind, &ny.kind) {
            (NodeKind::Split { rules: ra }, NodeKind::Split { rules: rb })
                if matches!((ra.first(), rb.first()), (Some((_, r1)), Some((_, r2))) if r1.same_test(r2)) =>
            {
                let rules = ra.iter().chain(rb.iter()).cloned().collect();
                fill(&mut merged, target, NodeKind::Split { rules }, provenance);

                let mut pending = Vec::with_capacity(2);
                for side in [BranchKind::Left, BranchKind::Right] {
                    let (Some(cx), Some(cy)) = (nx.child(&side), ny.child(&side)) else {
                        return Err(format!(
                            "split at {} has no {:?} branch",
                            nx.describe(),
                            side
                        ));
                    };
                    let child = merged.add_child(target, side, placeholder());
                    pending.push((cx, cy, child));
                }
                stack.extend(pending.into_iter().rev());

                carry_extra_branches(&mut merged, target, a, nx);
                carry_extra_branches(&mut merged, target, b, ny);
            }
            (NodeKind::Split { .. }, NodeKind::Split { .. } | NodeKind::Leaf { .. }) => {
                tracing::debug!(
                    at = %nx.describe(),
                    other = %ny.describe(),
                    "keeping first split and attaching the other subtree"
                );
                survive(&mut merged, target, a, x, b, y, provenance);
            }
            (NodeKind::Leaf { .. }, NodeKind::Split { .. }) => {
                tracing::debug!(
                    at = %ny.describe(),
                    other = %nx.describe(),
                    "keeping split and attaching the terminal node"
                );
                survive(&mut merged, target, b, y, a, x, provenance);
            }
            (NodeKind::Leaf { outcomes: oa }, NodeKind::Leaf { outcomes: ob }) => {
                let outcomes = oa.iter().chain(ob.iter()).cloned().collect();
                fill(&mut merged, target, NodeKind::Leaf { outcomes }, provenance);
                carry_extra_branches(&mut merged, target, a, nx);
                carry_extra_branches(&mut merged, target, b, ny);
            }
            (NodeKind::Note { .. }, _) | (_, NodeKind::Note { .. }) => {
                return Err(format!(
                    "notes at {} and {} must be added after merging",
                    nx.describe(),
                    ny.describe()
                ));
            }
        }
    }

    Ok(merged)
}

/// Keeps the split of `keep` at `target` and hangs the whole `other` subtree
/// off it for the other tree's strata.
fn survive(
    merged: &mut Tree,
    target: NodeId,
    keep_tree: &Tree,
    keep: NodeId,
    other_tree: &Tree,
    other: NodeId,
    provenance: Vec<Origin>,
) {
    let kept = keep_tree.node(keep);
    fill(merged, target, kept.kind.clone(), provenance);

    for branch in &kept.branches {
        let copy = merged.graft(keep_tree, branch.child);
        merged.attach(target, branch.kind.clone(), copy);
    }

    let strata = other_tree.node(other).strata();
    let copy = merged.graft(other_tree, other);
    merged.attach(target, BranchKind::Stratum(strata), copy);
}

fn fill(merged: &mut Tree, target: NodeId, kind: NodeKind, provenance: Vec<Origin>) {
    let node = merged.node_mut(target);
    node.kind = kind;
    node.provenance = provenance;
}

/// Copies the branches other than left and right.
fn carry_extra_branches(merged: &mut Tree, target: NodeId, source: &Tree, node: &Node) {
    for branch in node
        .branches
        .iter()
        .filter(|branch| !matches!(branch.kind, BranchKind::Left | BranchKind::Right))
    {
        let copy = merged.graft(source, branch.child);
        merged.attach(target, branch.kind.clone(), copy);
    }
}
