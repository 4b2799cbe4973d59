//! Collapsing of repeated questions.
//!
//! The same question is often asked in several branches of a tree. Those
//! occurrences are merged into one representative row, which becomes visible
//! whenever any of them would have been. The form is answered one row at a
//! time, so a representative may only read rows emitted before it.
use rustc_hash::{FxHashMap, FxHashSet};
use smol_str::SmolStr;

use crate::config::QuestionType;
use crate::error::{Error, Result};
use crate::expr::{Atom, Expr};
use crate::stratum::Stratum;
use crate::tree::{BranchKind, NodeId, Tree};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GroupKey {
    question: SmolStr,
    kind: QuestionType,
    offered: Vec<SmolStr>,
    segments: Vec<(SmolStr, Vec<Stratum>)>,
}

/// Merges structurally equivalent question nodes.
///
/// Nodes are grouped by question, type, offered choices and, for segment rows,
/// the segments they assign. Every atom reading a collapsed node is
/// redirected to the representative.
pub fn merge_duplicate_questions(mut tree: Tree) -> Result<Tree> {
    let universe = tree.strata();
    let mut groups: Vec<Vec<NodeId>> = Vec::new();
    let mut index: FxHashMap<GroupKey, usize> = FxHashMap::default();

    for id in tree.preorder() {
        let node = tree.node(id);
        let Some(binding) = node.question.as_ref() else {
            continue;
        };
        if binding.collapsed_into.is_some() {
            continue;
        }

        let key = GroupKey {
            question: binding.question.clone(),
            kind: binding.kind,
            offered: binding.offered_choices().into_iter().cloned().collect(),
            segments: binding.segments.clone(),
        };
        match index.get(&key) {
            Some(group) => groups[*group].push(id),
            None => {
                index.insert(key, groups.len());
                groups.push(vec![id]);
            }
        }
    }

    let position: FxHashMap<NodeId, usize> = tree.preorder().enumerate().map(|(i, id)| (id, i)).collect();
    let read: FxHashSet<NodeId> = tree
        .preorder()
        .flat_map(|id| tree.node(id).relevance.atoms().into_iter().filter_map(Atom::source).collect::<Vec<_>>())
        .collect();

    let mut redirect: FxHashMap<NodeId, NodeId> = FxHashMap::default();
    let mut merged: Vec<NodeId> = Vec::new();

    for members in groups.iter().filter(|members| members.len() > 1) {
        for subgroup in partition(&tree, members, &read, &position, &redirect) {
            if subgroup.len() < 2 {
                continue;
            }
            let representative = subgroup[0];
            check_compatible(&tree, &subgroup)?;

            let disjuncts = subgroup
                .iter()
                .filter(|member| !absorbed(&tree, &subgroup, **member))
                .map(|member| visibility(&tree, *member))
                .collect::<Vec<_>>();
            let relevance = Expr::Or(disjuncts).simplify(&universe);

            let node = tree.node_mut(representative);
            node.relevance = relevance;
            if let Some(binding) = node.question.as_mut() {
                binding.guard = None;
            }

            for member in &subgroup[1..] {
                redirect.insert(*member, representative);
                if let Some(binding) = tree.node_mut(*member).question.as_mut() {
                    binding.collapsed_into = Some(representative);
                }
            }
            merged.push(representative);
        }
    }

    if redirect.is_empty() {
        return Ok(tree);
    }

    let ids = tree.preorder().collect::<Vec<_>>();
    for id in ids {
        tree.node_mut(id).relevance.redirect(&redirect);
    }

    for representative in merged.iter().copied() {
        if tree.node(representative).relevance.references(representative) {
            let question = tree
                .node(representative)
                .question
                .as_ref()
                .map(|binding| binding.question.clone())
                .unwrap_or_default();
            return Err(Error::DuplicateResolution {
                question,
                reason: "the merged question would depend on its own answer".to_string(),
            });
        }
    }

    tracing::debug!(
        groups = merged.len(),
        collapsed = redirect.len(),
        "merged duplicate questions"
    );
    Ok(tree)
}

/// Splits a group into runs that can share a row, representative first.
///
/// Nothing reads a row that no relevance references, so such a group merges
/// into its last member, which follows every row any member reads. Otherwise
/// the earliest member represents its run, and a later member joins only when
/// every row it reads comes before the representative. Members below another
/// member of the run are implied by it and always join.
fn partition(
    tree: &Tree,
    members: &[NodeId],
    read: &FxHashSet<NodeId>,
    position: &FxHashMap<NodeId, usize>,
    redirect: &FxHashMap<NodeId, NodeId>,
) -> Vec<Vec<NodeId>> {
    if members.iter().all(|member| !read.contains(member)) {
        let mut run = members.to_vec();
        run.rotate_right(1);
        return vec![run];
    }

    let mut runs: Vec<Vec<NodeId>> = Vec::new();
    for member in members.iter().copied() {
        let slot = runs.iter().position(|run| {
            absorbed(tree, run, member) || reads_before(&visibility(tree, member), run[0], position, redirect)
        });
        match slot {
            Some(slot) => runs[slot].push(member),
            None => runs.push(vec![member]),
        }
    }
    runs
}

fn reads_before(
    expr: &Expr,
    row: NodeId,
    position: &FxHashMap<NodeId, usize>,
    redirect: &FxHashMap<NodeId, NodeId>,
) -> bool {
    let Some(limit) = position.get(&row) else {
        return false;
    };
    expr.atoms().into_iter().filter_map(Atom::source).all(|source| {
        let source = redirect.get(&source).copied().unwrap_or(source);
        position.get(&source).is_some_and(|at| at < limit)
    })
}

/// A member is implied by another member above it, unless it hangs off that
/// member for other strata.
fn absorbed(tree: &Tree, members: &[NodeId], member: NodeId) -> bool {
    members.iter().any(|other| {
        if !tree.is_ancestor(*other, member) {
            return false;
        }
        let mut child = member;
        while let Some(parent) = tree.node(child).parent
            && parent != *other
        {
            child = parent;
        }
        tree.node(*other)
            .branches
            .iter()
            .any(|branch| branch.child == child && !matches!(branch.kind, BranchKind::Stratum(_)))
    })
}

/// Relevance of a member including its stratum guard.
fn visibility(tree: &Tree, id: NodeId) -> Expr {
    let node = tree.node(id);
    match node.question.as_ref().and_then(|binding| binding.guard.as_ref()) {
        Some(strata) => node.relevance.conjoin(Expr::Atom(Atom::Stratum {
            strata: strata.clone(),
        })),
        None => node.relevance.clone(),
    }
}

fn check_compatible(tree: &Tree, members: &[NodeId]) -> Result<()> {
    let first = tree.node(members[0]).question.as_ref();
    for member in &members[1..] {
        let other = tree.node(*member).question.as_ref();
        let (Some(first), Some(other)) = (first, other) else {
            continue;
        };

        let mut hidden_a = first.hidden.clone();
        let mut hidden_b = other.hidden.clone();
        hidden_a.sort();
        hidden_b.sort();

        let reason = if hidden_a != hidden_b {
            Some("occurrences hide different choices")
        } else if first.calculations != other.calculations {
            Some("occurrences carry different calculations")
        } else if first.required != other.required {
            Some("occurrences disagree on being required")
        } else {
            None
        };

        if let Some(reason) = reason {
            return Err(Error::DuplicateResolution {
                question: first.question.clone(),
                reason: reason.to_string(),
            });
        }
    }
    Ok(())
}
