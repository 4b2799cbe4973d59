use rustc_hash::FxHashMap;
use slotmap::SlotMap;
use smol_str::SmolStr;

use crate::expr::Expr;
use crate::question::QuestionBinding;
use crate::rule::SplitRule;
use crate::stratum::{Stratum, unique_strata};

slotmap::new_key_type! { pub struct NodeId; }

/// Original node a merged node stands for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    pub stratum: Stratum,
    pub source: u64,
}

impl Origin {
    pub fn new(stratum: Stratum, source: u64) -> Self {
        Self { stratum, source }
    }
}

/// Prediction of a terminal node for one stratum.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub stratum: Stratum,
    pub class: SmolStr,
    pub n: u64,
    pub probabilities: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// One rule per stratum splitting at this position.
    Split { rules: Vec<(Stratum, SplitRule)> },
    Leaf { outcomes: Vec<Outcome> },
    /// Informational row telling the enumerator which segment was reached.
    Note { segment: SmolStr, strata: Vec<Stratum> },
}

impl NodeKind {
    pub fn is_split(&self) -> bool {
        matches!(self, NodeKind::Split { .. })
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, NodeKind::Leaf { .. })
    }

    /// Variable read by the split, taken from the first stratum.
    pub fn variable(&self) -> Option<&SmolStr> {
        match self {
            NodeKind::Split { rules } => rules.first().map(|(_, rule)| rule.variable()),
            _ => None,
        }
    }

    /// Rules grouped by equality, keeping the first-seen order of strata.
    pub fn rule_groups(&self) -> Vec<(Vec<Stratum>, &SplitRule)> {
        let mut groups: Vec<(Vec<Stratum>, &SplitRule)> = Vec::new();
        if let NodeKind::Split { rules } = self {
            for (stratum, rule) in rules {
                match groups.iter_mut().find(|(_, r)| *r == rule) {
                    Some((strata, _)) => {
                        if !strata.contains(stratum) {
                            strata.push(stratum.clone());
                        }
                    }
                    None => groups.push((vec![stratum.clone()], rule)),
                }
            }
        }
        groups
    }

    /// Outcomes grouped by predicted class, keeping the first-seen order.
    pub fn class_groups(&self) -> Vec<(SmolStr, Vec<Stratum>)> {
        let mut groups: Vec<(SmolStr, Vec<Stratum>)> = Vec::new();
        if let NodeKind::Leaf { outcomes } = self {
            for outcome in outcomes {
                match groups.iter_mut().find(|(class, _)| *class == outcome.class) {
                    Some((_, strata)) => {
                        if !strata.contains(&outcome.stratum) {
                            strata.push(outcome.stratum.clone());
                        }
                    }
                    None => groups.push((outcome.class.clone(), vec![outcome.stratum.clone()])),
                }
            }
        }
        groups
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchKind {
    Left,
    Right,
    Stratum(Vec<Stratum>),
    Choice(SmolStr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub kind: BranchKind,
    pub child: NodeId,
    pub hidden: bool,
}

impl Branch {
    pub fn new(kind: BranchKind, child: NodeId) -> Self {
        Self {
            kind,
            child,
            hidden: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub provenance: Vec<Origin>,
    pub branches: Vec<Branch>,
    pub parent: Option<NodeId>,
    pub relevance: Expr,
    pub question: Option<QuestionBinding>,
}

impl Node {
    pub fn new(kind: NodeKind, provenance: Vec<Origin>) -> Self {
        Self {
            kind,
            provenance,
            branches: Vec::new(),
            parent: None,
            relevance: Expr::Const(true),
            question: None,
        }
    }

    /// Strata reaching this node, in provenance order.
    pub fn strata(&self) -> Vec<Stratum> {
        unique_strata(self.provenance.iter().map(|origin| &origin.stratum))
    }

    pub fn child(&self, kind: &BranchKind) -> Option<NodeId> {
        self.branches.iter().find(|b| &b.kind == kind).map(|b| b.child)
    }

    /// Original positions of the node, e.g. `rural node 2, urban node 2`.
    pub fn describe(&self) -> String {
        self.provenance
            .iter()
            .map(|origin| format!("{} node {}", origin.stratum, origin.source))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn is_collapsed(&self) -> bool {
        self.question.as_ref().is_some_and(|q| q.collapsed_into.is_some())
    }
}

/// A rooted tree stored in an arena. Children are owned by the arena and
/// reached through explicit branches.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: SlotMap<NodeId, Node>,
    root: NodeId,
    variables: Vec<SmolStr>,
}

impl Tree {
    pub fn new(root: Node, variables: Vec<SmolStr>) -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(root);
        Self { nodes, root, variables }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Candidate variables of the models the tree was built from.
    pub fn variables(&self) -> &[SmolStr] {
        &self.variables
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Adds `node` as a child of `parent` after its existing branches.
    pub fn add_child(&mut self, parent: NodeId, kind: BranchKind, mut node: Node) -> NodeId {
        node.parent = Some(parent);
        let child = self.nodes.insert(node);
        self.nodes[parent].branches.push(Branch::new(kind, child));
        child
    }

    /// Node ids in pre-order, branches visited in order.
    pub fn preorder(&self) -> Preorder<'_> {
        Preorder {
            tree: self,
            stack: vec![self.root],
        }
    }

    pub fn preorder_from(&self, id: NodeId) -> Preorder<'_> {
        Preorder {
            tree: self,
            stack: vec![id],
        }
    }

    pub fn leaves(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.preorder().filter(|id| self.nodes[*id].kind.is_leaf())
    }

    /// Every stratum the tree represents, in first-seen order.
    pub fn strata(&self) -> Vec<Stratum> {
        unique_strata(
            self.preorder()
                .flat_map(|id| self.nodes[id].provenance.iter().map(|origin| &origin.stratum)),
        )
    }

    pub fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut current = self.nodes[id].parent;
        while let Some(parent) = current {
            depth += 1;
            current = self.nodes[parent].parent;
        }
        depth
    }

    /// `true` when `ancestor` lies strictly above `id`.
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = self.nodes[id].parent;
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.nodes[parent].parent;
        }
        false
    }

    /// Deep-copies the subtree of `source` rooted at `from` into this arena and
    /// returns the id of the copy. The copy is detached until it is attached
    /// with [`Tree::attach`].
    pub fn graft(&mut self, source: &Tree, from: NodeId) -> NodeId {
        let subtree = source.extract(from);
        self.insert_subtree(subtree)
    }

    /// Deep-copies a subtree of this tree; see [`Tree::graft`].
    pub fn duplicate(&mut self, from: NodeId) -> NodeId {
        let subtree = self.extract(from);
        self.insert_subtree(subtree)
    }

    pub fn attach(&mut self, parent: NodeId, kind: BranchKind, child: NodeId) {
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].branches.push(Branch::new(kind, child));
    }

    /// Removes the subtree rooted at `id`. The parent branch pointing at it is
    /// removed as well.
    pub fn remove_subtree(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes.get(id).and_then(|node| node.parent)
            && let Some(node) = self.nodes.get_mut(parent)
        {
            node.branches.retain(|branch| branch.child != id);
        }

        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(current) {
                stack.extend(node.branches.iter().map(|branch| branch.child));
            }
        }
    }

    fn extract(&self, from: NodeId) -> Vec<(NodeId, Node)> {
        self.preorder_from(from)
            .map(|id| (id, self.nodes[id].clone()))
            .collect()
    }

    fn insert_subtree(&mut self, subtree: Vec<(NodeId, Node)>) -> NodeId {
        let mut mapping: FxHashMap<NodeId, NodeId> = FxHashMap::default();
        let mut inserted = Vec::with_capacity(subtree.len());

        for (old, node) in subtree {
            let new = self.nodes.insert(node);
            mapping.insert(old, new);
            inserted.push(new);
        }

        for (i, id) in inserted.iter().enumerate() {
            let node = &mut self.nodes[*id];
            node.parent = if i == 0 {
                None
            } else {
                node.parent.and_then(|p| mapping.get(&p).copied())
            };
            for branch in node.branches.iter_mut() {
                if let Some(child) = mapping.get(&branch.child) {
                    branch.child = *child;
                }
            }
            node.relevance.redirect(&mapping);
            if let Some(question) = node.question.as_mut()
                && let Some(into) = question.collapsed_into.as_mut()
                && let Some(mapped) = mapping.get(into)
            {
                *into = *mapped;
            }
        }

        inserted[0]
    }
}

/// Pre-order iterator driven by an explicit stack.
pub struct Preorder<'a> {
    tree: &'a Tree,
    stack: Vec<NodeId>,
}

impl Iterator for Preorder<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        let node = &self.tree.nodes[id];
        self.stack
            .extend(node.branches.iter().rev().map(|branch| branch.child));
        Some(id)
    }
}
