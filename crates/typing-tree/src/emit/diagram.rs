use itertools::Itertools;
use rustc_hash::FxHashMap;

use crate::config::{Config, DEFAULT_LANGUAGE, Labels};
use crate::rule::Side;
use crate::tree::{Branch, BranchKind, Node, NodeId, NodeKind, Tree};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EdgeLabels {
    /// The condition for following the edge, e.g. `<= 4`.
    #[default]
    Condition,
    YesNo,
    /// Configured labels of the choices on split branches.
    ChoiceLabels,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagramOptions {
    /// Prefix node labels with their position in the source models.
    pub add_node_id: bool,
    pub edge_labels: EdgeLabels,
    pub skip_notes: bool,
    /// Label bound nodes with their question text instead of the split rule.
    pub question_labels: bool,
}

/// Renders a tree as a Mermaid flowchart.
pub fn diagram(tree: &Tree, config: Option<&Config>, options: &DiagramOptions) -> String {
    let language = config
        .map(|config| config.settings.default_language())
        .unwrap_or(DEFAULT_LANGUAGE);

    let visible = tree
        .preorder()
        .filter(|id| !(options.skip_notes && matches!(tree.node(*id).kind, NodeKind::Note { .. })))
        .collect::<Vec<_>>();
    let ids: FxHashMap<NodeId, usize> = visible.iter().enumerate().map(|(i, id)| (*id, i + 1)).collect();

    let mut lines = vec!["flowchart TD".to_string()];

    for id in &visible {
        let node = tree.node(*id);
        let mut label = node_label(node, language, options);
        if options.add_node_id {
            label = format!("{}<br>{}", node.describe(), label);
        }
        let label = escape(&label);
        let shape = match node.kind {
            NodeKind::Split { .. } => format!("[\"{}\"]", label),
            NodeKind::Leaf { .. } => format!("([\"{}\"])", label),
            NodeKind::Note { .. } => format!(">\"{}\"]", label),
        };
        lines.push(format!("    n{}{}", ids[id], shape));
    }

    for id in &visible {
        let node = tree.node(*id);
        for branch in &node.branches {
            let Some(child) = ids.get(&branch.child) else {
                continue;
            };
            let arrow = if branch.hidden { "-.->" } else { "-->" };
            match edge_label(node, branch, language, options) {
                Some(label) => lines.push(format!(
                    "    n{} {}|\"{}\"| n{}",
                    ids[id],
                    arrow,
                    escape(&label),
                    child
                )),
                None => lines.push(format!("    n{} {} n{}", ids[id], arrow, child)),
            }
        }
    }

    let mut diagram = lines.join("\n");
    diagram.push('\n');
    diagram
}

fn node_label(node: &Node, language: &str, options: &DiagramOptions) -> String {
    if options.question_labels
        && !node.kind.is_leaf()
        && let Some(text) = node.question.as_ref().and_then(|binding| label_in(&binding.labels, language))
    {
        return text;
    }

    match &node.kind {
        NodeKind::Split { .. } => per_stratum(
            node.kind
                .rule_groups()
                .into_iter()
                .map(|(strata, rule)| (strata, rule.to_string())),
        ),
        NodeKind::Leaf { .. } => per_stratum(
            node.kind
                .class_groups()
                .into_iter()
                .map(|(class, strata)| (strata, class.to_string())),
        ),
        NodeKind::Note { segment, .. } => segment.to_string(),
    }
}

fn edge_label(node: &Node, branch: &Branch, language: &str, options: &DiagramOptions) -> Option<String> {
    match (&branch.kind, options.edge_labels) {
        (BranchKind::Stratum(strata), _) => Some(strata.iter().join(", ")),
        (BranchKind::Left, EdgeLabels::YesNo) => Some("yes".to_string()),
        (BranchKind::Right, EdgeLabels::YesNo) => Some("no".to_string()),
        (BranchKind::Left | BranchKind::Right, _) => {
            let side = match branch.kind {
                BranchKind::Left => Side::Left,
                _ => Side::Right,
            };
            Some(per_stratum(
                node.kind
                    .rule_groups()
                    .into_iter()
                    .map(|(strata, rule)| (strata, rule.side_label(side))),
            ))
        }
        (BranchKind::Choice(value), EdgeLabels::ChoiceLabels) => node
            .question
            .as_ref()
            .and_then(|binding| binding.choices.iter().find(|choice| &choice.name == value))
            .and_then(|choice| label_in(&choice.labels, language))
            .or_else(|| Some(value.to_string())),
        (BranchKind::Choice(value), _) => Some(value.to_string()),
    }
}

/// One label, or one per stratum group when the groups differ.
fn per_stratum(groups: impl Iterator<Item = (Vec<crate::Stratum>, String)>) -> String {
    let groups = groups.collect::<Vec<_>>();
    match groups.as_slice() {
        [(_, label)] => label.clone(),
        groups => groups
            .iter()
            .map(|(strata, label)| format!("{} ({})", label, strata.iter().join(", ")))
            .join("; "),
    }
}

fn label_in(labels: &Labels, language: &str) -> Option<String> {
    labels
        .get(language)
        .or_else(|| labels.get(""))
        .or_else(|| labels.values().next())
        .cloned()
}

fn escape(label: &str) -> String {
    label.replace('"', "#quot;")
}
