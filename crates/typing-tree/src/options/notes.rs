use crate::config::{Config, Labels, QuestionType};
use crate::error::{Error, Result};
use crate::expr::{Atom, Expr};
use crate::question::{QuestionBinding, SEGMENT_NOTE_QUESTION};
use crate::tree::{BranchKind, Node, NodeId, NodeKind, Tree};

/// Appends a note naming the segment reached under every leaf, one per
/// predicted class, guarded by the strata predicting it.
pub(super) fn add_segment_notes(mut tree: Tree, config: &Config) -> Result<Tree> {
    let prefixes = config.settings.labels("segment_note_label");
    let leaves = tree.leaves().collect::<Vec<NodeId>>();

    for leaf in leaves {
        let node = tree.node(leaf);
        if node
            .branches
            .iter()
            .any(|branch| matches!(tree.node(branch.child).kind, NodeKind::Note { .. }))
        {
            continue;
        }

        let mut notes = Vec::new();
        for (class, strata) in node.kind.class_groups() {
            let segment = config.segments.get(&class).ok_or_else(|| {
                Error::missing("segment", class.clone(), format!("leaf at {}", node.describe()))
            })?;

            let provenance = node
                .provenance
                .iter()
                .filter(|origin| strata.contains(&origin.stratum))
                .cloned()
                .collect();
            let mut note = Node::new(
                NodeKind::Note {
                    segment: class.clone(),
                    strata: strata.clone(),
                },
                provenance,
            );

            let mut binding = QuestionBinding::new(SEGMENT_NOTE_QUESTION, QuestionType::Note);
            binding.labels = note_labels(&prefixes, &segment.labels);
            binding.segments = vec![(class.clone(), strata.clone())];
            note.question = Some(binding);
            note.relevance = node.relevance.conjoin(Expr::Atom(Atom::Stratum {
                strata: strata.clone(),
            }));

            notes.push((BranchKind::Stratum(strata), note));
        }

        for (kind, note) in notes {
            tree.add_child(leaf, kind, note);
        }
    }

    Ok(tree)
}

fn note_labels(prefixes: &Labels, segment: &Labels) -> Labels {
    segment
        .iter()
        .map(|(language, label)| {
            let text = match prefixes.get(language) {
                Some(prefix) => format!("{} {}", prefix, label),
                None => label.clone(),
            };
            (language.clone(), text)
        })
        .collect()
}
