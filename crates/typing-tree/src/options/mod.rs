//! Question binding and the configured transforms applied to a merged tree.
mod bind;
mod calculate;
mod enforce;
mod filter;
mod hide;
mod notes;
mod split;

use smol_str::SmolStr;

use crate::config::{Config, OptionSpec};
use crate::error::{Error, Result};
use crate::tree::{NodeId, Tree};

pub use bind::bind_questions;
pub use enforce::enforce_relevance;

/// One pass over the tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Transform {
    /// Replaces the yes/no branches of a question by one branch per choice.
    Split { src_question: SmolStr },
    Calculate {
        src_question: SmolStr,
        name: SmolStr,
        calculation: String,
    },
    Hide {
        src_question: SmolStr,
        choices: Vec<SmolStr>,
    },
    SegmentNotes,
    EnforceRelevance,
    FilterChoices,
}

impl From<&OptionSpec> for Transform {
    fn from(option: &OptionSpec) -> Self {
        match option {
            OptionSpec::Split { src_question } => Transform::Split {
                src_question: src_question.clone(),
            },
            OptionSpec::Calculate {
                src_question,
                name,
                calculation,
            } => Transform::Calculate {
                src_question: src_question.clone(),
                name: name.clone(),
                calculation: calculation.clone(),
            },
            OptionSpec::Hide { src_question, choices } => Transform::Hide {
                src_question: src_question.clone(),
                choices: choices.clone(),
            },
        }
    }
}

impl Transform {
    pub fn name(&self) -> &'static str {
        match self {
            Transform::Split { .. } => "split",
            Transform::Calculate { .. } => "calculate",
            Transform::Hide { .. } => "hide",
            Transform::SegmentNotes => "segment_notes",
            Transform::EnforceRelevance => "enforce_relevance",
            Transform::FilterChoices => "filter_choices",
        }
    }
}

/// Applies transforms in caller order, binding questions first.
#[derive(Debug, Clone, Copy)]
pub struct OptionEngine<'a> {
    config: &'a Config,
}

impl<'a> OptionEngine<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    pub fn run(&self, tree: Tree, transforms: &[Transform]) -> Result<Tree> {
        let mut tree = bind_questions(tree, self.config)?;
        for transform in transforms {
            tree = self.apply(tree, transform)?;
        }
        Ok(tree)
    }

    /// Applies one transform to an already bound tree.
    pub fn apply(&self, tree: Tree, transform: &Transform) -> Result<Tree> {
        tracing::debug!(transform = transform.name(), nodes = tree.len(), "applying transform");
        match transform {
            Transform::Split { src_question } => split::split(tree, src_question),
            Transform::Calculate {
                src_question,
                name,
                calculation,
            } => calculate::calculate(tree, src_question, name, calculation),
            Transform::Hide { src_question, choices } => hide::hide(tree, src_question, choices),
            Transform::SegmentNotes => notes::add_segment_notes(tree, self.config),
            Transform::EnforceRelevance => Ok(enforce_relevance(tree)),
            Transform::FilterChoices => Ok(filter::filter_choices(tree)),
        }
    }
}

/// Nodes bound to `question`, collapsed ones included, in pre-order.
fn bound_to(tree: &Tree, question: &str) -> Vec<NodeId> {
    tree.preorder()
        .filter(|id| {
            tree.node(*id)
                .question
                .as_ref()
                .is_some_and(|binding| binding.question == question)
        })
        .collect()
}

fn bound_or_missing(tree: &Tree, question: &SmolStr, option: &str) -> Result<Vec<NodeId>> {
    let nodes = bound_to(tree, question);
    if nodes.is_empty() {
        return Err(Error::missing(
            "question",
            question.clone(),
            format!("option `{}`: no node of the tree asks it", option),
        ));
    }
    Ok(nodes)
}
