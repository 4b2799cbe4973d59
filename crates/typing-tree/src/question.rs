use smol_str::SmolStr;

use crate::config::{Choice, Labels, QuestionType};
use crate::stratum::Stratum;
use crate::tree::NodeId;

/// Identifier of the rows recording the segment reached at a leaf.
pub const SEGMENT_QUESTION: &str = "segment";
/// Identifier of the notes announcing the segment reached.
pub const SEGMENT_NOTE_QUESTION: &str = "segment_note";

/// Calculation attached to a question, emitted as its own `calculate` row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Calculation {
    pub name: SmolStr,
    pub expression: String,
}

/// Question a node is asked as.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionBinding {
    /// Question identifier. Repeated occurrences share it.
    pub question: SmolStr,
    pub kind: QuestionType,
    pub list_name: Option<SmolStr>,
    pub labels: Labels,
    pub hints: Labels,
    /// Every configured choice, in configured order.
    pub choices: Vec<Choice>,
    /// Choices still reachable at this node, `None` when unfiltered.
    pub available: Option<Vec<SmolStr>>,
    pub hidden: Vec<SmolStr>,
    pub calculations: Vec<Calculation>,
    pub required: bool,
    /// Classes assigned per strata, for segment rows.
    pub segments: Vec<(SmolStr, Vec<Stratum>)>,
    /// Strata the question is asked for when fewer than the strata reaching it.
    pub guard: Option<Vec<Stratum>>,
    /// Rows are always numbered (`segment_1`, `segment_2`, ...).
    pub numbered: bool,
    pub collapsed_into: Option<NodeId>,
}

impl QuestionBinding {
    pub fn new(question: impl Into<SmolStr>, kind: QuestionType) -> Self {
        Self {
            question: question.into(),
            kind,
            list_name: None,
            labels: Labels::new(),
            hints: Labels::new(),
            choices: Vec::new(),
            available: None,
            hidden: Vec::new(),
            calculations: Vec::new(),
            required: kind.is_required(),
            segments: Vec::new(),
            guard: None,
            numbered: false,
            collapsed_into: None,
        }
    }

    /// Choices shown to the enumerator: the available ones, minus hidden ones.
    pub fn offered_choices(&self) -> Vec<&SmolStr> {
        self.choices
            .iter()
            .map(|choice| &choice.name)
            .filter(|name| {
                self.available
                    .as_ref()
                    .is_none_or(|available| available.contains(name))
            })
            .filter(|name| !self.hidden.contains(name))
            .collect()
    }

    pub fn has_choice(&self, name: &str) -> bool {
        self.choices.iter().any(|choice| choice.name == name)
    }
}
