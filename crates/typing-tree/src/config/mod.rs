//! Typed configuration tables of a typing tool.
//!
//! A configuration is a directory of CSV tables, one per spreadsheet tab:
//! `questions.csv`, `choices.csv`, `options.csv`, `segments.csv`,
//! `settings.csv` and optionally `screening_questions.csv` and
//! `screening_choices.csv`. Label and hint columns are named
//! `label::<language>` and `hint::<language>`.
mod load;
mod validate;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::{Error, Result};

pub use validate::validate_against_models;

/// Text per language, keyed by the language part of a `label::<language>`
/// column. The plain `label` column is stored under the empty key.
pub type Labels = BTreeMap<String, String>;

pub const DEFAULT_LANGUAGE: &str = "English (en)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Integer,
    Decimal,
    Text,
    SelectOne,
    SelectMultiple,
    Note,
    Calculate,
}

impl QuestionType {
    pub fn is_select(self) -> bool {
        matches!(self, QuestionType::SelectOne | QuestionType::SelectMultiple)
    }

    /// Answer types the enumerator cannot skip.
    pub fn is_required(self) -> bool {
        matches!(
            self,
            QuestionType::Integer | QuestionType::Decimal | QuestionType::SelectOne | QuestionType::Text
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QuestionType::Integer => "integer",
            QuestionType::Decimal => "decimal",
            QuestionType::Text => "text",
            QuestionType::SelectOne => "select_one",
            QuestionType::SelectMultiple => "select_multiple",
            QuestionType::Note => "note",
            QuestionType::Calculate => "calculate",
        }
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for QuestionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        // select types may carry their list name, e.g. `select_one region`
        let kind = s.split_whitespace().next().unwrap_or_default();
        match kind {
            "integer" => Ok(QuestionType::Integer),
            "decimal" => Ok(QuestionType::Decimal),
            "text" => Ok(QuestionType::Text),
            "select_one" => Ok(QuestionType::SelectOne),
            "select_multiple" => Ok(QuestionType::SelectMultiple),
            "note" => Ok(QuestionType::Note),
            "calculate" => Ok(QuestionType::Calculate),
            _ => Err(Error::config("questions", format!("unknown question type `{}`", s))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    pub name: SmolStr,
    pub kind: QuestionType,
    /// Choice list of select questions. Defaults to the question name.
    pub list_name: Option<SmolStr>,
    pub labels: Labels,
    pub hints: Labels,
}

impl Question {
    pub fn new(name: impl Into<SmolStr>, kind: QuestionType) -> Self {
        let name = name.into();
        Self {
            list_name: kind.is_select().then(|| name.clone()),
            name,
            kind,
            labels: Labels::new(),
            hints: Labels::new(),
        }
    }

    pub fn with_label(mut self, language: &str, text: &str) -> Self {
        self.labels.insert(language.to_string(), text.to_string());
        self
    }

    pub fn with_hint(mut self, language: &str, text: &str) -> Self {
        self.hints.insert(language.to_string(), text.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    pub name: SmolStr,
    pub labels: Labels,
}

impl Choice {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            labels: Labels::new(),
        }
    }

    pub fn with_label(mut self, language: &str, text: &str) -> Self {
        self.labels.insert(language.to_string(), text.to_string());
        self
    }
}

/// A configured transform, one row of `options.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "option", rename_all = "snake_case")]
pub enum OptionSpec {
    Split {
        src_question: SmolStr,
    },
    Calculate {
        src_question: SmolStr,
        name: SmolStr,
        calculation: String,
    },
    Hide {
        src_question: SmolStr,
        choices: Vec<SmolStr>,
    },
}

impl OptionSpec {
    pub fn src_question(&self) -> &SmolStr {
        match self {
            OptionSpec::Split { src_question }
            | OptionSpec::Calculate { src_question, .. }
            | OptionSpec::Hide { src_question, .. } => src_question,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            OptionSpec::Split { .. } => "split",
            OptionSpec::Calculate { .. } => "calculate",
            OptionSpec::Hide { .. } => "hide",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub name: SmolStr,
    pub labels: Labels,
}

/// Ordered `key`/`value` pairs of `settings.csv`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    entries: Vec<(String, String)>,
}

impl Settings {
    pub fn new(entries: Vec<(String, String)>) -> Self {
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set(&mut self, key: &str, value: &str) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_string(),
            None => self.entries.push((key.to_string(), value.to_string())),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Values of `<prefix>::<language>` keys, keyed by language.
    pub fn labels(&self, prefix: &str) -> Labels {
        self.iter()
            .filter_map(|(key, value)| {
                let language = key.strip_prefix(prefix)?.strip_prefix("::")?;
                Some((language.to_string(), value.to_string()))
            })
            .collect()
    }

    pub fn default_language(&self) -> &str {
        self.get("default_language").unwrap_or(DEFAULT_LANGUAGE)
    }

    /// Name of the row holding the respondent's stratum.
    pub fn strata_question(&self) -> &str {
        self.get("strata_question").unwrap_or("strata")
    }
}

/// A row of `screening_questions.csv`, emitted verbatim ahead of the typing group.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreeningQuestion {
    pub kind: String,
    pub name: SmolStr,
    pub labels: Labels,
    pub hints: Labels,
    pub relevant: String,
    pub required: bool,
    pub calculation: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub questions: BTreeMap<SmolStr, Question>,
    /// Choice lists by list name, choices in configured order.
    pub choices: BTreeMap<SmolStr, Vec<Choice>>,
    pub options: Vec<OptionSpec>,
    pub segments: BTreeMap<SmolStr, Segment>,
    pub settings: Settings,
    pub screening_questions: Vec<ScreeningQuestion>,
    pub screening_choices: Vec<(SmolStr, Choice)>,
}

impl Config {
    pub fn question(&self, name: &str) -> Option<&Question> {
        self.questions.get(name)
    }

    /// Choices offered by a question, empty for non-select questions.
    pub fn choices_of(&self, question: &Question) -> &[Choice] {
        question
            .list_name
            .as_ref()
            .and_then(|list| self.choices.get(list))
            .map(|choices| choices.as_slice())
            .unwrap_or_default()
    }

    pub fn with_question(mut self, question: Question) -> Self {
        self.questions.insert(question.name.clone(), question);
        self
    }

    pub fn with_choices(mut self, list_name: &str, choices: Vec<Choice>) -> Self {
        self.choices.insert(list_name.into(), choices);
        self
    }

    pub fn with_option(mut self, option: OptionSpec) -> Self {
        self.options.push(option);
        self
    }

    pub fn with_segment(mut self, name: &str, language: &str, label: &str) -> Self {
        let mut labels = Labels::new();
        labels.insert(language.to_string(), label.to_string());
        self.segments.insert(
            name.into(),
            Segment {
                name: name.into(),
                labels,
            },
        );
        self
    }

    pub fn with_setting(mut self, key: &str, value: &str) -> Self {
        self.settings.set(key, value);
        self
    }

    /// Cross-checks the tables against each other.
    pub fn validate(&self) -> Result<()> {
        for question in self.questions.values() {
            if question.kind.is_select() {
                let list = question.list_name.as_ref().unwrap_or(&question.name);
                if !self.choices.contains_key(list) {
                    return Err(Error::missing(
                        "choice list",
                        list.clone(),
                        format!("question `{}`", question.name),
                    ));
                }
            }
        }

        for option in &self.options {
            let context = format!("option `{}`", option.kind());
            let question = self
                .question(option.src_question())
                .ok_or_else(|| Error::missing("question", option.src_question().clone(), context.clone()))?;

            match option {
                OptionSpec::Split { .. } if !question.kind.is_select() => {
                    return Err(Error::missing("choice list", question.name.clone(), context));
                }
                OptionSpec::Hide { choices, .. } => {
                    let offered = self.choices_of(question);
                    if let Some(choice) = choices
                        .iter()
                        .find(|choice| !offered.iter().any(|c| &c.name == *choice))
                    {
                        return Err(Error::missing(
                            "choice",
                            choice.clone(),
                            format!("option `hide` on `{}`", question.name),
                        ));
                    }
                }
                OptionSpec::Calculate { name, .. } if name.is_empty() => {
                    return Err(Error::config(
                        "options",
                        format!("calculate option on `{}` has no name", question.name),
                    ));
                }
                _ => {}
            }
        }

        Ok(())
    }
}
