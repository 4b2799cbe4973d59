//! Skeleton configuration tables derived from fitted models.
use std::path::Path;

use itertools::Itertools;
use smol_str::SmolStr;

use crate::config::DEFAULT_LANGUAGE;
use crate::emit::Sheet;
use crate::error::Result;
use crate::rpart::{CartModel, Variable, parse_rpart};
use crate::rule::SplitRule;
use crate::stratum::Stratum;

const DEFAULT_SETTINGS: [(&str, &str); 6] = [
    ("form_title", "Typing tool"),
    ("form_id", "typing_tool"),
    ("default_language", DEFAULT_LANGUAGE),
    ("typing_group_label::English (en)", "Typing"),
    ("segment_note_label::English (en)", "Segment:"),
    ("strata_label::English (en)", "Stratum"),
];

/// The tables of a configuration directory, ready to be filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigTemplate {
    pub questions: Sheet,
    pub choices: Sheet,
    pub options: Sheet,
    pub segments: Sheet,
    pub settings: Sheet,
}

impl ConfigTemplate {
    /// One question per split variable, its levels as choices, and one
    /// segment per class of any model. Labels default to the identifiers.
    pub fn from_models(models: &[(Stratum, CartModel)]) -> Result<Self> {
        let label = format!("label::{}", DEFAULT_LANGUAGE);

        let mut variables: Vec<&Variable> = Vec::new();
        let mut thresholds: Vec<(SmolStr, f64)> = Vec::new();
        let mut classes: Vec<SmolStr> = Vec::new();

        for (stratum, model) in models {
            let parsed = parse_rpart(model)?;
            for variable in model.split_variables() {
                if !variables.iter().any(|v| v.name == variable.name) {
                    variables.push(variable);
                }
            }
            thresholds.extend(parsed.rules.values().filter_map(|rule| match rule {
                SplitRule::Numeric {
                    variable, threshold, ..
                } => Some((variable.clone(), *threshold)),
                SplitRule::Categorical { .. } => None,
            }));
            for class in parsed.classes {
                if !classes.contains(&class) {
                    classes.push(class);
                }
            }
            tracing::debug!(stratum = %stratum, "collected template entries");
        }

        let questions = variables
            .iter()
            .map(|variable| {
                let kind = if variable.is_categorical() {
                    format!("select_one {}", variable.name)
                } else if thresholds
                    .iter()
                    .filter(|(name, _)| *name == variable.name)
                    .all(|(_, threshold)| (threshold * 2.0).fract() == 0.0)
                {
                    "integer".to_string()
                } else {
                    "decimal".to_string()
                };
                vec![variable.name.to_string(), kind, variable.name.to_string()]
            })
            .collect();

        let choices = variables
            .iter()
            .flat_map(|variable| {
                variable
                    .levels
                    .iter()
                    .map(|level| vec![variable.name.to_string(), level.to_string(), level.to_string()])
            })
            .collect();

        let segments = classes
            .iter()
            .map(|class| vec![class.to_string(), class.to_string()])
            .collect();

        Ok(Self {
            questions: table("questions", &["name", "type", &label], questions),
            choices: table("choices", &["list_name", "name", &label], choices),
            options: table("options", &["option", "config"], Vec::new()),
            segments: table("segments", &["name", &label], segments),
            settings: table(
                "settings",
                &["key", "value"],
                DEFAULT_SETTINGS
                    .iter()
                    .map(|(key, value)| vec![key.to_string(), value.to_string()])
                    .collect(),
            ),
        })
    }

    pub fn sheets(&self) -> [&Sheet; 5] {
        [&self.questions, &self.choices, &self.options, &self.segments, &self.settings]
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        for sheet in self.sheets() {
            sheet.save(dir)?;
        }
        tracing::info!(
            dir = %dir.display(),
            tables = %self.sheets().iter().map(|sheet| sheet.name).join(", "),
            "wrote configuration template"
        );
        Ok(())
    }
}

fn table(name: &'static str, headers: &[&str], rows: Vec<Vec<String>>) -> Sheet {
    Sheet {
        name,
        headers: headers.iter().map(|header| header.to_string()).collect(),
        rows,
    }
}
