//! End-to-end compilation of stratum models into a form and diagrams.
use std::path::Path;

use crate::builder::build_tree;
use crate::config::{Config, OptionSpec, validate_against_models};
use crate::dedup::merge_duplicate_questions;
use crate::emit::{ChoiceRow, DiagramOptions, EmitOptions, Sheet, SurveyRow, diagram, form_rows};
use crate::error::{Error, Result};
use crate::merge::merge_trees;
use crate::options::{OptionEngine, Transform};
use crate::relevance::compile_relevance;
use crate::rpart::{CartModel, parse_rpart};
use crate::stratum::Stratum;
use crate::tree::Tree;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormOptions {
    pub merge_duplicate_questions: bool,
    /// Restrict select questions to the choices still reachable at each node.
    pub skip_unavailable_choices: bool,
    pub enable_screening: bool,
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            merge_duplicate_questions: true,
            skip_unavailable_choices: false,
            enable_screening: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FormOutput {
    pub survey: Vec<SurveyRow>,
    pub choices: Vec<ChoiceRow>,
    pub settings: Vec<(String, String)>,
    /// Flowchart of the compiled form, notes skipped.
    pub diagram: String,
    pub tree: Tree,
}

impl FormOutput {
    pub fn sheets(&self) -> [Sheet; 3] {
        [
            Sheet::survey(&self.survey),
            Sheet::choices(&self.choices),
            Sheet::settings(&self.settings),
        ]
    }

    /// Writes the three sheets and `<version>.txt` holding the diagram.
    pub fn save(&self, dir: &Path, version: &str) -> Result<()> {
        for sheet in self.sheets() {
            sheet.save(dir)?;
        }
        let path = dir.join(format!("{}.txt", version));
        std::fs::write(&path, &self.diagram).map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })?;
        tracing::info!(dir = %dir.display(), version, "wrote form");
        Ok(())
    }
}

/// Parses, builds and merges the tree of every stratum, then compiles the
/// relevance of every node.
pub fn build_merged_tree(models: &[(Stratum, CartModel)]) -> Result<Tree> {
    let trees = models
        .iter()
        .map(|(stratum, model)| {
            let parsed = parse_rpart(model)?;
            let tree = build_tree(&parsed, stratum)?;
            tracing::debug!(stratum = %stratum, nodes = tree.len(), "built tree");
            Ok((stratum.clone(), tree))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(compile_relevance(merge_trees(trees)?))
}

/// Compiles the models into form rows: bind, configured split and calculate
/// options, segment notes, relevance simplification, optional choice
/// filtering, optional duplicate merging, hide options, emission.
pub fn compile_form(models: &[(Stratum, CartModel)], config: &Config, options: &FormOptions) -> Result<FormOutput> {
    validate_against_models(config, models)?;
    let tree = build_merged_tree(models)?;

    let mut transforms = config
        .options
        .iter()
        .filter(|option| !matches!(option, OptionSpec::Hide { .. }))
        .map(Transform::from)
        .collect::<Vec<_>>();
    transforms.push(Transform::SegmentNotes);
    transforms.push(Transform::EnforceRelevance);
    if options.skip_unavailable_choices {
        transforms.push(Transform::FilterChoices);
    }

    let engine = OptionEngine::new(config);
    let mut tree = engine.run(tree, &transforms)?;

    if options.merge_duplicate_questions {
        tree = merge_duplicate_questions(tree)?;
    }
    for option in config
        .options
        .iter()
        .filter(|option| matches!(option, OptionSpec::Hide { .. }))
    {
        tree = engine.apply(tree, &Transform::from(option))?;
    }

    let rows = form_rows(
        &tree,
        config,
        &EmitOptions {
            enable_screening: options.enable_screening,
        },
    );
    let diagram = diagram(
        &tree,
        Some(config),
        &DiagramOptions {
            skip_notes: true,
            question_labels: true,
            ..Default::default()
        },
    );

    tracing::info!(
        rows = rows.survey.len(),
        choices = rows.choices.len(),
        nodes = tree.len(),
        "compiled form"
    );

    Ok(FormOutput {
        survey: rows.survey,
        choices: rows.choices,
        settings: rows.settings,
        diagram,
        tree,
    })
}

/// Diagram of the merged models without any configuration.
pub fn cart_diagram(models: &[(Stratum, CartModel)], options: &DiagramOptions) -> Result<String> {
    let tree = build_merged_tree(models)?;
    Ok(diagram(&tree, None, options))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Choice, Question, QuestionType};
    use crate::rpart::{NodeRecord, Variable};

    fn model(threshold: f64) -> CartModel {
        CartModel {
            nodes: vec![
                NodeRecord::split(1, 0, -1, threshold, 1),
                NodeRecord::leaf(2, 1),
                NodeRecord::split(3, 1, 2, 1.0, 2),
                NodeRecord::leaf(6, 1),
                NodeRecord::leaf(7, 2),
            ],
            ylevels: vec!["poor".into(), "rich".into()],
            xlevels: vec![
                Variable {
                    name: "hh_size".into(),
                    levels: Vec::new(),
                },
                Variable {
                    name: "region".into(),
                    levels: vec!["north".into(), "south".into()],
                },
            ],
            csplit: vec![vec![1, 3]],
        }
    }

    fn models() -> Vec<(Stratum, CartModel)> {
        vec![(Stratum::rural(), model(4.5)), (Stratum::urban(), model(6.5))]
    }

    fn config() -> Config {
        Config::default()
            .with_question(Question::new("hh_size", QuestionType::Integer))
            .with_question(Question::new("region", QuestionType::SelectOne))
            .with_choices("region", vec![Choice::new("north"), Choice::new("south")])
            .with_segment("poor", "English (en)", "Poor")
            .with_segment("rich", "English (en)", "Rich")
            .with_option(OptionSpec::Hide {
                src_question: "region".into(),
                choices: vec!["south".into()],
            })
    }

    #[test]
    fn test_compile_form() {
        // both `poor` leaves collapse into the last one, with their notes
        let output = compile_form(&models(), &config(), &FormOptions::default()).unwrap();
        let names = output.survey.iter().map(|row| row.name.as_str()).collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![
                "typing",
                "strata",
                "hh_size",
                "region",
                "segment_1",
                "segment_note",
                "segment_2",
                "segment_note_2",
                "segment",
                "",
            ]
        );
        let region = output.survey.iter().find(|row| row.name == "region").unwrap();
        assert_eq!(region.choice_filter, "name = 'north'");
        assert!(output.diagram.starts_with("flowchart TD\n"));
        assert_eq!(output.sheets()[0].rows.len(), output.survey.len());

        let unmerged = compile_form(
            &models(),
            &config(),
            &FormOptions {
                merge_duplicate_questions: false,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(unmerged.survey.len(), output.survey.len() + 2);
    }

    #[test]
    fn test_compile_form_missing_segment() {
        let config = Config {
            segments: Default::default(),
            ..config()
        };
        assert!(matches!(
            compile_form(&models(), &config, &FormOptions::default()),
            Err(Error::ConfigReference { kind: "segment", .. })
        ));
    }

    #[test]
    fn test_cart_diagram() {
        let text = cart_diagram(&models(), &DiagramOptions::default()).unwrap();
        assert!(text.contains("n1[\"hh_size < 4.5 (rural); hh_size < 6.5 (urban)\"]"));
    }
}
