use itertools::Itertools;
use smol_str::SmolStr;

use super::names::RowNames;
use super::xpath::{render, row_relevance};
use crate::config::{Config, Labels, QuestionType};
use crate::expr::{Atom, Expr};
use crate::question::{QuestionBinding, SEGMENT_QUESTION};
use crate::stratum::Stratum;
use crate::tree::Tree;

const TYPING_GROUP: &str = "typing";
/// Settings keys that configure the compiler and are not form settings.
const INTERNAL_SETTINGS: [&str; 3] = ["typing_group_", "segment_note_", "strata_"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SurveyRow {
    pub kind: String,
    pub name: SmolStr,
    pub labels: Labels,
    pub hints: Labels,
    pub required: bool,
    pub relevant: String,
    pub calculation: String,
    pub choice_filter: String,
}

impl SurveyRow {
    fn new(kind: impl Into<String>, name: impl Into<SmolStr>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceRow {
    pub list_name: SmolStr,
    pub name: SmolStr,
    pub labels: Labels,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormRows {
    pub survey: Vec<SurveyRow>,
    pub choices: Vec<ChoiceRow>,
    /// Column/value pairs of the single settings row.
    pub settings: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitOptions {
    pub enable_screening: bool,
}

/// Builds the survey, choices and settings rows of a compiled tree.
pub fn form_rows(tree: &Tree, config: &Config, options: &EmitOptions) -> FormRows {
    let settings = &config.settings;
    let strata_field = settings.strata_question();
    let universe = tree.strata();

    let screening = if options.enable_screening {
        config.screening_questions.as_slice()
    } else {
        &[]
    };
    let screening_provides_strata = screening.iter().any(|q| q.name == strata_field);
    let strata_row = universe.len() > 1 && !screening_provides_strata;

    let mut reserved = vec![TYPING_GROUP, SEGMENT_QUESTION];
    reserved.extend(screening.iter().map(|q| q.name.as_str()));
    let names = RowNames::assign(tree, strata_field, &reserved);

    let mut survey = Vec::new();
    let mut choices: Vec<ChoiceRow> = Vec::new();

    for question in screening {
        survey.push(SurveyRow {
            kind: question.kind.clone(),
            name: question.name.clone(),
            labels: question.labels.clone(),
            hints: question.hints.clone(),
            required: question.required,
            relevant: question.relevant.clone(),
            calculation: question.calculation.clone(),
            choice_filter: String::new(),
        });
    }
    if options.enable_screening {
        choices.extend(config.screening_choices.iter().map(|(list_name, choice)| ChoiceRow {
            list_name: list_name.clone(),
            name: choice.name.clone(),
            labels: choice.labels.clone(),
        }));
    }

    let mut group = SurveyRow::new("begin_group", TYPING_GROUP);
    group.labels = or_default(settings.labels("typing_group_label"), settings.default_language(), "Typing");
    group.relevant = settings.get("typing_group_relevant").unwrap_or_default().to_string();
    survey.push(group);

    if strata_row {
        let mut row = SurveyRow::new(format!("select_one {}", strata_field), strata_field);
        row.labels = or_default(settings.labels("strata_label"), settings.default_language(), "Stratum");
        row.required = true;
        survey.push(row);

        for stratum in &universe {
            let mut labels = Labels::new();
            labels.insert(settings.default_language().to_string(), title_case(stratum.as_str()));
            choices.push(ChoiceRow {
                list_name: SmolStr::new(strata_field),
                name: SmolStr::new(stratum.as_str()),
                labels,
            });
        }
    }

    let mut segment_rows = Vec::new();
    for id in tree.preorder() {
        let node = tree.node(id);
        let Some(binding) = node.question.as_ref() else {
            continue;
        };
        if binding.collapsed_into.is_some() {
            continue;
        }
        let Some(name) = names.get(id) else {
            continue;
        };
        let relevant = render(&row_relevance(tree, id, &universe), &names);

        let mut row = SurveyRow::new(row_type(binding), name.clone());
        row.labels = binding.labels.clone();
        row.hints = binding.hints.clone();
        row.required = binding.required;
        row.relevant = relevant.clone();
        row.choice_filter = choice_filter(binding);
        if binding.question == SEGMENT_QUESTION && binding.kind == QuestionType::Calculate {
            row.calculation = segment_calculation(&binding.segments, &names, &universe);
            segment_rows.push(name.clone());
        }
        survey.push(row);

        for (i, calculation) in binding.calculations.iter().enumerate() {
            let Some(calculation_name) = names.calculation(id, i) else {
                continue;
            };
            let mut row = SurveyRow::new(QuestionType::Calculate.as_str(), calculation_name.clone());
            row.relevant = relevant.clone();
            row.calculation = calculation
                .expression
                .replace(&format!("${{{}}}", binding.question), &format!("${{{}}}", name));
            survey.push(row);
        }

        if let Some(list_name) = &binding.list_name
            && !choices.iter().any(|c| &c.list_name == list_name)
        {
            choices.extend(binding.choices.iter().map(|choice| ChoiceRow {
                list_name: list_name.clone(),
                name: choice.name.clone(),
                labels: choice.labels.clone(),
            }));
        }
    }

    if !segment_rows.is_empty() {
        let mut row = SurveyRow::new(QuestionType::Calculate.as_str(), SEGMENT_QUESTION);
        row.calculation = format!(
            "concat({})",
            segment_rows.iter().map(|name| format!("${{{}}}", name)).join(", ")
        );
        survey.push(row);
    }

    survey.push(SurveyRow::new("end_group", ""));

    let settings = settings
        .iter()
        .filter(|(key, _)| !INTERNAL_SETTINGS.iter().any(|prefix| key.starts_with(prefix)))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();

    FormRows {
        survey,
        choices,
        settings,
    }
}

fn row_type(binding: &QuestionBinding) -> String {
    match (&binding.list_name, binding.kind.is_select()) {
        (Some(list_name), true) => format!("{} {}", binding.kind, list_name),
        _ => binding.kind.to_string(),
    }
}

/// Restricts the choices shown when some are filtered out or hidden.
fn choice_filter(binding: &QuestionBinding) -> String {
    if binding.available.is_none() && binding.hidden.is_empty() {
        return String::new();
    }
    let offered = binding.offered_choices();
    if offered.is_empty() {
        return "false()".to_string();
    }
    offered.iter().map(|name| format!("name = '{}'", name)).join(" or ")
}

/// The class a leaf assigns, picked by stratum when strata disagree.
fn segment_calculation(segments: &[(SmolStr, Vec<Stratum>)], names: &RowNames, universe: &[Stratum]) -> String {
    match segments {
        [] => "''".to_string(),
        [(class, _)] => format!("'{}'", class),
        _ => {
            let mut expression = "''".to_string();
            for (class, strata) in segments.iter().rev() {
                let condition = render(
                    &Expr::Atom(Atom::Stratum {
                        strata: strata.clone(),
                    })
                    .simplify(universe),
                    names,
                );
                expression = format!("if({}, '{}', {})", condition, class, expression);
            }
            expression
        }
    }
}

fn or_default(labels: Labels, language: &str, text: &str) -> Labels {
    if labels.is_empty() {
        let mut labels = Labels::new();
        labels.insert(language.to_string(), text.to_string());
        labels
    } else {
        labels
    }
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::config::{Choice, Question, ScreeningQuestion};
    use crate::options::{OptionEngine, Transform};
    use crate::relevance::compile_relevance;
    use crate::rule::{Comparator, SplitRule};
    use crate::tree::{BranchKind, Node, NodeKind, Origin, Outcome};

    fn tree() -> Tree {
        let rule = |threshold| SplitRule::Numeric {
            variable: "hh_size".into(),
            comparator: Comparator::Le,
            threshold,
        };
        let mut tree = Tree::new(
            Node::new(
                NodeKind::Split {
                    rules: vec![(Stratum::rural(), rule(4.0)), (Stratum::urban(), rule(6.0))],
                },
                vec![Origin::new(Stratum::rural(), 1), Origin::new(Stratum::urban(), 1)],
            ),
            vec!["hh_size".into()],
        );
        let root = tree.root();
        let outcome = |stratum: Stratum, class: &str| Outcome {
            stratum,
            class: class.into(),
            n: 1,
            probabilities: Vec::new(),
        };
        for (side, left_class, right_class, source) in [
            (BranchKind::Left, "poor", "poor", 2),
            (BranchKind::Right, "rich", "middle", 3),
        ] {
            tree.add_child(
                root,
                side,
                Node::new(
                    NodeKind::Leaf {
                        outcomes: vec![
                            outcome(Stratum::rural(), left_class),
                            outcome(Stratum::urban(), right_class),
                        ],
                    },
                    vec![Origin::new(Stratum::rural(), source), Origin::new(Stratum::urban(), source)],
                ),
            );
        }
        compile_relevance(tree)
    }

    fn config() -> Config {
        Config::default()
            .with_question(
                Question::new("hh_size", QuestionType::Integer)
                    .with_label("English (en)", "How many people live here?"),
            )
            .with_question(Question::new("consent", QuestionType::SelectOne))
            .with_choices("consent", vec![Choice::new("yes"), Choice::new("no")])
            .with_setting("form_title", "Typing tool")
            .with_setting("typing_group_label::English (en)", "Household typing")
            .with_setting("typing_group_relevant", "${consent} = 'yes'")
            .with_setting("strata_question", "strata")
    }

    fn compiled(config: &Config) -> Tree {
        OptionEngine::new(config)
            .run(tree(), &[Transform::EnforceRelevance])
            .unwrap()
    }

    #[test]
    fn test_survey_rows() {
        let config = config();
        let rows = form_rows(&compiled(&config), &config, &EmitOptions::default());
        let kinds = rows
            .survey
            .iter()
            .map(|row| (row.kind.as_str(), row.name.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![
                ("begin_group", "typing"),
                ("select_one strata", "strata"),
                ("integer", "hh_size"),
                ("calculate", "segment_1"),
                ("calculate", "segment_2"),
                ("calculate", "segment"),
                ("end_group", ""),
            ]
        );

        let group = &rows.survey[0];
        assert_eq!(group.relevant, "${consent} = 'yes'");
        assert_eq!(
            group.labels.get("English (en)").map(String::as_str),
            Some("Household typing")
        );

        let hh_size = &rows.survey[2];
        assert!(hh_size.required);
        assert_eq!(hh_size.relevant, "");

        assert_eq!(
            rows.survey[3].relevant,
            "(selected(${strata}, 'rural') and ${hh_size} <= 4) or (selected(${strata}, 'urban') and ${hh_size} <= 6)"
        );
        assert_eq!(rows.survey[3].calculation, "'poor'");
        assert_eq!(
            rows.survey[4].calculation,
            "if(selected(${strata}, 'rural'), 'rich', if(selected(${strata}, 'urban'), 'middle', ''))"
        );
        assert!(!rows.survey[4].required);
        assert_eq!(rows.survey[5].calculation, "concat(${segment_1}, ${segment_2})");

        assert_eq!(
            rows.choices.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            vec!["rural", "urban"]
        );
        assert_eq!(
            rows.settings,
            vec![("form_title".to_string(), "Typing tool".to_string())]
        );
    }

    #[rstest]
    #[case::screening_provides_strata(true, false)]
    #[case::without_screening(false, true)]
    fn test_screening(#[case] enable_screening: bool, #[case] strata_row: bool) {
        let mut config = config();
        config.screening_questions.push(ScreeningQuestion {
            kind: "select_one strata".into(),
            name: "strata".into(),
            labels: Labels::new(),
            hints: Labels::new(),
            relevant: String::new(),
            required: true,
            calculation: String::new(),
        });
        config.screening_choices.push(("strata".into(), Choice::new("rural")));
        config.screening_choices.push(("strata".into(), Choice::new("urban")));

        let rows = form_rows(&compiled(&config), &config, &EmitOptions { enable_screening });
        let strata_rows = rows.survey.iter().filter(|row| row.name == "strata").count();
        assert_eq!(strata_rows, 1);
        assert_eq!(rows.survey[0].kind == "begin_group", !enable_screening);
        let typing = rows.survey.iter().position(|row| row.name == "typing").unwrap();
        assert_eq!(rows.survey[typing + 1].name == "strata", strata_row);
        assert_eq!(rows.choices.len(), 2);
    }

    #[test]
    fn test_choice_filter() {
        let mut binding = QuestionBinding::new("consent", QuestionType::SelectOne);
        binding.choices = vec![Choice::new("yes"), Choice::new("no"), Choice::new("maybe")];
        assert_eq!(choice_filter(&binding), "");
        binding.hidden = vec!["maybe".into()];
        assert_eq!(choice_filter(&binding), "name = 'yes' or name = 'no'");
        binding.available = Some(vec!["maybe".into()]);
        assert_eq!(choice_filter(&binding), "false()");
    }

    #[test]
    fn test_single_stratum_has_no_strata_row() {
        let rule = SplitRule::Numeric {
            variable: "hh_size".into(),
            comparator: Comparator::Le,
            threshold: 4.0,
        };
        let mut tree = Tree::new(
            Node::new(
                NodeKind::Split {
                    rules: vec![(Stratum::rural(), rule)],
                },
                vec![Origin::new(Stratum::rural(), 1)],
            ),
            vec!["hh_size".into()],
        );
        let root = tree.root();
        for (side, source) in [(BranchKind::Left, 2), (BranchKind::Right, 3)] {
            tree.add_child(
                root,
                side,
                Node::new(
                    NodeKind::Leaf {
                        outcomes: vec![Outcome {
                            stratum: Stratum::rural(),
                            class: "poor".into(),
                            n: 1,
                            probabilities: Vec::new(),
                        }],
                    },
                    vec![Origin::new(Stratum::rural(), source)],
                ),
            );
        }
        let config = config();
        let tree = OptionEngine::new(&config).run(compile_relevance(tree), &[]).unwrap();
        let rows = form_rows(&tree, &config, &EmitOptions::default());
        assert!(rows.survey.iter().all(|row| row.name != "strata"));
        assert_eq!(rows.survey.len(), 6);
    }
}
