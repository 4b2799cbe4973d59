//! A rural/urban pair of fitted models and a configuration covering them.
//!
//! Both models share the candidate variables `hh_size`, `region`, `has_land`
//! and `rooms`, and the classes `poor`, `vulnerable` and `better_off`.
use smol_str::SmolStr;
use typing_tree::{Answer, CartModel, Respondent, Side, SplitRule, Stratum, Tree, parse_rpart, row_relevance};

/// `hh_size < 4.5`, then `region` on the left and `has_land` on the right.
pub const RURAL_MODEL: &str = r#"{
  "nodes": [
    {"id": 1, "n": 400, "var": 0, "ncat": -1, "index": 4.5, "yval": 2},
    {"id": 2, "n": 220, "var": 1, "ncat": 3, "index": 1, "yval": 1},
    {"id": 3, "n": 180, "var": 2, "ncat": 2, "index": 2, "yval": 2},
    {"id": 4, "n": 130, "yval": 1, "yprob": [0.7, 0.2, 0.1]},
    {"id": 5, "n": 90, "yval": 2, "yprob": [0.2, 0.6, 0.2]},
    {"id": 6, "n": 100, "yval": 2, "yprob": [0.3, 0.5, 0.2]},
    {"id": 7, "n": 80, "yval": 3, "yprob": [0.1, 0.2, 0.7]}
  ],
  "ylevels": ["poor", "vulnerable", "better_off"],
  "xlevels": [
    {"name": "hh_size"},
    {"name": "region", "levels": ["north", "south", "east"]},
    {"name": "has_land", "levels": ["no", "yes"]},
    {"name": "rooms"}
  ],
  "csplit": [[1, 3, 1], [1, 3, 2]]
}"#;

/// `hh_size < 5.5`, then `rooms` on the left and `region` on the right,
/// where `south` is absent from the fit.
pub const URBAN_MODEL: &str = r#"{
  "nodes": [
    {"id": 1, "n": 300, "var": 0, "ncat": -1, "index": 5.5, "yval": 2},
    {"id": 2, "n": 160, "var": 3, "ncat": -1, "index": 2.5, "yval": 1},
    {"id": 3, "n": 140, "var": 1, "ncat": 3, "index": 1, "yval": 2},
    {"id": 4, "n": 70, "yval": 1},
    {"id": 5, "n": 90, "yval": 2},
    {"id": 6, "n": 60, "yval": 2},
    {"id": 7, "n": 80, "yval": 3}
  ],
  "ylevels": ["poor", "vulnerable", "better_off"],
  "xlevels": [
    {"name": "hh_size"},
    {"name": "region", "levels": ["north", "south", "east"]},
    {"name": "has_land", "levels": ["no", "yes"]},
    {"name": "rooms"}
  ],
  "csplit": [[1, 2, 3]]
}"#;

pub const QUESTIONS: &str = "\
name,type,label::English (en),hint::English (en)
hh_size,integer,How many people live in the household?,Count everyone who slept here last night
region,select_one region,Which region is the household in?,
has_land,select_one yes_no,Does the household own land?,
rooms,integer,How many rooms does the dwelling have?,
";

pub const CHOICES: &str = "\
list_name,name,label::English (en)
region,north,North
region,south,South
region,east,East
yes_no,no,No
yes_no,yes,Yes
";

pub const OPTIONS: &str = r#"option,config
split,"{""src_question"": ""has_land""}"
calculate,"{""src_question"": ""hh_size"", ""name"": ""adults"", ""calculation"": ""${hh_size} - 1""}"
"#;

pub const SEGMENTS: &str = "\
name,label::English (en)
poor,Poor
vulnerable,Vulnerable
better_off,Better off
";

pub const SETTINGS: &str = "\
key,value
form_title,Household typing
form_id,household_typing
version,1
segment_note_label::English (en),Segment:
";

/// The configuration tables, keyed by table name.
pub fn config_tables() -> Vec<(&'static str, &'static str)> {
    vec![
        ("questions", QUESTIONS),
        ("choices", CHOICES),
        ("options", OPTIONS),
        ("segments", SEGMENTS),
        ("settings", SETTINGS),
    ]
}

pub fn models() -> Vec<(Stratum, CartModel)> {
    vec![
        (
            Stratum::rural(),
            CartModel::from_json(RURAL_MODEL, "rural").expect("Failed to parse rural model"),
        ),
        (
            Stratum::urban(),
            CartModel::from_json(URBAN_MODEL, "urban").expect("Failed to parse urban model"),
        ),
    ]
}

/// Every combination of answers to the fixture questions, per stratum.
pub fn respondents() -> Vec<Respondent> {
    let mut respondents = Vec::new();
    for stratum in [Stratum::rural(), Stratum::urban()] {
        for hh_size in [1.0, 4.0, 5.0, 6.0, 9.0] {
            for rooms in [1.0, 3.0] {
                for region in ["north", "south", "east"] {
                    for has_land in ["no", "yes"] {
                        respondents.push(
                            Respondent::new(stratum.clone())
                                .with_number("hh_size", hh_size)
                                .with_number("rooms", rooms)
                                .with_choice("region", region)
                                .with_choice("has_land", has_land),
                        );
                    }
                }
            }
        }
    }
    respondents
}

/// Class the model predicts for a respondent, `None` when an answer is
/// missing or absent from the fit.
pub fn predict(model: &CartModel, respondent: &Respondent) -> Option<SmolStr> {
    let parsed = parse_rpart(model).expect("Failed to parse model");
    let mut id = 1u64;
    loop {
        let Some(rule) = parsed.rules.get(&id) else {
            return parsed.distributions.get(&id).map(|d| d.class.clone());
        };
        let answer = respondent.answers.get(rule.variable())?;
        let left = match (rule, answer) {
            (SplitRule::Numeric { comparator, threshold, .. }, Answer::Number(value)) => {
                comparator.holds(*value, *threshold)
            }
            (SplitRule::Categorical { .. }, Answer::Choice(value)) => {
                rule.route(value)? == Side::Left
            }
            _ => return None,
        };
        id = if left { id * 2 } else { id * 2 + 1 };
    }
}

/// Classes assigned to a respondent by the visible segment rows of a
/// compiled tree, sorted and deduplicated.
pub fn assigned_segments(tree: &Tree, respondent: &Respondent) -> Vec<SmolStr> {
    let universe = tree.strata();
    let mut segments = tree
        .preorder()
        .filter(|id| tree.node(*id).kind.is_leaf())
        .filter(|id| {
            tree.node(*id)
                .question
                .as_ref()
                .is_some_and(|binding| binding.collapsed_into.is_none())
        })
        .filter(|id| row_relevance(tree, *id, &universe).eval(respondent))
        .flat_map(|id| {
            tree.node(id)
                .question
                .as_ref()
                .map(|binding| binding.segments.clone())
                .unwrap_or_default()
        })
        .filter(|(_, strata)| strata.contains(&respondent.stratum))
        .map(|(class, _)| class)
        .collect::<Vec<_>>();
    segments.sort();
    segments.dedup();
    segments
}

/// Classes assigned when a respondent fills the compiled form row by row.
///
/// Each emitted row is checked against the answers given above it only, the
/// way a form without field lists is answered. Sorted and deduplicated.
pub fn answered_in_order(tree: &Tree, respondent: &Respondent) -> Vec<SmolStr> {
    let universe = tree.strata();
    let mut known = Respondent::new(respondent.stratum.clone());
    let mut segments = Vec::new();

    for id in tree.preorder() {
        let node = tree.node(id);
        let Some(binding) = node.question.as_ref().filter(|binding| binding.collapsed_into.is_none()) else {
            continue;
        };
        if !row_relevance(tree, id, &universe).eval(&known) {
            continue;
        }
        if node.kind.is_leaf() {
            segments.extend(
                binding
                    .segments
                    .iter()
                    .filter(|(_, strata)| strata.contains(&respondent.stratum))
                    .map(|(class, _)| class.clone()),
            );
        } else if let Some(answer) = respondent.answers.get(&binding.question) {
            known.answers.insert(binding.question.clone(), answer.clone());
        }
    }
    segments.sort();
    segments.dedup();
    segments
}
