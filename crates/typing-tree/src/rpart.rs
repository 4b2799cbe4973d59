//! Decoding of the flat tables an `rpart` fit is exported as.
use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::{Error, Result};
use crate::rule::{Comparator, SplitRule};

/// A candidate variable of the fit. Numeric variables have no levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: SmolStr,
    #[serde(default)]
    pub levels: Vec<SmolStr>,
}

impl Variable {
    pub fn is_categorical(&self) -> bool {
        !self.levels.is_empty()
    }
}

/// One row of the exported frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: u64,
    #[serde(default)]
    pub n: u64,
    /// 0-based index into the variable schema, absent for terminal nodes.
    #[serde(default)]
    pub var: Option<usize>,
    #[serde(default)]
    pub ncat: i64,
    #[serde(default)]
    pub index: f64,
    /// Comparator routing left, overriding the one implied by `ncat`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<SmolStr>,
    /// 1-based index into the class labels.
    pub yval: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yprob: Option<Vec<f64>>,
}

impl NodeRecord {
    pub fn leaf(id: u64, yval: usize) -> Self {
        Self {
            id,
            n: 0,
            var: None,
            ncat: 0,
            index: 0.0,
            op: None,
            yval,
            yprob: None,
        }
    }

    pub fn split(id: u64, var: usize, ncat: i64, index: f64, yval: usize) -> Self {
        Self {
            var: Some(var),
            ncat,
            index,
            ..Self::leaf(id, yval)
        }
    }

    pub fn with_op(mut self, op: &str) -> Self {
        self.op = Some(op.into());
        self
    }

    pub fn is_split(&self) -> bool {
        self.var.is_some()
    }
}

/// Serialized classification tree of one stratum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartModel {
    pub nodes: Vec<NodeRecord>,
    pub ylevels: Vec<SmolStr>,
    #[serde(default)]
    pub xlevels: Vec<Variable>,
    #[serde(default)]
    pub csplit: Vec<Vec<u8>>,
}

impl CartModel {
    pub fn from_json(json: &str, context: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|source| Error::Json {
            context: context.to_string(),
            source,
        })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json, &path.display().to_string())
    }

    /// Variables referenced by at least one split, in first-use order.
    pub fn split_variables(&self) -> Vec<&Variable> {
        let mut used: Vec<&Variable> = Vec::new();
        for var in self.nodes.iter().filter_map(|node| node.var) {
            if let Some(variable) = self.xlevels.get(var)
                && !used.iter().any(|v| v.name == variable.name)
            {
                used.push(variable);
            }
        }
        used
    }
}

/// Class distribution of one node.
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
    pub class: SmolStr,
    pub n: u64,
    pub probabilities: Vec<f64>,
}

/// Typed view of a [`CartModel`].
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedModel {
    pub rules: BTreeMap<u64, SplitRule>,
    pub distributions: BTreeMap<u64, Distribution>,
    pub variables: Vec<Variable>,
    pub classes: Vec<SmolStr>,
}

impl ParsedModel {
    pub fn variable_names(&self) -> Vec<SmolStr> {
        self.variables.iter().map(|v| v.name.clone()).collect()
    }
}

const LEFT: u8 = 1;
const ABSENT: u8 = 2;
const RIGHT: u8 = 3;

/// Decodes the split tables of a model. Nothing is coerced: any disagreement
/// between the node rows and the level or category tables is an error naming
/// the node.
pub fn parse_rpart(model: &CartModel) -> Result<ParsedModel> {
    let mut rules = BTreeMap::new();
    let mut distributions = BTreeMap::new();

    for record in &model.nodes {
        if record.id == 0 {
            return Err(Error::malformed(0, "node id 0 is not a valid position"));
        }
        if distributions.contains_key(&record.id) {
            return Err(Error::malformed(record.id, "duplicate node id"));
        }

        distributions.insert(record.id, parse_distribution(model, record)?);
        if let Some(var) = record.var {
            rules.insert(record.id, parse_rule(model, record, var)?);
        }
    }

    tracing::debug!(
        nodes = model.nodes.len(),
        splits = rules.len(),
        "parsed rpart model"
    );

    Ok(ParsedModel {
        rules,
        distributions,
        variables: model.xlevels.clone(),
        classes: model.ylevels.clone(),
    })
}

fn parse_distribution(model: &CartModel, record: &NodeRecord) -> Result<Distribution> {
    let class = record
        .yval
        .checked_sub(1)
        .and_then(|i| model.ylevels.get(i))
        .ok_or_else(|| {
            Error::malformed(
                record.id,
                format!(
                    "class index {} out of range 1..={}",
                    record.yval,
                    model.ylevels.len()
                ),
            )
        })?;

    let probabilities = record.yprob.clone().unwrap_or_default();
    if !probabilities.is_empty() && probabilities.len() != model.ylevels.len() {
        return Err(Error::malformed(
            record.id,
            format!(
                "class distribution has {} entries for {} classes",
                probabilities.len(),
                model.ylevels.len()
            ),
        ));
    }

    Ok(Distribution {
        class: class.clone(),
        n: record.n,
        probabilities,
    })
}

fn parse_rule(model: &CartModel, record: &NodeRecord, var: usize) -> Result<SplitRule> {
    let variable = model.xlevels.get(var).ok_or_else(|| {
        Error::malformed(
            record.id,
            format!("variable index {} out of range 0..{}", var, model.xlevels.len()),
        )
    })?;

    match record.ncat {
        -1 | 1 => {
            if variable.is_categorical() {
                return Err(Error::malformed(
                    record.id,
                    format!(
                        "ncat {} on categorical variable `{}` with {} levels",
                        record.ncat,
                        variable.name,
                        variable.levels.len()
                    ),
                ));
            }
            if !record.index.is_finite() {
                return Err(Error::malformed(
                    record.id,
                    format!("threshold {} is not finite", record.index),
                ));
            }

            let comparator = match &record.op {
                Some(op) => Comparator::parse(op).ok_or_else(|| {
                    Error::malformed(record.id, format!("unknown comparator `{}`", op))
                })?,
                None if record.ncat == -1 => Comparator::Lt,
                None => Comparator::Ge,
            };

            Ok(SplitRule::Numeric {
                variable: variable.name.clone(),
                comparator,
                threshold: record.index,
            })
        }
        ncat if ncat > 1 => parse_categorical(model, record, variable, ncat as usize),
        ncat => Err(Error::malformed(
            record.id,
            format!("ncat {} is not a valid split kind", ncat),
        )),
    }
}

fn parse_categorical(
    model: &CartModel,
    record: &NodeRecord,
    variable: &Variable,
    ncat: usize,
) -> Result<SplitRule> {
    if variable.levels.len() != ncat {
        return Err(Error::malformed(
            record.id,
            format!(
                "ncat {} but variable `{}` declares {} levels",
                ncat,
                variable.name,
                variable.levels.len()
            ),
        ));
    }

    let row_index = record.index;
    let row = (row_index.fract() == 0.0 && row_index >= 1.0)
        .then(|| model.csplit.get(row_index as usize - 1))
        .flatten()
        .ok_or_else(|| {
            Error::malformed(
                record.id,
                format!(
                    "category row {} out of range 1..={}",
                    row_index,
                    model.csplit.len()
                ),
            )
        })?;

    if row.len() < ncat || row[ncat..].iter().any(|code| *code != ABSENT) {
        return Err(Error::malformed(
            record.id,
            format!(
                "category row {} has {} codes for {} levels",
                row_index,
                row.len(),
                ncat
            ),
        ));
    }

    let mut left = Vec::new();
    let mut right = Vec::new();
    for (level, code) in variable.levels.iter().zip(row.iter()) {
        match *code {
            LEFT => left.push(level.clone()),
            RIGHT => right.push(level.clone()),
            ABSENT => {}
            code => {
                return Err(Error::malformed(
                    record.id,
                    format!("unknown category code {} for level `{}`", code, level),
                ));
            }
        }
    }

    if left.is_empty() || right.is_empty() {
        return Err(Error::malformed(
            record.id,
            format!("categorical split on `{}` routes no level to one side", variable.name),
        ));
    }

    Ok(SplitRule::Categorical {
        variable: variable.name.clone(),
        left,
        right,
    })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn model(nodes: Vec<NodeRecord>) -> CartModel {
        CartModel {
            nodes,
            ylevels: vec!["poor".into(), "non_poor".into()],
            xlevels: vec![
                Variable {
                    name: "hh_size".into(),
                    levels: Vec::new(),
                },
                Variable {
                    name: "region".into(),
                    levels: vec!["a".into(), "b".into(), "c".into()],
                },
            ],
            csplit: vec![vec![1, 3, 2], vec![3, 1, 1]],
        }
    }

    fn stump(root: NodeRecord) -> CartModel {
        model(vec![root, NodeRecord::leaf(2, 1), NodeRecord::leaf(3, 2)])
    }

    #[rstest]
    #[case::less_than(
        NodeRecord::split(1, 0, -1, 4.5, 1),
        SplitRule::Numeric { variable: "hh_size".into(), comparator: Comparator::Lt, threshold: 4.5 }
    )]
    #[case::greater_equal(
        NodeRecord::split(1, 0, 1, 2.5, 1),
        SplitRule::Numeric { variable: "hh_size".into(), comparator: Comparator::Ge, threshold: 2.5 }
    )]
    #[case::explicit_op(
        NodeRecord::split(1, 0, -1, 4.0, 1).with_op("<="),
        SplitRule::Numeric { variable: "hh_size".into(), comparator: Comparator::Le, threshold: 4.0 }
    )]
    #[case::categorical(
        NodeRecord::split(1, 1, 3, 1.0, 1),
        SplitRule::Categorical { variable: "region".into(), left: vec!["a".into()], right: vec!["b".into()] }
    )]
    #[case::categorical_second_row(
        NodeRecord::split(1, 1, 3, 2.0, 1),
        SplitRule::Categorical { variable: "region".into(), left: vec!["b".into(), "c".into()], right: vec!["a".into()] }
    )]
    fn test_parse_rule(#[case] root: NodeRecord, #[case] expected: SplitRule) {
        let parsed = parse_rpart(&stump(root)).unwrap();
        assert_eq!(parsed.rules.get(&1), Some(&expected));
        assert_eq!(parsed.rules.len(), 1);
        assert_eq!(parsed.distributions.len(), 3);
        assert_eq!(parsed.distributions[&3].class, "non_poor");
    }

    #[rstest]
    #[case::variable_out_of_range(NodeRecord::split(1, 5, -1, 4.5, 1))]
    #[case::class_out_of_range(NodeRecord::split(1, 0, -1, 4.5, 3))]
    #[case::class_zero(NodeRecord::split(1, 0, -1, 4.5, 0))]
    #[case::row_out_of_range(NodeRecord::split(1, 1, 3, 3.0, 1))]
    #[case::fractional_row(NodeRecord::split(1, 1, 3, 1.5, 1))]
    #[case::ncat_mismatch(NodeRecord::split(1, 1, 2, 1.0, 1))]
    #[case::numeric_on_categorical(NodeRecord::split(1, 1, -1, 1.0, 1))]
    #[case::categorical_on_numeric(NodeRecord::split(1, 0, 3, 1.0, 1))]
    #[case::invalid_ncat(NodeRecord::split(1, 0, 0, 1.0, 1))]
    #[case::unknown_op(NodeRecord::split(1, 0, -1, 4.5, 1).with_op("=="))]
    #[case::infinite_threshold(NodeRecord::split(1, 0, -1, f64::INFINITY, 1))]
    fn test_malformed(#[case] root: NodeRecord) {
        let err = parse_rpart(&stump(root)).unwrap_err();
        assert!(matches!(err, Error::MalformedModel { node: 1, .. }), "{err:?}");
    }

    #[rstest]
    #[case::short_row(vec![vec![1, 3]])]
    #[case::extra_codes(vec![vec![1, 3, 2, 1]])]
    #[case::empty_side(vec![vec![1, 1, 2]])]
    #[case::unknown_code(vec![vec![1, 4, 3]])]
    fn test_malformed_csplit(#[case] csplit: Vec<Vec<u8>>) {
        let mut cart = stump(NodeRecord::split(1, 1, 3, 1.0, 1));
        cart.csplit = csplit;
        assert!(matches!(
            parse_rpart(&cart),
            Err(Error::MalformedModel { node: 1, .. })
        ));
    }

    #[test]
    fn test_trailing_absent_codes_are_accepted() {
        let mut cart = stump(NodeRecord::split(1, 1, 3, 1.0, 1));
        cart.csplit = vec![vec![1, 3, 3, 2, 2]];
        assert!(parse_rpart(&cart).is_ok());
    }

    #[rstest]
    #[case::duplicate(vec![NodeRecord::leaf(1, 1), NodeRecord::leaf(1, 2)], 1)]
    #[case::zero(vec![NodeRecord::leaf(0, 1)], 0)]
    fn test_invalid_ids(#[case] nodes: Vec<NodeRecord>, #[case] node: u64) {
        assert!(matches!(
            parse_rpart(&model(nodes)),
            Err(Error::MalformedModel { node: n, .. }) if n == node
        ));
    }

    #[test]
    fn test_distribution_length() {
        let mut root = NodeRecord::leaf(1, 1);
        root.yprob = Some(vec![0.2, 0.3, 0.5]);
        assert!(matches!(
            parse_rpart(&model(vec![root])),
            Err(Error::MalformedModel { node: 1, .. })
        ));
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "nodes": [
                {"id": 1, "n": 120, "var": 0, "ncat": -1, "index": 4.5, "yval": 1, "yprob": [0.6, 0.4]},
                {"id": 2, "n": 70, "var": null, "yval": 1},
                {"id": 3, "n": 50, "yval": 2}
            ],
            "ylevels": ["poor", "non_poor"],
            "xlevels": [{"name": "hh_size", "levels": []}]
        }"#;
        let cart = CartModel::from_json(json, "rural.json").unwrap();
        assert_eq!(cart.nodes.len(), 3);
        assert_eq!(cart.split_variables().len(), 1);

        let parsed = parse_rpart(&cart).unwrap();
        assert_eq!(parsed.distributions[&1].probabilities, vec![0.6, 0.4]);
        assert_eq!(parsed.distributions[&1].n, 120);
    }

    #[test]
    fn test_from_json_invalid() {
        assert!(matches!(
            CartModel::from_json("{\"nodes\": 1}", "urban.json"),
            Err(Error::Json { .. })
        ));
    }
}
