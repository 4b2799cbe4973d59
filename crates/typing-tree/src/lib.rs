//! Rebuilds `rpart` classification trees fitted per stratum, merges them and
//! compiles the result into an XLSForm typing tool and Mermaid diagrams.
//!
//! ## Example
//!
//! ```rust
//! use typing_tree::{CartModel, DiagramOptions, NodeRecord, Stratum, Variable, cart_diagram};
//!
//! let model = |threshold| CartModel {
//!     nodes: vec![
//!         NodeRecord::split(1, 0, -1, threshold, 1),
//!         NodeRecord::leaf(2, 1),
//!         NodeRecord::leaf(3, 2),
//!     ],
//!     ylevels: vec!["poor".into(), "rich".into()],
//!     xlevels: vec![Variable { name: "hh_size".into(), levels: Vec::new() }],
//!     csplit: Vec::new(),
//! };
//!
//! let diagram = cart_diagram(
//!     &[(Stratum::rural(), model(4.5)), (Stratum::urban(), model(6.5))],
//!     &DiagramOptions::default(),
//! )
//! .unwrap();
//! assert!(diagram.starts_with("flowchart TD"));
//! ```
mod builder;
mod config;
mod dedup;
mod emit;
mod error;
mod expr;
mod merge;
mod options;
mod pipeline;
mod question;
mod relevance;
mod rpart;
mod rule;
mod stratum;
mod template;
mod tree;

pub use builder::build_tree;
pub use config::Choice;
pub use config::Config;
pub use config::DEFAULT_LANGUAGE;
pub use config::Labels;
pub use config::OptionSpec;
pub use config::Question;
pub use config::QuestionType;
pub use config::ScreeningQuestion;
pub use config::Segment;
pub use config::Settings;
pub use config::validate_against_models;
pub use dedup::merge_duplicate_questions;
pub use emit::ChoiceRow;
pub use emit::DiagramOptions;
pub use emit::EdgeLabels;
pub use emit::EmitOptions;
pub use emit::FormRows;
pub use emit::RowNames;
pub use emit::Sheet;
pub use emit::SurveyRow;
pub use emit::diagram;
pub use emit::form_rows;
pub use emit::render;
pub use emit::row_relevance;
pub use error::Error;
pub use error::Result;
pub use expr::Answer;
pub use expr::Atom;
pub use expr::Expr;
pub use expr::Respondent;
pub use merge::merge_trees;
pub use options::OptionEngine;
pub use options::Transform;
pub use options::bind_questions;
pub use options::enforce_relevance;
pub use pipeline::FormOptions;
pub use pipeline::FormOutput;
pub use pipeline::build_merged_tree;
pub use pipeline::cart_diagram;
pub use pipeline::compile_form;
pub use question::Calculation;
pub use question::QuestionBinding;
pub use question::SEGMENT_NOTE_QUESTION;
pub use question::SEGMENT_QUESTION;
pub use relevance::compile_relevance;
pub use relevance::edge_condition;
pub use relevance::split_guard;
pub use rpart::CartModel;
pub use rpart::Distribution;
pub use rpart::NodeRecord;
pub use rpart::ParsedModel;
pub use rpart::Variable;
pub use rpart::parse_rpart;
pub use rule::Comparator;
pub use rule::Side;
pub use rule::SplitRule;
pub use stratum::Stratum;
pub use template::ConfigTemplate;
pub use tree::Branch;
pub use tree::BranchKind;
pub use tree::Node;
pub use tree::NodeId;
pub use tree::NodeKind;
pub use tree::Origin;
pub use tree::Outcome;
pub use tree::Preorder;
pub use tree::Tree;
