use miette::Diagnostic;
use smol_str::SmolStr;
use thiserror::Error;

use crate::Stratum;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by the typing tool pipeline.
///
/// Every variant is fatal for the stage that raised it. Nothing is retried.
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error("Malformed model at node {node}: {reason}")]
    #[diagnostic(
        code(typing::malformed_model),
        help("the split, level and category tables of the CART output disagree")
    )]
    MalformedModel { node: u64, reason: String },

    #[error("Incomplete tree: node {node} {reason}")]
    #[diagnostic(code(typing::incomplete_tree))]
    IncompleteTree { node: u64, reason: String },

    #[error("Cannot merge `{left}` and `{right}` trees: {reason}")]
    #[diagnostic(code(typing::merge_conflict))]
    MergeConflict {
        left: Stratum,
        right: Stratum,
        reason: String,
    },

    #[error("Unknown {kind} `{name}` referenced by {context}")]
    #[diagnostic(
        code(typing::config_reference),
        help("add the missing entry to the configuration or fix the reference")
    )]
    ConfigReference {
        kind: &'static str,
        name: SmolStr,
        context: String,
    },

    #[error("Cannot merge duplicate questions `{question}`: {reason}")]
    #[diagnostic(code(typing::duplicate_resolution))]
    DuplicateResolution { question: SmolStr, reason: String },

    #[error("Invalid configuration in {table}: {reason}")]
    #[diagnostic(code(typing::config))]
    Config { table: &'static str, reason: String },

    #[error("Failed to access {path}")]
    #[diagnostic(code(typing::io))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {context}")]
    #[diagnostic(code(typing::json))]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid CSV in {context}")]
    #[diagnostic(code(typing::csv))]
    Csv {
        context: String,
        #[source]
        source: csv::Error,
    },
}

impl Error {
    pub(crate) fn malformed(node: u64, reason: impl Into<String>) -> Self {
        Error::MalformedModel {
            node,
            reason: reason.into(),
        }
    }

    pub(crate) fn incomplete(node: u64, reason: impl Into<String>) -> Self {
        Error::IncompleteTree {
            node,
            reason: reason.into(),
        }
    }

    pub(crate) fn missing(kind: &'static str, name: impl Into<SmolStr>, context: impl Into<String>) -> Self {
        Error::ConfigReference {
            kind,
            name: name.into(),
            context: context.into(),
        }
    }

    pub(crate) fn config(table: &'static str, reason: impl Into<String>) -> Self {
        Error::Config {
            table,
            reason: reason.into(),
        }
    }

    /// Identifier of the offending entry, used by callers to point at the input to fix.
    pub fn offending(&self) -> Option<String> {
        match self {
            Error::MalformedModel { node, .. } | Error::IncompleteTree { node, .. } => Some(node.to_string()),
            Error::ConfigReference { name, .. } => Some(name.to_string()),
            Error::DuplicateResolution { question, .. } => Some(question.to_string()),
            Error::MergeConflict { right, .. } => Some(right.to_string()),
            Error::Config { .. } | Error::Io { .. } | Error::Json { .. } | Error::Csv { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::malformed(Error::malformed(3, "class index 4 out of range"), Some("3"))]
    #[case::incomplete(Error::incomplete(2, "has no right child 5"), Some("2"))]
    #[case::reference(Error::missing("question", "hh_size", "option `hide`"), Some("hh_size"))]
    #[case::config(Error::config("options", "unknown option kind"), None)]
    fn test_offending(#[case] error: Error, #[case] expected: Option<&str>) {
        assert_eq!(error.offending().as_deref(), expected);
    }

    #[test]
    fn test_display() {
        let error = Error::missing("choice", "urban", "option `hide` on `strata`");
        assert_eq!(
            error.to_string(),
            "Unknown choice `urban` referenced by option `hide` on `strata`"
        );
    }
}
