//! Serialization of a compiled tree into form rows and diagram text.
mod diagram;
mod form;
mod names;
mod sheet;
mod xpath;

pub use diagram::{DiagramOptions, EdgeLabels, diagram};
pub use form::{ChoiceRow, EmitOptions, FormRows, SurveyRow, form_rows};
pub use names::RowNames;
pub use sheet::Sheet;
pub use xpath::{render, row_relevance};
