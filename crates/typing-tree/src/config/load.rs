use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use csv::ReaderBuilder;
use smol_str::SmolStr;

use super::{Choice, Config, Labels, OptionSpec, Question, QuestionType, ScreeningQuestion, Segment, Settings};
use crate::error::{Error, Result};

type Row = BTreeMap<String, String>;

/// One configuration table as header/value maps.
#[derive(Debug, Clone, Default)]
pub(crate) struct Table {
    name: &'static str,
    rows: Vec<Row>,
}

impl Table {
    pub(crate) fn read(name: &'static str, reader: impl Read) -> Result<Self> {
        let mut reader = ReaderBuilder::new().flexible(true).trim(csv::Trim::All).from_reader(reader);
        let headers = reader
            .headers()
            .map_err(|source| Error::Csv {
                context: format!("{}.csv", name),
                source,
            })?
            .clone();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|source| Error::Csv {
                context: format!("{}.csv", name),
                source,
            })?;
            let row: Row = headers
                .iter()
                .zip(record.iter())
                .map(|(header, value)| (header.to_string(), value.to_string()))
                .collect();
            // spreadsheets export trailing blank lines
            if row.values().any(|value| !value.is_empty()) {
                rows.push(row);
            }
        }

        Ok(Self { name, rows })
    }

    fn open(dir: &Path, name: &'static str, optional: bool) -> Result<Self> {
        let path = dir.join(format!("{}.csv", name));
        if optional && !path.exists() {
            return Ok(Self { name, rows: Vec::new() });
        }

        let file = std::fs::File::open(&path).map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::read(name, file)
    }

    fn required<'a>(&self, row: &'a Row, column: &str) -> Result<&'a str> {
        row.get(column)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| Error::config(self.name, format!("missing value in column `{}`", column)))
    }
}

fn optional<'a>(row: &'a Row, column: &str) -> &'a str {
    row.get(column).map(String::as_str).unwrap_or_default()
}

/// Collects `<prefix>::<language>` columns, and a plain `<prefix>` column
/// under the empty language.
fn labels(row: &Row, prefix: &str) -> Labels {
    row.iter()
        .filter(|(_, value)| !value.is_empty())
        .filter_map(|(column, value)| {
            if column == prefix {
                Some((String::new(), value.clone()))
            } else {
                let language = column.strip_prefix(prefix)?.strip_prefix("::")?;
                Some((language.to_string(), value.clone()))
            }
        })
        .collect()
}

fn truthy(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "true" | "yes" | "1")
}

impl Config {
    /// Loads every table of a configuration directory and validates it.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        tracing::debug!(dir = %dir.display(), "loading configuration");

        let config = Self::from_tables(
            &Table::open(dir, "questions", false)?,
            &Table::open(dir, "choices", false)?,
            &Table::open(dir, "options", true)?,
            &Table::open(dir, "segments", false)?,
            &Table::open(dir, "settings", true)?,
            &Table::open(dir, "screening_questions", true)?,
            &Table::open(dir, "screening_choices", true)?,
        )?;
        config.validate()?;
        Ok(config)
    }

    pub(crate) fn from_tables(
        questions: &Table,
        choices: &Table,
        options: &Table,
        segments: &Table,
        settings: &Table,
        screening_questions: &Table,
        screening_choices: &Table,
    ) -> Result<Self> {
        let mut config = Config::default();

        for row in &questions.rows {
            let name = SmolStr::new(questions.required(row, "name")?);
            let type_column = questions.required(row, "type")?;
            let kind = type_column.parse::<QuestionType>()?;
            let list_name = if kind.is_select() {
                Some(
                    type_column
                        .split_whitespace()
                        .nth(1)
                        .map(SmolStr::new)
                        .unwrap_or_else(|| name.clone()),
                )
            } else {
                None
            };

            let question = Question {
                name: name.clone(),
                kind,
                list_name,
                labels: labels(row, "label"),
                hints: labels(row, "hint"),
            };
            if config.questions.insert(name.clone(), question).is_some() {
                return Err(Error::config("questions", format!("duplicate question `{}`", name)));
            }
        }

        for row in &choices.rows {
            let list_name = SmolStr::new(choices.required(row, "list_name")?);
            let choice = Choice {
                name: SmolStr::new(choices.required(row, "name")?),
                labels: labels(row, "label"),
            };
            config.choices.entry(list_name).or_default().push(choice);
        }

        for row in &options.rows {
            let kind = options.required(row, "option")?;
            let mut value: serde_json::Value =
                serde_json::from_str(options.required(row, "config")?).map_err(|source| Error::Json {
                    context: format!("options.csv `{}` config", kind),
                    source,
                })?;
            let Some(object) = value.as_object_mut() else {
                return Err(Error::config(
                    "options",
                    format!("config of option `{}` is not a JSON object", kind),
                ));
            };
            if !matches!(kind, "split" | "calculate" | "hide") {
                return Err(Error::config("options", format!("unknown option `{}`", kind)));
            }
            object.insert("option".to_string(), serde_json::Value::String(kind.to_string()));

            let option: OptionSpec = serde_json::from_value(value).map_err(|source| Error::Json {
                context: format!("options.csv `{}` config", kind),
                source,
            })?;
            config.options.push(option);
        }

        for row in &segments.rows {
            let name = SmolStr::new(segments.required(row, "name")?);
            config.segments.insert(
                name.clone(),
                Segment {
                    name,
                    labels: labels(row, "label"),
                },
            );
        }

        config.settings = Settings::new(
            settings
                .rows
                .iter()
                .map(|row| Ok((settings.required(row, "key")?.to_string(), optional(row, "value").to_string())))
                .collect::<Result<Vec<_>>>()?,
        );

        for row in &screening_questions.rows {
            config.screening_questions.push(ScreeningQuestion {
                kind: screening_questions.required(row, "type")?.to_string(),
                name: SmolStr::new(optional(row, "name")),
                labels: labels(row, "label"),
                hints: labels(row, "hint"),
                relevant: optional(row, "relevant").to_string(),
                required: truthy(optional(row, "required")),
                calculation: optional(row, "calculation").to_string(),
            });
        }

        for row in &screening_choices.rows {
            config.screening_choices.push((
                SmolStr::new(screening_choices.required(row, "list_name")?),
                Choice {
                    name: SmolStr::new(screening_choices.required(row, "name")?),
                    labels: labels(row, "label"),
                },
            ));
        }

        tracing::debug!(
            questions = config.questions.len(),
            options = config.options.len(),
            segments = config.segments.len(),
            "configuration loaded"
        );
        Ok(config)
    }
}
