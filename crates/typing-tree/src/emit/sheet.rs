use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;

use csv::WriterBuilder;

use super::form::{ChoiceRow, SurveyRow};
use crate::config::Labels;
use crate::error::{Error, Result};

/// A worksheet of an XLSForm, written as CSV.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
    pub name: &'static str,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Sheet {
    pub fn survey(rows: &[SurveyRow]) -> Self {
        let label_languages = languages(rows.iter().map(|row| &row.labels));
        let hint_languages = languages(rows.iter().map(|row| &row.hints));

        let mut headers = vec!["type".to_string(), "name".to_string()];
        headers.extend(label_languages.iter().map(|language| column("label", language)));
        headers.extend(hint_languages.iter().map(|language| column("hint", language)));
        headers.extend(["required", "relevant", "calculation", "choice_filter"].map(String::from));

        let rows = rows
            .iter()
            .map(|row| {
                let mut cells = vec![row.kind.clone(), row.name.to_string()];
                cells.extend(cells_of(&row.labels, &label_languages));
                cells.extend(cells_of(&row.hints, &hint_languages));
                cells.push(if row.required { "yes" } else { "" }.to_string());
                cells.push(row.relevant.clone());
                cells.push(row.calculation.clone());
                cells.push(row.choice_filter.clone());
                cells
            })
            .collect();

        Self {
            name: "survey",
            headers,
            rows,
        }
    }

    pub fn choices(rows: &[ChoiceRow]) -> Self {
        let label_languages = languages(rows.iter().map(|row| &row.labels));

        let mut headers = vec!["list_name".to_string(), "name".to_string()];
        headers.extend(label_languages.iter().map(|language| column("label", language)));

        let rows = rows
            .iter()
            .map(|row| {
                let mut cells = vec![row.list_name.to_string(), row.name.to_string()];
                cells.extend(cells_of(&row.labels, &label_languages));
                cells
            })
            .collect();

        Self {
            name: "choices",
            headers,
            rows,
        }
    }

    pub fn settings(entries: &[(String, String)]) -> Self {
        Self {
            name: "settings",
            headers: entries.iter().map(|(key, _)| key.clone()).collect(),
            rows: if entries.is_empty() {
                Vec::new()
            } else {
                vec![entries.iter().map(|(_, value)| value.clone()).collect()]
            },
        }
    }

    pub fn write<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = WriterBuilder::new().flexible(false).from_writer(writer);
        let csv_error = |source| Error::Csv {
            context: format!("{}.csv", self.name),
            source,
        };

        writer.write_record(&self.headers).map_err(csv_error)?;
        for row in &self.rows {
            writer.write_record(row).map_err(csv_error)?;
        }
        writer.flush().map_err(|source| Error::Io {
            path: format!("{}.csv", self.name),
            source,
        })
    }

    pub fn to_csv_string(&self) -> Result<String> {
        let mut buf = Vec::new();
        self.write(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Writes `<name>.csv` into `dir`.
    pub fn save(&self, dir: &Path) -> Result<()> {
        let path = dir.join(format!("{}.csv", self.name));
        let file = std::fs::File::create(&path).map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.write(file)
    }
}

fn languages<'a>(labels: impl Iterator<Item = &'a Labels>) -> Vec<String> {
    labels
        .flat_map(|labels| labels.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn column(prefix: &str, language: &str) -> String {
    if language.is_empty() {
        prefix.to_string()
    } else {
        format!("{}::{}", prefix, language)
    }
}

fn cells_of<'a>(labels: &'a Labels, languages: &'a [String]) -> impl Iterator<Item = String> + 'a {
    languages
        .iter()
        .map(|language| labels.get(language).cloned().unwrap_or_default())
}
