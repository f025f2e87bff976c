use std::fs;
use std::path::Path;

use csv::{ReaderBuilder, WriterBuilder};
use indexmap::IndexMap;
use tracing::debug;

use crate::{DatasetError, Example};

/// Reads and writes example files. Every loader assigns `input_keys` and
/// `output_keys` to the loaded rows, so a file never decides which fields are labels.
pub struct DataLoader;

impl DataLoader {
    /// Loads a JSON array of objects, or one object per line when `lines` is set.
    /// Non-string values are stored as their JSON text.
    pub fn load_json(
        path: impl AsRef<Path>,
        lines: bool,
        input_keys: &[&str],
        output_keys: &[&str],
    ) -> Result<Vec<Example>, DatasetError> {
        let data = fs::read_to_string(path.as_ref())?;

        let rows: Vec<serde_json::Map<String, serde_json::Value>> = if lines {
            data.lines()
                .filter(|line| !line.trim().is_empty())
                .map(serde_json::from_str)
                .collect::<Result<_, _>>()?
        } else {
            serde_json::from_str(&data)?
        };

        let examples: Vec<Example> = rows
            .into_iter()
            .map(|row| {
                let fields = row
                    .into_iter()
                    .map(|(key, value)| {
                        let value = match value {
                            serde_json::Value::String(text) => text,
                            other => other.to_string(),
                        };
                        (key, value)
                    })
                    .collect();
                Example::new(fields, to_owned(input_keys), to_owned(output_keys))
            })
            .collect();

        debug!(path = %path.as_ref().display(), count = examples.len(), "loaded json examples");
        Ok(examples)
    }

    pub fn save_json(
        path: impl AsRef<Path>,
        examples: &[Example],
        lines: bool,
    ) -> Result<(), DatasetError> {
        let data = if lines {
            examples
                .iter()
                .map(|example| serde_json::to_string(&example.data))
                .collect::<Result<Vec<_>, _>>()?
                .join("\n")
        } else {
            let rows: Vec<_> = examples.iter().map(|example| &example.data).collect();
            serde_json::to_string_pretty(&rows)?
        };
        fs::write(path, data)?;
        Ok(())
    }

    /// Loads a headed CSV file. Every column named in `input_keys` or
    /// `output_keys` must be present on every row.
    pub fn load_csv(
        path: impl AsRef<Path>,
        delimiter: char,
        input_keys: &[&str],
        output_keys: &[&str],
    ) -> Result<Vec<Example>, DatasetError> {
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter as u8)
            .has_headers(true)
            .from_path(path.as_ref())?;
        let headers = reader.headers()?.clone();

        let mut examples = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record?;
            let fields: IndexMap<String, String> = headers
                .iter()
                .zip(record.iter())
                .map(|(header, cell)| (header.to_string(), cell.to_string()))
                .collect();

            if let Some(column) = input_keys
                .iter()
                .chain(output_keys)
                .find(|key| !fields.contains_key(**key))
            {
                return Err(DatasetError::MissingColumn {
                    row,
                    column: column.to_string(),
                });
            }

            examples.push(Example::new(
                fields,
                to_owned(input_keys),
                to_owned(output_keys),
            ));
        }

        debug!(path = %path.as_ref().display(), count = examples.len(), "loaded csv examples");
        Ok(examples)
    }

    pub fn save_csv(
        path: impl AsRef<Path>,
        examples: &[Example],
        delimiter: char,
    ) -> Result<(), DatasetError> {
        let mut writer = WriterBuilder::new()
            .delimiter(delimiter as u8)
            .from_path(path)?;
        if let Some(first) = examples.first() {
            writer.write_record(first.data.keys())?;
        }
        for example in examples {
            writer.write_record(example.data.values())?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn to_owned(keys: &[&str]) -> Vec<String> {
    keys.iter().map(|key| key.to_string()).collect()
}
