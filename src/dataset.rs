//! Flat tabular datasets.
//!
//! A [`Dataset`] is an ordered column list plus string rows. It is the common
//! shape of contract artifacts, merged outputs, and flattened listing pages.
//! Appending a dataset with different columns takes the union of columns in
//! first-seen order and leaves missing cells empty.

use crate::cache::write_atomic;
use crate::error::{IngestError, IngestResult};
use std::path::Path;

/// Column list plus rows of string cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Dataset {
    /// Empty dataset with the given header.
    #[must_use]
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Column names in order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows in order.
    #[must_use]
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// No rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of `name` in the header.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Whether the header contains `name`.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Every cell of column `name`, top to bottom.
    #[must_use]
    pub fn column_values(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| row[idx].as_str()).collect())
    }

    /// Append one row.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::ValidationError`] if the row width does not
    /// match the header.
    pub fn push_row(&mut self, row: Vec<String>) -> IngestResult<()> {
        if row.len() != self.columns.len() {
            return Err(IngestError::validation(format!(
                "row has {} cells but the dataset has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Remove column `name`. Returns whether it was present.
    pub fn drop_column(&mut self, name: &str) -> bool {
        let Some(idx) = self.column_index(name) else {
            return false;
        };
        self.columns.remove(idx);
        for row in &mut self.rows {
            row.remove(idx);
        }
        true
    }

    /// Add column `name` with the same `value` in every row.
    ///
    /// Does nothing if the column already exists.
    pub fn add_constant_column(&mut self, name: &str, value: &str) {
        if self.has_column(name) {
            return;
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(value.to_string());
        }
    }

    /// Concatenate `other` below `self`.
    ///
    /// Columns only `other` has are appended to the header and left empty in
    /// existing rows; columns only `self` has are left empty in `other`'s rows.
    pub fn append(&mut self, other: Self) {
        for column in &other.columns {
            if !self.has_column(column) {
                self.columns.push(column.clone());
                for row in &mut self.rows {
                    row.push(String::new());
                }
            }
        }

        let positions: Vec<usize> = other
            .columns
            .iter()
            .filter_map(|column| self.column_index(column))
            .collect();

        for row in other.rows {
            let mut aligned = vec![String::new(); self.columns.len()];
            for (cell, &position) in row.into_iter().zip(&positions) {
                aligned[position] = cell;
            }
            self.rows.push(aligned);
        }
    }

    /// Flatten JSON objects into a dataset.
    ///
    /// Top-level keys become columns (union, first-seen order). Strings are
    /// kept verbatim, `null` becomes empty, everything else is rendered as
    /// compact JSON. Records that are not objects are returned as skipped.
    #[must_use]
    pub fn from_json_records(records: &[serde_json::Value]) -> (Self, usize) {
        let mut dataset = Self::default();
        let mut skipped = 0;

        for record in records {
            let Some(object) = record.as_object() else {
                skipped += 1;
                continue;
            };

            let mut unit = Self::new(object.keys().cloned().collect());
            unit.rows.push(object.values().map(render_cell).collect());
            dataset.append(unit);
        }

        (dataset, skipped)
    }

    /// Parse CSV bytes with a header row.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::CacheError`] for malformed CSV, including rows
    /// whose width differs from the header.
    pub fn from_csv_bytes(bytes: &[u8]) -> IngestResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(bytes);

        let columns: Vec<String> = reader
            .headers()
            .map_err(|e| IngestError::cache("Failed to read CSV header", Some(Box::new(e))))?
            .iter()
            .map(str::to_string)
            .collect();

        let mut dataset = Self::new(columns);
        for record in reader.records() {
            let record =
                record.map_err(|e| IngestError::cache("Malformed CSV row", Some(Box::new(e))))?;
            dataset.rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(dataset)
    }

    /// Read a CSV file.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::CacheError`] if the file cannot be read or parsed.
    pub fn read_csv(path: &Path) -> IngestResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            IngestError::cache(
                format!("Failed to read {}", path.display()),
                Some(Box::new(e)),
            )
        })?;
        Self::from_csv_bytes(&bytes).map_err(|e| {
            IngestError::cache(format!("Invalid CSV in {}", path.display()), Some(Box::new(e)))
        })
    }

    /// Serialize as CSV with a header row.
    ///
    /// A dataset without columns serializes to an empty file.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::CacheError`] if serialization fails.
    pub fn to_csv_bytes(&self) -> IngestResult<Vec<u8>> {
        if self.columns.is_empty() {
            return Ok(Vec::new());
        }

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(&self.columns)
            .map_err(|e| IngestError::cache("Failed to write CSV header", Some(Box::new(e))))?;
        for row in &self.rows {
            writer
                .write_record(row)
                .map_err(|e| IngestError::cache("Failed to write CSV row", Some(Box::new(e))))?;
        }

        writer
            .into_inner()
            .map_err(|e| IngestError::cache(format!("Failed to flush CSV: {e}"), None))
    }

    /// Atomically write as CSV.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::CacheError`] if serialization or the write fails.
    pub fn write_csv(&self, path: &Path) -> IngestResult<()> {
        write_atomic(path, &self.to_csv_bytes()?)
    }
}

fn render_cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| (*v).to_string()).collect()
    }

    #[test]
    fn test_push_row_checks_width() {
        let mut dataset = Dataset::new(strings(&["a", "b"]));
        assert!(dataset.push_row(strings(&["1", "2"])).is_ok());
        assert!(dataset.push_row(strings(&["1"])).is_err());
        assert_eq!(dataset.len(), 1);
    }

    #[test]
    fn test_append_unions_columns() {
        let mut left = Dataset::new(strings(&["id", "question"]));
        left.push_row(strings(&["1", "Will it rain?"])).unwrap();

        let mut right = Dataset::new(strings(&["category", "id"]));
        right.push_row(strings(&["Weather", "2"])).unwrap();

        left.append(right);

        assert_eq!(left.columns(), strings(&["id", "question", "category"]).as_slice());
        assert_eq!(left.rows()[0], strings(&["1", "Will it rain?", ""]));
        assert_eq!(left.rows()[1], strings(&["2", "", "Weather"]));
    }

    #[test]
    fn test_drop_and_add_columns() {
        let mut dataset = Dataset::new(strings(&["", "buyer"]));
        dataset.push_row(strings(&["0", "0xabc"])).unwrap();

        assert!(dataset.drop_column(""));
        assert!(!dataset.drop_column(""));
        dataset.add_constant_column("smartContract", "0xdef");
        dataset.add_constant_column("smartContract", "ignored");

        assert_eq!(dataset.columns(), strings(&["buyer", "smartContract"]).as_slice());
        assert_eq!(dataset.rows()[0], strings(&["0xabc", "0xdef"]));
    }

    #[test]
    fn test_from_json_records() {
        let records = vec![
            json!({"id": "1", "volume": 12.5, "closed": true, "tags": ["a"], "image": null}),
            json!("not an object"),
            json!({"id": "2", "category": "Sports"}),
        ];

        let (dataset, skipped) = Dataset::from_json_records(&records);

        assert_eq!(skipped, 1);
        assert_eq!(dataset.len(), 2);
        let ids = dataset.column_values("id").unwrap();
        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(dataset.column_values("volume").unwrap(), vec!["12.5", ""]);
        assert_eq!(dataset.column_values("closed").unwrap(), vec!["true", ""]);
        assert_eq!(dataset.column_values("tags").unwrap(), vec!["[\"a\"]", ""]);
        assert_eq!(dataset.column_values("image").unwrap(), vec!["", ""]);
        assert_eq!(dataset.column_values("category").unwrap(), vec!["", "Sports"]);
    }

    #[test]
    fn test_csv_round_trip_through_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("silver").join("out.csv");

        let mut dataset = Dataset::new(strings(&["question", "id"]));
        dataset.push_row(strings(&["Who wins, A or B?", "7"])).unwrap();
        dataset.write_csv(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "question,id\n\"Who wins, A or B?\",7\n");
        assert_eq!(Dataset::read_csv(&path).unwrap(), dataset);
    }

    #[test]
    fn test_header_only_csv() {
        let dataset = Dataset::from_csv_bytes(b"buyer,smartContract\n").unwrap();
        assert_eq!(dataset.columns().len(), 2);
        assert!(dataset.is_empty());
    }

    #[test]
    fn test_ragged_csv_is_an_error() {
        let result = Dataset::from_csv_bytes(b"a,b\n1,2\n3\n");
        assert!(matches!(result, Err(IngestError::CacheError { .. })));
    }

    #[test]
    fn test_empty_dataset_serializes_to_nothing() {
        assert!(Dataset::default().to_csv_bytes().unwrap().is_empty());
        assert_eq!(Dataset::from_csv_bytes(b"").unwrap(), Dataset::default());
    }
}
