// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tabular payload moved from a data source to a data target.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single record keyed by column name.
pub type Row = serde_json::Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataTable {
	pub columns: Vec<String>,
	pub rows: Vec<Row>,
	pub fetched_at: DateTime<Utc>,
	pub source: String,
}

impl DataTable {
	pub fn new(source: impl Into<String>, columns: Vec<String>, rows: Vec<Row>) -> Self {
		Self {
			columns,
			rows,
			fetched_at: Utc::now(),
			source: source.into(),
		}
	}

	/// Build a table from rows, deriving columns from first appearance order.
	pub fn from_rows(source: impl Into<String>, rows: Vec<Row>) -> Self {
		let mut columns: Vec<String> = Vec::new();
		for row in &rows {
			for key in row.keys() {
				if !columns.iter().any(|c| c == key) {
					columns.push(key.clone());
				}
			}
		}
		Self::new(source, columns, rows)
	}

	pub fn len(&self) -> usize {
		self.rows.len()
	}

	pub fn is_empty(&self) -> bool {
		self.rows.is_empty()
	}

	/// Drop rows whose `key_column` is missing, null, or an empty string.
	///
	/// Returns the number of rows removed.
	pub fn retain_keyed(&mut self, key_column: &str) -> usize {
		let before = self.rows.len();
		self.rows.retain(|row| has_key(row, key_column));
		before - self.rows.len()
	}
}

fn has_key(row: &Row, key_column: &str) -> bool {
	match row.get(key_column) {
		None | Some(Value::Null) => false,
		Some(Value::String(s)) => !s.trim().is_empty(),
		Some(_) => true,
	}
}
