// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Outcome of one orchestrated sync, returned for both success and business failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
	pub success: bool,
	/// Absent when the sync was rejected before a run was created.
	pub run_id: Option<String>,
	pub records_processed: u64,
	pub records_failed: u64,
	pub duration: Duration,
	pub errors: Vec<String>,
	pub metrics: BTreeMap<String, Value>,
}

impl SyncResult {
	/// A sync that never started a run.
	pub fn rejected(reason: impl Into<String>) -> Self {
		Self {
			success: false,
			errors: vec![reason.into()],
			..Default::default()
		}
	}

	pub fn with_metric(mut self, key: &str, value: impl Into<Value>) -> Self {
		self.metrics.insert(key.to_string(), value.into());
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_rejected_has_no_run() {
		let result = SyncResult::rejected("dependency not satisfied");
		assert!(!result.success);
		assert!(result.run_id.is_none());
		assert_eq!(result.errors, vec!["dependency not satisfied".to_string()]);
	}

	#[test]
	fn test_with_metric() {
		let result = SyncResult::default().with_metric("fetched", 10u64);
		assert_eq!(result.metrics["fetched"], Value::from(10u64));
	}
}
