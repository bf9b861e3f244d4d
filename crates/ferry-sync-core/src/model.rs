// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Catalog and audit records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::status::{RunStatus, StepName};

/// Column checked for presence during validation when a job does not override it.
pub const DEFAULT_KEY_COLUMN: &str = "id";

/// A schedulable unit of synchronization work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
	pub id: String,
	/// Unique human-readable name: "orders-hourly"
	pub name: String,
	pub cron_expression: String,
	pub enabled: bool,
	/// Job whose most recent run must be completed before this one may start.
	pub depends_on: Option<String>,
	/// Exclusive jobs never run concurrently with other exclusive jobs.
	pub exclusive: bool,
	/// Higher wins when several exclusive jobs are eligible at once.
	pub priority: i32,
	pub source_endpoint: String,
	pub target_ref: String,
	pub configuration: BTreeMap<String, String>,

	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	pub last_run_at: Option<DateTime<Utc>>,
	/// Advisory, refreshed from the trigger engine.
	pub next_run_at: Option<DateTime<Utc>>,
}

impl Job {
	pub fn new(
		id: impl Into<String>,
		name: impl Into<String>,
		cron_expression: impl Into<String>,
		source_endpoint: impl Into<String>,
		target_ref: impl Into<String>,
	) -> Self {
		let now = Utc::now();
		Self {
			id: id.into(),
			name: name.into(),
			cron_expression: cron_expression.into(),
			enabled: true,
			depends_on: None,
			exclusive: false,
			priority: 0,
			source_endpoint: source_endpoint.into(),
			target_ref: target_ref.into(),
			configuration: BTreeMap::new(),
			created_at: now,
			updated_at: now,
			last_run_at: None,
			next_run_at: None,
		}
	}

	/// Column that every valid row must carry a non-null value for.
	pub fn key_column(&self) -> &str {
		self
			.configuration
			.get("key_column")
			.map(String::as_str)
			.filter(|c| !c.is_empty())
			.unwrap_or(DEFAULT_KEY_COLUMN)
	}
}

/// One execution attempt of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
	pub id: String,
	pub job_id: String,
	pub started_at: DateTime<Utc>,
	pub ended_at: Option<DateTime<Utc>>,
	pub status: RunStatus,
	pub records_fetched: u64,
	pub records_processed: u64,
	pub error_message: Option<String>,
	pub metadata: Option<serde_json::Value>,
}

impl Run {
	/// A fresh run in progress, starting now.
	pub fn start(job_id: impl Into<String>) -> Self {
		Self {
			id: Uuid::new_v4().to_string(),
			job_id: job_id.into(),
			started_at: Utc::now(),
			ended_at: None,
			status: RunStatus::InProgress,
			records_fetched: 0,
			records_processed: 0,
			error_message: None,
			metadata: None,
		}
	}

	pub fn is_open(&self) -> bool {
		self.ended_at.is_none()
	}
}

/// One timed phase of a run. The ordered step list of a run is its execution trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
	pub id: String,
	pub run_id: String,
	pub name: StepName,
	pub started_at: DateTime<Utc>,
	pub ended_at: Option<DateTime<Utc>>,
	pub status: RunStatus,
	pub details: Option<String>,
	pub duration_ms: Option<u64>,
	pub metrics: Option<serde_json::Value>,
}

impl Step {
	/// Steps are created already in progress, never speculatively.
	pub fn start(run_id: impl Into<String>, name: StepName) -> Self {
		Self {
			id: Uuid::new_v4().to_string(),
			run_id: run_id.into(),
			name,
			started_at: Utc::now(),
			ended_at: None,
			status: RunStatus::InProgress,
			details: None,
			duration_ms: None,
			metrics: None,
		}
	}
}

/// Time-bounded advisory claim on a job id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lock {
	pub job_id: String,
	/// Process or instance identifier of the holder.
	pub holder: String,
	pub acquired_at: DateTime<Utc>,
	pub expires_at: DateTime<Utc>,
	pub active: bool,
	pub exclusive: bool,
}

impl Lock {
	pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
		self.expires_at <= now
	}

	/// Active and not yet expired. Expired leases are releasable by anyone.
	pub fn is_held(&self, now: DateTime<Utc>) -> bool {
		self.active && !self.is_expired(now)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Duration;

	#[test]
	fn test_new_job_defaults() {
		let job = Job::new("job-1", "orders", "0 * * * *", "/orders", "orders_table");
		assert!(job.enabled);
		assert!(!job.exclusive);
		assert_eq!(job.priority, 0);
		assert!(job.depends_on.is_none());
		assert_eq!(job.key_column(), DEFAULT_KEY_COLUMN);
	}

	#[test]
	fn test_key_column_override() {
		let mut job = Job::new("job-1", "orders", "0 * * * *", "/orders", "orders_table");
		job
			.configuration
			.insert("key_column".to_string(), "order_no".to_string());
		assert_eq!(job.key_column(), "order_no");

		job
			.configuration
			.insert("key_column".to_string(), String::new());
		assert_eq!(job.key_column(), DEFAULT_KEY_COLUMN);
	}

	#[test]
	fn test_run_start_is_open_and_in_progress() {
		let run = Run::start("job-1");
		assert!(run.is_open());
		assert_eq!(run.status, RunStatus::InProgress);
		assert!(Uuid::parse_str(&run.id).is_ok());
	}

	#[test]
	fn test_step_start_is_in_progress() {
		let step = Step::start("run-1", StepName::FetchData);
		assert_eq!(step.status, RunStatus::InProgress);
		assert!(step.ended_at.is_none());
	}

	#[test]
	fn test_lock_expiry() {
		let now = Utc::now();
		let lock = Lock {
			job_id: "job-1".to_string(),
			holder: "node-a".to_string(),
			acquired_at: now - Duration::minutes(10),
			expires_at: now - Duration::seconds(1),
			active: true,
			exclusive: true,
		};
		assert!(lock.is_expired(now));
		assert!(!lock.is_held(now));

		let live = Lock {
			expires_at: now + Duration::minutes(5),
			..lock.clone()
		};
		assert!(live.is_held(now));

		let released = Lock {
			active: false,
			..live
		};
		assert!(!released.is_held(now));
	}
}
