// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Scripted connectors and a migrated in-memory store for orchestrator tests.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ferry_server_db::testing::{create_file_test_pool, create_test_pool};
use sqlx::SqlitePool;
use std::path::Path;
use ferry_server_db::{
	JobRepository, SqliteJobRepository, SqliteLockRepository, SqliteRunRepository,
};
use ferry_server_jobs::{OrchestratorConfig, SchedulingPolicy, SyncOrchestrator};
use ferry_sync_core::{
	CancellationToken, ConnectorFactory, Connectors, DataSource, DataTable, DataTarget,
	FetchParams, Job, Result, Row, SyncError,
};

/// `total` rows with an `id` column, the first `missing_key` of which lack it.
pub fn rows(total: usize, missing_key: usize) -> Vec<Row> {
	(0..total)
		.map(|i| {
			let value = if i < missing_key {
				json!({ "name": format!("row-{i}") })
			} else {
				json!({ "id": i, "name": format!("row-{i}") })
			};
			value.as_object().cloned().unwrap()
		})
		.collect()
}

pub struct ScriptedSource {
	pub rows: Vec<Row>,
	pub reachable: bool,
	pub fetch_error: Option<String>,
	/// Time `fetch_data` takes unless cancelled first.
	pub fetch_delay: Duration,
	pub last_params: Mutex<Option<FetchParams>>,
}

impl ScriptedSource {
	pub fn with_rows(rows: Vec<Row>) -> Self {
		Self {
			rows,
			reachable: true,
			fetch_error: None,
			fetch_delay: Duration::ZERO,
			last_params: Mutex::new(None),
		}
	}

	pub fn slow(rows: Vec<Row>, delay: Duration) -> Self {
		Self {
			fetch_delay: delay,
			..Self::with_rows(rows)
		}
	}

	pub fn unreachable() -> Self {
		Self {
			reachable: false,
			..Self::with_rows(Vec::new())
		}
	}
}

#[async_trait]
impl DataSource for ScriptedSource {
	fn source_name(&self) -> &str {
		"scripted"
	}

	async fn test_connection(&self, _cancel: &CancellationToken) -> Result<bool> {
		Ok(self.reachable)
	}

	async fn fetch_data(&self, params: &FetchParams, cancel: &CancellationToken) -> Result<DataTable> {
		*self.last_params.lock().unwrap() = Some(params.clone());
		if !self.fetch_delay.is_zero() {
			tokio::select! {
				biased;
				_ = cancel.cancelled() => return Err(SyncError::Cancelled),
				_ = tokio::time::sleep(self.fetch_delay) => {}
			}
		}
		if let Some(message) = &self.fetch_error {
			return Err(SyncError::Source(message.clone()));
		}
		Ok(DataTable::from_rows("scripted", self.rows.clone()))
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetCall {
	Prepare,
	Save(usize),
	Finalize { success: bool, token_cancelled: bool },
}

pub struct RecordingTarget {
	pub calls: Mutex<Vec<TargetCall>>,
	pub accept_save: AtomicBool,
	pub fail_commit: AtomicBool,
	/// Cancelled from inside `save_data`, as an operator would mid-transfer.
	pub cancel_during_save: Mutex<Option<CancellationToken>>,
}

impl Default for RecordingTarget {
	fn default() -> Self {
		Self {
			calls: Mutex::new(Vec::new()),
			accept_save: AtomicBool::new(true),
			fail_commit: AtomicBool::new(false),
			cancel_during_save: Mutex::new(None),
		}
	}
}

impl RecordingTarget {
	pub fn calls(&self) -> Vec<TargetCall> {
		self.calls.lock().unwrap().clone()
	}

	pub fn finalize_calls(&self) -> Vec<TargetCall> {
		self
			.calls()
			.into_iter()
			.filter(|call| matches!(call, TargetCall::Finalize { .. }))
			.collect()
	}
}

#[async_trait]
impl DataTarget for RecordingTarget {
	fn target_name(&self) -> &str {
		"recording"
	}

	async fn prepare_target(&self, _cancel: &CancellationToken) -> Result<bool> {
		self.calls.lock().unwrap().push(TargetCall::Prepare);
		Ok(true)
	}

	async fn save_data(&self, data: &DataTable, _cancel: &CancellationToken) -> Result<bool> {
		self.calls.lock().unwrap().push(TargetCall::Save(data.len()));
		if let Some(token) = self.cancel_during_save.lock().unwrap().as_ref() {
			token.cancel();
		}
		Ok(self.accept_save.load(Ordering::SeqCst))
	}

	async fn finalize_target(&self, success: bool, cancel: &CancellationToken) -> Result<bool> {
		self.calls.lock().unwrap().push(TargetCall::Finalize {
			success,
			token_cancelled: cancel.is_cancelled(),
		});
		if success && self.fail_commit.load(Ordering::SeqCst) {
			return Err(SyncError::Target("commit refused".to_string()));
		}
		Ok(true)
	}
}

pub struct FixedConnectors {
	pub source: Arc<ScriptedSource>,
	pub target: Arc<RecordingTarget>,
}

impl ConnectorFactory for FixedConnectors {
	fn connectors(&self, _job: &Job) -> Result<Connectors> {
		Ok(Connectors {
			source: self.source.clone(),
			target: self.target.clone(),
		})
	}
}

pub struct Harness {
	pub jobs: Arc<SqliteJobRepository>,
	pub runs: Arc<SqliteRunRepository>,
	pub locks: Arc<SqliteLockRepository>,
	pub policy: Arc<SchedulingPolicy>,
}

impl Harness {
	pub async fn new() -> Self {
		Self::with_pool(create_test_pool().await)
	}

	/// Backed by a database file under `dir`, so several connections contend for writes.
	pub async fn on_file(dir: &Path) -> Self {
		Self::with_pool(create_file_test_pool(dir).await)
	}

	fn with_pool(pool: SqlitePool) -> Self {
		let jobs = Arc::new(SqliteJobRepository::new(pool.clone()));
		let runs = Arc::new(SqliteRunRepository::new(pool.clone()));
		let locks = Arc::new(SqliteLockRepository::new(pool));
		let policy = Arc::new(SchedulingPolicy::new(
			jobs.clone(),
			runs.clone(),
			locks.clone(),
			"node-a",
		));
		Self {
			jobs,
			runs,
			locks,
			policy,
		}
	}

	/// A policy sharing this store but acting as a different process.
	pub fn peer_policy(&self, holder: &str) -> SchedulingPolicy {
		SchedulingPolicy::new(
			self.jobs.clone(),
			self.runs.clone(),
			self.locks.clone(),
			holder,
		)
	}

	pub async fn add_job(&self, job: Job) -> Job {
		self.jobs.create_job(&job).await.unwrap();
		job
	}

	pub fn orchestrator(
		&self,
		source: Arc<ScriptedSource>,
		target: Arc<RecordingTarget>,
	) -> SyncOrchestrator {
		SyncOrchestrator::new(
			self.jobs.clone(),
			self.runs.clone(),
			self.policy.clone(),
			Arc::new(FixedConnectors { source, target }),
			OrchestratorConfig {
				lock_timeout: Duration::from_secs(30),
			},
		)
	}
}

pub fn job(id: &str) -> Job {
	Job::new(id, id, "0 * * * *", "https://api.example.test/records", "staging")
}
