// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Periodic cleanup of run history, stale lock rows and alert throttle entries.
//!
//! Each pass first fails runs left open by a dead process (see
//! [`RunRepository::abandon_orphaned_runs`]). The loop makes a pass as soon
//! as it starts, so a restarted server frees those jobs right away.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use ferry_server_db::{LockRepository, RunRepository};

use crate::alert::AlertDispatcher;
use crate::error::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionReport {
	pub runs_abandoned: u64,
	pub runs_deleted: u64,
	pub locks_purged: u64,
	pub throttle_entries_swept: usize,
}

pub struct RetentionTask {
	runs: Arc<dyn RunRepository>,
	locks: Arc<dyn LockRepository>,
	alerts: Option<Arc<AlertDispatcher>>,
	retention_days: u32,
	interval: Duration,
}

impl RetentionTask {
	pub fn new(
		runs: Arc<dyn RunRepository>,
		locks: Arc<dyn LockRepository>,
		retention_days: u32,
		interval: Duration,
	) -> Self {
		Self {
			runs,
			locks,
			alerts: None,
			retention_days,
			interval,
		}
	}

	pub fn with_alerts(mut self, alerts: Arc<AlertDispatcher>) -> Self {
		self.alerts = Some(alerts);
		self
	}

	#[instrument(skip(self), fields(retention_days = self.retention_days))]
	pub async fn run_once(&self) -> Result<RetentionReport> {
		let now = Utc::now();
		let runs_abandoned = self.runs.abandon_orphaned_runs(now).await?;
		let runs_deleted = self.runs.cleanup_old_runs(self.retention_days).await?;
		let locks_purged = self.locks.purge_expired(now).await?;
		let throttle_entries_swept = self.alerts.as_ref().map_or(0, |alerts| alerts.sweep());

		let report = RetentionReport {
			runs_abandoned,
			runs_deleted,
			locks_purged,
			throttle_entries_swept,
		};
		if report != RetentionReport::default() {
			info!(
				runs_abandoned,
				runs_deleted,
				locks_purged,
				throttle_entries_swept,
				"retention pass removed stale records"
			);
		}
		Ok(report)
	}

	pub async fn run(&self, cancel: CancellationToken) {
		loop {
			if let Err(e) = self.run_once().await {
				error!(error = %e, "retention pass failed");
			}
			tokio::select! {
				_ = cancel.cancelled() => break,
				_ = tokio::time::sleep(self.interval) => {}
			}
		}
	}
}
