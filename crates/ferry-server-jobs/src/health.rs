// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

use ferry_server_db::{JobRepository, RunRepository};
use ferry_sync_core::{Run, RunStatus};

use crate::error::Result;

#[derive(Debug, Clone, Serialize)]
pub struct JobHealthStatus {
	pub job_id: String,
	pub name: String,
	pub enabled: bool,
	pub status: HealthState,
	pub last_run: Option<LastRunInfo>,
	pub consecutive_failures: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct LastRunInfo {
	pub run_id: String,
	pub status: RunStatus,
	pub started_at: DateTime<Utc>,
	pub duration_ms: Option<i64>,
	pub records_processed: u64,
	pub error: Option<String>,
}

impl From<Run> for LastRunInfo {
	fn from(run: Run) -> Self {
		Self {
			duration_ms: run
				.ended_at
				.map(|ended| (ended - run.started_at).num_milliseconds()),
			run_id: run.id,
			status: run.status,
			started_at: run.started_at,
			records_processed: run.records_processed,
			error: run.error_message,
		}
	}
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
	Healthy,
	Degraded,
	Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobsHealthStatus {
	pub status: HealthState,
	pub jobs: Vec<JobHealthStatus>,
}

pub struct HealthMonitor {
	jobs: Arc<dyn JobRepository>,
	runs: Arc<dyn RunRepository>,
}

impl HealthMonitor {
	pub fn new(jobs: Arc<dyn JobRepository>, runs: Arc<dyn RunRepository>) -> Self {
		Self { jobs, runs }
	}

	#[instrument(skip(self))]
	pub async fn job_status(&self, job_id: &str) -> Result<Option<JobHealthStatus>> {
		let Some(job) = self.jobs.get_job(job_id).await? else {
			return Ok(None);
		};

		let last_run = self.runs.get_last_run(job_id).await?;
		let consecutive_failures = self.runs.count_consecutive_failures(job_id).await?;
		let status = determine_health_state(last_run.as_ref(), consecutive_failures);

		Ok(Some(JobHealthStatus {
			job_id: job.id,
			name: job.name,
			enabled: job.enabled,
			status,
			last_run: last_run.map(LastRunInfo::from),
			consecutive_failures,
		}))
	}

	/// Every job's health plus the worst state across them.
	#[instrument(skip(self))]
	pub async fn health_status(&self) -> Result<JobsHealthStatus> {
		let mut jobs = Vec::new();
		let mut worst_state = HealthState::Healthy;

		for job in self.jobs.list_jobs().await? {
			if let Some(status) = self.job_status(&job.id).await? {
				if status.status == HealthState::Unhealthy {
					worst_state = HealthState::Unhealthy;
				} else if status.status == HealthState::Degraded && worst_state != HealthState::Unhealthy {
					worst_state = HealthState::Degraded;
				}
				jobs.push(status);
			}
		}

		Ok(JobsHealthStatus {
			status: worst_state,
			jobs,
		})
	}
}

fn determine_health_state(last_run: Option<&Run>, consecutive_failures: u32) -> HealthState {
	let Some(run) = last_run else {
		return HealthState::Healthy;
	};
	match run.status {
		RunStatus::Failed | RunStatus::PartiallyCompleted => {
			if consecutive_failures >= 3 {
				HealthState::Unhealthy
			} else if consecutive_failures >= 1 || run.status == RunStatus::PartiallyCompleted {
				HealthState::Degraded
			} else {
				HealthState::Healthy
			}
		}
		RunStatus::Pending | RunStatus::InProgress | RunStatus::Completed | RunStatus::Cancelled => {
			HealthState::Healthy
		}
	}
}
