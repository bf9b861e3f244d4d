// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Start eligibility and exclusivity leases.
//!
//! The policy judges one job at a time. Choosing between several eligible
//! exclusive jobs is left to the caller, which offers them in descending
//! priority order.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use ferry_server_db::{DbError, JobRepository, LockRepository, RunRepository};
use ferry_sync_core::RunStatus;

use crate::error::Result;

pub struct SchedulingPolicy {
	jobs: Arc<dyn JobRepository>,
	runs: Arc<dyn RunRepository>,
	locks: Arc<dyn LockRepository>,
	holder: String,
}

impl SchedulingPolicy {
	pub fn new(
		jobs: Arc<dyn JobRepository>,
		runs: Arc<dyn RunRepository>,
		locks: Arc<dyn LockRepository>,
		holder: impl Into<String>,
	) -> Self {
		Self {
			jobs,
			runs,
			locks,
			holder: holder.into(),
		}
	}

	/// Identifier this process uses as lock holder.
	pub fn holder(&self) -> &str {
		&self.holder
	}

	/// Whether `job_id` may start now.
	///
	/// False when the job already has an open run, when its dependency's most
	/// recent run is not `Completed`, or when it is exclusive and another
	/// exclusive job holds a live lease. Unknown jobs never run.
	#[instrument(skip(self))]
	pub async fn can_run(&self, job_id: &str) -> Result<bool> {
		let Some(job) = self.jobs.get_job(job_id).await? else {
			warn!(job_id, "eligibility check for unknown job");
			return Ok(false);
		};

		if let Some(open) = self.runs.get_open_run(job_id).await? {
			debug!(job_id, run_id = %open.id, "job already has an open run");
			return Ok(false);
		}

		if let Some(dependency) = job.depends_on.as_deref() {
			let satisfied = matches!(
				self.runs.get_last_run(dependency).await?,
				Some(run) if run.status == RunStatus::Completed
			);
			if !satisfied {
				debug!(job_id, dependency, "dependency has not completed");
				return Ok(false);
			}
		}

		if job.exclusive {
			let held = self.locks.list_active_exclusive_locks(Utc::now()).await?;
			if let Some(other) = held.iter().find(|lock| lock.job_id != job_id) {
				debug!(job_id, blocking_job = %other.job_id, "another exclusive job is running");
				return Ok(false);
			}
		}

		Ok(true)
	}

	/// Jobs that depend on `job_id` and are held back by its most recent outcome.
	#[instrument(skip(self))]
	pub async fn get_blocked_jobs(&self, job_id: &str) -> Result<Vec<String>> {
		let completed = matches!(
			self.runs.get_last_run(job_id).await?,
			Some(run) if run.status == RunStatus::Completed
		);
		if completed {
			return Ok(Vec::new());
		}

		Ok(self
			.jobs
			.list_dependents(job_id)
			.await?
			.into_iter()
			.map(|job| job.id)
			.collect())
	}

	/// Claim the lease on `job_id` for `timeout`.
	///
	/// Exclusivity is taken from the job definition, so an exclusive job
	/// fails here while any other exclusive job holds a live lease.
	#[instrument(skip(self))]
	pub async fn acquire_lock(&self, job_id: &str, timeout: Duration) -> Result<bool> {
		let exclusive = match self.jobs.get_job(job_id).await? {
			Some(job) => job.exclusive,
			None => return Err(DbError::NotFound(job_id.to_string()).into()),
		};
		let acquired = self
			.locks
			.try_acquire(job_id, &self.holder, lease_duration(timeout)?, exclusive)
			.await?;
		if !acquired {
			warn!(job_id, holder = %self.holder, "lock contention");
		}
		Ok(acquired)
	}

	/// Extend a lease this process holds. False once the lease has been lost.
	pub async fn renew_lock(&self, job_id: &str, timeout: Duration) -> Result<bool> {
		Ok(self
			.locks
			.renew(job_id, &self.holder, lease_duration(timeout)?)
			.await?)
	}

	/// Idempotent. Releasing a lease held by someone else does nothing.
	#[instrument(skip(self))]
	pub async fn release_lock(&self, job_id: &str) -> Result<()> {
		self.locks.release(job_id, &self.holder).await?;
		Ok(())
	}
}

fn lease_duration(timeout: Duration) -> Result<chrono::Duration> {
	chrono::Duration::from_std(timeout)
		.map_err(|e| DbError::Internal(format!("lock timeout out of range: {e}")).into())
}
