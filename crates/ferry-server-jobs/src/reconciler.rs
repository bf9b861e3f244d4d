// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Keeps trigger registrations in line with the job catalog.
//!
//! The catalog is authoritative. Enabled jobs get registered, disabled or
//! deleted jobs get fully unregistered, and a changed cron expression causes
//! a re-registration. After every pass the live next fire time is written
//! back to each job's advisory `next_run_at`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use ferry_server_db::JobRepository;
use ferry_sync_core::Job;

use crate::error::{Result, SchedulerError};
use crate::trigger::TriggerEngine;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
	pub registered: Vec<String>,
	pub unregistered: Vec<String>,
	pub rescheduled: Vec<String>,
	/// Jobs skipped because their cron expression does not parse.
	pub invalid: Vec<String>,
}

impl ReconcileReport {
	pub fn is_noop(&self) -> bool {
		self.registered.is_empty()
			&& self.unregistered.is_empty()
			&& self.rescheduled.is_empty()
			&& self.invalid.is_empty()
	}
}

pub struct SchedulerReconciler {
	jobs: Arc<dyn JobRepository>,
	engine: Arc<dyn TriggerEngine>,
	interval: Duration,
	settle_delay: Duration,
}

impl SchedulerReconciler {
	pub fn new(
		jobs: Arc<dyn JobRepository>,
		engine: Arc<dyn TriggerEngine>,
		interval: Duration,
		settle_delay: Duration,
	) -> Self {
		Self {
			jobs,
			engine,
			interval,
			settle_delay,
		}
	}

	/// Register every enabled job that has no trigger yet.
	///
	/// Jobs are registered highest priority first, then by name.
	#[instrument(skip(self))]
	pub async fn startup_pass(&self) -> Result<ReconcileReport> {
		let mut report = ReconcileReport::default();

		for job in self.jobs.list_enabled_jobs().await? {
			if !self.engine.exists(&job.id).await {
				self.register(&job, &mut report).await?;
			}
		}

		self.refresh_next_runs().await?;
		info!(registered = report.registered.len(), "startup reconciliation complete");
		Ok(report)
	}

	/// Diff the full catalog against the engine and converge.
	#[instrument(skip(self))]
	pub async fn reconcile(&self) -> Result<ReconcileReport> {
		let mut report = ReconcileReport::default();
		let catalog = self.jobs.list_jobs().await?;
		let known: HashSet<&str> = catalog.iter().map(|job| job.id.as_str()).collect();

		for job in &catalog {
			let live = self.engine.get_trigger(&job.id).await;
			match (job.enabled, live) {
				(true, None) => self.register(job, &mut report).await?,
				(false, Some(_)) => {
					if self.engine.unschedule(&job.id).await? {
						info!(job_id = %job.id, "disabled job unregistered");
						report.unregistered.push(job.id.clone());
					}
					self.jobs.set_next_run(&job.id, None).await?;
				}
				(true, Some(trigger)) if trigger.cron_expr != job.cron_expression => {
					self.engine.unschedule(&job.id).await?;
					let mut scratch = ReconcileReport::default();
					self.register(job, &mut scratch).await?;
					if scratch.invalid.is_empty() {
						info!(
							job_id = %job.id,
							old = %trigger.cron_expr,
							new = %job.cron_expression,
							"job rescheduled"
						);
						report.rescheduled.push(job.id.clone());
					} else {
						report.unregistered.push(job.id.clone());
						report.invalid.extend(scratch.invalid);
					}
				}
				_ => {}
			}
		}

		for job_key in self.engine.list_scheduled().await {
			if !known.contains(job_key.as_str()) && self.engine.unschedule(&job_key).await? {
				info!(job_id = %job_key, "deleted job unregistered");
				report.unregistered.push(job_key);
			}
		}

		self.refresh_next_runs().await?;
		if !report.is_noop() {
			info!(
				registered = report.registered.len(),
				unregistered = report.unregistered.len(),
				rescheduled = report.rescheduled.len(),
				invalid = report.invalid.len(),
				"reconciliation applied changes"
			);
		}
		Ok(report)
	}

	async fn register(&self, job: &Job, report: &mut ReconcileReport) -> Result<()> {
		match self.engine.schedule(&job.id, &job.cron_expression).await {
			Ok(()) => {
				info!(job_id = %job.id, cron = %job.cron_expression, "job registered");
				report.registered.push(job.id.clone());
				Ok(())
			}
			Err(SchedulerError::InvalidCron { expression, reason }) => {
				warn!(job_id = %job.id, %expression, %reason, "invalid cron expression, job not registered");
				report.invalid.push(job.id.clone());
				Ok(())
			}
			Err(e) => Err(e),
		}
	}

	async fn refresh_next_runs(&self) -> Result<()> {
		for job_key in self.engine.list_scheduled().await {
			if let Some(trigger) = self.engine.get_trigger(&job_key).await {
				self.jobs.set_next_run(&job_key, trigger.next_fire_time).await?;
			}
		}
		Ok(())
	}

	/// Settle, run the startup pass, then reconcile every interval until cancelled.
	pub async fn run(&self, cancel: CancellationToken) {
		tokio::select! {
			_ = cancel.cancelled() => return,
			_ = tokio::time::sleep(self.settle_delay) => {}
		}

		if let Err(e) = self.startup_pass().await {
			error!(error = %e, "startup reconciliation failed");
		}

		loop {
			tokio::select! {
				_ = cancel.cancelled() => break,
				_ = tokio::time::sleep(self.interval) => {}
			}
			if let Err(e) = self.reconcile().await {
				error!(error = %e, "reconciliation failed");
			}
		}

		info!("reconciler stopped");
	}
}
