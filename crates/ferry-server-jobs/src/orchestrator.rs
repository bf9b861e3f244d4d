// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! End-to-end execution of one sync run.
//!
//! A run walks the fixed pipeline `Initialize -> FetchData -> ValidateData ->
//! TransferData -> FinalizeTarget`. Each phase is recorded as a step row
//! created just before it starts, so the step list of a run doubles as its
//! execution trace. A failing phase aborts the rest of the pipeline.
//!
//! Business failures (source, target, configuration) end the run as `Failed`
//! and come back as an unsuccessful [`SyncResult`]. Cancellation ends the run
//! as `Cancelled` and is returned as [`SyncError::Cancelled`]. Only store
//! failures propagate as other errors. Whenever the pipeline aborts before the
//! commit, the target is finalized with `success = false` on a token nobody
//! can cancel.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use ferry_server_db::{DbError, JobRepository, RunRepository};
use ferry_sync_core::{
	ConnectorFactory, Connectors, FetchParams, Job, Result, Run, RunStatus, StepName, SyncError,
	SyncResult,
};

use crate::alert::AlertDispatcher;
use crate::error::store_error;
use crate::policy::SchedulingPolicy;
use crate::trigger::{JobRunner, TriggerContext, TriggerSource};

/// Parameter carrying the job's source endpoint into `fetch_data`.
pub const ENDPOINT_PARAM: &str = "endpoint";

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
	/// Lease length for a run. Renewed every third of this while the run is live.
	pub lock_timeout: Duration,
}

impl Default for OrchestratorConfig {
	fn default() -> Self {
		Self {
			lock_timeout: Duration::from_secs(3600),
		}
	}
}

pub struct SyncOrchestrator {
	jobs: Arc<dyn JobRepository>,
	runs: Arc<dyn RunRepository>,
	policy: Arc<SchedulingPolicy>,
	connectors: Arc<dyn ConnectorFactory>,
	alerts: Option<Arc<AlertDispatcher>>,
	config: OrchestratorConfig,
}

#[derive(Default)]
struct Progress {
	fetched: u64,
	processed: u64,
	dropped: u64,
	finalize_called: bool,
	source_name: Option<String>,
	target_name: Option<String>,
}

struct StepOutput<T> {
	value: T,
	details: String,
	metrics: Option<serde_json::Value>,
}

impl<T> StepOutput<T> {
	fn new(value: T, details: impl Into<String>) -> Self {
		Self {
			value,
			details: details.into(),
			metrics: None,
		}
	}

	fn with_metrics(mut self, metrics: serde_json::Value) -> Self {
		self.metrics = Some(metrics);
		self
	}
}

impl SyncOrchestrator {
	pub fn new(
		jobs: Arc<dyn JobRepository>,
		runs: Arc<dyn RunRepository>,
		policy: Arc<SchedulingPolicy>,
		connectors: Arc<dyn ConnectorFactory>,
		config: OrchestratorConfig,
	) -> Self {
		Self {
			jobs,
			runs,
			policy,
			connectors,
			alerts: None,
			config,
		}
	}

	pub fn with_alerts(mut self, alerts: Arc<AlertDispatcher>) -> Self {
		self.alerts = Some(alerts);
		self
	}

	pub async fn execute_sync(&self, job_id: &str, cancel: &CancellationToken) -> Result<SyncResult> {
		self
			.execute_sync_with_context(job_id, &BTreeMap::new(), cancel)
			.await
	}

	/// Like [`execute_sync`](Self::execute_sync), recording `context` in the run metadata.
	#[instrument(skip(self, context, cancel))]
	pub async fn execute_sync_with_context(
		&self,
		job_id: &str,
		context: &BTreeMap<String, String>,
		cancel: &CancellationToken,
	) -> Result<SyncResult> {
		let started = Instant::now();

		let Some(job) = self.jobs.get_job(job_id).await.map_err(store_error)? else {
			warn!(job_id, "sync requested for unknown job");
			return Ok(SyncResult::rejected(format!("job {job_id} not found")));
		};

		if !self.policy.can_run(job_id).await.map_err(store_error)? {
			info!(job_id, "job not eligible to start, skipping");
			return Ok(SyncResult::rejected(
				"job cannot start: open run, unmet dependency or exclusive job running",
			));
		}

		// Every run holds its job's lease for its whole life. Exclusive jobs
		// contend on it; for the rest it marks the open run as alive.
		let acquired = self
			.policy
			.acquire_lock(job_id, self.config.lock_timeout)
			.await
			.map_err(store_error)?;
		if !acquired {
			return Ok(SyncResult::rejected(if job.exclusive {
				"lock held by another exclusive job"
			} else {
				"lock held by another run of this job"
			}));
		}
		let lease = LeaseHeartbeat::start(
			Arc::clone(&self.policy),
			job_id.to_string(),
			self.config.lock_timeout,
		);

		let outcome = self.run_job(&job, context, cancel, started).await;

		lease.stop().await;
		if let Err(e) = self.policy.release_lock(job_id).await {
			warn!(job_id, error = %e, "failed to release job lock");
		}

		outcome
	}

	async fn run_job(
		&self,
		job: &Job,
		context: &BTreeMap<String, String>,
		cancel: &CancellationToken,
		started: Instant,
	) -> Result<SyncResult> {
		let run = Run::start(&job.id);
		match self.runs.create_run(&run).await {
			Ok(()) => {}
			Err(DbError::Conflict(reason)) => {
				warn!(job_id = %job.id, %reason, "another run opened concurrently");
				return Ok(SyncResult::rejected(reason));
			}
			Err(e) => return Err(store_error(e)),
		}
		info!(job_id = %job.id, run_id = %run.id, "sync run started");

		let mut progress = Progress::default();
		let outcome = match self.resolve_connectors(job) {
			Ok(connectors) => {
				progress.source_name = Some(connectors.source.source_name().to_string());
				progress.target_name = Some(connectors.target.target_name().to_string());
				let outcome = self
					.run_pipeline(job, &run.id, &connectors, cancel, &mut progress)
					.await;
				if outcome.is_err() && !progress.finalize_called {
					finalize_on_abort(&run.id, &connectors).await;
				}
				outcome
			}
			Err(e) => Err(e),
		};

		let metadata = run_metadata(&progress, context);
		let duration = started.elapsed();

		match outcome {
			Ok(()) => {
				self
					.close_run(job, &run.id, RunStatus::Completed, &progress, None, metadata)
					.await?;
				info!(
					job_id = %job.id,
					run_id = %run.id,
					records_fetched = progress.fetched,
					records_processed = progress.processed,
					duration_ms = duration.as_millis() as u64,
					"sync run completed"
				);

				let mut result = SyncResult {
					success: true,
					run_id: Some(run.id.clone()),
					records_processed: progress.processed,
					records_failed: progress.dropped,
					duration,
					..Default::default()
				}
				.with_metric("run_id", run.id.clone())
				.with_metric("records_fetched", progress.fetched);
				if let Some(source) = &progress.source_name {
					result = result.with_metric("source", source.clone());
				}
				if let Some(target) = &progress.target_name {
					result = result.with_metric("target", target.clone());
				}
				Ok(result)
			}
			Err(SyncError::Cancelled) => {
				self
					.close_run(
						job,
						&run.id,
						RunStatus::Cancelled,
						&progress,
						Some("sync cancelled".to_string()),
						metadata,
					)
					.await?;
				info!(job_id = %job.id, run_id = %run.id, "sync run cancelled");
				Err(SyncError::Cancelled)
			}
			Err(SyncError::Store(message)) => {
				// Best effort only: the store is what just failed.
				let _ = self
					.runs
					.complete_run(
						&run.id,
						RunStatus::Failed,
						progress.processed,
						Some(message.clone()),
						Some(metadata),
					)
					.await;
				error!(job_id = %job.id, run_id = %run.id, error = %message, "sync run aborted by store failure");
				Err(SyncError::Store(message))
			}
			Err(e) => {
				let message = e.to_string();
				self
					.close_run(
						job,
						&run.id,
						RunStatus::Failed,
						&progress,
						Some(message.clone()),
						metadata,
					)
					.await?;
				warn!(
					job_id = %job.id,
					run_id = %run.id,
					kind = e.kind(),
					error = %message,
					"sync run failed"
				);
				self.alert_failure(job, &run.id, &message).await;

				Ok(SyncResult {
					success: false,
					run_id: Some(run.id.clone()),
					records_processed: progress.processed,
					records_failed: progress.dropped,
					duration,
					errors: vec![message],
					..Default::default()
				}
				.with_metric("run_id", run.id)
				.with_metric("records_fetched", progress.fetched))
			}
		}
	}

	fn resolve_connectors(&self, job: &Job) -> Result<Connectors> {
		if job.source_endpoint.trim().is_empty() {
			return Err(SyncError::Configuration(format!(
				"job {} has no source endpoint",
				job.id
			)));
		}
		self.connectors.connectors(job)
	}

	async fn run_pipeline(
		&self,
		job: &Job,
		run_id: &str,
		connectors: &Connectors,
		cancel: &CancellationToken,
		progress: &mut Progress,
	) -> Result<()> {
		let source = &connectors.source;
		let target = &connectors.target;

		checkpoint(cancel)?;
		self
			.step(run_id, StepName::Initialize, async {
				if !source.test_connection(cancel).await? {
					return Err(SyncError::Source(format!(
						"connection test failed for {}",
						source.source_name()
					)));
				}
				if !target.prepare_target(cancel).await? {
					return Err(SyncError::Target(format!(
						"could not prepare {}",
						target.target_name()
					)));
				}
				Ok::<_, SyncError>(StepOutput::new(
					(),
					format!(
						"{} reachable, {} prepared",
						source.source_name(),
						target.target_name()
					),
				))
			})
			.await?;

		checkpoint(cancel)?;
		let mut table = self
			.step(run_id, StepName::FetchData, async {
				let mut params: FetchParams = job.configuration.clone();
				params.insert(ENDPOINT_PARAM.to_string(), job.source_endpoint.clone());
				let table = source.fetch_data(&params, cancel).await?;
				let details = format!("fetched {} rows from {}", table.len(), source.source_name());
				let metrics = json!({ "rows": table.len(), "columns": table.columns.len() });
				Ok::<_, SyncError>(StepOutput::new(table, details).with_metrics(metrics))
			})
			.await?;
		progress.fetched = table.len() as u64;
		self
			.runs
			.update_run_progress(run_id, progress.fetched, 0)
			.await
			.map_err(store_error)?;

		checkpoint(cancel)?;
		let key_column = job.key_column();
		progress.dropped = self
			.step(run_id, StepName::ValidateData, async {
				let dropped = table.retain_keyed(key_column) as u64;
				if dropped > 0 {
					warn!(run_id, dropped, key_column, "dropped rows missing key column");
				}
				let details = format!(
					"{dropped} rows dropped for missing '{key_column}', {} valid",
					table.len()
				);
				let metrics = json!({ "dropped": dropped, "valid": table.len() });
				Ok::<_, SyncError>(StepOutput::new(dropped, details).with_metrics(metrics))
			})
			.await?;

		checkpoint(cancel)?;
		let table = &table;
		self
			.step(run_id, StepName::TransferData, async {
				if !target.save_data(table, cancel).await? {
					return Err(SyncError::Target(format!(
						"{} rejected {} rows",
						target.target_name(),
						table.len()
					)));
				}
				Ok::<_, SyncError>(StepOutput::new(
					(),
					format!("saved {} rows to {}", table.len(), target.target_name()),
				))
			})
			.await?;
		progress.processed = table.len() as u64;
		self
			.runs
			.update_run_progress(run_id, progress.fetched, progress.processed)
			.await
			.map_err(store_error)?;

		checkpoint(cancel)?;
		progress.finalize_called = true;
		self
			.step(run_id, StepName::FinalizeTarget, async {
				if !target.finalize_target(true, cancel).await? {
					return Err(SyncError::Target(format!(
						"{} failed to commit",
						target.target_name()
					)));
				}
				Ok::<_, SyncError>(StepOutput::new((), format!("{} committed", target.target_name())))
			})
			.await?;

		Ok(())
	}

	/// Record one pipeline phase as a step row around `body`.
	async fn step<T, F>(&self, run_id: &str, name: StepName, body: F) -> Result<T>
	where
		F: Future<Output = Result<StepOutput<T>>>,
	{
		let step = self
			.runs
			.create_step(run_id, name)
			.await
			.map_err(store_error)?;
		debug!(run_id, step = %name, "step started");

		let timer = Instant::now();
		let outcome = body.await;
		let elapsed_ms = u64::try_from(timer.elapsed().as_millis()).unwrap_or(u64::MAX);

		match outcome {
			Ok(output) => {
				self
					.runs
					.complete_step(
						&step.id,
						RunStatus::Completed,
						Some(output.details),
						elapsed_ms,
						output.metrics,
					)
					.await
					.map_err(store_error)?;
				debug!(run_id, step = %name, elapsed_ms, "step completed");
				Ok(output.value)
			}
			Err(e) => {
				let status = if e.is_cancelled() {
					RunStatus::Cancelled
				} else {
					RunStatus::Failed
				};
				self
					.runs
					.complete_step(&step.id, status, Some(e.to_string()), elapsed_ms, None)
					.await
					.map_err(store_error)?;
				warn!(run_id, step = %name, error = %e, "step failed");
				Err(e)
			}
		}
	}

	async fn close_run(
		&self,
		job: &Job,
		run_id: &str,
		status: RunStatus,
		progress: &Progress,
		error: Option<String>,
		metadata: serde_json::Value,
	) -> Result<()> {
		self
			.runs
			.complete_run(run_id, status, progress.processed, error, Some(metadata))
			.await
			.map_err(store_error)?;
		self
			.jobs
			.set_last_run(&job.id, Utc::now())
			.await
			.map_err(store_error)?;
		Ok(())
	}

	async fn alert_failure(&self, job: &Job, run_id: &str, message: &str) {
		let Some(alerts) = &self.alerts else {
			return;
		};
		let consecutive_failures = match self.runs.count_consecutive_failures(&job.id).await {
			Ok(count) => count,
			Err(e) => {
				warn!(job_id = %job.id, error = %e, "could not count consecutive failures");
				1
			}
		};
		alerts
			.notify_run(
				&job.id,
				&job.name,
				run_id,
				RunStatus::Failed,
				message,
				consecutive_failures,
			)
			.await;
	}
}

fn checkpoint(cancel: &CancellationToken) -> Result<()> {
	if cancel.is_cancelled() {
		return Err(SyncError::Cancelled);
	}
	Ok(())
}

/// Roll the target back. Runs on a fresh token so an already-cancelled run still completes it.
async fn finalize_on_abort(run_id: &str, connectors: &Connectors) {
	let uncancellable = CancellationToken::new();
	match connectors
		.target
		.finalize_target(false, &uncancellable)
		.await
	{
		Ok(true) => debug!(run_id, "target rolled back"),
		Ok(false) => warn!(run_id, target = connectors.target.target_name(), "target rollback reported failure"),
		Err(e) => warn!(run_id, error = %e, "target rollback failed"),
	}
}

fn run_metadata(progress: &Progress, context: &BTreeMap<String, String>) -> serde_json::Value {
	json!({
		"source": progress.source_name,
		"target": progress.target_name,
		"records_fetched": progress.fetched,
		"records_dropped": progress.dropped,
		"trigger": context,
	})
}

#[async_trait]
impl JobRunner for SyncOrchestrator {
	async fn run(&self, job_key: &str, context: TriggerContext, cancel: CancellationToken) {
		let mut data = context.data;
		data.insert(
			"source".to_string(),
			match context.source {
				TriggerSource::Schedule => "schedule",
				TriggerSource::Manual => "manual",
			}
			.to_string(),
		);

		match self
			.execute_sync_with_context(job_key, &data, &cancel)
			.await
		{
			Ok(result) if result.success => {}
			Ok(result) => {
				info!(job_id = job_key, errors = ?result.errors, "sync did not succeed");
			}
			Err(SyncError::Cancelled) => {}
			Err(e) => {
				error!(job_id = job_key, error = %e, "sync execution failed");
			}
		}
	}
}

/// Keeps a job's lease alive while its run is in progress.
struct LeaseHeartbeat {
	cancel: CancellationToken,
	handle: JoinHandle<()>,
}

impl LeaseHeartbeat {
	fn start(policy: Arc<SchedulingPolicy>, job_id: String, timeout: Duration) -> Self {
		let cancel = CancellationToken::new();
		let interval = (timeout / 3).max(Duration::from_millis(10));
		let token = cancel.clone();

		let handle = tokio::spawn(async move {
			loop {
				tokio::select! {
					_ = token.cancelled() => break,
					_ = tokio::time::sleep(interval) => {}
				}
				match policy.renew_lock(&job_id, timeout).await {
					Ok(true) => debug!(job_id = %job_id, "lease renewed"),
					Ok(false) => {
						warn!(job_id = %job_id, "lease lost while run in progress");
						break;
					}
					Err(e) => warn!(job_id = %job_id, error = %e, "lease renewal failed"),
				}
			}
		});

		Self { cancel, handle }
	}

	async fn stop(self) {
		self.cancel.cancel();
		let _ = self.handle.await;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_checkpoint() {
		let cancel = CancellationToken::new();
		assert!(checkpoint(&cancel).is_ok());
		cancel.cancel();
		assert!(matches!(checkpoint(&cancel), Err(SyncError::Cancelled)));
	}

	#[test]
	fn test_run_metadata_includes_trigger_context() {
		let progress = Progress {
			fetched: 10,
			dropped: 2,
			source_name: Some("http".to_string()),
			..Default::default()
		};
		let mut context = BTreeMap::new();
		context.insert("triggered_by".to_string(), "ops".to_string());

		let metadata = run_metadata(&progress, &context);
		assert_eq!(metadata["records_fetched"], 10);
		assert_eq!(metadata["records_dropped"], 2);
		assert_eq!(metadata["source"], "http");
		assert!(metadata["target"].is_null());
		assert_eq!(metadata["trigger"]["triggered_by"], "ops");
	}

	#[test]
	fn test_default_lock_timeout() {
		assert_eq!(
			OrchestratorConfig::default().lock_timeout,
			Duration::from_secs(3600)
		);
	}
}
