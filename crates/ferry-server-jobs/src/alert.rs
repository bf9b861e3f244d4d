// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Failure alerts with per-job throttling.
//!
//! Delivery channels live outside this crate behind [`AlertSink`]. The
//! dispatcher only decides whether an alert goes out: failed runs are
//! alerted, cancelled runs never are, and repeats for the same job and kind
//! are suppressed for the throttle window.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use ferry_sync_core::RunStatus;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
	RunFailed,
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
	pub kind: AlertKind,
	pub job_id: String,
	pub job_name: String,
	pub run_id: String,
	pub message: String,
	pub consecutive_failures: u32,
	pub occurred_at: DateTime<Utc>,
}

#[async_trait]
pub trait AlertSink: Send + Sync {
	async fn send(&self, alert: &Alert) -> Result<()>;
}

/// Writes alerts to the log. Used when no external channel is configured.
pub struct TracingAlertSink;

#[async_trait]
impl AlertSink for TracingAlertSink {
	async fn send(&self, alert: &Alert) -> Result<()> {
		error!(
			job_id = %alert.job_id,
			job_name = %alert.job_name,
			run_id = %alert.run_id,
			consecutive_failures = alert.consecutive_failures,
			message = %alert.message,
			"sync job failed"
		);
		Ok(())
	}
}

pub struct AlertDispatcher {
	sink: Arc<dyn AlertSink>,
	enabled: bool,
	throttle: Duration,
	last_sent: Mutex<HashMap<(String, AlertKind), Instant>>,
}

impl AlertDispatcher {
	pub fn new(sink: Arc<dyn AlertSink>, enabled: bool, throttle: Duration) -> Self {
		Self {
			sink,
			enabled,
			throttle,
			last_sent: Mutex::new(HashMap::new()),
		}
	}

	/// Alert on a finished run if its status warrants it. Returns whether an alert was sent.
	pub async fn notify_run(
		&self,
		job_id: &str,
		job_name: &str,
		run_id: &str,
		status: RunStatus,
		message: &str,
		consecutive_failures: u32,
	) -> bool {
		if !self.enabled || status != RunStatus::Failed {
			return false;
		}

		let alert = Alert {
			kind: AlertKind::RunFailed,
			job_id: job_id.to_string(),
			job_name: job_name.to_string(),
			run_id: run_id.to_string(),
			message: message.to_string(),
			consecutive_failures,
			occurred_at: Utc::now(),
		};
		self.dispatch(alert).await
	}

	async fn dispatch(&self, alert: Alert) -> bool {
		let key = (alert.job_id.clone(), alert.kind);
		if !self.claim_slot(&key, Instant::now()) {
			debug!(job_id = %alert.job_id, kind = ?alert.kind, "alert throttled");
			return false;
		}

		match self.sink.send(&alert).await {
			Ok(()) => true,
			Err(e) => {
				warn!(job_id = %alert.job_id, error = %e, "failed to deliver alert");
				// Let the next failure retry delivery.
				self.lock_map().remove(&key);
				false
			}
		}
	}

	fn claim_slot(&self, key: &(String, AlertKind), now: Instant) -> bool {
		let mut last_sent = self.lock_map();
		match last_sent.get(key) {
			Some(sent) if now.duration_since(*sent) < self.throttle => false,
			_ => {
				last_sent.insert(key.clone(), now);
				true
			}
		}
	}

	/// Drop throttle entries whose window has passed. Returns how many were removed.
	pub fn sweep(&self) -> usize {
		let now = Instant::now();
		let mut last_sent = self.lock_map();
		let before = last_sent.len();
		last_sent.retain(|_, sent| now.duration_since(*sent) < self.throttle);
		before - last_sent.len()
	}

	fn lock_map(&self) -> std::sync::MutexGuard<'_, HashMap<(String, AlertKind), Instant>> {
		self.last_sent.lock().unwrap_or_else(|e| e.into_inner())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::SchedulerError;
	use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

	#[derive(Default)]
	struct RecordingSink {
		sent: Mutex<Vec<Alert>>,
		fail: AtomicBool,
		attempts: AtomicUsize,
	}

	#[async_trait]
	impl AlertSink for RecordingSink {
		async fn send(&self, alert: &Alert) -> Result<()> {
			self.attempts.fetch_add(1, Ordering::SeqCst);
			if self.fail.load(Ordering::SeqCst) {
				return Err(SchedulerError::Alert("webhook down".to_string()));
			}
			self.sent.lock().unwrap().push(alert.clone());
			Ok(())
		}
	}

	fn dispatcher(sink: Arc<RecordingSink>, throttle: Duration) -> AlertDispatcher {
		AlertDispatcher::new(sink, true, throttle)
	}

	#[tokio::test]
	async fn test_failed_run_alerts_once_per_window() {
		let sink = Arc::new(RecordingSink::default());
		let alerts = dispatcher(sink.clone(), Duration::from_secs(900));

		assert!(
			alerts
				.notify_run("job-1", "orders", "run-1", RunStatus::Failed, "boom", 1)
				.await
		);
		assert!(
			!alerts
				.notify_run("job-1", "orders", "run-2", RunStatus::Failed, "boom", 2)
				.await
		);
		assert!(
			alerts
				.notify_run("job-2", "customers", "run-3", RunStatus::Failed, "boom", 1)
				.await
		);

		let sent = sink.sent.lock().unwrap();
		assert_eq!(sent.len(), 2);
		assert_eq!(sent[0].run_id, "run-1");
		assert_eq!(sent[0].kind, AlertKind::RunFailed);
	}

	#[tokio::test]
	async fn test_cancelled_and_completed_runs_not_alerted() {
		let sink = Arc::new(RecordingSink::default());
		let alerts = dispatcher(sink.clone(), Duration::from_secs(900));

		for status in [RunStatus::Cancelled, RunStatus::Completed] {
			assert!(
				!alerts
					.notify_run("job-1", "orders", "run-1", status, "", 0)
					.await
			);
		}
		assert_eq!(sink.attempts.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn test_disabled_dispatcher_sends_nothing() {
		let sink = Arc::new(RecordingSink::default());
		let alerts = AlertDispatcher::new(sink.clone(), false, Duration::from_secs(1));
		assert!(
			!alerts
				.notify_run("job-1", "orders", "run-1", RunStatus::Failed, "boom", 1)
				.await
		);
		assert_eq!(sink.attempts.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn test_delivery_failure_does_not_consume_window() {
		let sink = Arc::new(RecordingSink::default());
		sink.fail.store(true, Ordering::SeqCst);
		let alerts = dispatcher(sink.clone(), Duration::from_secs(900));

		assert!(
			!alerts
				.notify_run("job-1", "orders", "run-1", RunStatus::Failed, "boom", 1)
				.await
		);
		sink.fail.store(false, Ordering::SeqCst);
		assert!(
			alerts
				.notify_run("job-1", "orders", "run-2", RunStatus::Failed, "boom", 2)
				.await
		);
		assert_eq!(sink.attempts.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn test_sweep_expires_entries() {
		let sink = Arc::new(RecordingSink::default());
		let alerts = dispatcher(sink.clone(), Duration::from_millis(20));

		alerts
			.notify_run("job-1", "orders", "run-1", RunStatus::Failed, "boom", 1)
			.await;
		assert_eq!(alerts.sweep(), 0);

		tokio::time::sleep(Duration::from_millis(40)).await;
		assert_eq!(alerts.sweep(), 1);
		assert!(
			alerts
				.notify_run("job-1", "orders", "run-2", RunStatus::Failed, "boom", 2)
				.await
		);
	}

	#[tokio::test]
	async fn test_tracing_sink_succeeds() {
		let alert = Alert {
			kind: AlertKind::RunFailed,
			job_id: "job-1".to_string(),
			job_name: "orders".to_string(),
			run_id: "run-1".to_string(),
			message: "boom".to_string(),
			consecutive_failures: 3,
			occurred_at: Utc::now(),
		};
		assert!(TracingAlertSink.send(&alert).await.is_ok());
	}
}
