// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-process cron trigger engine.
//!
//! Each registered job gets one sleeping task that wakes at the next fire
//! time of its schedule and hands the job to the [`JobRunner`]. A shared
//! executing set keeps a job from ever running concurrently with itself: a
//! fire that lands while the previous execution is still going is skipped.
//!
//! Executions run on a [`TaskTracker`], and [`TriggerEngine::shutdown`]
//! cancels them and waits for them to finish, so a run in progress gets
//! to record how it ended before the store goes away.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, SchedulerError};
use crate::schedule::parse_schedule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
	Schedule,
	Manual,
}

/// What caused a fire, plus free-form audit data such as the requesting user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerContext {
	pub source: TriggerSource,
	pub data: BTreeMap<String, String>,
}

impl TriggerContext {
	pub fn scheduled() -> Self {
		Self {
			source: TriggerSource::Schedule,
			data: BTreeMap::new(),
		}
	}

	pub fn manual() -> Self {
		Self {
			source: TriggerSource::Manual,
			data: BTreeMap::new(),
		}
	}

	pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
		self.data.insert(key.to_string(), value.into());
		self
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerInfo {
	pub next_fire_time: Option<DateTime<Utc>>,
	pub prev_fire_time: Option<DateTime<Utc>>,
	pub cron_expr: String,
}

/// Callback invoked on every fire.
#[async_trait]
pub trait JobRunner: Send + Sync {
	async fn run(&self, job_key: &str, context: TriggerContext, cancel: CancellationToken);
}

#[async_trait]
pub trait TriggerEngine: Send + Sync {
	/// Register `job_key` on `cron_expr`, replacing any existing registration.
	async fn schedule(&self, job_key: &str, cron_expr: &str) -> Result<()>;
	/// Returns whether a registration was removed.
	async fn unschedule(&self, job_key: &str) -> Result<bool>;
	/// Fire a registered job immediately.
	async fn trigger(&self, job_key: &str, context: TriggerContext) -> Result<()>;
	async fn exists(&self, job_key: &str) -> bool;
	async fn get_trigger(&self, job_key: &str) -> Option<TriggerInfo>;
	async fn list_scheduled(&self) -> Vec<String>;
	async fn list_executing(&self) -> Vec<String>;
	async fn shutdown(&self);
}

#[derive(Default)]
struct FireTimes {
	next: Option<DateTime<Utc>>,
	prev: Option<DateTime<Utc>>,
}

struct Registration {
	cron_expr: String,
	times: Arc<Mutex<FireTimes>>,
	cancel: CancellationToken,
	handle: JoinHandle<()>,
}

type ExecutingSet = Arc<Mutex<HashSet<String>>>;

pub struct CronTriggerEngine {
	runner: Arc<dyn JobRunner>,
	registrations: tokio::sync::Mutex<HashMap<String, Registration>>,
	executing: ExecutingSet,
	executions: TaskTracker,
	shutdown: CancellationToken,
}

impl CronTriggerEngine {
	pub fn new(runner: Arc<dyn JobRunner>) -> Self {
		Self {
			runner,
			registrations: tokio::sync::Mutex::new(HashMap::new()),
			executing: Arc::new(Mutex::new(HashSet::new())),
			executions: TaskTracker::new(),
			shutdown: CancellationToken::new(),
		}
	}

	fn spawner(&self) -> FireSpawner {
		FireSpawner {
			runner: Arc::clone(&self.runner),
			executing: Arc::clone(&self.executing),
			executions: self.executions.clone(),
			shutdown: self.shutdown.clone(),
		}
	}
}

#[async_trait]
impl TriggerEngine for CronTriggerEngine {
	#[instrument(skip(self))]
	async fn schedule(&self, job_key: &str, cron_expr: &str) -> Result<()> {
		let schedule = parse_schedule(cron_expr)?;
		let times = Arc::new(Mutex::new(FireTimes {
			next: schedule.upcoming(Utc).next(),
			prev: None,
		}));
		let cancel = self.shutdown.child_token();

		let handle = tokio::spawn(fire_loop(
			job_key.to_string(),
			schedule,
			Arc::clone(&times),
			cancel.clone(),
			self.spawner(),
		));

		let previous = self.registrations.lock().await.insert(
			job_key.to_string(),
			Registration {
				cron_expr: cron_expr.to_string(),
				times,
				cancel,
				handle,
			},
		);
		if let Some(previous) = previous {
			previous.cancel.cancel();
			debug!(job_key, old_expr = %previous.cron_expr, "replaced trigger");
		}

		info!(job_key, cron_expr, "job scheduled");
		Ok(())
	}

	#[instrument(skip(self))]
	async fn unschedule(&self, job_key: &str) -> Result<bool> {
		match self.registrations.lock().await.remove(job_key) {
			Some(registration) => {
				registration.cancel.cancel();
				info!(job_key, "job unscheduled");
				Ok(true)
			}
			None => Ok(false),
		}
	}

	#[instrument(skip(self, context))]
	async fn trigger(&self, job_key: &str, context: TriggerContext) -> Result<()> {
		if !self.exists(job_key).await {
			return Err(SchedulerError::NotRegistered(job_key.to_string()));
		}

		self.spawner().fire(job_key, context);
		Ok(())
	}

	async fn exists(&self, job_key: &str) -> bool {
		self.registrations.lock().await.contains_key(job_key)
	}

	async fn get_trigger(&self, job_key: &str) -> Option<TriggerInfo> {
		let registrations = self.registrations.lock().await;
		let registration = registrations.get(job_key)?;
		let times = lock_times(&registration.times);
		Some(TriggerInfo {
			next_fire_time: times.next,
			prev_fire_time: times.prev,
			cron_expr: registration.cron_expr.clone(),
		})
	}

	async fn list_scheduled(&self) -> Vec<String> {
		let mut keys: Vec<String> = self.registrations.lock().await.keys().cloned().collect();
		keys.sort();
		keys
	}

	async fn list_executing(&self) -> Vec<String> {
		let mut keys: Vec<String> = lock_set(&self.executing).iter().cloned().collect();
		keys.sort();
		keys
	}

	#[instrument(skip(self))]
	async fn shutdown(&self) {
		self.shutdown.cancel();

		let drained: Vec<Registration> = self
			.registrations
			.lock()
			.await
			.drain()
			.map(|(_, registration)| registration)
			.collect();
		for registration in drained {
			let _ = registration.handle.await;
		}

		self.executions.close();
		if !self.executions.is_empty() {
			info!(in_flight = self.executions.len(), "waiting for running executions");
		}
		self.executions.wait().await;

		info!("trigger engine shut down");
	}
}

#[derive(Clone)]
struct FireSpawner {
	runner: Arc<dyn JobRunner>,
	executing: ExecutingSet,
	executions: TaskTracker,
	shutdown: CancellationToken,
}

impl FireSpawner {
	/// Start one execution unless the job is already running. Returns whether it started.
	fn fire(&self, job_key: &str, context: TriggerContext) -> bool {
		if self.shutdown.is_cancelled() {
			debug!(job_key, "engine shutting down, fire dropped");
			return false;
		}
		let Some(guard) = ExecutingGuard::claim(&self.executing, job_key) else {
			warn!(job_key, source = ?context.source, "job still executing, fire skipped");
			return false;
		};

		let runner = Arc::clone(&self.runner);
		let cancel = self.shutdown.child_token();
		let job_key = job_key.to_string();
		self.executions.spawn(async move {
			let _guard = guard;
			runner.run(&job_key, context, cancel).await;
		});
		true
	}
}

/// Membership in the executing set, dropped when the execution ends.
struct ExecutingGuard {
	executing: ExecutingSet,
	job_key: String,
}

impl ExecutingGuard {
	fn claim(executing: &ExecutingSet, job_key: &str) -> Option<Self> {
		if !lock_set(executing).insert(job_key.to_string()) {
			return None;
		}
		Some(Self {
			executing: Arc::clone(executing),
			job_key: job_key.to_string(),
		})
	}
}

impl Drop for ExecutingGuard {
	fn drop(&mut self) {
		lock_set(&self.executing).remove(&self.job_key);
	}
}

async fn fire_loop(
	job_key: String,
	schedule: Schedule,
	times: Arc<Mutex<FireTimes>>,
	cancel: CancellationToken,
	spawner: FireSpawner,
) {
	let mut last_fire: Option<DateTime<Utc>> = None;
	loop {
		let now = Utc::now();
		// Never fire the same slot twice if the wall clock lags the timer.
		let from = last_fire.map_or(now, |last| last.max(now));
		let Some(next) = schedule.after(&from).next() else {
			info!(job_key = %job_key, "schedule has no further fire times");
			lock_times(&times).next = None;
			break;
		};
		lock_times(&times).next = Some(next);

		let wait = (next - now).to_std().unwrap_or_default();
		tokio::select! {
			_ = cancel.cancelled() => break,
			_ = tokio::time::sleep(wait) => {}
		}

		last_fire = Some(next);
		lock_times(&times).prev = Some(next);
		spawner.fire(&job_key, TriggerContext::scheduled());
	}
}

// A poisoned lock only means another task panicked mid-update; the sets stay usable.
fn lock_set(set: &ExecutingSet) -> std::sync::MutexGuard<'_, HashSet<String>> {
	set.lock().unwrap_or_else(|e| e.into_inner())
}

fn lock_times(times: &Mutex<FireTimes>) -> std::sync::MutexGuard<'_, FireTimes> {
	times.lock().unwrap_or_else(|e| e.into_inner())
}
