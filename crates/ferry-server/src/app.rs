// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Process wiring: store, scheduler, command processor and retention.

use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use ferry_server_config::{QueueConfig, ServerConfig};
use ferry_server_db::{
	create_pool_with, run_migrations, PoolSettings, SqliteJobRepository, SqliteLockRepository,
	SqliteRunRepository,
};
use ferry_server_jobs::{
	AlertDispatcher, CronTriggerEngine, HealthMonitor, JobsHealthStatus, OrchestratorConfig,
	RetentionTask, SchedulerReconciler, SchedulingPolicy, SyncOrchestrator, TracingAlertSink,
	TriggerEngine,
};
use ferry_server_queue::{
	CommandProcessor, CommandQueue, InMemoryCommandQueue, QueueTiming, RedisCommandQueue,
};
use ferry_sync_core::{Command, ConnectorFactory};

use crate::connectors::DefaultConnectorFactory;

/// `redis_url` value selecting the process-local transport.
pub const MEMORY_QUEUE_URL: &str = "memory://";

pub fn build_queue(config: &QueueConfig) -> anyhow::Result<Arc<dyn CommandQueue>> {
	let timing = QueueTiming {
		poll_interval: config.poll_interval(),
		error_backoff: config.error_backoff(),
	};
	if config.redis_url == MEMORY_QUEUE_URL {
		return Ok(Arc::new(InMemoryCommandQueue::new(timing)));
	}
	Ok(Arc::new(RedisCommandQueue::new(
		&config.redis_url,
		config.list_name.as_str(),
		config.channel_name.as_str(),
		timing,
	)?))
}

/// Publish a TriggerNow command for `job_id` and return it.
pub async fn publish_trigger(
	config: &QueueConfig,
	job_id: &str,
	triggered_by: &str,
) -> anyhow::Result<Command> {
	if config.redis_url == MEMORY_QUEUE_URL {
		anyhow::bail!("the in-memory command queue cannot be reached from another process");
	}
	let queue = build_queue(config)?;
	Ok(queue.publish_trigger(job_id, triggered_by).await?)
}

/// Everything the scheduler process runs, wired but not yet started.
pub struct Server {
	pub pool: SqlitePool,
	pub engine: Arc<CronTriggerEngine>,
	pub reconciler: Arc<SchedulerReconciler>,
	pub processor: Arc<CommandProcessor>,
	pub retention: Arc<RetentionTask>,
	pub health: HealthMonitor,
}

impl Server {
	pub async fn build(config: &ServerConfig) -> anyhow::Result<Self> {
		let pool = create_pool_with(
			&config.database.url,
			PoolSettings {
				max_connections: config.database.max_connections,
				busy_timeout: config.database.busy_timeout(),
			},
		)
		.await?;
		run_migrations(&pool).await?;

		let connectors: Arc<dyn ConnectorFactory> = Arc::new(DefaultConnectorFactory::new(
			reqwest::Client::new(),
			pool.clone(),
		));
		let queue = build_queue(&config.queue)?;
		Self::with_parts(config, pool, connectors, queue)
	}

	/// Wire the process around an existing store, connectors and queue.
	pub fn with_parts(
		config: &ServerConfig,
		pool: SqlitePool,
		connectors: Arc<dyn ConnectorFactory>,
		queue: Arc<dyn CommandQueue>,
	) -> anyhow::Result<Self> {
		let jobs = Arc::new(SqliteJobRepository::new(pool.clone()));
		let runs = Arc::new(SqliteRunRepository::new(pool.clone()));
		let locks = Arc::new(SqliteLockRepository::new(pool.clone()));

		let policy = Arc::new(SchedulingPolicy::new(
			jobs.clone(),
			runs.clone(),
			locks.clone(),
			&config.scheduler.instance_id,
		));
		let alerts = Arc::new(AlertDispatcher::new(
			Arc::new(TracingAlertSink),
			config.jobs.alert_enabled,
			config.jobs.alert_throttle(),
		));

		let orchestrator = Arc::new(
			SyncOrchestrator::new(
				jobs.clone(),
				runs.clone(),
				policy,
				connectors,
				OrchestratorConfig {
					lock_timeout: config.scheduler.lock_timeout(),
				},
			)
			.with_alerts(alerts.clone()),
		);
		let engine = Arc::new(CronTriggerEngine::new(orchestrator));

		let reconciler = Arc::new(SchedulerReconciler::new(
			jobs.clone(),
			engine.clone(),
			config.scheduler.reconcile_interval(),
			config.scheduler.settle_delay(),
		));
		let processor = Arc::new(CommandProcessor::new(queue, engine.clone()));
		let retention = Arc::new(
			RetentionTask::new(
				runs.clone(),
				locks,
				config.jobs.history_retention_days,
				config.jobs.retention_interval(),
			)
			.with_alerts(alerts),
		);
		let health = HealthMonitor::new(jobs, runs);

		Ok(Self {
			pool,
			engine,
			reconciler,
			processor,
			retention,
			health,
		})
	}

	pub async fn health_status(&self) -> anyhow::Result<JobsHealthStatus> {
		Ok(self.health.health_status().await?)
	}

	/// Run the background loops until `shutdown` fires, then stop the trigger
	/// engine. Runs in progress are cancelled and finish recording their
	/// outcome before the pool closes.
	pub async fn run(self, shutdown: CancellationToken) {
		let mut tasks = JoinSet::new();

		let reconciler = self.reconciler.clone();
		let cancel = shutdown.child_token();
		tasks.spawn(async move { reconciler.run(cancel).await });

		let processor = self.processor.clone();
		let cancel = shutdown.child_token();
		tasks.spawn(async move { processor.run(cancel).await });

		let retention = self.retention.clone();
		let cancel = shutdown.child_token();
		tasks.spawn(async move { retention.run(cancel).await });

		info!("scheduler running");
		shutdown.cancelled().await;

		info!("shutting down background tasks");
		while let Some(result) = tasks.join_next().await {
			if let Err(e) = result {
				error!(error = %e, "background task panicked");
			}
		}

		let executing = self.engine.list_executing().await;
		if !executing.is_empty() {
			warn!(jobs = ?executing, "cancelling in-flight runs");
		}
		self.engine.shutdown().await;
		self.pool.close().await;
		info!("scheduler stopped");
	}
}
