// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Run and step audit records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::instrument;

use ferry_sync_core::{Run, RunStatus, Step, StepName};

use crate::error::{DbError, Result};
use crate::time;

#[async_trait]
pub trait RunRepository: Send + Sync {
	/// Fails with `Conflict` if the job already has an open run.
	async fn create_run(&self, run: &Run) -> Result<()>;
	async fn get_run(&self, run_id: &str) -> Result<Option<Run>>;
	async fn get_open_run(&self, job_id: &str) -> Result<Option<Run>>;
	/// Most recent run by start time, open or not.
	async fn get_last_run(&self, job_id: &str) -> Result<Option<Run>>;
	async fn list_runs(&self, job_id: &str, limit: u32, offset: u32) -> Result<Vec<Run>>;
	async fn update_run_progress(&self, run_id: &str, fetched: u64, processed: u64) -> Result<()>;
	/// Close an open run with a terminal status. Closing twice is a `Conflict`.
	async fn complete_run(
		&self,
		run_id: &str,
		status: RunStatus,
		processed: u64,
		error: Option<String>,
		metadata: Option<serde_json::Value>,
	) -> Result<()>;
	async fn count_consecutive_failures(&self, job_id: &str) -> Result<u32>;
	/// Fail open runs whose job holds no live lease at `now`.
	///
	/// Every live run keeps its job's lease renewed, so an open run without
	/// one was left behind by a process that died mid-run.
	async fn abandon_orphaned_runs(&self, now: DateTime<Utc>) -> Result<u64>;
	async fn delete_old_runs(&self, before: DateTime<Utc>) -> Result<u64>;
	async fn cleanup_old_runs(&self, retention_days: u32) -> Result<u64>;

	async fn create_step(&self, run_id: &str, name: StepName) -> Result<Step>;
	async fn complete_step(
		&self,
		step_id: &str,
		status: RunStatus,
		details: Option<String>,
		duration_ms: u64,
		metrics: Option<serde_json::Value>,
	) -> Result<()>;
	/// Steps of a run in execution order.
	async fn list_steps(&self, run_id: &str) -> Result<Vec<Step>>;
}

#[derive(Clone)]
pub struct SqliteRunRepository {
	pool: SqlitePool,
}

impl SqliteRunRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}
}

const RUN_COLUMNS: &str = "id, job_id, started_at, ended_at, status, records_fetched, \
	 records_processed, error_message, metadata";

/// Error message recorded on runs closed by [`RunRepository::abandon_orphaned_runs`].
pub const ABANDONED_ERROR: &str = "abandoned";

const STEP_COLUMNS: &str =
	"id, run_id, name, started_at, ended_at, status, details, duration_ms, metrics";

fn to_sql_count(n: u64) -> i64 {
	i64::try_from(n).unwrap_or(i64::MAX)
}

#[async_trait]
impl RunRepository for SqliteRunRepository {
	#[instrument(skip(self, run), fields(run_id = %run.id, job_id = %run.job_id))]
	async fn create_run(&self, run: &Run) -> Result<()> {
		let metadata = run.metadata.as_ref().map(serde_json::to_string).transpose()?;

		sqlx::query(
			r#"
			INSERT INTO sync_runs (
				id, job_id, started_at, ended_at, status,
				records_fetched, records_processed, error_message, metadata
			)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(&run.id)
		.bind(&run.job_id)
		.bind(time::encode(run.started_at))
		.bind(time::encode_opt(run.ended_at))
		.bind(run.status.as_str())
		.bind(to_sql_count(run.records_fetched))
		.bind(to_sql_count(run.records_processed))
		.bind(&run.error_message)
		.bind(metadata)
		.execute(&self.pool)
		.await
		.map_err(|e| DbError::from_insert(e, || format!("job {} already has an open run", run.job_id)))?;

		Ok(())
	}

	#[instrument(skip(self))]
	async fn get_run(&self, run_id: &str) -> Result<Option<Run>> {
		let row = sqlx::query_as::<_, RunRow>(&format!(
			"SELECT {RUN_COLUMNS} FROM sync_runs WHERE id = ?"
		))
		.bind(run_id)
		.fetch_optional(&self.pool)
		.await?;

		row.map(Run::try_from).transpose()
	}

	#[instrument(skip(self))]
	async fn get_open_run(&self, job_id: &str) -> Result<Option<Run>> {
		let row = sqlx::query_as::<_, RunRow>(&format!(
			"SELECT {RUN_COLUMNS} FROM sync_runs WHERE job_id = ? AND ended_at IS NULL"
		))
		.bind(job_id)
		.fetch_optional(&self.pool)
		.await?;

		row.map(Run::try_from).transpose()
	}

	#[instrument(skip(self))]
	async fn get_last_run(&self, job_id: &str) -> Result<Option<Run>> {
		let row = sqlx::query_as::<_, RunRow>(&format!(
			"SELECT {RUN_COLUMNS} FROM sync_runs WHERE job_id = ? \
			 ORDER BY started_at DESC, rowid DESC LIMIT 1"
		))
		.bind(job_id)
		.fetch_optional(&self.pool)
		.await?;

		row.map(Run::try_from).transpose()
	}

	#[instrument(skip(self))]
	async fn list_runs(&self, job_id: &str, limit: u32, offset: u32) -> Result<Vec<Run>> {
		let rows = sqlx::query_as::<_, RunRow>(&format!(
			"SELECT {RUN_COLUMNS} FROM sync_runs WHERE job_id = ? \
			 ORDER BY started_at DESC, rowid DESC LIMIT ? OFFSET ?"
		))
		.bind(job_id)
		.bind(limit as i64)
		.bind(offset as i64)
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(Run::try_from).collect()
	}

	#[instrument(skip(self))]
	async fn update_run_progress(&self, run_id: &str, fetched: u64, processed: u64) -> Result<()> {
		let result = sqlx::query(
			"UPDATE sync_runs SET records_fetched = ?, records_processed = ? WHERE id = ?",
		)
		.bind(to_sql_count(fetched))
		.bind(to_sql_count(processed))
		.bind(run_id)
		.execute(&self.pool)
		.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(run_id.to_string()));
		}

		Ok(())
	}

	#[instrument(skip(self, error, metadata))]
	async fn complete_run(
		&self,
		run_id: &str,
		status: RunStatus,
		processed: u64,
		error: Option<String>,
		metadata: Option<serde_json::Value>,
	) -> Result<()> {
		// Only open runs are updated, and an open run is in progress.
		if !RunStatus::InProgress.can_transition_to(status) {
			return Err(DbError::Internal(format!(
				"run {run_id} cannot be completed with non-terminal status {status}"
			)));
		}
		let metadata = metadata.as_ref().map(serde_json::to_string).transpose()?;

		let result = sqlx::query(
			r#"
			UPDATE sync_runs
			SET status = ?,
				ended_at = ?,
				records_processed = ?,
				error_message = ?,
				metadata = COALESCE(?, metadata)
			WHERE id = ? AND ended_at IS NULL
			"#,
		)
		.bind(status.as_str())
		.bind(time::encode(Utc::now()))
		.bind(to_sql_count(processed))
		.bind(error)
		.bind(metadata)
		.bind(run_id)
		.execute(&self.pool)
		.await?;

		if result.rows_affected() == 0 {
			return match self.get_run(run_id).await? {
				Some(_) => Err(DbError::Conflict(format!("run {run_id} already ended"))),
				None => Err(DbError::NotFound(run_id.to_string())),
			};
		}

		Ok(())
	}

	/// Failed runs since the most recent non-failed finished run.
	#[instrument(skip(self))]
	async fn count_consecutive_failures(&self, job_id: &str) -> Result<u32> {
		let row = sqlx::query_as::<_, (i64,)>(
			r#"
			WITH ranked AS (
				SELECT status,
					   ROW_NUMBER() OVER (ORDER BY started_at DESC, rowid DESC) as rn
				FROM sync_runs
				WHERE job_id = ? AND ended_at IS NOT NULL
			)
			SELECT COUNT(*) as count
			FROM ranked
			WHERE status = 'failed'
			  AND rn <= (
				  SELECT COALESCE(MIN(rn) - 1, (SELECT COUNT(*) FROM ranked))
				  FROM ranked
				  WHERE status != 'failed'
			  )
			"#,
		)
		.bind(job_id)
		.fetch_one(&self.pool)
		.await?;

		Ok(u32::try_from(row.0).unwrap_or(u32::MAX))
	}

	#[instrument(skip(self))]
	async fn abandon_orphaned_runs(&self, now: DateTime<Utc>) -> Result<u64> {
		let result = sqlx::query(
			r#"
			UPDATE sync_runs
			SET status = ?1, ended_at = ?2, error_message = ?3
			WHERE ended_at IS NULL
			  AND started_at < ?2
			  AND NOT EXISTS (
				  SELECT 1 FROM sync_locks l
				  WHERE l.job_id = sync_runs.job_id AND l.active = 1 AND l.expires_at > ?2
			  )
			"#,
		)
		.bind(RunStatus::Failed.as_str())
		.bind(time::encode(now))
		.bind(ABANDONED_ERROR)
		.execute(&self.pool)
		.await?;

		let abandoned = result.rows_affected();
		if abandoned > 0 {
			tracing::warn!(abandoned, "closed runs left open without a live lease");
		}
		Ok(abandoned)
	}

	/// Each job's most recent run survives, so `get_last_run` (and with it
	/// dependency checks) never changes because of retention.
	#[instrument(skip(self))]
	async fn delete_old_runs(&self, before: DateTime<Utc>) -> Result<u64> {
		let result = sqlx::query(
			r#"
			DELETE FROM sync_runs
			WHERE ended_at IS NOT NULL AND ended_at < ?
			  AND id != (
				  SELECT latest.id FROM sync_runs latest
				  WHERE latest.job_id = sync_runs.job_id
				  ORDER BY latest.started_at DESC, latest.rowid DESC
				  LIMIT 1
			  )
			"#,
		)
		.bind(time::encode(before))
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected())
	}

	#[instrument(skip(self))]
	async fn cleanup_old_runs(&self, retention_days: u32) -> Result<u64> {
		let cutoff = Utc::now() - chrono::Duration::days(i64::from(retention_days));
		self.delete_old_runs(cutoff).await
	}

	#[instrument(skip(self), fields(step = %name))]
	async fn create_step(&self, run_id: &str, name: StepName) -> Result<Step> {
		let step = Step::start(run_id, name);

		sqlx::query(
			r#"
			INSERT INTO sync_steps (id, run_id, seq, name, started_at, status)
			SELECT ?, ?, COALESCE(MAX(seq), 0) + 1, ?, ?, ?
			FROM sync_steps
			WHERE run_id = ?
			"#,
		)
		.bind(&step.id)
		.bind(&step.run_id)
		.bind(step.name.as_str())
		.bind(time::encode(step.started_at))
		.bind(step.status.as_str())
		.bind(run_id)
		.execute(&self.pool)
		.await?;

		Ok(step)
	}

	#[instrument(skip(self, details, metrics))]
	async fn complete_step(
		&self,
		step_id: &str,
		status: RunStatus,
		details: Option<String>,
		duration_ms: u64,
		metrics: Option<serde_json::Value>,
	) -> Result<()> {
		if !RunStatus::InProgress.can_transition_to(status) {
			return Err(DbError::Internal(format!(
				"step {step_id} cannot be completed with non-terminal status {status}"
			)));
		}
		let metrics = metrics.as_ref().map(serde_json::to_string).transpose()?;

		let result = sqlx::query(
			r#"
			UPDATE sync_steps
			SET status = ?,
				ended_at = ?,
				details = ?,
				duration_ms = ?,
				metrics = ?
			WHERE id = ? AND status = ?
			"#,
		)
		.bind(status.as_str())
		.bind(time::encode(Utc::now()))
		.bind(details)
		.bind(to_sql_count(duration_ms))
		.bind(metrics)
		.bind(step_id)
		.bind(RunStatus::InProgress.as_str())
		.execute(&self.pool)
		.await?;

		if result.rows_affected() == 0 {
			let (exists,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sync_steps WHERE id = ?")
				.bind(step_id)
				.fetch_one(&self.pool)
				.await?;
			return Err(if exists > 0 {
				DbError::Conflict(format!("step {step_id} already ended"))
			} else {
				DbError::NotFound(step_id.to_string())
			});
		}

		Ok(())
	}

	#[instrument(skip(self))]
	async fn list_steps(&self, run_id: &str) -> Result<Vec<Step>> {
		let rows = sqlx::query_as::<_, StepRow>(&format!(
			"SELECT {STEP_COLUMNS} FROM sync_steps WHERE run_id = ? ORDER BY seq ASC"
		))
		.bind(run_id)
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(Step::try_from).collect()
	}
}

fn decode_json(field: &str, value: Option<String>) -> Result<Option<serde_json::Value>> {
	value
		.map(|v| {
			serde_json::from_str(&v).map_err(|_| DbError::Internal(format!("Invalid {field}: {v}")))
		})
		.transpose()
}

fn decode_count(n: i64) -> u64 {
	u64::try_from(n).unwrap_or(0)
}

#[derive(sqlx::FromRow)]
struct RunRow {
	id: String,
	job_id: String,
	started_at: String,
	ended_at: Option<String>,
	status: String,
	records_fetched: i64,
	records_processed: i64,
	error_message: Option<String>,
	metadata: Option<String>,
}

impl TryFrom<RunRow> for Run {
	type Error = DbError;

	fn try_from(row: RunRow) -> Result<Self> {
		Ok(Run {
			status: row.status.parse().map_err(DbError::Internal)?,
			started_at: time::decode("started_at", &row.started_at)?,
			ended_at: time::decode_opt("ended_at", row.ended_at)?,
			records_fetched: decode_count(row.records_fetched),
			records_processed: decode_count(row.records_processed),
			metadata: decode_json("metadata", row.metadata)?,
			id: row.id,
			job_id: row.job_id,
			error_message: row.error_message,
		})
	}
}

#[derive(sqlx::FromRow)]
struct StepRow {
	id: String,
	run_id: String,
	name: String,
	started_at: String,
	ended_at: Option<String>,
	status: String,
	details: Option<String>,
	duration_ms: Option<i64>,
	metrics: Option<String>,
}

impl TryFrom<StepRow> for Step {
	type Error = DbError;

	fn try_from(row: StepRow) -> Result<Self> {
		Ok(Step {
			name: row.name.parse().map_err(DbError::Internal)?,
			status: row.status.parse().map_err(DbError::Internal)?,
			started_at: time::decode("started_at", &row.started_at)?,
			ended_at: time::decode_opt("ended_at", row.ended_at)?,
			duration_ms: row.duration_ms.map(decode_count),
			metrics: decode_json("metrics", row.metrics)?,
			id: row.id,
			run_id: row.run_id,
			details: row.details,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::job::{JobRepository, SqliteJobRepository};
	use crate::testing::create_test_pool;
	use ferry_sync_core::Job;

	async fn setup() -> (SqliteRunRepository, SqliteJobRepository) {
		let pool = create_test_pool().await;
		let jobs = SqliteJobRepository::new(pool.clone());
		jobs
			.create_job(&Job::new("job-1", "orders", "0 * * * *", "/orders", "orders"))
			.await
			.unwrap();
		(SqliteRunRepository::new(pool), jobs)
	}

	async fn finished_run(repo: &SqliteRunRepository, status: RunStatus) -> Run {
		let run = Run::start("job-1");
		repo.create_run(&run).await.unwrap();
		repo
			.complete_run(&run.id, status, 0, None, None)
			.await
			.unwrap();
		run
	}

	#[tokio::test]
	async fn test_create_and_complete_run() {
		let (repo, _) = setup().await;
		let run = Run::start("job-1");
		repo.create_run(&run).await.unwrap();

		let open = repo.get_open_run("job-1").await.unwrap().unwrap();
		assert_eq!(open.id, run.id);
		assert_eq!(open.status, RunStatus::InProgress);

		repo.update_run_progress(&run.id, 100, 0).await.unwrap();
		let progressed = repo.get_run(&run.id).await.unwrap().unwrap();
		assert_eq!(progressed.records_fetched, 100);

		repo
			.complete_run(
				&run.id,
				RunStatus::Completed,
				95,
				None,
				Some(serde_json::json!({"source": "http"})),
			)
			.await
			.unwrap();

		let done = repo.get_run(&run.id).await.unwrap().unwrap();
		assert_eq!(done.status, RunStatus::Completed);
		assert_eq!(done.records_fetched, 100);
		assert_eq!(done.records_processed, 95);
		assert!(done.ended_at.is_some());
		assert_eq!(done.metadata.unwrap()["source"], "http");
		assert!(repo.get_open_run("job-1").await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_second_open_run_is_conflict() {
		let (repo, _) = setup().await;
		repo.create_run(&Run::start("job-1")).await.unwrap();

		let result = repo.create_run(&Run::start("job-1")).await;
		assert!(matches!(result, Err(DbError::Conflict(_))));
	}

	#[tokio::test]
	async fn test_complete_twice_is_conflict() {
		let (repo, _) = setup().await;
		let run = finished_run(&repo, RunStatus::Failed).await;

		let result = repo
			.complete_run(&run.id, RunStatus::Completed, 0, None, None)
			.await;
		assert!(matches!(result, Err(DbError::Conflict(_))));

		let result = repo
			.complete_run("missing", RunStatus::Completed, 0, None, None)
			.await;
		assert!(matches!(result, Err(DbError::NotFound(_))));
	}

	#[tokio::test]
	async fn test_complete_with_non_terminal_status_rejected() {
		let (repo, _) = setup().await;
		let run = Run::start("job-1");
		repo.create_run(&run).await.unwrap();

		let result = repo
			.complete_run(&run.id, RunStatus::InProgress, 0, None, None)
			.await;
		assert!(matches!(result, Err(DbError::Internal(_))));
	}

	#[tokio::test]
	async fn test_last_run_and_listing() {
		let (repo, _) = setup().await;
		finished_run(&repo, RunStatus::Completed).await;
		let latest = finished_run(&repo, RunStatus::Failed).await;

		let last = repo.get_last_run("job-1").await.unwrap().unwrap();
		assert_eq!(last.id, latest.id);
		assert_eq!(last.status, RunStatus::Failed);

		let page = repo.list_runs("job-1", 1, 0).await.unwrap();
		assert_eq!(page.len(), 1);
		assert_eq!(page[0].id, latest.id);
		assert_eq!(repo.list_runs("job-1", 10, 0).await.unwrap().len(), 2);
		assert!(repo.get_last_run("other").await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_consecutive_failures() {
		let (repo, _) = setup().await;
		assert_eq!(repo.count_consecutive_failures("job-1").await.unwrap(), 0);

		finished_run(&repo, RunStatus::Failed).await;
		finished_run(&repo, RunStatus::Completed).await;
		finished_run(&repo, RunStatus::Failed).await;
		finished_run(&repo, RunStatus::Failed).await;
		assert_eq!(repo.count_consecutive_failures("job-1").await.unwrap(), 2);

		// Open runs do not break a failure streak.
		repo.create_run(&Run::start("job-1")).await.unwrap();
		assert_eq!(repo.count_consecutive_failures("job-1").await.unwrap(), 2);
	}

	#[tokio::test]
	async fn test_delete_old_runs_keeps_open_runs() {
		let (repo, _) = setup().await;
		let old = finished_run(&repo, RunStatus::Completed).await;
		let open = Run::start("job-1");
		repo.create_run(&open).await.unwrap();

		let deleted = repo
			.delete_old_runs(Utc::now() + chrono::Duration::seconds(5))
			.await
			.unwrap();
		assert_eq!(deleted, 1);
		assert!(repo.get_run(&old.id).await.unwrap().is_none());
		assert!(repo.get_run(&open.id).await.unwrap().is_some());

		assert_eq!(repo.cleanup_old_runs(90).await.unwrap(), 0);
	}

	#[tokio::test]
	async fn test_abandon_orphaned_runs_spares_leased_runs() {
		use crate::lock::{LockRepository, SqliteLockRepository};

		let pool = create_test_pool().await;
		let jobs = SqliteJobRepository::new(pool.clone());
		let repo = SqliteRunRepository::new(pool.clone());
		let locks = SqliteLockRepository::new(pool);
		for (id, name) in [("orphan", "orphan"), ("live", "live")] {
			jobs
				.create_job(&Job::new(id, name, "0 * * * *", "/x", "x"))
				.await
				.unwrap();
		}

		let orphan = Run::start("orphan");
		repo.create_run(&orphan).await.unwrap();
		assert!(locks
			.try_acquire("live", "node-a", chrono::Duration::minutes(5), false)
			.await
			.unwrap());
		let live = Run::start("live");
		repo.create_run(&live).await.unwrap();

		let now = Utc::now() + chrono::Duration::seconds(1);
		assert_eq!(repo.abandon_orphaned_runs(now).await.unwrap(), 1);

		let closed = repo.get_run(&orphan.id).await.unwrap().unwrap();
		assert_eq!(closed.status, RunStatus::Failed);
		assert_eq!(closed.error_message.as_deref(), Some(ABANDONED_ERROR));
		assert!(closed.ended_at.is_some());
		assert!(repo.get_open_run("orphan").await.unwrap().is_none());
		assert!(repo.get_open_run("live").await.unwrap().is_some());

		// The job can open a fresh run once the orphan is closed.
		repo.create_run(&Run::start("orphan")).await.unwrap();
	}

	#[tokio::test]
	async fn test_delete_old_runs_keeps_latest_run_per_job() {
		let (repo, jobs) = setup().await;
		jobs
			.create_job(&Job::new("job-2", "yearly", "0 0 1 1 *", "/y", "y"))
			.await
			.unwrap();

		let older = finished_run(&repo, RunStatus::Failed).await;
		let latest = finished_run(&repo, RunStatus::Completed).await;
		let only = Run::start("job-2");
		repo.create_run(&only).await.unwrap();
		repo
			.complete_run(&only.id, RunStatus::Completed, 0, None, None)
			.await
			.unwrap();

		let deleted = repo
			.delete_old_runs(Utc::now() + chrono::Duration::seconds(5))
			.await
			.unwrap();
		assert_eq!(deleted, 1);
		assert!(repo.get_run(&older.id).await.unwrap().is_none());
		assert_eq!(repo.get_last_run("job-1").await.unwrap().unwrap().id, latest.id);
		assert_eq!(repo.get_last_run("job-2").await.unwrap().unwrap().id, only.id);
	}

	#[tokio::test]
	async fn test_step_completes_once_with_terminal_status() {
		let (repo, _) = setup().await;
		let run = Run::start("job-1");
		repo.create_run(&run).await.unwrap();
		let step = repo.create_step(&run.id, StepName::Initialize).await.unwrap();

		let result = repo
			.complete_step(&step.id, RunStatus::Pending, None, 0, None)
			.await;
		assert!(matches!(result, Err(DbError::Internal(_))));

		repo
			.complete_step(&step.id, RunStatus::Failed, Some("boom".to_string()), 1, None)
			.await
			.unwrap();
		let result = repo
			.complete_step(&step.id, RunStatus::Completed, None, 1, None)
			.await;
		assert!(matches!(result, Err(DbError::Conflict(_))));

		let result = repo
			.complete_step("missing", RunStatus::Completed, None, 1, None)
			.await;
		assert!(matches!(result, Err(DbError::NotFound(_))));

		let steps = repo.list_steps(&run.id).await.unwrap();
		assert_eq!(steps[0].status, RunStatus::Failed);
	}

	#[tokio::test]
	async fn test_steps_are_ordered_and_cascade() {
		let (repo, jobs) = setup().await;
		let run = Run::start("job-1");
		repo.create_run(&run).await.unwrap();

		for name in StepName::PIPELINE {
			let step = repo.create_step(&run.id, name).await.unwrap();
			assert_eq!(step.status, RunStatus::InProgress);
			repo
				.complete_step(
					&step.id,
					RunStatus::Completed,
					Some(format!("{name} ok")),
					3,
					None,
				)
				.await
				.unwrap();
		}

		let steps = repo.list_steps(&run.id).await.unwrap();
		let names: Vec<StepName> = steps.iter().map(|s| s.name).collect();
		assert_eq!(names, StepName::PIPELINE.to_vec());
		assert!(steps.iter().all(|s| s.status == RunStatus::Completed));
		assert_eq!(steps[1].details.as_deref(), Some("fetch_data ok"));
		assert_eq!(steps[0].duration_ms, Some(3));

		jobs.delete_job("job-1").await.unwrap();
		assert!(repo.get_run(&run.id).await.unwrap().is_none());
		assert!(repo.list_steps(&run.id).await.unwrap().is_empty());
	}
}
