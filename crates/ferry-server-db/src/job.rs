// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Job catalog persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use tracing::instrument;

use ferry_sync_core::Job;

use crate::error::{DbError, Result};
use crate::time;

/// Catalog of job definitions.
#[async_trait]
pub trait JobRepository: Send + Sync {
	async fn create_job(&self, job: &Job) -> Result<()>;
	async fn get_job(&self, id: &str) -> Result<Option<Job>>;
	async fn get_job_by_name(&self, name: &str) -> Result<Option<Job>>;
	/// All jobs, highest priority first, then by name.
	async fn list_jobs(&self) -> Result<Vec<Job>>;
	async fn list_enabled_jobs(&self) -> Result<Vec<Job>>;
	async fn update_job(&self, job: &Job) -> Result<()>;
	async fn set_enabled(&self, id: &str, enabled: bool) -> Result<()>;
	async fn set_last_run(&self, id: &str, at: DateTime<Utc>) -> Result<()>;
	async fn set_next_run(&self, id: &str, at: Option<DateTime<Utc>>) -> Result<()>;
	/// Jobs that name `id` as their dependency.
	async fn list_dependents(&self, id: &str) -> Result<Vec<Job>>;
	/// Fails with `Conflict` while any other job depends on `id`.
	async fn delete_job(&self, id: &str) -> Result<()>;
}

/// SQLite implementation of the job catalog.
#[derive(Clone)]
pub struct SqliteJobRepository {
	pool: SqlitePool,
}

impl SqliteJobRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}
}

const JOB_COLUMNS: &str = "id, name, cron_expression, enabled, depends_on, exclusive, priority, \
	 source_endpoint, target_ref, configuration, created_at, updated_at, last_run_at, next_run_at";

fn check_dependency(job: &Job) -> Result<()> {
	if job.depends_on.as_deref() == Some(job.id.as_str()) {
		return Err(DbError::Conflict(format!(
			"job {} cannot depend on itself",
			job.id
		)));
	}
	Ok(())
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
	#[instrument(skip(self, job), fields(job_id = %job.id, name = %job.name))]
	async fn create_job(&self, job: &Job) -> Result<()> {
		check_dependency(job)?;
		let configuration = serde_json::to_string(&job.configuration)?;

		sqlx::query(
			r#"
			INSERT INTO sync_jobs (
				id, name, cron_expression, enabled, depends_on, exclusive, priority,
				source_endpoint, target_ref, configuration,
				created_at, updated_at, last_run_at, next_run_at
			)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(&job.id)
		.bind(&job.name)
		.bind(&job.cron_expression)
		.bind(job.enabled)
		.bind(&job.depends_on)
		.bind(job.exclusive)
		.bind(job.priority)
		.bind(&job.source_endpoint)
		.bind(&job.target_ref)
		.bind(configuration)
		.bind(time::encode(job.created_at))
		.bind(time::encode(job.updated_at))
		.bind(time::encode_opt(job.last_run_at))
		.bind(time::encode_opt(job.next_run_at))
		.execute(&self.pool)
		.await
		.map_err(|e| DbError::from_insert(e, || format!("job {} or name {} exists", job.id, job.name)))?;

		Ok(())
	}

	#[instrument(skip(self))]
	async fn get_job(&self, id: &str) -> Result<Option<Job>> {
		let row = sqlx::query_as::<_, JobRow>(&format!(
			"SELECT {JOB_COLUMNS} FROM sync_jobs WHERE id = ?"
		))
		.bind(id)
		.fetch_optional(&self.pool)
		.await?;

		row.map(Job::try_from).transpose()
	}

	#[instrument(skip(self))]
	async fn get_job_by_name(&self, name: &str) -> Result<Option<Job>> {
		let row = sqlx::query_as::<_, JobRow>(&format!(
			"SELECT {JOB_COLUMNS} FROM sync_jobs WHERE name = ?"
		))
		.bind(name)
		.fetch_optional(&self.pool)
		.await?;

		row.map(Job::try_from).transpose()
	}

	#[instrument(skip(self))]
	async fn list_jobs(&self) -> Result<Vec<Job>> {
		let rows = sqlx::query_as::<_, JobRow>(&format!(
			"SELECT {JOB_COLUMNS} FROM sync_jobs ORDER BY priority DESC, name ASC"
		))
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(Job::try_from).collect()
	}

	#[instrument(skip(self))]
	async fn list_enabled_jobs(&self) -> Result<Vec<Job>> {
		let rows = sqlx::query_as::<_, JobRow>(&format!(
			"SELECT {JOB_COLUMNS} FROM sync_jobs WHERE enabled = 1 ORDER BY priority DESC, name ASC"
		))
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(Job::try_from).collect()
	}

	#[instrument(skip(self, job), fields(job_id = %job.id))]
	async fn update_job(&self, job: &Job) -> Result<()> {
		check_dependency(job)?;
		let configuration = serde_json::to_string(&job.configuration)?;

		let result = sqlx::query(
			r#"
			UPDATE sync_jobs
			SET name = ?,
				cron_expression = ?,
				enabled = ?,
				depends_on = ?,
				exclusive = ?,
				priority = ?,
				source_endpoint = ?,
				target_ref = ?,
				configuration = ?,
				updated_at = ?
			WHERE id = ?
			"#,
		)
		.bind(&job.name)
		.bind(&job.cron_expression)
		.bind(job.enabled)
		.bind(&job.depends_on)
		.bind(job.exclusive)
		.bind(job.priority)
		.bind(&job.source_endpoint)
		.bind(&job.target_ref)
		.bind(configuration)
		.bind(time::encode(Utc::now()))
		.bind(&job.id)
		.execute(&self.pool)
		.await
		.map_err(|e| DbError::from_insert(e, || format!("job name {} exists", job.name)))?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(job.id.clone()));
		}

		Ok(())
	}

	#[instrument(skip(self))]
	async fn set_enabled(&self, id: &str, enabled: bool) -> Result<()> {
		let result = sqlx::query("UPDATE sync_jobs SET enabled = ?, updated_at = ? WHERE id = ?")
			.bind(enabled)
			.bind(time::encode(Utc::now()))
			.bind(id)
			.execute(&self.pool)
			.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(id.to_string()));
		}

		Ok(())
	}

	#[instrument(skip(self))]
	async fn set_last_run(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
		let result = sqlx::query("UPDATE sync_jobs SET last_run_at = ? WHERE id = ?")
			.bind(time::encode(at))
			.bind(id)
			.execute(&self.pool)
			.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(id.to_string()));
		}

		Ok(())
	}

	#[instrument(skip(self))]
	async fn set_next_run(&self, id: &str, at: Option<DateTime<Utc>>) -> Result<()> {
		sqlx::query("UPDATE sync_jobs SET next_run_at = ? WHERE id = ?")
			.bind(time::encode_opt(at))
			.bind(id)
			.execute(&self.pool)
			.await?;

		Ok(())
	}

	#[instrument(skip(self))]
	async fn list_dependents(&self, id: &str) -> Result<Vec<Job>> {
		let rows = sqlx::query_as::<_, JobRow>(&format!(
			"SELECT {JOB_COLUMNS} FROM sync_jobs WHERE depends_on = ? ORDER BY priority DESC, name ASC"
		))
		.bind(id)
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(Job::try_from).collect()
	}

	#[instrument(skip(self))]
	async fn delete_job(&self, id: &str) -> Result<()> {
		let dependents = self.list_dependents(id).await?;
		if !dependents.is_empty() {
			let names: Vec<&str> = dependents.iter().map(|j| j.name.as_str()).collect();
			return Err(DbError::Conflict(format!(
				"job {id} is a dependency of: {}",
				names.join(", ")
			)));
		}

		let result = sqlx::query("DELETE FROM sync_jobs WHERE id = ?")
			.bind(id)
			.execute(&self.pool)
			.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(id.to_string()));
		}

		Ok(())
	}
}

#[derive(sqlx::FromRow)]
struct JobRow {
	id: String,
	name: String,
	cron_expression: String,
	enabled: bool,
	depends_on: Option<String>,
	exclusive: bool,
	priority: i64,
	source_endpoint: String,
	target_ref: String,
	configuration: String,
	created_at: String,
	updated_at: String,
	last_run_at: Option<String>,
	next_run_at: Option<String>,
}

impl TryFrom<JobRow> for Job {
	type Error = DbError;

	fn try_from(row: JobRow) -> Result<Self> {
		let configuration: BTreeMap<String, String> = serde_json::from_str(&row.configuration)?;

		Ok(Job {
			id: row.id,
			name: row.name,
			cron_expression: row.cron_expression,
			enabled: row.enabled,
			depends_on: row.depends_on,
			exclusive: row.exclusive,
			priority: i32::try_from(row.priority)
				.map_err(|_| DbError::Internal(format!("Invalid priority: {}", row.priority)))?,
			source_endpoint: row.source_endpoint,
			target_ref: row.target_ref,
			configuration,
			created_at: time::decode("created_at", &row.created_at)?,
			updated_at: time::decode("updated_at", &row.updated_at)?,
			last_run_at: time::decode_opt("last_run_at", row.last_run_at)?,
			next_run_at: time::decode_opt("next_run_at", row.next_run_at)?,
		})
	}
}
