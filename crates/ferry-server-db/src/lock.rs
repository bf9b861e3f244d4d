// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Lease-based job locks.
//!
//! One row per job id. A row is held while `active` and unexpired; an
//! expired row is free for anyone to claim, which is how crashed holders
//! are recovered.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use tracing::instrument;

use ferry_sync_core::Lock;

use crate::error::{DbError, Result};
use crate::time;

#[async_trait]
pub trait LockRepository: Send + Sync {
	/// Claim the lock on `job_id` for `timeout`.
	///
	/// Fails (returns `false`) when the job's own lock is held by anyone,
	/// or when `exclusive` is set and another job holds an exclusive lock.
	async fn try_acquire(
		&self,
		job_id: &str,
		holder: &str,
		timeout: Duration,
		exclusive: bool,
	) -> Result<bool>;

	/// Deactivate the lock if `holder` owns it. Anything else is a no-op.
	async fn release(&self, job_id: &str, holder: &str) -> Result<()>;

	/// Push the expiry out by `timeout`. Returns `false` if `holder` no longer owns the lease.
	async fn renew(&self, job_id: &str, holder: &str, timeout: Duration) -> Result<bool>;

	/// The job's lock row if it is currently held.
	async fn active_lock(&self, job_id: &str) -> Result<Option<Lock>>;

	async fn list_active_exclusive_locks(&self, now: DateTime<Utc>) -> Result<Vec<Lock>>;

	/// Delete rows that are released or expired.
	async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

#[derive(Clone)]
pub struct SqliteLockRepository {
	pool: SqlitePool,
}

impl SqliteLockRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}
}

const LOCK_COLUMNS: &str = "job_id, holder, acquired_at, expires_at, active, exclusive";

#[async_trait]
impl LockRepository for SqliteLockRepository {
	#[instrument(skip(self, timeout), fields(timeout_secs = timeout.num_seconds()))]
	async fn try_acquire(
		&self,
		job_id: &str,
		holder: &str,
		timeout: Duration,
		exclusive: bool,
	) -> Result<bool> {
		if timeout <= Duration::zero() {
			return Err(DbError::Internal(format!(
				"lock timeout must be positive, got {timeout}"
			)));
		}

		// Check and claim in one write statement: SQLite takes the write lock
		// before reading, so concurrent claimants queue on the busy timeout
		// instead of failing on a stale snapshot.
		let now = Utc::now();
		let result = sqlx::query(
			r#"
			INSERT INTO sync_locks (job_id, holder, acquired_at, expires_at, active, exclusive)
			SELECT ?1, ?2, ?3, ?4, 1, ?5
			WHERE NOT EXISTS (
				SELECT 1 FROM sync_locks
				WHERE active = 1 AND expires_at > ?3
				  AND (job_id = ?1 OR (?5 = 1 AND exclusive = 1))
			)
			ON CONFLICT(job_id) DO UPDATE SET
				holder = excluded.holder,
				acquired_at = excluded.acquired_at,
				expires_at = excluded.expires_at,
				active = 1,
				exclusive = excluded.exclusive
			"#,
		)
		.bind(job_id)
		.bind(holder)
		.bind(time::encode(now))
		.bind(time::encode(now + timeout))
		.bind(exclusive)
		.execute(&self.pool)
		.await?;

		if result.rows_affected() > 0 {
			return Ok(true);
		}

		let blocking = sqlx::query_as::<_, (String, String)>(
			r#"
			SELECT job_id, holder FROM sync_locks
			WHERE active = 1 AND expires_at > ? AND (job_id = ? OR (? AND exclusive = 1))
			ORDER BY job_id = ? DESC
			LIMIT 1
			"#,
		)
		.bind(time::encode(now))
		.bind(job_id)
		.bind(exclusive)
		.bind(job_id)
		.fetch_optional(&self.pool)
		.await?;
		match blocking {
			Some((other_job, other_holder)) if other_job != job_id => tracing::debug!(
				job_id,
				blocking_job = %other_job,
				blocking_holder = %other_holder,
				"exclusive lock held by another job"
			),
			_ => tracing::debug!(job_id, "lock already held"),
		}
		Ok(false)
	}

	#[instrument(skip(self))]
	async fn release(&self, job_id: &str, holder: &str) -> Result<()> {
		let result =
			sqlx::query("UPDATE sync_locks SET active = 0 WHERE job_id = ? AND holder = ? AND active = 1")
				.bind(job_id)
				.bind(holder)
				.execute(&self.pool)
				.await?;

		if result.rows_affected() == 0 {
			tracing::debug!(job_id, holder, "release ignored, lock not held by holder");
		}
		Ok(())
	}

	#[instrument(skip(self, timeout))]
	async fn renew(&self, job_id: &str, holder: &str, timeout: Duration) -> Result<bool> {
		let now = Utc::now();
		let result = sqlx::query(
			r#"
			UPDATE sync_locks SET expires_at = ?
			WHERE job_id = ? AND holder = ? AND active = 1 AND expires_at > ?
			"#,
		)
		.bind(time::encode(now + timeout))
		.bind(job_id)
		.bind(holder)
		.bind(time::encode(now))
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected() > 0)
	}

	#[instrument(skip(self))]
	async fn active_lock(&self, job_id: &str) -> Result<Option<Lock>> {
		let row = sqlx::query_as::<_, LockRow>(&format!(
			"SELECT {LOCK_COLUMNS} FROM sync_locks WHERE job_id = ? AND active = 1 AND expires_at > ?"
		))
		.bind(job_id)
		.bind(time::encode(Utc::now()))
		.fetch_optional(&self.pool)
		.await?;

		row.map(Lock::try_from).transpose()
	}

	#[instrument(skip(self))]
	async fn list_active_exclusive_locks(&self, now: DateTime<Utc>) -> Result<Vec<Lock>> {
		let rows = sqlx::query_as::<_, LockRow>(&format!(
			"SELECT {LOCK_COLUMNS} FROM sync_locks \
			 WHERE exclusive = 1 AND active = 1 AND expires_at > ? ORDER BY acquired_at"
		))
		.bind(time::encode(now))
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(Lock::try_from).collect()
	}

	#[instrument(skip(self))]
	async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
		let result = sqlx::query("DELETE FROM sync_locks WHERE active = 0 OR expires_at <= ?")
			.bind(time::encode(now))
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected())
	}
}

#[derive(sqlx::FromRow)]
struct LockRow {
	job_id: String,
	holder: String,
	acquired_at: String,
	expires_at: String,
	active: bool,
	exclusive: bool,
}

impl TryFrom<LockRow> for Lock {
	type Error = DbError;

	fn try_from(row: LockRow) -> Result<Self> {
		Ok(Lock {
			acquired_at: time::decode("acquired_at", &row.acquired_at)?,
			expires_at: time::decode("expires_at", &row.expires_at)?,
			job_id: row.job_id,
			holder: row.holder,
			active: row.active,
			exclusive: row.exclusive,
		})
	}
}
