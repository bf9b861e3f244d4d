// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Staging target: rows land as JSON documents in `staged_records`, keyed by
//! `(target_ref, record_key)` so a re-sync replaces rather than duplicates.
//! `record_key` holds the key value as JSON text.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::SqlitePool;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use ferry_sync_core::{DataTable, DataTarget, Result, Row, SyncError};

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS staged_records (
	target_ref TEXT NOT NULL,
	record_key TEXT NOT NULL,
	payload TEXT NOT NULL,
	staged_at TEXT NOT NULL,
	PRIMARY KEY (target_ref, record_key)
)
"#;

/// Saved rows are held until finalize and written in a single transaction,
/// so the store's write lock is never held across the run's other steps.
pub struct SqliteStagingTarget {
	pool: SqlitePool,
	target_ref: String,
	key_column: String,
	pending: Mutex<Option<Vec<Row>>>,
}

impl SqliteStagingTarget {
	pub fn new(pool: SqlitePool, target_ref: impl Into<String>, key_column: impl Into<String>) -> Self {
		Self {
			pool,
			target_ref: target_ref.into(),
			key_column: key_column.into(),
			pending: Mutex::new(None),
		}
	}

	fn pending(&self) -> std::sync::MutexGuard<'_, Option<Vec<Row>>> {
		self.pending.lock().unwrap_or_else(|e| e.into_inner())
	}

	/// The key value as JSON text, so `"1"` and `1` stay distinct records.
	fn record_key(&self, row: &Row) -> Result<String> {
		match row.get(&self.key_column) {
			Some(Value::Null) | None => Err(SyncError::Validation(format!(
				"row without '{}' reached the target",
				self.key_column
			))),
			Some(key) => Ok(key.to_string()),
		}
	}

	async fn commit(&self, rows: Vec<Row>) -> Result<()> {
		let staged_at = Utc::now().to_rfc3339();
		let mut tx = self.pool.begin().await.map_err(target_error)?;
		for row in &rows {
			let key = self.record_key(row)?;
			let payload = serde_json::to_string(row)
				.map_err(|e| SyncError::Target(format!("unserializable row: {e}")))?;
			sqlx::query(
				r#"
				INSERT INTO staged_records (target_ref, record_key, payload, staged_at)
				VALUES (?, ?, ?, ?)
				ON CONFLICT(target_ref, record_key) DO UPDATE SET
					payload = excluded.payload,
					staged_at = excluded.staged_at
				"#,
			)
			.bind(&self.target_ref)
			.bind(&key)
			.bind(&payload)
			.bind(&staged_at)
			.execute(&mut *tx)
			.await
			.map_err(target_error)?;
		}
		tx.commit().await.map_err(target_error)?;
		info!(target_ref = %self.target_ref, rows = rows.len(), "staged rows committed");
		Ok(())
	}
}

fn target_error(err: sqlx::Error) -> SyncError {
	SyncError::Target(err.to_string())
}

#[async_trait]
impl DataTarget for SqliteStagingTarget {
	fn target_name(&self) -> &str {
		&self.target_ref
	}

	#[instrument(skip(self, _cancel), fields(target_ref = %self.target_ref))]
	async fn prepare_target(&self, _cancel: &CancellationToken) -> Result<bool> {
		sqlx::query(CREATE_TABLE)
			.execute(&self.pool)
			.await
			.map_err(target_error)?;
		*self.pending() = Some(Vec::new());
		Ok(true)
	}

	async fn save_data(&self, data: &DataTable, _cancel: &CancellationToken) -> Result<bool> {
		let mut pending = self.pending();
		let Some(rows) = pending.as_mut() else {
			return Err(SyncError::Target("save before prepare".to_string()));
		};
		rows.extend(data.rows.iter().cloned());
		debug!(target_ref = %self.target_ref, buffered = rows.len(), "rows buffered");
		Ok(true)
	}

	#[instrument(skip(self, _cancel), fields(target_ref = %self.target_ref))]
	async fn finalize_target(&self, success: bool, _cancel: &CancellationToken) -> Result<bool> {
		let Some(rows) = self.pending().take() else {
			// Never prepared: nothing to commit or roll back.
			return Ok(true);
		};
		if !success {
			debug!(discarded = rows.len(), "staged rows rolled back");
			return Ok(true);
		}
		self.commit(rows).await?;
		Ok(true)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use ferry_server_db::testing::create_test_pool;
	use serde_json::json;

	fn table(values: Vec<Value>) -> DataTable {
		DataTable::from_rows(
			"test",
			values
				.into_iter()
				.map(|v| v.as_object().cloned().unwrap())
				.collect(),
		)
	}

	async fn staged(pool: &SqlitePool, target_ref: &str) -> Vec<(String, String)> {
		sqlx::query_as(
			"SELECT record_key, payload FROM staged_records WHERE target_ref = ? ORDER BY record_key",
		)
		.bind(target_ref)
		.fetch_all(pool)
		.await
		.unwrap()
	}

	#[tokio::test]
	async fn test_commit_on_success() {
		let pool = create_test_pool().await;
		let target = SqliteStagingTarget::new(pool.clone(), "orders", "id");
		let cancel = CancellationToken::new();

		assert!(target.prepare_target(&cancel).await.unwrap());
		target
			.save_data(&table(vec![json!({"id": 1, "v": "a"}), json!({"id": "b2", "v": "b"})]), &cancel)
			.await
			.unwrap();
		assert!(staged(&pool, "orders").await.is_empty());

		assert!(target.finalize_target(true, &cancel).await.unwrap());
		let rows = staged(&pool, "orders").await;
		assert_eq!(rows.len(), 2);
		assert_eq!(rows[0].0, "\"b2\"");
		assert_eq!(rows[1].0, "1");
	}

	#[tokio::test]
	async fn test_string_and_number_keys_are_distinct() {
		let pool = create_test_pool().await;
		let target = SqliteStagingTarget::new(pool.clone(), "orders", "id");
		let cancel = CancellationToken::new();

		target.prepare_target(&cancel).await.unwrap();
		target
			.save_data(
				&table(vec![json!({"id": 1, "v": "number"}), json!({"id": "1", "v": "string"})]),
				&cancel,
			)
			.await
			.unwrap();
		target.finalize_target(true, &cancel).await.unwrap();

		let rows = staged(&pool, "orders").await;
		assert_eq!(rows.len(), 2);
		let keys: Vec<&str> = rows.iter().map(|(key, _)| key.as_str()).collect();
		assert_eq!(keys, vec!["\"1\"", "1"]);
	}

	#[tokio::test]
	async fn test_rollback_discards_rows() {
		let pool = create_test_pool().await;
		let target = SqliteStagingTarget::new(pool.clone(), "orders", "id");
		let cancel = CancellationToken::new();

		target.prepare_target(&cancel).await.unwrap();
		target.save_data(&table(vec![json!({"id": 1})]), &cancel).await.unwrap();
		assert!(target.finalize_target(false, &cancel).await.unwrap());

		assert!(staged(&pool, "orders").await.is_empty());
	}

	#[tokio::test]
	async fn test_resync_replaces_by_key() {
		let pool = create_test_pool().await;
		let cancel = CancellationToken::new();

		for version in ["old", "new"] {
			let target = SqliteStagingTarget::new(pool.clone(), "orders", "id");
			target.prepare_target(&cancel).await.unwrap();
			target
				.save_data(&table(vec![json!({"id": 1, "v": version})]), &cancel)
				.await
				.unwrap();
			target.finalize_target(true, &cancel).await.unwrap();
		}

		let rows = staged(&pool, "orders").await;
		assert_eq!(rows.len(), 1);
		let payload: Value = serde_json::from_str(&rows[0].1).unwrap();
		assert_eq!(payload["v"], "new");
	}

	#[tokio::test]
	async fn test_finalize_without_prepare_is_noop() {
		let pool = create_test_pool().await;
		let target = SqliteStagingTarget::new(pool, "orders", "id");
		assert!(target
			.finalize_target(false, &CancellationToken::new())
			.await
			.unwrap());
	}

	#[tokio::test]
	async fn test_save_before_prepare_fails() {
		let pool = create_test_pool().await;
		let target = SqliteStagingTarget::new(pool, "orders", "id");
		let err = target
			.save_data(&table(vec![json!({"id": 1})]), &CancellationToken::new())
			.await
			.unwrap_err();
		assert!(matches!(err, SyncError::Target(_)));
	}
}
