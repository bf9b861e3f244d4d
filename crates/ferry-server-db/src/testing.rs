// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Helpers for tests that need a migrated database.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

use crate::pool::{create_pool, run_migrations};

/// In-memory pool with the full schema applied.
///
/// Pinned to a single connection: every SQLite in-memory connection is its
/// own database.
pub async fn create_test_pool() -> SqlitePool {
	let options = SqliteConnectOptions::from_str("sqlite::memory:")
		.unwrap()
		.foreign_keys(true);
	let pool = SqlitePoolOptions::new()
		.max_connections(1)
		.idle_timeout(None)
		.max_lifetime(None)
		.connect_with(options)
		.await
		.unwrap();
	run_migrations(&pool).await.unwrap();
	pool
}

/// File-backed pool under `dir` with several connections, for tests that
/// need real write contention between connections.
pub async fn create_file_test_pool(dir: &Path) -> SqlitePool {
	let pool = create_pool(&file_test_url(dir)).await.unwrap();
	run_migrations(&pool).await.unwrap();
	pool
}

/// URL of the database behind [`create_file_test_pool`], for reopening it.
pub fn file_test_url(dir: &Path) -> String {
	format!("sqlite:{}", dir.join("ferry-test.db").display())
}
