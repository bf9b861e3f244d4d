// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use ferry_server_db::DbError;
use ferry_sync_core::SyncError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SchedulerError>;

#[derive(Debug, Error)]
pub enum SchedulerError {
	#[error("invalid cron expression '{expression}': {reason}")]
	InvalidCron { expression: String, reason: String },

	#[error("job not registered: {0}")]
	NotRegistered(String),

	#[error("alert delivery failed: {0}")]
	Alert(String),

	#[error("database error: {0}")]
	Db(#[from] DbError),
}

/// Store failures surface to orchestrator callers through the core taxonomy.
pub(crate) fn store_error(err: impl std::fmt::Display) -> SyncError {
	SyncError::Store(err.to_string())
}
