// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error taxonomy for sync runs.

use thiserror::Error;

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors raised while executing a sync run.
///
/// Only [`SyncError::Store`] is an infrastructure failure; every other variant
/// is a business failure that ends the current run and is recorded on it.
#[derive(Debug, Error)]
pub enum SyncError {
	/// Missing job, empty endpoint, unusable connector wiring. Never retried.
	#[error("configuration error: {0}")]
	Configuration(String),

	#[error("source error: {0}")]
	Source(String),

	#[error("target error: {0}")]
	Target(String),

	/// Structural validation failure. Row-level problems are dropped, not raised.
	#[error("validation error: {0}")]
	Validation(String),

	#[error("sync cancelled")]
	Cancelled,

	#[error("store error: {0}")]
	Store(String),
}

impl SyncError {
	/// Short machine-friendly label used in logs and alert keys.
	pub fn kind(&self) -> &'static str {
		match self {
			SyncError::Configuration(_) => "configuration",
			SyncError::Source(_) => "source",
			SyncError::Target(_) => "target",
			SyncError::Validation(_) => "validation",
			SyncError::Cancelled => "cancelled",
			SyncError::Store(_) => "store",
		}
	}

	pub fn is_cancelled(&self) -> bool {
		matches!(self, SyncError::Cancelled)
	}
}
