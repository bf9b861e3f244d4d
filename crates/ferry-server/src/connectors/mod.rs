// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Concrete connectors used by the server binary.

mod http;
mod staging;

pub use http::HttpJsonSource;
pub use staging::SqliteStagingTarget;

use sqlx::SqlitePool;
use std::sync::Arc;

use ferry_sync_core::{ConnectorFactory, Connectors, Job, Result, SyncError};

/// HTTP JSON source and SQLite staging target for every job.
///
/// A fresh target is built per run so each run owns its own transaction.
pub struct DefaultConnectorFactory {
	client: reqwest::Client,
	pool: SqlitePool,
}

impl DefaultConnectorFactory {
	pub fn new(client: reqwest::Client, pool: SqlitePool) -> Self {
		Self { client, pool }
	}
}

impl ConnectorFactory for DefaultConnectorFactory {
	fn connectors(&self, job: &Job) -> Result<Connectors> {
		if job.target_ref.trim().is_empty() {
			return Err(SyncError::Configuration(format!(
				"job {} has no target reference",
				job.id
			)));
		}
		Ok(Connectors {
			source: Arc::new(HttpJsonSource::new(
				self.client.clone(),
				job.source_endpoint.clone(),
			)),
			target: Arc::new(SqliteStagingTarget::new(
				self.pool.clone(),
				job.target_ref.clone(),
				job.key_column(),
			)),
		})
	}
}
