// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Contracts the orchestrator consumes from data sources and data targets.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::model::Job;
use crate::table::DataTable;

/// Parameters passed to [`DataSource::fetch_data`].
pub type FetchParams = BTreeMap<String, String>;

/// Read side of a sync: the external provider.
#[async_trait]
pub trait DataSource: Send + Sync {
	fn source_name(&self) -> &str;

	/// Cheap reachability probe. Safe to call frequently.
	async fn test_connection(&self, cancel: &CancellationToken) -> Result<bool>;

	async fn fetch_data(&self, params: &FetchParams, cancel: &CancellationToken)
		-> Result<DataTable>;
}

/// Write side of a sync: the relational store being loaded.
#[async_trait]
pub trait DataTarget: Send + Sync {
	fn target_name(&self) -> &str;

	/// Open whatever unit of work the target needs, e.g. a transaction.
	async fn prepare_target(&self, cancel: &CancellationToken) -> Result<bool>;

	async fn save_data(&self, data: &DataTable, cancel: &CancellationToken) -> Result<bool>;

	/// Commit on `success`, roll back otherwise.
	///
	/// Called exactly once per run regardless of outcome, and must accept
	/// `success = false` even when [`DataTarget::prepare_target`] never succeeded.
	async fn finalize_target(&self, success: bool, cancel: &CancellationToken) -> Result<bool>;
}

/// Source and target resolved for one job.
#[derive(Clone)]
pub struct Connectors {
	pub source: Arc<dyn DataSource>,
	pub target: Arc<dyn DataTarget>,
}

/// Resolves the connectors for a job once, when the job is loaded for a run.
pub trait ConnectorFactory: Send + Sync {
	fn connectors(&self, job: &Job) -> Result<Connectors>;
}
