// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use ferry_server_jobs::ENDPOINT_PARAM;
use ferry_sync_core::{DataSource, DataTable, FetchParams, Result, Row, SyncError};

/// Job configuration keys with this prefix become query parameters.
const QUERY_PREFIX: &str = "query.";

/// Reads a JSON array of objects, or `{ "data": [...] }`, from a GET endpoint.
pub struct HttpJsonSource {
	client: reqwest::Client,
	endpoint: String,
}

impl HttpJsonSource {
	pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
		Self {
			client,
			endpoint: endpoint.into(),
		}
	}

	async fn get(&self, params: &FetchParams) -> Result<Value> {
		let endpoint = params
			.get(ENDPOINT_PARAM)
			.filter(|e| !e.is_empty())
			.unwrap_or(&self.endpoint);
		let query: Vec<(&str, &str)> = params
			.iter()
			.filter_map(|(k, v)| k.strip_prefix(QUERY_PREFIX).map(|k| (k, v.as_str())))
			.collect();

		let response = self
			.client
			.get(endpoint)
			.query(&query)
			.send()
			.await
			.map_err(|e| SyncError::Source(format!("request to {endpoint} failed: {e}")))?;

		let status = response.status();
		if !status.is_success() {
			return Err(SyncError::Source(format!("{endpoint} returned {status}")));
		}

		response
			.json::<Value>()
			.await
			.map_err(|e| SyncError::Source(format!("invalid JSON from {endpoint}: {e}")))
	}
}

/// Objects out of the payload; non-object array entries are skipped.
fn extract_rows(payload: Value) -> Result<Vec<Row>> {
	let items = match payload {
		Value::Array(items) => items,
		Value::Object(mut object) => match object.remove("data") {
			Some(Value::Array(items)) => items,
			_ => {
				return Err(SyncError::Source(
					"expected a JSON array or an object with a \"data\" array".to_string(),
				))
			}
		},
		_ => {
			return Err(SyncError::Source(
				"expected a JSON array or an object with a \"data\" array".to_string(),
			))
		}
	};

	let total = items.len();
	let rows: Vec<Row> = items
		.into_iter()
		.filter_map(|item| match item {
			Value::Object(row) => Some(row),
			_ => None,
		})
		.collect();
	if rows.len() < total {
		warn!(skipped = total - rows.len(), "skipped non-object entries in payload");
	}
	Ok(rows)
}

#[async_trait]
impl DataSource for HttpJsonSource {
	fn source_name(&self) -> &str {
		&self.endpoint
	}

	async fn test_connection(&self, cancel: &CancellationToken) -> Result<bool> {
		let probe = self.client.head(&self.endpoint).send();
		let response = tokio::select! {
			biased;
			_ = cancel.cancelled() => return Err(SyncError::Cancelled),
			response = probe => response,
		};
		match response {
			// Some APIs reject HEAD but are up.
			Ok(response) => Ok(!response.status().is_server_error()),
			Err(e) => {
				debug!(endpoint = %self.endpoint, error = %e, "connection probe failed");
				Ok(false)
			}
		}
	}

	#[instrument(skip(self, params, cancel), fields(endpoint = %self.endpoint))]
	async fn fetch_data(&self, params: &FetchParams, cancel: &CancellationToken) -> Result<DataTable> {
		let payload = tokio::select! {
			biased;
			_ = cancel.cancelled() => return Err(SyncError::Cancelled),
			payload = self.get(params) => payload?,
		};
		let rows = extract_rows(payload)?;
		debug!(rows = rows.len(), "fetched rows");
		Ok(DataTable::from_rows(self.endpoint.clone(), rows))
	}
}
