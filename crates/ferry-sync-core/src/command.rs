// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Cross-process commands carried by the command queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandKind {
	/// Run the job immediately on the process that owns the trigger engine.
	TriggerNow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
	pub id: String,
	pub job_id: String,
	pub command: CommandKind,
	pub triggered_by: String,
	pub timestamp: DateTime<Utc>,
}

impl Command {
	pub fn trigger_now(job_id: impl Into<String>, triggered_by: impl Into<String>) -> Self {
		Self {
			id: Uuid::new_v4().to_string(),
			job_id: job_id.into(),
			command: CommandKind::TriggerNow,
			triggered_by: triggered_by.into(),
			timestamp: Utc::now(),
		}
	}

	pub fn to_json(&self) -> serde_json::Result<String> {
		serde_json::to_string(self)
	}

	pub fn from_json(payload: &str) -> serde_json::Result<Self> {
		serde_json::from_str(payload)
	}
}
