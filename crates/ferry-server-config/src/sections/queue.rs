// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Command queue configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueueConfigLayer {
	pub redis_url: Option<String>,
	pub list_name: Option<String>,
	pub channel_name: Option<String>,
	pub poll_interval_secs: Option<u64>,
	pub error_backoff_secs: Option<u64>,
}

impl QueueConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.redis_url.is_some() {
			self.redis_url = other.redis_url;
		}
		if other.list_name.is_some() {
			self.list_name = other.list_name;
		}
		if other.channel_name.is_some() {
			self.channel_name = other.channel_name;
		}
		if other.poll_interval_secs.is_some() {
			self.poll_interval_secs = other.poll_interval_secs;
		}
		if other.error_backoff_secs.is_some() {
			self.error_backoff_secs = other.error_backoff_secs;
		}
	}

	pub fn finalize(self) -> QueueConfig {
		let defaults = QueueConfig::default();
		QueueConfig {
			redis_url: self.redis_url.unwrap_or(defaults.redis_url),
			list_name: self.list_name.unwrap_or(defaults.list_name),
			channel_name: self.channel_name.unwrap_or(defaults.channel_name),
			poll_interval_secs: self.poll_interval_secs.unwrap_or(defaults.poll_interval_secs),
			error_backoff_secs: self.error_backoff_secs.unwrap_or(defaults.error_backoff_secs),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueConfig {
	pub redis_url: String,
	pub list_name: String,
	pub channel_name: String,
	pub poll_interval_secs: u64,
	pub error_backoff_secs: u64,
}

impl QueueConfig {
	pub fn poll_interval(&self) -> Duration {
		Duration::from_secs(self.poll_interval_secs)
	}

	pub fn error_backoff(&self) -> Duration {
		Duration::from_secs(self.error_backoff_secs)
	}
}

impl Default for QueueConfig {
	fn default() -> Self {
		Self {
			redis_url: "redis://127.0.0.1:6379".to_string(),
			list_name: "ferry:commands".to_string(),
			channel_name: "ferry:commands:notify".to_string(),
			poll_interval_secs: 1,
			error_backoff_secs: 5,
		}
	}
}
