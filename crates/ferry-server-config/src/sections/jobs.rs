// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Jobs configuration section.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JobsConfigLayer {
	pub alert_enabled: Option<bool>,
	pub alert_throttle_secs: Option<u64>,
	pub history_retention_days: Option<u32>,
	pub retention_interval_secs: Option<u64>,
}

impl JobsConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.alert_enabled.is_some() {
			self.alert_enabled = other.alert_enabled;
		}
		if other.alert_throttle_secs.is_some() {
			self.alert_throttle_secs = other.alert_throttle_secs;
		}
		if other.history_retention_days.is_some() {
			self.history_retention_days = other.history_retention_days;
		}
		if other.retention_interval_secs.is_some() {
			self.retention_interval_secs = other.retention_interval_secs;
		}
	}

	pub fn finalize(self) -> JobsConfig {
		JobsConfig {
			alert_enabled: self.alert_enabled.unwrap_or(false),
			alert_throttle_secs: self.alert_throttle_secs.unwrap_or(900), // 15 minutes
			history_retention_days: self.history_retention_days.unwrap_or(90),
			retention_interval_secs: self.retention_interval_secs.unwrap_or(3600),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobsConfig {
	pub alert_enabled: bool,
	pub alert_throttle_secs: u64,
	pub history_retention_days: u32,
	/// How often the retention sweep runs.
	pub retention_interval_secs: u64,
}

impl JobsConfig {
	pub fn alert_throttle(&self) -> Duration {
		Duration::from_secs(self.alert_throttle_secs)
	}

	pub fn retention_interval(&self) -> Duration {
		Duration::from_secs(self.retention_interval_secs)
	}
}

impl Default for JobsConfig {
	fn default() -> Self {
		Self {
			alert_enabled: false,
			alert_throttle_secs: 900,
			history_retention_days: 90,
			retention_interval_secs: 3600,
		}
	}
}
