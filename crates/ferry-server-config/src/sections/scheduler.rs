// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Scheduler configuration: reconciliation cadence and lease timing.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SchedulerConfigLayer {
	pub instance_id: Option<String>,
	pub reconcile_interval_secs: Option<u64>,
	pub settle_delay_secs: Option<u64>,
	pub lock_timeout_secs: Option<u64>,
}

impl SchedulerConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.instance_id.is_some() {
			self.instance_id = other.instance_id;
		}
		if other.reconcile_interval_secs.is_some() {
			self.reconcile_interval_secs = other.reconcile_interval_secs;
		}
		if other.settle_delay_secs.is_some() {
			self.settle_delay_secs = other.settle_delay_secs;
		}
		if other.lock_timeout_secs.is_some() {
			self.lock_timeout_secs = other.lock_timeout_secs;
		}
	}

	pub fn finalize(self) -> SchedulerConfig {
		SchedulerConfig {
			instance_id: self.instance_id.unwrap_or_else(generate_instance_id),
			reconcile_interval_secs: self.reconcile_interval_secs.unwrap_or(60),
			settle_delay_secs: self.settle_delay_secs.unwrap_or(5),
			lock_timeout_secs: self.lock_timeout_secs.unwrap_or(3600),
		}
	}
}

/// `<hostname>-<8 hex chars>`, unique per process start.
fn generate_instance_id() -> String {
	let host = std::env::var("HOSTNAME")
		.ok()
		.filter(|h| !h.is_empty())
		.unwrap_or_else(|| "ferry".to_string());
	let suffix = uuid::Uuid::new_v4().simple().to_string();
	format!("{host}-{}", &suffix[..8])
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerConfig {
	/// Lock holder identity of this process.
	pub instance_id: String,
	pub reconcile_interval_secs: u64,
	pub settle_delay_secs: u64,
	pub lock_timeout_secs: u64,
}

impl SchedulerConfig {
	pub fn reconcile_interval(&self) -> Duration {
		Duration::from_secs(self.reconcile_interval_secs)
	}

	pub fn settle_delay(&self) -> Duration {
		Duration::from_secs(self.settle_delay_secs)
	}

	pub fn lock_timeout(&self) -> Duration {
		Duration::from_secs(self.lock_timeout_secs)
	}
}

impl Default for SchedulerConfig {
	fn default() -> Self {
		SchedulerConfigLayer::default().finalize()
	}
}
