// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Run store connection settings.
//!
//! Several writers share one SQLite file (the orchestrator, the lock store
//! and the staging target), so the busy timeout bounds how long a write
//! waits for the file lock before failing.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfigLayer {
	pub url: Option<String>,
	pub max_connections: Option<u32>,
	pub busy_timeout_secs: Option<u64>,
}

impl DatabaseConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.url.is_some() {
			self.url = other.url;
		}
		if other.max_connections.is_some() {
			self.max_connections = other.max_connections;
		}
		if other.busy_timeout_secs.is_some() {
			self.busy_timeout_secs = other.busy_timeout_secs;
		}
	}

	pub fn finalize(self) -> DatabaseConfig {
		let defaults = DatabaseConfig::default();
		DatabaseConfig {
			url: self.url.unwrap_or(defaults.url),
			max_connections: self.max_connections.unwrap_or(defaults.max_connections),
			busy_timeout_secs: self.busy_timeout_secs.unwrap_or(defaults.busy_timeout_secs),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
	pub url: String,
	pub max_connections: u32,
	pub busy_timeout_secs: u64,
}

impl DatabaseConfig {
	pub fn busy_timeout(&self) -> Duration {
		Duration::from_secs(self.busy_timeout_secs)
	}
}

impl Default for DatabaseConfig {
	fn default() -> Self {
		Self {
			url: "sqlite:./ferry.db".to_string(),
			max_connections: 5,
			busy_timeout_secs: 5,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let config = DatabaseConfigLayer::default().finalize();
		assert_eq!(config, DatabaseConfig::default());
		assert_eq!(config.url, "sqlite:./ferry.db");
		assert_eq!(config.busy_timeout(), Duration::from_secs(5));
	}

	#[test]
	fn test_merge_keeps_unset_fields() {
		let mut base: DatabaseConfigLayer =
			toml::from_str("url = \"sqlite:/var/lib/ferry/ferry.db\"\nmax_connections = 8").unwrap();
		base.merge(DatabaseConfigLayer {
			busy_timeout_secs: Some(30),
			..Default::default()
		});

		let config = base.finalize();
		assert_eq!(config.url, "sqlite:/var/lib/ferry/ferry.db");
		assert_eq!(config.max_connections, 8);
		assert_eq!(config.busy_timeout_secs, 30);
	}
}
