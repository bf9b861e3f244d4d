// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Centralized configuration management for Ferry server.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Type-safe configuration with validation
//! - Consistent environment variable naming (`FERRY_SERVER_*`)
//!
//! # Usage
//!
//! ```ignore
//! use ferry_server_config::load_config;
//!
//! let config = load_config()?;
//! println!("Database at {}", config.database.url);
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::ServerConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use tracing::{debug, info};

/// Fully resolved server configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
	pub database: DatabaseConfig,
	pub queue: QueueConfig,
	pub scheduler: SchedulerConfig,
	pub jobs: JobsConfig,
	pub logging: LoggingConfig,
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`FERRY_SERVER_*`)
/// 2. Config file (`/etc/ferry/server.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration with a custom config file path in place of the system one.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

/// Merge `sources` in precedence order and resolve the result.
pub fn load_from_sources(
	mut sources: Vec<Box<dyn ConfigSource>>,
) -> Result<ServerConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
pub fn finalize(layer: ServerConfigLayer) -> Result<ServerConfig, ConfigError> {
	let config = ServerConfig {
		database: layer.database.unwrap_or_default().finalize(),
		queue: layer.queue.unwrap_or_default().finalize(),
		scheduler: layer.scheduler.unwrap_or_default().finalize(),
		jobs: layer.jobs.unwrap_or_default().finalize(),
		logging: layer.logging.unwrap_or_default().finalize(),
	};

	validate_config(&config)?;

	info!(
		database = %config.database.url,
		instance_id = %config.scheduler.instance_id,
		reconcile_interval_secs = config.scheduler.reconcile_interval_secs,
		lock_timeout_secs = config.scheduler.lock_timeout_secs,
		alert_enabled = config.jobs.alert_enabled,
		history_retention_days = config.jobs.history_retention_days,
		"Server configuration loaded"
	);

	Ok(config)
}

fn require_positive(key: &str, value: u64) -> Result<(), ConfigError> {
	if value == 0 {
		return Err(ConfigError::Validation(format!("{key} must be greater than zero")));
	}
	Ok(())
}

/// Validate cross-field configuration rules.
fn validate_config(config: &ServerConfig) -> Result<(), ConfigError> {
	require_positive(
		"database.max_connections",
		u64::from(config.database.max_connections),
	)?;
	require_positive("queue.poll_interval_secs", config.queue.poll_interval_secs)?;
	require_positive("queue.error_backoff_secs", config.queue.error_backoff_secs)?;
	require_positive(
		"scheduler.reconcile_interval_secs",
		config.scheduler.reconcile_interval_secs,
	)?;
	require_positive("scheduler.lock_timeout_secs", config.scheduler.lock_timeout_secs)?;
	require_positive("jobs.alert_throttle_secs", config.jobs.alert_throttle_secs)?;
	require_positive(
		"jobs.retention_interval_secs",
		config.jobs.retention_interval_secs,
	)?;
	require_positive(
		"jobs.history_retention_days",
		u64::from(config.jobs.history_retention_days),
	)?;

	if config.scheduler.instance_id.trim().is_empty() {
		return Err(ConfigError::Validation(
			"scheduler.instance_id must not be blank".to_string(),
		));
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	struct FixedSource(Precedence, &'static str);

	impl ConfigSource for FixedSource {
		fn name(&self) -> &'static str {
			"fixed"
		}

		fn precedence(&self) -> Precedence {
			self.0
		}

		fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
			Ok(toml::from_str(self.1).unwrap())
		}
	}

	#[test]
	fn test_defaults_resolve() {
		let config = finalize(ServerConfigLayer::default()).unwrap();
		assert_eq!(config.database.url, "sqlite:./ferry.db");
		assert_eq!(config.queue.list_name, "ferry:commands");
		assert_eq!(config.scheduler.lock_timeout_secs, 3600);
		assert_eq!(config.jobs.history_retention_days, 90);
		assert_eq!(config.logging.level, "info");
	}

	#[test]
	fn test_higher_precedence_wins_regardless_of_order() {
		let config = load_from_sources(vec![
			Box::new(FixedSource(
				Precedence::Environment,
				"[database]\nurl = \"sqlite:/env.db\"",
			)),
			Box::new(FixedSource(
				Precedence::ConfigFile,
				"[database]\nurl = \"sqlite:/file.db\"\n[logging]\nlevel = \"debug\"",
			)),
		])
		.unwrap();
		assert_eq!(config.database.url, "sqlite:/env.db");
		assert_eq!(config.logging.level, "debug");
	}

	#[test]
	fn test_config_file_is_read() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("server.toml");
		std::fs::write(
			&path,
			r#"
[scheduler]
instance_id = "file-node"
reconcile_interval_secs = 15

[jobs]
alert_enabled = true
"#,
		)
		.unwrap();

		let config = load_from_sources(vec![
			Box::new(DefaultsSource),
			Box::new(TomlSource::new(&path)),
		])
		.unwrap();
		assert_eq!(config.scheduler.instance_id, "file-node");
		assert_eq!(config.scheduler.reconcile_interval_secs, 15);
		assert!(config.jobs.alert_enabled);
	}

	#[test]
	fn test_zero_lock_timeout_rejected() {
		let layer: ServerConfigLayer = toml::from_str("[scheduler]\nlock_timeout_secs = 0").unwrap();
		let err = finalize(layer).unwrap_err();
		assert!(err.to_string().contains("lock_timeout_secs"));
	}

	#[test]
	fn test_zero_poll_interval_rejected() {
		let layer: ServerConfigLayer = toml::from_str("[queue]\npoll_interval_secs = 0").unwrap();
		assert!(matches!(finalize(layer), Err(ConfigError::Validation(_))));
	}

	#[test]
	fn test_zero_max_connections_rejected() {
		let layer: ServerConfigLayer = toml::from_str("[database]\nmax_connections = 0").unwrap();
		let err = finalize(layer).unwrap_err();
		assert!(err.to_string().contains("database.max_connections"));
	}

	#[test]
	fn test_blank_instance_id_rejected() {
		let layer: ServerConfigLayer =
			toml::from_str("[scheduler]\ninstance_id = \"  \"").unwrap();
		assert!(finalize(layer).is_err());
	}

	proptest! {
		#[test]
		fn positive_intervals_always_validate(
			poll in 1u64..3600,
			reconcile in 1u64..86_400,
			lock in 1u64..86_400,
		) {
			let layer = ServerConfigLayer {
				queue: Some(QueueConfigLayer {
					poll_interval_secs: Some(poll),
					..Default::default()
				}),
				scheduler: Some(SchedulerConfigLayer {
					reconcile_interval_secs: Some(reconcile),
					lock_timeout_secs: Some(lock),
					..Default::default()
				}),
				..Default::default()
			};
			let config = finalize(layer).unwrap();
			prop_assert_eq!(config.queue.poll_interval_secs, poll);
			prop_assert_eq!(config.scheduler.lock_timeout_secs, lock);
		}
	}
}
