// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: environment variables and TOML files.

use std::path::PathBuf;
use std::str::FromStr;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::ServerConfigLayer;
use crate::sections::{
	DatabaseConfigLayer, JobsConfigLayer, LogFormat, LoggingConfigLayer, QueueConfigLayer,
	SchedulerConfigLayer,
};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<ServerConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(ServerConfigLayer::default())
	}
}

/// TOML file configuration source. A missing file contributes nothing.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/ferry/server.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(ServerConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: ServerConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: FERRY_SERVER_<SECTION>_<FIELD>
pub struct EnvSource;

impl EnvSource {
	/// Build a layer from an arbitrary variable lookup.
	pub fn load_with(
		lookup: impl Fn(&str) -> Option<String>,
	) -> Result<ServerConfigLayer, ConfigError> {
		let env = Env { lookup: &lookup };
		Ok(ServerConfigLayer {
			database: Some(DatabaseConfigLayer {
				url: env.var("FERRY_SERVER_DATABASE_URL"),
				max_connections: env.parse("FERRY_SERVER_DATABASE_MAX_CONNECTIONS")?,
				busy_timeout_secs: env.parse("FERRY_SERVER_DATABASE_BUSY_TIMEOUT_SECS")?,
			}),
			queue: Some(QueueConfigLayer {
				redis_url: env.var("FERRY_SERVER_REDIS_URL"),
				list_name: env.var("FERRY_SERVER_QUEUE_LIST"),
				channel_name: env.var("FERRY_SERVER_QUEUE_CHANNEL"),
				poll_interval_secs: env.parse("FERRY_SERVER_QUEUE_POLL_INTERVAL_SECS")?,
				error_backoff_secs: env.parse("FERRY_SERVER_QUEUE_ERROR_BACKOFF_SECS")?,
			}),
			scheduler: Some(SchedulerConfigLayer {
				instance_id: env.var("FERRY_SERVER_INSTANCE_ID"),
				reconcile_interval_secs: env.parse("FERRY_SERVER_RECONCILE_INTERVAL_SECS")?,
				settle_delay_secs: env.parse("FERRY_SERVER_SETTLE_DELAY_SECS")?,
				lock_timeout_secs: env.parse("FERRY_SERVER_LOCK_TIMEOUT_SECS")?,
			}),
			jobs: Some(JobsConfigLayer {
				alert_enabled: env.bool("FERRY_SERVER_JOB_ALERT_ENABLED"),
				alert_throttle_secs: env.parse("FERRY_SERVER_JOB_ALERT_THROTTLE_SECS")?,
				history_retention_days: env.parse("FERRY_SERVER_JOB_HISTORY_RETENTION_DAYS")?,
				retention_interval_secs: env.parse("FERRY_SERVER_JOB_RETENTION_INTERVAL_SECS")?,
			}),
			logging: Some(LoggingConfigLayer {
				level: env.var("FERRY_SERVER_LOG_LEVEL"),
				format: env.log_format("FERRY_SERVER_LOG_FORMAT")?,
			}),
		})
	}
}

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Self::load_with(|name| std::env::var(name).ok())
	}
}

struct Env<'a> {
	lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl Env<'_> {
	fn var(&self, name: &str) -> Option<String> {
		(self.lookup)(name).filter(|s| !s.is_empty())
	}

	fn bool(&self, name: &str) -> Option<bool> {
		self.var(name)
			.map(|v| v.eq_ignore_ascii_case("true") || v == "1")
	}

	fn parse<T: FromStr>(&self, name: &str) -> Result<Option<T>, ConfigError> {
		match self.var(name) {
			Some(v) => v.trim().parse().map(Some).map_err(|_| ConfigError::InvalidValue {
				key: name.to_string(),
				message: format!("invalid {} value '{v}'", std::any::type_name::<T>()),
			}),
			None => Ok(None),
		}
	}

	fn log_format(&self, name: &str) -> Result<Option<LogFormat>, ConfigError> {
		match self.var(name) {
			Some(v) => match v.to_lowercase().as_str() {
				"text" | "pretty" => Ok(Some(LogFormat::Text)),
				"json" => Ok(Some(LogFormat::Json)),
				_ => Err(ConfigError::InvalidValue {
					key: name.to_string(),
					message: format!("expected 'text' or 'json', got '{v}'"),
				}),
			},
			None => Ok(None),
		}
	}
}
