// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use ferry_sync_core::Command;

use crate::error::{QueueError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueTiming {
	/// Upper bound on a single blocking pop.
	pub poll_interval: Duration,
	/// Pause after a transport error before polling again.
	pub error_backoff: Duration,
}

impl Default for QueueTiming {
	fn default() -> Self {
		Self {
			poll_interval: Duration::from_secs(1),
			error_backoff: Duration::from_secs(5),
		}
	}
}

/// Durable FIFO of commands plus an advisory notification channel.
#[async_trait]
pub trait CommandQueue: Send + Sync {
	/// Append to the FIFO, then announce on the channel. Only the append must succeed.
	async fn publish(&self, command: &Command) -> Result<()>;

	/// Pop the oldest command, blocking for at most `timeout`.
	async fn pop(&self, timeout: Duration) -> Result<Option<Command>>;

	fn timing(&self) -> QueueTiming;

	async fn publish_trigger(&self, job_id: &str, triggered_by: &str) -> Result<Command> {
		let command = Command::trigger_now(job_id, triggered_by);
		self.publish(&command).await?;
		Ok(command)
	}

	/// Block until a command arrives. `None` only once `cancel` fires.
	///
	/// Cancellation is observed between pops, so it takes effect within one
	/// poll interval. Transport errors back off and retry; malformed payloads
	/// are dropped.
	async fn wait_for_command(&self, cancel: &CancellationToken) -> Option<Command> {
		let timing = self.timing();
		while !cancel.is_cancelled() {
			match self.pop(timing.poll_interval).await {
				Ok(Some(command)) => return Some(command),
				Ok(None) => {}
				Err(QueueError::Serialization(e)) => {
					warn!(error = %e, "dropping malformed command");
				}
				Err(e) => {
					error!(error = %e, backoff_secs = timing.error_backoff.as_secs(), "command queue unavailable");
					tokio::select! {
						_ = cancel.cancelled() => return None,
						_ = tokio::time::sleep(timing.error_backoff) => {}
					}
				}
			}
		}
		None
	}
}
