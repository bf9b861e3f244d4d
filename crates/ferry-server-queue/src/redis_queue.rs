// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Redis transport: an LPUSH/BRPOP list for delivery and a pub/sub channel
//! for announcements.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use ferry_sync_core::Command;

use crate::error::Result;
use crate::queue::{CommandQueue, QueueTiming};

pub const DEFAULT_LIST_NAME: &str = "ferry:commands";
pub const DEFAULT_CHANNEL_NAME: &str = "ferry:commands:notify";

pub struct RedisCommandQueue {
	client: redis::Client,
	list_name: String,
	channel_name: String,
	timing: QueueTiming,
	publisher: Mutex<Option<MultiplexedConnection>>,
	// BRPOP parks the connection, so the consumer never shares with publishers.
	consumer: Mutex<Option<MultiplexedConnection>>,
}

impl RedisCommandQueue {
	/// Connections are opened lazily on first use.
	pub fn new(
		url: &str,
		list_name: impl Into<String>,
		channel_name: impl Into<String>,
		timing: QueueTiming,
	) -> Result<Self> {
		let client = redis::Client::open(url)?;
		Ok(Self {
			client,
			list_name: list_name.into(),
			channel_name: channel_name.into(),
			timing,
			publisher: Mutex::new(None),
			consumer: Mutex::new(None),
		})
	}

	pub fn list_name(&self) -> &str {
		&self.list_name
	}

	pub fn channel_name(&self) -> &str {
		&self.channel_name
	}

	async fn connection(
		&self,
		slot: &mut Option<MultiplexedConnection>,
	) -> Result<MultiplexedConnection> {
		if let Some(conn) = slot.as_ref() {
			return Ok(conn.clone());
		}
		let conn = self.client.get_multiplexed_async_connection().await?;
		*slot = Some(conn.clone());
		Ok(conn)
	}
}

#[async_trait]
impl CommandQueue for RedisCommandQueue {
	#[instrument(skip(self, command), fields(command_id = %command.id, job_id = %command.job_id))]
	async fn publish(&self, command: &Command) -> Result<()> {
		let payload = command.to_json()?;
		let mut slot = self.publisher.lock().await;
		let mut conn = self.connection(&mut slot).await?;

		let pushed: redis::RedisResult<i64> = redis::cmd("LPUSH")
			.arg(&self.list_name)
			.arg(&payload)
			.query_async(&mut conn)
			.await;
		if let Err(e) = pushed {
			*slot = None;
			return Err(e.into());
		}

		let announced: redis::RedisResult<i64> = redis::cmd("PUBLISH")
			.arg(&self.channel_name)
			.arg(&payload)
			.query_async(&mut conn)
			.await;
		if let Err(e) = announced {
			warn!(error = %e, channel = %self.channel_name, "command queued but announcement failed");
		}

		debug!("command queued");
		Ok(())
	}

	async fn pop(&self, timeout: Duration) -> Result<Option<Command>> {
		let mut slot = self.consumer.lock().await;
		let mut conn = self.connection(&mut slot).await?;

		// BRPOP takes whole seconds and treats 0 as "forever".
		let seconds = timeout.as_secs().max(1);
		let popped: redis::RedisResult<Option<(String, String)>> = redis::cmd("BRPOP")
			.arg(&self.list_name)
			.arg(seconds)
			.query_async(&mut conn)
			.await;

		match popped {
			Ok(Some((_, payload))) => Ok(Some(Command::from_json(&payload)?)),
			Ok(None) => Ok(None),
			Err(e) => {
				*slot = None;
				Err(e.into())
			}
		}
	}

	fn timing(&self) -> QueueTiming {
		self.timing
	}
}
