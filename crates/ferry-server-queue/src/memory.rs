// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Process-local queue for single-process deployments and tests.
//!
//! Payloads are stored in their wire form so the JSON contract is exercised
//! the same way the Redis transport does.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};

use ferry_sync_core::Command;

use crate::error::Result;
use crate::queue::{CommandQueue, QueueTiming};

pub struct InMemoryCommandQueue {
	items: Mutex<VecDeque<String>>,
	available: Notify,
	notifications: broadcast::Sender<String>,
	timing: QueueTiming,
}

impl InMemoryCommandQueue {
	pub fn new(timing: QueueTiming) -> Self {
		let (notifications, _) = broadcast::channel(64);
		Self {
			items: Mutex::new(VecDeque::new()),
			available: Notify::new(),
			notifications,
			timing,
		}
	}

	/// Receive every payload announced after this call.
	pub fn subscribe(&self) -> broadcast::Receiver<String> {
		self.notifications.subscribe()
	}

	pub fn len(&self) -> usize {
		self.lock_items().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Append a payload as-is, bypassing serialization.
	pub fn push_raw(&self, payload: impl Into<String>) {
		self.lock_items().push_back(payload.into());
		self.available.notify_one();
	}

	fn lock_items(&self) -> std::sync::MutexGuard<'_, VecDeque<String>> {
		self.items.lock().unwrap_or_else(|e| e.into_inner())
	}
}

impl Default for InMemoryCommandQueue {
	fn default() -> Self {
		Self::new(QueueTiming::default())
	}
}

#[async_trait]
impl CommandQueue for InMemoryCommandQueue {
	async fn publish(&self, command: &Command) -> Result<()> {
		let payload = command.to_json()?;
		self.push_raw(payload.clone());
		// No subscribers is fine: the list is the source of truth.
		let _ = self.notifications.send(payload);
		Ok(())
	}

	async fn pop(&self, timeout: Duration) -> Result<Option<Command>> {
		let deadline = tokio::time::Instant::now() + timeout;
		loop {
			let next = self.lock_items().pop_front();
			if let Some(payload) = next {
				return Ok(Some(Command::from_json(&payload)?));
			}
			if tokio::time::timeout_at(deadline, self.available.notified())
				.await
				.is_err()
			{
				return Ok(None);
			}
		}
	}

	fn timing(&self) -> QueueTiming {
		self.timing
	}
}
