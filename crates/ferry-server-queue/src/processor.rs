// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use ferry_server_jobs::{SchedulerError, TriggerContext, TriggerEngine};
use ferry_sync_core::{Command, CommandKind};

use crate::queue::CommandQueue;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
	Triggered,
	/// The job is not registered with the trigger engine; the command is dropped.
	UnknownJob,
	Failed(String),
}

/// Drains the command queue into the local trigger engine.
pub struct CommandProcessor {
	queue: Arc<dyn CommandQueue>,
	engine: Arc<dyn TriggerEngine>,
}

impl CommandProcessor {
	pub fn new(queue: Arc<dyn CommandQueue>, engine: Arc<dyn TriggerEngine>) -> Self {
		Self { queue, engine }
	}

	#[instrument(skip(self, command), fields(command_id = %command.id, job_id = %command.job_id))]
	pub async fn handle(&self, command: Command) -> CommandOutcome {
		match command.command {
			CommandKind::TriggerNow => {
				if !self.engine.exists(&command.job_id).await {
					warn!(triggered_by = %command.triggered_by, "trigger requested for unknown job, dropping");
					return CommandOutcome::UnknownJob;
				}

				let context = TriggerContext::manual()
					.with("triggered_by", command.triggered_by.as_str())
					.with("command_id", command.id.as_str());
				match self.engine.trigger(&command.job_id, context).await {
					Ok(()) => {
						info!(triggered_by = %command.triggered_by, "manual trigger dispatched");
						CommandOutcome::Triggered
					}
					// Unregistered between the check and the trigger.
					Err(SchedulerError::NotRegistered(_)) => {
						warn!("job unregistered before trigger, dropping");
						CommandOutcome::UnknownJob
					}
					Err(e) => {
						error!(error = %e, "manual trigger failed");
						CommandOutcome::Failed(e.to_string())
					}
				}
			}
		}
	}

	pub async fn run(&self, cancel: CancellationToken) {
		info!("command processor started");
		while let Some(command) = self.queue.wait_for_command(&cancel).await {
			self.handle(command).await;
		}
		info!("command processor stopped");
	}
}
