// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Status machine shared by runs and steps, and the fixed step vocabulary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle of a run or a step.
///
/// `Pending -> InProgress -> {Completed, Failed, Cancelled, PartiallyCompleted}`.
/// The four terminal values are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
	Pending,
	InProgress,
	Completed,
	Failed,
	Cancelled,
	PartiallyCompleted,
}

impl RunStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			RunStatus::Pending => "pending",
			RunStatus::InProgress => "in_progress",
			RunStatus::Completed => "completed",
			RunStatus::Failed => "failed",
			RunStatus::Cancelled => "cancelled",
			RunStatus::PartiallyCompleted => "partially_completed",
		}
	}

	pub fn is_terminal(&self) -> bool {
		matches!(
			self,
			RunStatus::Completed
				| RunStatus::Failed
				| RunStatus::Cancelled
				| RunStatus::PartiallyCompleted
		)
	}

	/// Whether moving from `self` to `next` is a legal transition.
	pub fn can_transition_to(&self, next: RunStatus) -> bool {
		match self {
			RunStatus::Pending => next == RunStatus::InProgress,
			RunStatus::InProgress => next.is_terminal(),
			_ => false,
		}
	}
}

impl fmt::Display for RunStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for RunStatus {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"pending" => Ok(RunStatus::Pending),
			"in_progress" => Ok(RunStatus::InProgress),
			"completed" => Ok(RunStatus::Completed),
			"failed" => Ok(RunStatus::Failed),
			"cancelled" => Ok(RunStatus::Cancelled),
			"partially_completed" => Ok(RunStatus::PartiallyCompleted),
			_ => Err(format!("unknown run status: {s}")),
		}
	}
}

/// Named phase of the sync pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
	Initialize,
	FetchData,
	ValidateData,
	TransferData,
	FinalizeTarget,
	/// Reserved for batching extensions.
	ProcessBatch,
	/// Reserved for post-run housekeeping extensions.
	Cleanup,
}

impl StepName {
	/// The pipeline executed for every run, in order.
	pub const PIPELINE: [StepName; 5] = [
		StepName::Initialize,
		StepName::FetchData,
		StepName::ValidateData,
		StepName::TransferData,
		StepName::FinalizeTarget,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			StepName::Initialize => "initialize",
			StepName::FetchData => "fetch_data",
			StepName::ValidateData => "validate_data",
			StepName::TransferData => "transfer_data",
			StepName::FinalizeTarget => "finalize_target",
			StepName::ProcessBatch => "process_batch",
			StepName::Cleanup => "cleanup",
		}
	}
}

impl fmt::Display for StepName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for StepName {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"initialize" => Ok(StepName::Initialize),
			"fetch_data" => Ok(StepName::FetchData),
			"validate_data" => Ok(StepName::ValidateData),
			"transfer_data" => Ok(StepName::TransferData),
			"finalize_target" => Ok(StepName::FinalizeTarget),
			"process_batch" => Ok(StepName::ProcessBatch),
			"cleanup" => Ok(StepName::Cleanup),
			_ => Err(format!("unknown step name: {s}")),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	fn any_status() -> impl Strategy<Value = RunStatus> {
		prop_oneof![
			Just(RunStatus::Pending),
			Just(RunStatus::InProgress),
			Just(RunStatus::Completed),
			Just(RunStatus::Failed),
			Just(RunStatus::Cancelled),
			Just(RunStatus::PartiallyCompleted),
		]
	}

	proptest! {
		#[test]
		fn run_status_roundtrip(status in any_status()) {
			let parsed: RunStatus = status.to_string().parse().unwrap();
			prop_assert_eq!(status, parsed);
		}

		#[test]
		fn terminal_statuses_are_absorbing(from in any_status(), to in any_status()) {
			if from.is_terminal() {
				prop_assert!(!from.can_transition_to(to));
			}
		}
	}

	#[test]
	fn test_in_progress_only_moves_to_terminal() {
		assert!(RunStatus::InProgress.can_transition_to(RunStatus::Completed));
		assert!(RunStatus::InProgress.can_transition_to(RunStatus::Cancelled));
		assert!(!RunStatus::InProgress.can_transition_to(RunStatus::Pending));
		assert!(RunStatus::Pending.can_transition_to(RunStatus::InProgress));
	}

	#[test]
	fn test_step_name_roundtrip() {
		for name in StepName::PIPELINE
			.iter()
			.chain([StepName::ProcessBatch, StepName::Cleanup].iter())
		{
			let parsed: StepName = name.as_str().parse().unwrap();
			assert_eq!(*name, parsed);
		}
	}

	#[test]
	fn test_unknown_values_rejected() {
		assert!("running".parse::<RunStatus>().is_err());
		assert!("fetch".parse::<StepName>().is_err());
	}
}
