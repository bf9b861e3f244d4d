// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Job execution and scheduling for Ferry server.
//!
//! The orchestrator runs one job end to end through the fixed step pipeline.
//! The scheduling policy decides whether a job may start and owns the
//! exclusivity leases. The cron trigger engine fires jobs on their schedules
//! and the reconciler keeps its registrations in line with the job catalog.

pub mod alert;
pub mod error;
pub mod health;
pub mod orchestrator;
pub mod policy;
pub mod reconciler;
pub mod retention;
pub mod schedule;
pub mod trigger;

pub use alert::{Alert, AlertDispatcher, AlertKind, AlertSink, TracingAlertSink};
pub use error::{Result, SchedulerError};
pub use health::{HealthMonitor, HealthState, JobHealthStatus, JobsHealthStatus, LastRunInfo};
pub use orchestrator::{OrchestratorConfig, SyncOrchestrator, ENDPOINT_PARAM};
pub use policy::SchedulingPolicy;
pub use reconciler::{ReconcileReport, SchedulerReconciler};
pub use retention::{RetentionReport, RetentionTask};
pub use schedule::{next_fire_after, normalize_cron_expression, validate_cron_expression};
pub use trigger::{
	CronTriggerEngine, JobRunner, TriggerContext, TriggerEngine, TriggerInfo, TriggerSource,
};
