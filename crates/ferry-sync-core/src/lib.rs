// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the Ferry sync system.
//!
//! This crate holds the shared vocabulary used by the run store, the
//! orchestrator, and the command queue:
//!
//! - Catalog and audit records ([`Job`], [`Run`], [`Step`], [`Lock`])
//! - The status machine shared by runs and steps ([`RunStatus`])
//! - The narrow connector contracts ([`DataSource`], [`DataTarget`])
//! - Cross-process trigger commands ([`Command`])

pub mod command;
pub mod connector;
pub mod error;
pub mod model;
pub mod result;
pub mod status;
pub mod table;

pub use command::{Command, CommandKind};
pub use connector::{ConnectorFactory, Connectors, DataSource, DataTarget, FetchParams};
pub use error::{Result, SyncError};
pub use model::{Job, Lock, Run, Step, DEFAULT_KEY_COLUMN};
pub use result::SyncResult;
pub use status::{RunStatus, StepName};
pub use table::{DataTable, Row};

pub use tokio_util::sync::CancellationToken;
