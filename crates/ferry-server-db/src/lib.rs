// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Database layer for Ferry server.
//!
//! Owns persistence of the job catalog, run and step audit records, and
//! lease-based job locks. Everything is SQLite via `sqlx`.

pub mod error;
pub mod job;
pub mod lock;
pub mod pool;
pub mod run;
pub mod testing;
mod time;

pub use error::{DbError, Result};
pub use job::{JobRepository, SqliteJobRepository};
pub use lock::{LockRepository, SqliteLockRepository};
pub use pool::{create_pool, create_pool_with, run_migrations, PoolSettings};
pub use run::{RunRepository, SqliteRunRepository, ABANDONED_ERROR};
