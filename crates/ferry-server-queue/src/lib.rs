// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! "Run this job now" requests between processes.
//!
//! A process without a trigger engine publishes [`Command`]s onto a durable
//! FIFO list and announces them on a notification channel. The
//! [`CommandProcessor`] inside the process that owns the trigger engine
//! drains the list and fires the requested jobs.
//!
//! [`Command`]: ferry_sync_core::Command

pub mod error;
pub mod memory;
pub mod processor;
pub mod queue;
pub mod redis_queue;

pub use error::{QueueError, Result};
pub use memory::InMemoryCommandQueue;
pub use processor::{CommandOutcome, CommandProcessor};
pub use queue::{CommandQueue, QueueTiming};
pub use redis_queue::RedisCommandQueue;
