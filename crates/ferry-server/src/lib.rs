// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Ferry server: wiring for the scheduler process and its command-line tools.

pub mod app;
pub mod connectors;
pub mod version;

pub use app::{build_queue, publish_trigger, Server};
