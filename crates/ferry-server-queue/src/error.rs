// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

pub type Result<T> = std::result::Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
	#[error("queue transport error: {0}")]
	Transport(String),

	#[error("malformed command payload: {0}")]
	Serialization(#[from] serde_json::Error),
}

impl From<redis::RedisError> for QueueError {
	fn from(err: redis::RedisError) -> Self {
		QueueError::Transport(err.to_string())
	}
}
