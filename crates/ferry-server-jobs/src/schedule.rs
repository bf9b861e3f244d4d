// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Cron expression parsing and next fire time calculation.
//!
//! Job schedules are stored as standard 5-field Unix expressions or as the
//! 6/7-field (seconds, optional year) form. Everything is evaluated in UTC.

use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;

use crate::error::{Result, SchedulerError};

/// Convert a 5-field Unix expression into the 7-field format the `cron` crate parses.
///
/// 5-field format: minute hour day-of-month month day-of-week
/// 7-field format: second minute hour day-of-month month day-of-week year
///
/// Expressions that already carry 6 or more fields are returned untouched.
pub fn normalize_cron_expression(expression: &str) -> String {
	let expression = expression.trim();
	if expression.split_whitespace().count() == 5 {
		format!("0 {} *", expression)
	} else {
		expression.to_string()
	}
}

pub(crate) fn parse_schedule(expression: &str) -> Result<Schedule> {
	Schedule::from_str(&normalize_cron_expression(expression)).map_err(|e| {
		SchedulerError::InvalidCron {
			expression: expression.to_string(),
			reason: e.to_string(),
		}
	})
}

pub fn validate_cron_expression(expression: &str) -> Result<()> {
	parse_schedule(expression).map(|_| ())
}

/// First fire time strictly after `after`, or `None` if the schedule never fires again.
pub fn next_fire_after(expression: &str, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
	Ok(parse_schedule(expression)?.after(&after).next())
}
