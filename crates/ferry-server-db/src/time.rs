// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Timestamp encoding shared by all tables.
//!
//! Fixed-width RFC 3339 with microseconds and a `Z` suffix, so that text
//! comparison in SQL matches chronological order.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{DbError, Result};

pub(crate) fn encode(dt: DateTime<Utc>) -> String {
	dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn encode_opt(dt: Option<DateTime<Utc>>) -> Option<String> {
	dt.map(encode)
}

pub(crate) fn decode(field: &str, value: &str) -> Result<DateTime<Utc>> {
	DateTime::parse_from_rfc3339(value)
		.map(|dt| dt.with_timezone(&Utc))
		.map_err(|_| DbError::Internal(format!("Invalid {field}: {value}")))
}

pub(crate) fn decode_opt(field: &str, value: Option<String>) -> Result<Option<DateTime<Utc>>> {
	value.map(|v| decode(field, &v)).transpose()
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;

	#[test]
	fn test_encoding_is_fixed_width_and_ordered() {
		let a = Utc.with_ymd_and_hms(2026, 1, 19, 10, 0, 0).unwrap();
		let b = a + chrono::Duration::microseconds(1500);
		let (ea, eb) = (encode(a), encode(b));
		assert_eq!(ea.len(), eb.len());
		assert!(ea < eb);
		assert_eq!(ea, "2026-01-19T10:00:00.000000Z");
	}

	#[test]
	fn test_roundtrip() {
		let now = Utc::now();
		let decoded = decode("ts", &encode(now)).unwrap();
		assert_eq!(encode(decoded), encode(now));
	}

	#[test]
	fn test_decode_invalid() {
		assert!(decode("ts", "yesterday").is_err());
	}
}
