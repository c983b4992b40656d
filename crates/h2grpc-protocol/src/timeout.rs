// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! `grpc-timeout` header values: at most 8 digits followed by a unit.

use std::time::Duration;

use thiserror::Error;

const MAX_DIGITS: usize = 8;
const MAX_VALUE: u128 = 99_999_999;

/// Units from finest to coarsest, with their length in nanoseconds
const UNITS: [(char, u128); 6] = [
    ('n', 1),
    ('u', 1_000),
    ('m', 1_000_000),
    ('S', 1_000_000_000),
    ('M', 60 * 1_000_000_000),
    ('H', 3_600 * 1_000_000_000),
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeoutError {
    #[error("empty grpc-timeout value")]
    Empty,

    #[error("invalid grpc-timeout unit: {0:?}")]
    InvalidUnit(char),

    #[error("invalid grpc-timeout amount: {0:?}")]
    InvalidAmount(String),
}

/// Encode a duration with the finest unit that fits, rounding up so a
/// non-zero timeout never becomes zero.
pub fn encode_timeout(timeout: Duration) -> String {
    let nanos = timeout.as_nanos();
    for (unit, scale) in UNITS {
        let amount = nanos.div_ceil(scale);
        if amount <= MAX_VALUE {
            return format!("{amount}{unit}");
        }
    }
    format!("{MAX_VALUE}H")
}

pub fn decode_timeout(value: &str) -> Result<Duration, TimeoutError> {
    let mut chars = value.chars();
    let unit = chars.next_back().ok_or(TimeoutError::Empty)?;
    let amount = chars.as_str();

    if amount.is_empty() || amount.len() > MAX_DIGITS || !amount.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(TimeoutError::InvalidAmount(amount.to_string()));
    }
    let amount: u64 = amount
        .parse()
        .map_err(|_| TimeoutError::InvalidAmount(amount.to_string()))?;

    let duration = match unit {
        'n' => Duration::from_nanos(amount),
        'u' => Duration::from_micros(amount),
        'm' => Duration::from_millis(amount),
        'S' => Duration::from_secs(amount),
        'M' => Duration::from_secs(amount * 60),
        'H' => Duration::from_secs(amount * 3_600),
        other => return Err(TimeoutError::InvalidUnit(other)),
    };
    Ok(duration)
}
