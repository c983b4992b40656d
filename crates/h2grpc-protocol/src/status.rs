// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! RPC status codes and their mapping to `grpc-status` / `grpc-message` metadata.

use std::fmt;

use http::{HeaderMap, HeaderValue};
use percent_encoding::{AsciiSet, CONTROLS, percent_decode, utf8_percent_encode};

use crate::metadata::{GRPC_MESSAGE, GRPC_STATUS};

/// Bytes that must be escaped inside `grpc-message`
const GRPC_MESSAGE_ESCAPES: &AsciiSet = &CONTROLS.add(b'%');

/// Canonical RPC status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Code {
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl TryFrom<u32> for Code {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, u32> {
        let code = match value {
            0 => Code::Ok,
            1 => Code::Cancelled,
            2 => Code::Unknown,
            3 => Code::InvalidArgument,
            4 => Code::DeadlineExceeded,
            5 => Code::NotFound,
            6 => Code::AlreadyExists,
            7 => Code::PermissionDenied,
            8 => Code::ResourceExhausted,
            9 => Code::FailedPrecondition,
            10 => Code::Aborted,
            11 => Code::OutOfRange,
            12 => Code::Unimplemented,
            13 => Code::Internal,
            14 => Code::Unavailable,
            15 => Code::DataLoss,
            16 => Code::Unauthenticated,
            other => return Err(other),
        };
        Ok(code)
    }
}

impl Code {
    /// Canonical name, used when a status carries no message
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::Ok => "OK",
            Code::Cancelled => "Canceled",
            Code::Unknown => "Unknown",
            Code::InvalidArgument => "InvalidArgument",
            Code::DeadlineExceeded => "DeadlineExceeded",
            Code::NotFound => "NotFound",
            Code::AlreadyExists => "AlreadyExists",
            Code::PermissionDenied => "PermissionDenied",
            Code::ResourceExhausted => "ResourceExhausted",
            Code::FailedPrecondition => "FailedPrecondition",
            Code::Aborted => "Aborted",
            Code::OutOfRange => "OutOfRange",
            Code::Unimplemented => "Unimplemented",
            Code::Internal => "Internal",
            Code::Unavailable => "Unavailable",
            Code::DataLoss => "DataLoss",
            Code::Unauthenticated => "Unauthenticated",
        }
    }

    /// Status implied by a non-200 HTTP response that carried no `grpc-status`
    pub fn from_http_status(status: u16) -> Code {
        match status {
            400 => Code::Internal,
            401 => Code::Unauthenticated,
            403 => Code::PermissionDenied,
            404 => Code::Unimplemented,
            429 | 502 | 503 | 504 => Code::Unavailable,
            _ => Code::Unknown,
        }
    }

    fn header_value(&self) -> HeaderValue {
        HeaderValue::from(*self as u32)
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of an RPC: a code plus an informational message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    code: Code,
    message: String,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Successful status with the canonical "OK" message
    pub fn ok() -> Self {
        Self::new(Code::Ok, Code::Ok.as_str())
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(Code::Cancelled, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(Code::Unknown, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(Code::DeadlineExceeded, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Code::NotFound, message)
    }

    pub fn failed_precondition(message: impl Into<String>) -> Self {
        Self::new(Code::FailedPrecondition, message)
    }

    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::new(Code::ResourceExhausted, message)
    }

    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::new(Code::Unimplemented, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(Code::Unavailable, message)
    }

    pub fn code(&self) -> Code {
        self.code
    }

    /// The message as sent, possibly empty
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The message, or the code's canonical name when the message is empty
    pub fn display_message(&self) -> &str {
        if self.message.is_empty() {
            self.code.as_str()
        } else {
            &self.message
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == Code::Ok
    }

    /// Write `grpc-status` and `grpc-message` into `headers`, replacing any previous values
    pub fn write_to(&self, headers: &mut HeaderMap) {
        headers.insert(GRPC_STATUS, self.code.header_value());

        let encoded = utf8_percent_encode(self.display_message(), GRPC_MESSAGE_ESCAPES).to_string();
        match HeaderValue::from_str(&encoded) {
            Ok(value) => {
                headers.insert(GRPC_MESSAGE, value);
            }
            Err(_) => {
                headers.insert(GRPC_MESSAGE, HeaderValue::from_static(self.code.as_str()));
            }
        }
    }

    /// Build a trailer map holding only this status
    pub fn to_header_map(&self) -> HeaderMap {
        let mut headers = HeaderMap::with_capacity(2);
        self.write_to(&mut headers);
        headers
    }

    /// Read the status out of a single metadata map.
    ///
    /// Returns `None` when the map has no `grpc-status` entry.
    pub fn from_header_map(headers: &HeaderMap) -> Option<Self> {
        let raw = headers.get(GRPC_STATUS)?;
        let message = headers
            .get(GRPC_MESSAGE)
            .map(|v| percent_decode(v.as_bytes()).decode_utf8_lossy().into_owned())
            .unwrap_or_default();

        let parsed = raw
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<u32>().ok())
            .and_then(|v| Code::try_from(v).ok());

        let status = match parsed {
            Some(code) => Self::new(code, message),
            None if message.is_empty() => Self::unknown(format!(
                "invalid grpc-status value: {}",
                String::from_utf8_lossy(raw.as_bytes())
            )),
            None => Self::unknown(message),
        };
        Some(status)
    }

    /// Recover the final status of a response: trailers win, headers are the
    /// fallback (trailers-only responses), and absence means success.
    pub fn from_metadata(trailers: Option<&HeaderMap>, headers: &HeaderMap) -> Self {
        trailers
            .and_then(Self::from_header_map)
            .or_else(|| Self::from_header_map(headers))
            .unwrap_or_else(Self::ok)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "code: {} message: {}", self.code, self.display_message())
    }
}

impl std::error::Error for Status {}
