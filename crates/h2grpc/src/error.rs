// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Unified error type for client and server calls.

use std::sync::Arc;

use h2grpc_protocol::{Code, CompressionError, EnvelopeError, FrameError, Status};
use thiserror::Error;

/// Boxed error used at the HTTP body and transport seams
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Broad category of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connection failure or I/O error below the RPC layer
    Transport,
    /// Malformed or unexpected traffic detected locally
    Protocol,
    /// Status returned by the remote handler
    Application,
    /// The call context was cancelled or its deadline passed
    Context,
}

/// Errors that can occur during an RPC.
///
/// `Error` is `Clone` so a failure captured by a stream's background task can
/// be handed to every caller that observes the stream afterwards.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(Arc<dyn std::error::Error + Send + Sync>),

    #[error("protocol error: {0}")]
    Protocol(Status),

    #[error("rpc error: {0}")]
    Application(Status),

    #[error("context canceled")]
    Cancelled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// The server stopped reading the request stream. The call's status is
    /// returned by the next `recv`.
    #[error("request stream closed by the server; recv returns the call status")]
    SendClosed,

    #[error("{context}: stream failed: {source}")]
    Poisoned {
        context: &'static str,
        source: Box<Error>,
    },
}

impl Error {
    pub fn transport(err: impl Into<BoxError>) -> Self {
        Error::Transport(Arc::from(err.into()))
    }

    pub fn protocol(code: Code, message: impl Into<String>) -> Self {
        Error::Protocol(Status::new(code, message))
    }

    /// Wrap a captured stream failure with the operation that observed it
    pub(crate) fn poisoned(context: &'static str, source: Error) -> Self {
        match source {
            Error::Poisoned { source, .. } => Error::Poisoned { context, source },
            source => Error::Poisoned {
                context,
                source: Box::new(source),
            },
        }
    }

    pub(crate) fn already_sent() -> Self {
        Error::protocol(Code::FailedPrecondition, "request message already sent")
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Transport(_) => ErrorKind::Transport,
            Error::Protocol(_) | Error::SendClosed => ErrorKind::Protocol,
            Error::Application(_) => ErrorKind::Application,
            Error::Cancelled | Error::DeadlineExceeded => ErrorKind::Context,
            Error::Poisoned { source, .. } => source.kind(),
        }
    }

    /// Status carried by protocol and application errors
    pub fn status(&self) -> Option<&Status> {
        match self {
            Error::Protocol(status) | Error::Application(status) => Some(status),
            Error::Poisoned { source, .. } => source.status(),
            _ => None,
        }
    }

    /// Code describing this error. Transport errors and [`Error::SendClosed`]
    /// carry no status and report `Unknown`.
    pub fn code(&self) -> Code {
        match self {
            Error::Cancelled => Code::Cancelled,
            Error::DeadlineExceeded => Code::DeadlineExceeded,
            Error::Poisoned { source, .. } => source.code(),
            other => other.status().map_or(Code::Unknown, Status::code),
        }
    }

    /// Status to put on the wire when a handler fails with this error
    pub fn to_status(&self) -> Status {
        match self.status() {
            Some(status) => status.clone(),
            None => Status::new(self.code(), self.to_string()),
        }
    }
}

impl From<Status> for Error {
    fn from(status: Status) -> Self {
        Error::Application(status)
    }
}

impl From<FrameError> for Error {
    fn from(err: FrameError) -> Self {
        let code = match &err {
            FrameError::FrameTooLarge { .. } => Code::ResourceExhausted,
            _ => Code::Internal,
        };
        Error::protocol(code, err.to_string())
    }
}

impl From<EnvelopeError> for Error {
    fn from(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::Frame(err) => err.into(),
            EnvelopeError::Compression(CompressionError::LimitExceeded { .. }) => {
                Error::protocol(Code::ResourceExhausted, err.to_string())
            }
            other => Error::protocol(Code::Internal, other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            Error::transport(std::io::Error::other("reset")).kind(),
            ErrorKind::Transport
        );
        assert_eq!(Error::already_sent().kind(), ErrorKind::Protocol);
        assert_eq!(
            Error::from(Status::not_found("missing")).kind(),
            ErrorKind::Application
        );
        assert_eq!(Error::Cancelled.kind(), ErrorKind::Context);
        assert_eq!(Error::DeadlineExceeded.kind(), ErrorKind::Context);
    }

    #[test]
    fn test_poisoned_looks_through_to_source() {
        let source = Error::from(Status::unavailable("backend down"));
        let err = Error::poisoned("send", source);

        assert_eq!(err.kind(), ErrorKind::Application);
        assert_eq!(err.code(), Code::Unavailable);
        assert_eq!(err.status().unwrap().message(), "backend down");
        assert!(err.to_string().starts_with("send: stream failed:"));
    }

    #[test]
    fn test_poisoned_does_not_nest() {
        let err = Error::poisoned("recv", Error::poisoned("send", Error::Cancelled));
        match err {
            Error::Poisoned { context, source } => {
                assert_eq!(context, "recv");
                assert!(matches!(*source, Error::Cancelled));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_to_status() {
        let status = Error::from(Status::invalid_argument("bad")).to_status();
        assert_eq!(status, Status::invalid_argument("bad"));

        let status = Error::transport(std::io::Error::other("broken pipe")).to_status();
        assert_eq!(status.code(), Code::Unknown);
        assert!(status.message().contains("broken pipe"));

        assert_eq!(Error::DeadlineExceeded.to_status().code(), Code::DeadlineExceeded);
    }

    #[test]
    fn test_send_closed_is_not_retryable() {
        let err = Error::SendClosed;
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(err.code(), Code::Unknown);
        assert!(err.status().is_none());
    }

    #[test]
    fn test_already_sent_message() {
        let err = Error::already_sent();
        assert_eq!(err.code(), Code::FailedPrecondition);
        assert!(err.to_string().contains("already sent"));
    }

    #[test]
    fn test_frame_error_mapping() {
        let err = Error::from(FrameError::FrameTooLarge { size: 10, max: 5 });
        assert_eq!(err.code(), Code::ResourceExhausted);

        let err = Error::from(FrameError::InvalidFlag(7));
        assert_eq!(err.code(), Code::Internal);
    }
}
