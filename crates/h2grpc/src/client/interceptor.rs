// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Hooks that run when a client call is opened.

use http::HeaderMap;

use crate::context::CallContext;
use crate::error::Error;
use crate::method::StreamShape;

/// Runs before a call's request is built.
///
/// Interceptors run in the order they were added to the channel. Each may
/// add request metadata or refuse the call; a refusal is returned from
/// [`Channel::new_stream`](super::Channel::new_stream) and no request is sent.
pub trait ClientInterceptor: Send + Sync + 'static {
    fn intercept(&self, call: &mut OutgoingCall<'_>) -> Result<(), Error>;
}

/// A call about to be opened
#[derive(Debug)]
pub struct OutgoingCall<'a> {
    pub ctx: &'a CallContext,
    pub path: &'a str,
    pub shape: StreamShape,
    /// Extra request headers. Headers the channel sets itself and names
    /// starting with `grpc-` are not overridden.
    pub metadata: HeaderMap,
}

impl<F> ClientInterceptor for F
where
    F: Fn(&mut OutgoingCall<'_>) -> Result<(), Error> + Send + Sync + 'static,
{
    fn intercept(&self, call: &mut OutgoingCall<'_>) -> Result<(), Error> {
        self(call)
    }
}
