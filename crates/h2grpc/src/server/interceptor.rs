// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Server-side interceptors wrapping every handler.

use std::sync::Arc;

use futures::future::BoxFuture;

use super::handler::{BoxHandler, Handler};
use super::stream::ServerStream;
use crate::error::Error;
use crate::method::MethodInfo;

/// Wraps handler invocation. An interceptor may inspect the call, short
/// circuit it with an error, or pass it on with `next.call(stream)`.
pub trait Interceptor: Send + Sync + 'static {
    fn intercept(
        &self,
        stream: ServerStream,
        method: &MethodInfo,
        next: BoxHandler,
    ) -> BoxFuture<'static, Result<(), Error>>;
}

struct Intercepted {
    interceptor: Arc<dyn Interceptor>,
    next: BoxHandler,
}

impl Handler for Intercepted {
    fn call(&self, stream: ServerStream) -> BoxFuture<'static, Result<(), Error>> {
        let method = stream.method_arc();
        self.interceptor
            .intercept(stream, &method, self.next.clone())
    }
}

/// Wrap `handler` so the first interceptor in the list runs outermost
pub(crate) fn chain(interceptors: &[Arc<dyn Interceptor>], handler: BoxHandler) -> BoxHandler {
    interceptors.iter().rev().fold(handler, |next, interceptor| {
        Arc::new(Intercepted {
            interceptor: interceptor.clone(),
            next,
        })
    })
}
