// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! One-shot readiness signals between a client stream and its background task.
//!
//! Each signal moves from "not ready" to "ready" exactly once, and every
//! waiter sees the same final state.

use tokio::sync::watch;

use crate::error::Error;

/// Firing side of a readiness signal
#[derive(Debug)]
pub(crate) struct Trigger {
    tx: watch::Sender<bool>,
}

/// Waiting side of a readiness signal
#[derive(Debug, Clone)]
pub(crate) struct Ready {
    rx: watch::Receiver<bool>,
}

pub(crate) fn ready_signal() -> (Trigger, Ready) {
    let (tx, rx) = watch::channel(false);
    (Trigger { tx }, Ready { rx })
}

impl Trigger {
    pub(crate) fn fire(&self) {
        self.tx.send_replace(true);
    }
}

impl Drop for Trigger {
    fn drop(&mut self) {
        self.fire();
    }
}

impl Ready {
    #[cfg(test)]
    pub(crate) fn is_ready(&self) -> bool {
        *self.rx.borrow()
    }

    pub(crate) async fn wait(&mut self) {
        // The trigger fires on drop, so a closed channel is also ready.
        let _ = self.rx.wait_for(|ready| *ready).await;
    }
}

/// Records the first error raised by a background task
#[derive(Debug)]
pub(crate) struct ErrorSlot {
    tx: watch::Sender<Option<Error>>,
}

/// Observes the error captured by an [`ErrorSlot`]
#[derive(Debug, Clone)]
pub(crate) struct ErrorWatch {
    rx: watch::Receiver<Option<Error>>,
}

pub(crate) fn error_signal() -> (ErrorSlot, ErrorWatch) {
    let (tx, rx) = watch::channel(None);
    (ErrorSlot { tx }, ErrorWatch { rx })
}

impl ErrorSlot {
    /// Store `err` unless an error was already captured
    pub(crate) fn capture(&self, err: Error) {
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(err);
            true
        });
    }
}

impl ErrorWatch {
    pub(crate) fn get(&self) -> Option<Error> {
        self.rx.borrow().clone()
    }

    /// Wait for an error; pends forever if the task finishes cleanly
    pub(crate) async fn wait(&mut self) -> Error {
        let captured = match self.rx.wait_for(Option::is_some).await {
            Ok(slot) => slot.clone(),
            Err(_) => None,
        };
        match captured {
            Some(err) => err,
            None => std::future::pending().await,
        }
    }
}
