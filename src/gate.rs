//! Shutdown barrier for background work.
//!
//! [`DispatchGate`] counts in-flight work (spawned tasks and entered
//! tokens) on top of a [`TaskTracker`]. Once [`close`](DispatchGate::close)
//! begins, new entries are refused and the in-flight count can only fall,
//! so closing terminates as soon as every holder releases its token.

use std::{
    future::Future,
    sync::atomic::{AtomicBool, Ordering},
};

use tokio::task::JoinHandle;
use tokio_util::task::{TaskTracker, task_tracker::TaskTrackerToken};

/// Returned when work is offered to a closing or closed gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("dispatch gate is closed")]
pub struct GateClosed;

/// Returned when reopening a gate that still holds in-flight work.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("dispatch gate still has {in_flight} entr(ies) in flight")]
pub struct GateBusy {
    /// Entries still registered.
    pub in_flight: usize,
}

/// Counted set of in-flight background work with a closed flag.
///
/// # Examples
///
/// ```
/// use streamwire::gate::DispatchGate;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let gate = DispatchGate::new();
/// let token = gate.enter().expect("gate open");
/// assert_eq!(gate.in_flight(), 1);
/// drop(token);
///
/// gate.close().await;
/// assert!(gate.enter().is_err());
/// assert!(gate.is_drained());
/// # }
/// ```
#[derive(Debug, Default)]
pub struct DispatchGate {
    tracker: TaskTracker,
    closed: AtomicBool,
}

/// Registration in a [`DispatchGate`]; dropping it releases the entry.
#[derive(Debug)]
pub struct GateToken {
    _token: TaskTrackerToken,
}

impl DispatchGate {
    /// Create an open gate with nothing in flight.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Register one unit of in-flight work.
    ///
    /// # Errors
    ///
    /// Returns [`GateClosed`] once [`close`](Self::close) has been called.
    pub fn enter(&self) -> Result<GateToken, GateClosed> {
        if self.is_closed() {
            return Err(GateClosed);
        }
        let token = self.tracker.token();
        // A close racing the registration must still see the gate refuse.
        if self.is_closed() {
            drop(token);
            return Err(GateClosed);
        }
        Ok(GateToken { _token: token })
    }

    /// Spawn `future` as tracked background work.
    ///
    /// # Errors
    ///
    /// Returns [`GateClosed`] once [`close`](Self::close) has been called.
    pub fn spawn<F>(&self, future: F) -> Result<JoinHandle<F::Output>, GateClosed>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let _entry = self.enter()?;
        Ok(self.tracker.spawn(future))
    }

    /// Refuse new work without waiting for in-flight work.
    pub fn seal(&self) {
        self.closed.store(true, Ordering::Release);
        self.tracker.close();
    }

    /// Refuse new work and wait until everything in flight has finished.
    ///
    /// Calling `close` again, or concurrently, waits on the same drain.
    pub async fn close(&self) {
        self.seal();
        self.tracker.wait().await;
    }

    /// Whether [`close`](Self::close) has been called since the last reopen.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.closed.load(Ordering::Acquire) }

    /// Number of tasks and tokens currently registered.
    #[must_use]
    pub fn in_flight(&self) -> usize { self.tracker.len() }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_drained(&self) -> bool { self.tracker.is_empty() }

    /// Accept work again after a completed drain.
    ///
    /// # Errors
    ///
    /// Returns [`GateBusy`] and leaves the gate untouched if work from the
    /// previous session is still registered.
    pub fn reopen(&self) -> Result<(), GateBusy> {
        let in_flight = self.in_flight();
        if in_flight > 0 {
            return Err(GateBusy { in_flight });
        }
        self.tracker.reopen();
        self.closed.store(false, Ordering::Release);
        Ok(())
    }
}
