// Copyright 2026 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A host with a hand-driven clock.

use std::cell::Cell;

use trellis_core::effect::EffectSink;
use trellis_core::time::{Duration, HostTime};
use trellis_core::{Host, Reconciler, TreeTypes};

/// A request the engine made of its host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostRequest {
    /// [`Host::request_callback`].
    Callback,
    /// [`Host::request_timeout`], with the requested delay.
    Timeout(Duration),
    /// [`Host::cancel_timeout`].
    CancelTimeout,
}

/// A [`Host`] whose clock only moves when told to.
///
/// With an auto-advance step, every clock read moves time forward by that
/// step. That makes render cost proportional to the work done, so time
/// slicing and starvation can be exercised deterministically.
#[derive(Debug, Default)]
pub struct ManualHost {
    now: Cell<u64>,
    step: u64,
    callback_pending: bool,
    timeout_at: Option<HostTime>,
    requests: Vec<HostRequest>,
}

impl ManualHost {
    /// A host at time zero whose clock never moves on its own.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the clock by `step` on every read.
    #[must_use]
    pub fn with_auto_advance(mut self, step: Duration) -> Self {
        self.step = step.micros();
        self
    }

    /// Current time without advancing the clock.
    #[must_use]
    pub fn peek(&self) -> HostTime {
        HostTime(self.now.get())
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get().saturating_add(by.micros()));
    }

    /// Returns whether a callback was requested and not yet delivered.
    #[must_use]
    pub fn callback_pending(&self) -> bool {
        self.callback_pending
    }

    /// Consumes a pending callback request.
    pub fn take_callback(&mut self) -> bool {
        std::mem::take(&mut self.callback_pending)
    }

    /// Absolute time of the pending timeout request, if any.
    #[must_use]
    pub fn timeout_at(&self) -> Option<HostTime> {
        self.timeout_at
    }

    /// Consumes the pending timeout if it is due.
    pub fn take_due_timeout(&mut self) -> bool {
        match self.timeout_at {
            Some(at) if at <= self.peek() => {
                self.timeout_at = None;
                true
            }
            _ => false,
        }
    }

    /// Every request made so far, oldest first.
    #[must_use]
    pub fn requests(&self) -> &[HostRequest] {
        &self.requests
    }

    /// Forgets the request log.
    pub fn clear_requests(&mut self) {
        self.requests.clear();
    }
}

impl Host for ManualHost {
    fn now(&self) -> HostTime {
        let now = self.now.get();
        self.now.set(now.saturating_add(self.step));
        HostTime(now)
    }

    fn request_callback(&mut self) {
        self.callback_pending = true;
        self.requests.push(HostRequest::Callback);
    }

    fn request_timeout(&mut self, delay: Duration) {
        self.timeout_at = Some(self.peek().saturating_add(delay));
        self.requests.push(HostRequest::Timeout(delay));
    }

    fn cancel_timeout(&mut self) {
        self.timeout_at = None;
        self.requests.push(HostRequest::CancelTimeout);
    }
}

/// Delivers one pending callback. Returns `false` if none was requested.
pub fn run_slice<T: TreeTypes, S: EffectSink<T>>(
    reconciler: &mut Reconciler<T, ManualHost, S>,
) -> bool {
    if !reconciler.host_mut().take_callback() {
        return false;
    }
    reconciler.on_host_callback();
    true
}

/// Plays the host's event loop until nothing is requested, or until
/// `max_slices` callbacks have been delivered. Pending timeouts are reached
/// by jumping the clock. Returns the number of callbacks delivered.
pub fn run_until_idle<T: TreeTypes, S: EffectSink<T>>(
    reconciler: &mut Reconciler<T, ManualHost, S>,
    max_slices: usize,
) -> usize {
    let mut slices = 0;
    while slices < max_slices {
        if run_slice(reconciler) {
            slices += 1;
            continue;
        }
        let host = reconciler.host_mut();
        let Some(at) = host.timeout_at() else {
            break;
        };
        let now = host.peek();
        if at > now {
            host.advance(at.saturating_duration_since(now));
        }
        if host.take_due_timeout() {
            reconciler.on_host_timeout();
        }
    }
    slices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_advance_moves_on_read() {
        let host = ManualHost::new().with_auto_advance(Duration::from_micros(10));
        assert_eq!(host.now(), HostTime(0));
        assert_eq!(host.now(), HostTime(10));
        assert_eq!(host.peek(), HostTime(20));
    }

    #[test]
    fn requests_are_logged() {
        let mut host = ManualHost::new();
        host.request_callback();
        host.advance(Duration::from_millis(1));
        host.request_timeout(Duration::from_millis(4));
        assert_eq!(host.timeout_at(), Some(HostTime(5_000)));
        assert!(!host.take_due_timeout());
        host.advance(Duration::from_millis(4));
        assert!(host.take_due_timeout());
        assert!(host.take_callback());
        assert!(!host.take_callback());
        assert_eq!(
            host.requests(),
            [
                HostRequest::Callback,
                HostRequest::Timeout(Duration::from_millis(4))
            ]
        );
    }
}
