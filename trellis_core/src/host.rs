// Copyright 2026 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The host integration seam.

use crate::time::{Duration, HostTime};

/// What the engine needs from its environment.
///
/// The host owns the event loop. When the engine asks for a callback, the
/// host later calls
/// [`Reconciler::on_host_callback`](crate::reconciler::Reconciler::on_host_callback);
/// when it asks for a timeout, the host later calls
/// [`Reconciler::on_host_timeout`](crate::reconciler::Reconciler::on_host_timeout).
/// Repeated requests before the host has called back may be coalesced.
pub trait Host {
    /// Current time on a monotonic clock.
    fn now(&self) -> HostTime;

    /// Asks to be called back as soon as the host is idle.
    fn request_callback(&mut self);

    /// Asks to be called back once `delay` has elapsed. Replaces any earlier
    /// timeout request.
    fn request_timeout(&mut self, delay: Duration);

    /// Withdraws the pending timeout request, if any.
    fn cancel_timeout(&mut self);
}
