// Copyright 2026 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Deterministic host and mirroring effect sink for exercising trellis.
//!
//! - [`ManualHost`](host::ManualHost): a [`Host`](trellis_core::Host) whose
//!   clock moves only when told to, optionally by a fixed step per read, and
//!   which logs every callback and timeout request.
//! - [`MirrorSink`](mirror::MirrorSink): an
//!   [`EffectSink`](trellis_core::EffectSink) that applies effect lists to an
//!   in-memory target tree, panics on effects that cannot apply, and can be
//!   checked against the committed tree.
//! - [`run_until_idle`](host::run_until_idle) plays the host's event loop.

pub mod host;
pub mod mirror;

#[cfg(test)]
mod scenarios;

pub use host::{HostRequest, ManualHost, run_slice, run_until_idle};
pub use mirror::{Mismatch, MirrorNode, MirrorSink};
