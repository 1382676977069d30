//! Metric helpers for `wiresock`.
//!
//! This module defines metric names and simple helper functions wrapping
//! the [`metrics`](https://docs.rs/metrics) crate. Without the `metrics`
//! feature the helpers compile to no-ops.

#[cfg(feature = "metrics")]
use metrics::counter;

use crate::transport::Role;

/// Name of the counter tracking established connections.
pub const CONNECTIONS_TOTAL: &str = "wiresock_connections_total";
/// Name of the counter tracking decoded frames.
pub const FRAMES_DECODED: &str = "wiresock_frames_decoded_total";
/// Name of the counter tracking framing errors.
pub const ERRORS_TOTAL: &str = "wiresock_errors_total";

/// Record an established connection for the given role.
#[cfg(feature = "metrics")]
pub fn inc_connections(role: Role) {
    counter!(CONNECTIONS_TOTAL, "role" => role.as_str()).increment(1);
}

/// Record an established connection for the given role.
#[cfg(not(feature = "metrics"))]
pub fn inc_connections(_role: Role) {}

/// Record a successfully decoded frame.
#[cfg(feature = "metrics")]
pub fn inc_frames() { counter!(FRAMES_DECODED).increment(1); }

/// Record a successfully decoded frame.
#[cfg(not(feature = "metrics"))]
pub fn inc_frames() {}

/// Record a framing error of the given kind.
#[cfg(feature = "metrics")]
pub fn inc_errors(kind: &'static str) { counter!(ERRORS_TOTAL, "kind" => kind).increment(1); }

/// Record a framing error of the given kind.
#[cfg(not(feature = "metrics"))]
pub fn inc_errors(_kind: &'static str) {}
