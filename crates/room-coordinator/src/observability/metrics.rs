//! Metrics definitions for the Room Coordinator.
//!
//! All metrics follow Prometheus naming conventions:
//! - `rc_` prefix for Room Coordinator
//! - `_total` suffix for counters
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `outcome`: bounded by error variant names (~8 values)
//! - `trigger`: 4 values (initial, change_feed, room_changed, manual)

use metrics::{counter, gauge};

// ============================================================================
// Room Lifecycle Metrics (Counters)
// ============================================================================

/// Record a room created by this client.
///
/// Metric: `rc_rooms_created_total`
/// Labels: none
pub fn record_room_created() {
    counter!("rc_rooms_created_total").increment(1);
}

/// Record a join attempt.
///
/// Metric: `rc_room_joins_total`
/// Labels: `outcome` (joined, already_member, not_found, already_closed,
/// unauthenticated, backend_error)
pub fn record_room_join(outcome: &str) {
    counter!("rc_room_joins_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record a room closed because its roster emptied.
///
/// Metric: `rc_rooms_closed_total`
/// Labels: none
pub fn record_room_closed() {
    counter!("rc_rooms_closed_total").increment(1);
}

// ============================================================================
// Audio Session Metrics
// ============================================================================

/// Record the result of an audio connect attempt.
///
/// Metric: `rc_audio_connect_total`
/// Labels: `outcome` (connected, permission_denied, token_error,
/// transport_error, timeout, cancelled)
pub fn record_audio_connect(outcome: &str) {
    counter!("rc_audio_connect_total", "outcome" => outcome.to_string()).increment(1);
}

/// Set whether a transport connection is currently live.
///
/// Metric: `rc_audio_connected`
/// Labels: none
///
/// At most one connection exists per process, so the value is 0 or 1.
pub fn set_audio_connected(connected: bool) {
    gauge!("rc_audio_connected").set(if connected { 1.0 } else { 0.0 });
}

/// Record a session ended by the silence watchdog.
///
/// Metric: `rc_silence_timeouts_total`
/// Labels: none
pub fn record_silence_timeout() {
    counter!("rc_silence_timeouts_total").increment(1);
}

// ============================================================================
// Presence Metrics (Counters)
// ============================================================================

/// Record a presence snapshot reload.
///
/// Metric: `rc_presence_resyncs_total`
/// Labels: `trigger` (initial, change_feed, room_changed, manual)
pub fn record_presence_resync(trigger: &str) {
    counter!("rc_presence_resyncs_total", "trigger" => trigger.to_string()).increment(1);
}

/// Record a change event dropped by the resync throttle.
///
/// Metric: `rc_presence_events_throttled_total`
/// Labels: none
pub fn record_presence_event_throttled() {
    counter!("rc_presence_events_throttled_total").increment(1);
}
