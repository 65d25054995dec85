//! Observability for the Room Coordinator.
//!
//! The crate records through the `metrics` facade only; the embedding
//! application decides whether a recorder is installed and where it exports.
//!
//! # Privacy by Default
//!
//! Instrumented functions use `#[instrument(skip_all)]` with explicit field
//! allow-listing. Room and user identifiers appear in spans but never in metric
//! labels. Access tokens are never logged.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `rc_rooms_created_total` | Counter | none | Rooms created by this client |
//! | `rc_room_joins_total` | Counter | `outcome` | Join attempts by result |
//! | `rc_rooms_closed_total` | Counter | none | Rooms closed on leave |
//! | `rc_audio_connect_total` | Counter | `outcome` | Audio connect attempts by result |
//! | `rc_audio_connected` | Gauge | none | 1 while a transport connection is live |
//! | `rc_silence_timeouts_total` | Counter | none | Sessions ended by the silence watchdog |
//! | `rc_presence_resyncs_total` | Counter | `trigger` | Presence snapshot reloads |
//! | `rc_presence_events_throttled_total` | Counter | none | Change events dropped inside the window |

pub mod metrics;

pub use metrics::{
    record_audio_connect, record_presence_event_throttled, record_presence_resync,
    record_room_closed, record_room_created, record_room_join, record_silence_timeout,
    set_audio_connected,
};
