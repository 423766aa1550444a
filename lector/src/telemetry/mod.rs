//! Request telemetry.
//!
//! Handlers hand a [`TelemetryEvent`] to the [`TelemetryRecorder`], which
//! persists it in the background and swallows storage failures. The
//! [`TelemetryAggregator`] answers the read-side questions: overall counters,
//! per-endpoint and hourly breakdowns, recent events and retention pruning.

mod aggregator;
mod event;
mod filter;
mod recorder;

pub use aggregator::{
    EndpointStats, HourlyBucket, OverallStats, TelemetryAggregator, DEFAULT_RECENT_LIMIT,
    HOURLY_BUCKET_LIMIT, MAX_RECENT_LIMIT,
};
pub use event::{StoredTelemetryEvent, TelemetryEvent, ALLOWED_METHODS};
pub use filter::{format_timestamp, parse_filter_date, TelemetryFilter};
pub use recorder::TelemetryRecorder;
