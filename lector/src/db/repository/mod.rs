mod telemetry_events;

pub use telemetry_events::TelemetryRepository;
