use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use validator::Validate;

use crate::db::TelemetryStore;
use crate::error::LectorError;

use super::event::{StoredTelemetryEvent, TelemetryEvent};

/// Fire-and-forget telemetry sink.
///
/// [`TelemetryRecorder::record`] validates, stamps and enqueues an event and
/// returns immediately. A single background writer persists the queue in
/// FIFO order. When the queue is full the newest event is dropped.
pub struct TelemetryRecorder {
    sender: mpsc::Sender<StoredTelemetryEvent>,
    /// Last issued `created_at`, in microseconds. Held across `try_send` so
    /// queue order and stamp order agree.
    clock: Mutex<i64>,
    dropped: AtomicU64,
    rejected: AtomicU64,
}

impl TelemetryRecorder {
    /// Start the background writer. It runs until `token` is cancelled or
    /// every recorder handle is dropped, then drains what is still queued.
    pub fn spawn(
        store: Arc<dyn TelemetryStore>,
        capacity: usize,
        token: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let writer = tokio::spawn(run_writer(store, receiver, token));

        let recorder = Self {
            sender,
            clock: Mutex::new(0),
            dropped: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        };

        (recorder, writer)
    }

    /// Queue an event for persistence. Never fails and never waits on storage.
    pub fn record(&self, event: TelemetryEvent) {
        if let Err(e) = event.validate() {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            warn!(endpoint = %event.endpoint, error = %e, "Discarding invalid telemetry event");
            return;
        }

        let mut last = self.clock.lock().unwrap_or_else(|e| e.into_inner());
        let created_at = next_timestamp(&mut last);
        let stored = StoredTelemetryEvent {
            id: nanoid::nanoid!(),
            event,
            created_at,
        };

        match self.sender.try_send(stored) {
            Ok(()) => {}
            Err(TrySendError::Full(stored)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    endpoint = %stored.event.endpoint,
                    dropped_total = dropped,
                    "Telemetry queue full, dropping event"
                );
            }
            Err(TrySendError::Closed(stored)) => {
                debug!(endpoint = %stored.event.endpoint, "Telemetry writer stopped, dropping event");
            }
        }
    }

    /// Events dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Events that failed validation.
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

/// Wall clock, bumped one microsecond past the previous stamp when needed.
fn next_timestamp(last_micros: &mut i64) -> DateTime<Utc> {
    let now = Utc::now();
    let micros = now.timestamp_micros().max(*last_micros + 1);
    *last_micros = micros;
    DateTime::from_timestamp_micros(micros).unwrap_or(now)
}

async fn run_writer(
    store: Arc<dyn TelemetryStore>,
    mut receiver: mpsc::Receiver<StoredTelemetryEvent>,
    token: CancellationToken,
) {
    debug!("Telemetry writer started");

    loop {
        tokio::select! {
            biased;

            next = receiver.recv() => match next {
                Some(event) => persist(store.as_ref(), &event).await,
                None => {
                    debug!("Telemetry channel closed");
                    return;
                }
            },
            _ = token.cancelled() => break,
        }
    }

    receiver.close();
    let mut drained = 0usize;
    while let Ok(event) = receiver.try_recv() {
        persist(store.as_ref(), &event).await;
        drained += 1;
    }

    info!(drained, "Telemetry writer stopped");
}

async fn persist(store: &dyn TelemetryStore, event: &StoredTelemetryEvent) {
    match store.insert_event(event).await {
        Ok(()) => debug!(endpoint = %event.event.endpoint, "Stats recorded successfully"),
        Err(e) => {
            let e = LectorError::TelemetryWrite(e.to_string());
            error!(endpoint = %event.event.endpoint, error = %e, "Failed to record stats");
        }
    }
}
