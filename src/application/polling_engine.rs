// Polling engine - cursor tracking, outlier filtering and history buffering
// for one telemetry stream
use crate::application::sample_source::{RealtimeBatch, SampleSource, SourceError};
use crate::domain::connection::{ConnectionStatus, ConnectionTracker};
use crate::domain::history::HistoryBuffer;
use crate::domain::outlier::{OutlierGuard, Verdict};
use crate::domain::sample::{RawRecord, Sample, SignalSpec};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub polls: u64,
    pub failures: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub duplicates: u64,
    pub fallbacks: u64,
}

/// Point-in-time view of one stream, safe to hand to renderers
#[derive(Debug, Clone, Serialize)]
pub struct SyncSnapshot {
    pub panel_id: String,
    pub status: ConnectionStatus,
    pub cursor: i64,
    pub latest: Option<Sample>,
    pub history: Vec<Sample>,
    pub stats: SyncStats,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub panel_id: String,
    pub signals: Vec<SignalSpec>,
    pub capacity: usize,
    pub guard: OutlierGuard,
    pub failure_threshold: u32,
}

struct EngineState {
    cursor: i64,
    history: HistoryBuffer,
    connection: ConnectionTracker,
    stats: SyncStats,
}

pub struct PollingEngine {
    panel_id: String,
    signals: Vec<SignalSpec>,
    guard: OutlierGuard,
    source: Arc<dyn SampleSource>,
    state: Mutex<EngineState>,
    in_flight: AtomicBool,
    cancelled: AtomicBool,
    updates: watch::Sender<SyncSnapshot>,
}

/// Clears the in-flight flag however the poll ends, including when the
/// polling task is aborted mid-request.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl PollingEngine {
    pub fn new(settings: EngineSettings, source: Arc<dyn SampleSource>) -> Self {
        let state = EngineState {
            cursor: 0,
            history: HistoryBuffer::new(settings.capacity),
            connection: ConnectionTracker::new(settings.failure_threshold),
            stats: SyncStats::default(),
        };
        let (updates, _) = watch::channel(Self::build_snapshot(&settings.panel_id, &state));

        Self {
            panel_id: settings.panel_id,
            signals: settings.signals,
            guard: settings.guard,
            source,
            state: Mutex::new(state),
            in_flight: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            updates,
        }
    }

    pub fn panel_id(&self) -> &str {
        &self.panel_id
    }

    /// Run one poll. Never fails: every error ends up in the connection
    /// status. Skips when another poll of this engine is still in flight.
    pub async fn poll_once(&self) {
        if self.is_cancelled() {
            return;
        }
        if self.in_flight.swap(true, Ordering::AcqRel) {
            tracing::debug!(panel = %self.panel_id, "Previous poll still in flight, skipping tick");
            return;
        }
        let _in_flight = InFlight(&self.in_flight);

        let cursor = self.state.lock().cursor;
        tracing::debug!(panel = %self.panel_id, cursor, "Polling realtime endpoint");

        match self.source.fetch_realtime(cursor).await {
            Ok(batch) => self.apply_batch(batch),
            Err(err) => self.handle_failure(err).await,
        }
    }

    /// Fill the history with up to `limit` recent records before realtime
    /// polling begins. A failed preload is logged and leaves the state as is;
    /// the realtime loop starts from cursor 0 instead.
    pub async fn preload(&self, limit: usize) {
        if limit == 0 || self.is_cancelled() {
            return;
        }
        if self.in_flight.swap(true, Ordering::AcqRel) {
            return;
        }
        let _in_flight = InFlight(&self.in_flight);

        let records = match self.source.fetch_history(limit).await {
            Ok(records) => records,
            Err(err) => {
                tracing::warn!(panel = %self.panel_id, error = %err, "History preload failed");
                return;
            }
        };

        let mut state = self.state.lock();
        if self.is_cancelled() {
            return;
        }
        self.apply_new_data(&mut state, &records);
        tracing::info!(
            panel = %self.panel_id,
            samples = state.history.len(),
            cursor = state.cursor,
            "Preloaded history"
        );
        self.mark_connected(&mut state);
        self.publish(&state);
    }

    /// Stop accepting updates. A response that arrives afterwards is dropped.
    pub fn cancel(&self) {
        // Taken under the state lock so an apply that already checked the
        // flag finishes before cancel returns
        let _state = self.state.lock();
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            // Wake subscribers so live streams can end
            self.updates.send_modify(|_| {});
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        let state = self.state.lock();
        Self::build_snapshot(&self.panel_id, &state)
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state.lock().connection.status()
    }

    #[cfg(test)]
    pub fn cursor(&self) -> i64 {
        self.state.lock().cursor
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncSnapshot> {
        self.updates.subscribe()
    }

    fn apply_batch(&self, batch: RealtimeBatch) {
        let mut state = self.state.lock();
        if self.is_cancelled() {
            tracing::debug!(panel = %self.panel_id, "Discarding response received after stop");
            return;
        }
        state.stats.polls += 1;

        match batch {
            RealtimeBatch::NewData(records) => self.apply_new_data(&mut state, &records),
            RealtimeBatch::Unchanged(Some(record)) => self.apply_current(&mut state, &record),
            RealtimeBatch::Unchanged(None) => {}
        }

        self.mark_connected(&mut state);
        self.publish(&state);
    }

    fn apply_new_data(&self, state: &mut EngineState, records: &[RawRecord]) {
        let mut samples: Vec<Sample> = records.iter().filter_map(|r| self.normalize(r)).collect();
        let Some(batch_max) = samples.iter().map(|s| s.id).max() else {
            return;
        };

        // Wire order is newest first; the buffer is chronological
        samples.reverse();
        samples.sort_by_key(|s| s.id);

        let mut floor = state.cursor;
        for sample in samples {
            if sample.id <= floor {
                state.stats.duplicates += 1;
                continue;
            }
            floor = sample.id;

            match self.guard.check(state.history.latest(), &sample) {
                Verdict::Accept => {
                    state.stats.accepted += 1;
                    state.history.append(sample);
                }
                Verdict::Reject(reason) => {
                    state.stats.rejected += 1;
                    tracing::warn!(
                        panel = %self.panel_id,
                        id = sample.id,
                        "Rejecting implausible sample: {}",
                        reason
                    );
                }
            }
        }

        // Only after the whole batch is applied
        state.cursor = state.cursor.max(batch_max);
    }

    fn apply_current(&self, state: &mut EngineState, record: &RawRecord) {
        let Some(sample) = self.normalize(record) else {
            return;
        };
        if state.cursor < sample.id {
            state.cursor = sample.id;
        }
        if state.history.is_empty() {
            tracing::info!(panel = %self.panel_id, id = sample.id, "Seeded from current record");
            self.seed(state, sample);
        }
    }

    async fn handle_failure(&self, err: SourceError) {
        let needs_bootstrap = {
            let mut state = self.state.lock();
            if self.is_cancelled() {
                return;
            }
            state.stats.polls += 1;
            state.stats.failures += 1;

            tracing::warn!(panel = %self.panel_id, error = %err, "Realtime poll failed");
            if state.connection.record_failure() {
                tracing::info!(
                    panel = %self.panel_id,
                    status = %state.connection.status(),
                    failures = state.connection.consecutive_failures(),
                    "Connection status changed"
                );
            }
            self.publish(&state);
            state.history.is_empty()
        };

        if needs_bootstrap {
            self.bootstrap_from_latest().await;
        }
    }

    /// Fallback for a stream that has never produced a sample
    async fn bootstrap_from_latest(&self) {
        let record = match self.source.fetch_latest().await {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::debug!(panel = %self.panel_id, "Latest endpoint returned no record");
                return;
            }
            Err(err) => {
                tracing::error!(panel = %self.panel_id, error = %err, "Fallback fetch failed");
                return;
            }
        };

        let mut state = self.state.lock();
        if self.is_cancelled() {
            return;
        }
        let Some(sample) = self.normalize(&record) else {
            return;
        };

        state.stats.fallbacks += 1;
        if state.cursor < sample.id {
            state.cursor = sample.id;
        }
        if state.history.is_empty() {
            tracing::info!(panel = %self.panel_id, id = sample.id, "Seeded from latest endpoint");
            self.seed(&mut state, sample);
        }
        self.mark_connected(&mut state);
        self.publish(&state);
    }

    fn seed(&self, state: &mut EngineState, sample: Sample) {
        state.stats.accepted += 1;
        state.history.append(sample);
    }

    fn mark_connected(&self, state: &mut EngineState) {
        if state.connection.record_success() {
            tracing::info!(panel = %self.panel_id, status = %state.connection.status(), "Connection status changed");
        }
    }

    fn normalize(&self, record: &RawRecord) -> Option<Sample> {
        let sample = Sample::normalize(record, &self.signals);
        if sample.is_none() {
            tracing::warn!(panel = %self.panel_id, "Dropping record without a usable id");
        }
        sample
    }

    fn publish(&self, state: &EngineState) {
        self.updates
            .send_replace(Self::build_snapshot(&self.panel_id, state));
    }

    fn build_snapshot(panel_id: &str, state: &EngineState) -> SyncSnapshot {
        SyncSnapshot {
            panel_id: panel_id.to_string(),
            status: state.connection.status(),
            cursor: state.cursor,
            latest: state.history.latest().cloned(),
            history: state.history.snapshot(),
            stats: state.stats,
        }
    }
}
