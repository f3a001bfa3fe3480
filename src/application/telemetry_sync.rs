// Telemetry sync client - one independently polled stream per panel
use crate::application::polling_engine::{EngineSettings, PollingEngine, SyncSnapshot};
use crate::application::sample_source::SampleSource;
use crate::domain::connection::{ConnectionStatus, DEFAULT_FAILURE_THRESHOLD};
use crate::domain::history::DEFAULT_HISTORY_CAPACITY;
use crate::domain::outlier::{OutlierGuard, default_max_rates};
use crate::domain::sample::{SignalSpec, default_signal_specs};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Builds a [`TelemetrySync`] for one stream
#[derive(Debug, Clone)]
pub struct TelemetrySyncBuilder {
    panel_id: String,
    signals: Vec<SignalSpec>,
    capacity: usize,
    max_rates: BTreeMap<String, f64>,
    interval: Duration,
    failure_threshold: u32,
    preload: usize,
}

impl TelemetrySyncBuilder {
    pub fn new(panel_id: impl Into<String>) -> Self {
        Self {
            panel_id: panel_id.into(),
            signals: default_signal_specs(),
            capacity: DEFAULT_HISTORY_CAPACITY,
            max_rates: default_max_rates(),
            interval: DEFAULT_POLL_INTERVAL,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            preload: 0,
        }
    }

    pub fn signals(mut self, signals: Vec<SignalSpec>) -> Self {
        self.signals = signals;
        self
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Replace every outlier rule
    pub fn max_rates(mut self, max_rates: BTreeMap<String, f64>) -> Self {
        self.max_rates = max_rates;
        self
    }

    pub fn max_rate(mut self, signal: impl Into<String>, rate: f64) -> Self {
        self.max_rates.insert(signal.into(), rate);
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Records to load into the history before the first realtime poll
    pub fn preload(mut self, limit: usize) -> Self {
        self.preload = limit;
        self
    }

    pub fn build(self, source: Arc<dyn SampleSource>) -> TelemetrySync {
        // A rule for a signal the stream does not carry compares 0 with 0
        let (max_rates, unused): (BTreeMap<_, _>, BTreeMap<_, _>) = self
            .max_rates
            .into_iter()
            .partition(|(signal, _)| self.signals.iter().any(|spec| &spec.name == signal));
        if !unused.is_empty() {
            tracing::debug!(
                panel = %self.panel_id,
                signals = ?unused.keys().collect::<Vec<_>>(),
                "Ignoring outlier rules for signals the panel does not carry"
            );
        }

        let settings = EngineSettings {
            panel_id: self.panel_id,
            signals: self.signals,
            capacity: self.capacity,
            guard: OutlierGuard::new(max_rates),
            failure_threshold: self.failure_threshold,
        };

        TelemetrySync {
            engine: Arc::new(PollingEngine::new(settings, source)),
            // tokio intervals panic on a zero period
            interval: self.interval.max(Duration::from_millis(1)),
            preload: self.preload,
            task: Mutex::new(None),
        }
    }
}

pub struct TelemetrySync {
    engine: Arc<PollingEngine>,
    interval: Duration,
    preload: usize,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TelemetrySync {
    pub fn builder(panel_id: impl Into<String>) -> TelemetrySyncBuilder {
        TelemetrySyncBuilder::new(panel_id)
    }

    /// Spawn the polling loop. The history preload, when configured, runs
    /// first; the first realtime poll follows immediately. No-op when already
    /// running or once stopped.
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.is_some() || self.engine.is_cancelled() {
            return;
        }

        let engine = self.engine.clone();
        let period = self.interval;
        let preload = self.preload;
        tracing::info!(panel = %engine.panel_id(), interval_ms = period.as_millis() as u64, "Starting telemetry sync");

        *task = Some(tokio::spawn(async move {
            engine.preload(preload).await;

            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if engine.is_cancelled() {
                    break;
                }
                engine.poll_once().await;
            }
        }));
    }

    /// Cancel polling. Safe to call any number of times; the last state stays
    /// readable.
    pub fn stop(&self) {
        self.engine.cancel();
        if let Some(task) = self.task.lock().take() {
            task.abort();
            tracing::info!(panel = %self.engine.panel_id(), "Stopped telemetry sync");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.engine.is_cancelled()
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        self.engine.snapshot()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.engine.status()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncSnapshot> {
        self.engine.subscribe()
    }

    /// Run a single poll outside the timer
    pub async fn poll_now(&self) {
        self.engine.poll_once().await;
    }
}

impl Drop for TelemetrySync {
    fn drop(&mut self) {
        self.stop();
    }
}
