// Panel registry - one telemetry sync client per configured machine panel
use crate::application::sample_source::SampleSource;
use crate::application::telemetry_sync::TelemetrySync;
use crate::domain::connection::ConnectionStatus;
use crate::infrastructure::config::{AppConfig, PanelConfig};
use crate::infrastructure::http_source::HttpSampleSource;
use serde::Serialize;
use std::sync::Arc;

pub struct Panel {
    pub config: PanelConfig,
    pub sync: TelemetrySync,
}

impl Panel {
    pub fn new(config: PanelConfig, source: Arc<dyn SampleSource>) -> Self {
        let sync = TelemetrySync::builder(config.id.clone())
            .signals(config.signal_specs())
            .capacity(config.capacity)
            .max_rates(config.max_rates.clone())
            .interval(config.interval())
            .failure_threshold(config.failure_threshold)
            .preload(config.preload)
            .build(source);

        Self { config, sync }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PanelSummary {
    pub id: String,
    pub title: String,
    pub protocol: String,
    pub status: ConnectionStatus,
}

pub struct PanelRegistry {
    panels: Vec<Arc<Panel>>,
}

impl PanelRegistry {
    pub fn new(panels: Vec<Panel>) -> Self {
        Self {
            panels: panels.into_iter().map(Arc::new).collect(),
        }
    }

    /// Build a panel per configured stream, all sharing one HTTP client
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.http.timeout())
            .build()?;

        let panels = config
            .panels
            .iter()
            .map(|panel| {
                let source = HttpSampleSource::new(client.clone(), panel.endpoint.clone(), panel.variant);
                Panel::new(panel.clone(), Arc::new(source))
            })
            .collect();

        Ok(Self::new(panels))
    }

    /// Panels poll independently; nothing coordinates their timers
    pub fn start_all(&self) {
        for panel in &self.panels {
            panel.sync.start();
        }
        tracing::info!("Started {} telemetry panels", self.len());
    }

    pub fn stop_all(&self) {
        for panel in &self.panels {
            panel.sync.stop();
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<Panel>> {
        self.panels.iter().find(|p| p.config.id == id).cloned()
    }

    pub fn list(&self) -> Vec<PanelSummary> {
        self.panels
            .iter()
            .map(|p| PanelSummary {
                id: p.config.id.clone(),
                title: p.config.title.clone(),
                protocol: p.config.protocol.clone(),
                status: p.sync.status(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.panels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.panels.is_empty()
    }
}
