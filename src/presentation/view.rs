// View models - map sync snapshots to chart and gauge inputs
use crate::application::polling_engine::{SyncSnapshot, SyncStats};
use crate::domain::connection::ConnectionStatus;
use crate::domain::sample::Sample;
use crate::infrastructure::config::PanelConfig;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub time_ms: i64,
    pub value: f64,
}

impl ChartPoint {
    pub fn new(time_ms: i64, value: f64) -> Self {
        Self { time_ms, value }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChartView {
    pub signal: String,
    pub unit: Option<String>,
    pub points: Vec<ChartPoint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GaugeView {
    pub signal: String,
    pub title: String,
    pub unit: String,
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub decimals: u32,
    /// Position of the value between min and max, clamped to 0..=100
    pub percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PanelView {
    pub id: String,
    pub title: String,
    pub protocol: String,
    pub status: ConnectionStatus,
    pub cursor: i64,
    pub latest: Option<Sample>,
    pub gauges: Vec<GaugeView>,
    pub stats: SyncStats,
}

pub fn panel_view(config: &PanelConfig, snapshot: &SyncSnapshot) -> PanelView {
    PanelView {
        id: config.id.clone(),
        title: config.title.clone(),
        protocol: config.protocol.clone(),
        status: snapshot.status,
        cursor: snapshot.cursor,
        latest: snapshot.latest.clone(),
        gauges: gauge_views(config, snapshot.latest.as_ref()),
        stats: snapshot.stats,
    }
}

/// One gauge per configured gauge; reads zero until a sample arrives
pub fn gauge_views(config: &PanelConfig, latest: Option<&Sample>) -> Vec<GaugeView> {
    config
        .gauges
        .iter()
        .map(|gauge| {
            let value = latest.map(|s| s.value(&gauge.signal)).unwrap_or(0.0);
            let span = gauge.max - gauge.min;
            let percent = if span > 0.0 {
                ((value - gauge.min) / span * 100.0).clamp(0.0, 100.0)
            } else {
                0.0
            };

            GaugeView {
                signal: gauge.signal.clone(),
                title: gauge.title.clone(),
                unit: gauge.unit.clone(),
                value,
                min: gauge.min,
                max: gauge.max,
                decimals: gauge.decimals,
                percent,
            }
        })
        .collect()
}

/// Chart series for the requested signal, or for every panel signal
pub fn chart_views(
    config: &PanelConfig,
    history: &[Sample],
    signal: Option<&str>,
    max_points: Option<usize>,
) -> Vec<ChartView> {
    config
        .signals
        .iter()
        .filter(|name| signal.is_none_or(|wanted| wanted == name.as_str()))
        .map(|name| {
            let points: Vec<ChartPoint> = history
                .iter()
                .map(|s| ChartPoint::new(s.time_ms(), s.value(name)))
                .collect();
            let points = match max_points {
                Some(max) => downsample_points(points, max),
                None => points,
            };

            ChartView {
                signal: name.clone(),
                unit: config.gauge(name).map(|g| g.unit.clone()),
                points,
            }
        })
        .collect()
}

/// Downsample chart points using bucket averaging
pub fn downsample_points(points: Vec<ChartPoint>, max_points: usize) -> Vec<ChartPoint> {
    if max_points == 0 || points.len() <= max_points {
        return points;
    }

    let bucket_size = (points.len() as f64 / max_points as f64).ceil() as usize;
    let mut downsampled = Vec::with_capacity(max_points);

    for chunk in points.chunks(bucket_size) {
        // Middle point's timestamp, average value
        let mid_idx = chunk.len() / 2;
        let avg_value = chunk.iter().map(|p| p.value).sum::<f64>() / chunk.len() as f64;

        downsampled.push(ChartPoint::new(chunk[mid_idx].time_ms, avg_value));
    }

    downsampled
}
