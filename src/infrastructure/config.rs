use crate::domain::connection::DEFAULT_FAILURE_THRESHOLD;
use crate::domain::history::DEFAULT_HISTORY_CAPACITY;
use crate::domain::outlier::default_max_rates;
use crate::domain::sample::{DEFAULT_SIGNALS, SignalSpec};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub http: HttpSettings,
    #[serde(default)]
    pub panels: Vec<PanelConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Filter used when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpSettings {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl HttpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// How a backend endpoint expects the realtime request
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WireVariant {
    /// `GET ?action=realtime&lastId=n`, answered with `{status, hasNewData, data}`
    #[default]
    Query,
    /// `POST {action, last_id}`, answered with `{success, data: [...]}`
    Post,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PanelConfig {
    pub id: String,
    pub title: String,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    pub endpoint: String,
    #[serde(default)]
    pub variant: WireVariant,
    #[serde(default = "default_signals")]
    pub signals: Vec<String>,
    /// signal name -> wire key
    #[serde(default)]
    pub aliases: HashMap<String, String>,
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_max_rates")]
    pub max_rates: BTreeMap<String, f64>,
    /// Recent records to load before realtime polling starts; 0 disables
    #[serde(default)]
    pub preload: usize,
    #[serde(default)]
    pub gauges: Vec<GaugeConfig>,
}

impl PanelConfig {
    pub fn signal_specs(&self) -> Vec<SignalSpec> {
        self.signals
            .iter()
            .map(|name| match self.aliases.get(name) {
                Some(key) => SignalSpec::aliased(name.clone(), key.clone()),
                None => SignalSpec::new(name.clone()),
            })
            .collect()
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn gauge(&self, signal: &str) -> Option<&GaugeConfig> {
        self.gauges.iter().find(|g| g.signal == signal)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GaugeConfig {
    pub signal: String,
    pub title: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub min: f64,
    pub max: f64,
    #[serde(default = "default_decimals")]
    pub decimals: u32,
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("panel id {0:?} is used more than once")]
    DuplicatePanel(String),
    #[error("panel {0:?} has an empty endpoint")]
    EmptyEndpoint(String),
    #[error("panel {0:?} needs a history capacity of at least 1")]
    ZeroCapacity(String),
    #[error("panel {0:?} needs a poll interval above 0 ms")]
    ZeroInterval(String),
    #[error("panel {0:?} needs a failure threshold of at least 1")]
    ZeroFailureThreshold(String),
    #[error("panel {panel:?} has a non-positive max rate for {signal:?}")]
    InvalidMaxRate { panel: String, signal: String },
    #[error("panel {panel:?} has a gauge for unknown signal {signal:?}")]
    UnknownGaugeSignal { panel: String, signal: String },
    #[error("request timeout must be above 0 ms")]
    ZeroTimeout,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http.timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }

        let mut seen = HashSet::new();
        for panel in &self.panels {
            if !seen.insert(panel.id.as_str()) {
                return Err(ConfigError::DuplicatePanel(panel.id.clone()));
            }
            if panel.endpoint.trim().is_empty() {
                return Err(ConfigError::EmptyEndpoint(panel.id.clone()));
            }
            if panel.capacity == 0 {
                return Err(ConfigError::ZeroCapacity(panel.id.clone()));
            }
            if panel.interval_ms == 0 {
                return Err(ConfigError::ZeroInterval(panel.id.clone()));
            }
            if panel.failure_threshold == 0 {
                return Err(ConfigError::ZeroFailureThreshold(panel.id.clone()));
            }
            if let Some((signal, _)) = panel
                .max_rates
                .iter()
                .find(|(_, rate)| !(rate.is_finite() && **rate > 0.0))
            {
                return Err(ConfigError::InvalidMaxRate {
                    panel: panel.id.clone(),
                    signal: signal.clone(),
                });
            }
            if let Some(gauge) = panel.gauges.iter().find(|g| !panel.signals.contains(&g.signal)) {
                return Err(ConfigError::UnknownGaugeSignal {
                    panel: panel.id.clone(),
                    signal: gauge.signal.clone(),
                });
            }
        }

        Ok(())
    }
}

/// Load `config/telemetry.{toml,yaml,json}` overlaid with `TELEMETRY__*`
/// environment variables (e.g. `TELEMETRY__SERVER__BIND`).
pub fn load_config() -> anyhow::Result<AppConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/telemetry"))
        .add_source(config::Environment::with_prefix("TELEMETRY").separator("__"))
        .build()?;

    let config: AppConfig = settings.try_deserialize()?;
    config.validate()?;
    Ok(config)
}

/// Parse configuration from a TOML string
#[cfg(test)]
pub fn parse_config(toml: &str) -> anyhow::Result<AppConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::from_str(toml, config::FileFormat::Toml))
        .build()?;

    let config: AppConfig = settings.try_deserialize()?;
    config.validate()?;
    Ok(config)
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_protocol() -> String {
    "opcua".to_string()
}

fn default_signals() -> Vec<String> {
    DEFAULT_SIGNALS.iter().map(|s| s.to_string()).collect()
}

fn default_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_failure_threshold() -> u32 {
    DEFAULT_FAILURE_THRESHOLD
}

fn default_decimals() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [server]
        bind = "127.0.0.1:9000"

        [[panels]]
        id = "feed-drive"
        title = "Feed Drive"
        endpoint = "https://edge.example/Backend/OPCUA_FeedDrive.php"
        interval_ms = 800

        [[panels.gauges]]
        signal = "speed"
        title = "Speed"
        unit = "RPM"
        max = 10000.0

        [[panels]]
        id = "rs232"
        title = "RS232 Monitor"
        protocol = "rs232"
        endpoint = "https://edge.example/Backend/RS232.php"
        variant = "post"
        signals = ["voltage"]
        capacity = 100

        [panels.aliases]
        voltage = "data"
    "#;

    #[test]
    fn test_parse_config_with_defaults() {
        let config = parse_config(SAMPLE).unwrap();

        assert_eq!(config.server.bind, "127.0.0.1:9000");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.http.timeout(), Duration::from_millis(5000));
        assert_eq!(config.panels.len(), 2);

        let feed = &config.panels[0];
        assert_eq!(feed.protocol, "opcua");
        assert_eq!(feed.variant, WireVariant::Query);
        assert_eq!(feed.signals.len(), DEFAULT_SIGNALS.len());
        assert_eq!(feed.capacity, DEFAULT_HISTORY_CAPACITY);
        assert_eq!(feed.interval(), Duration::from_millis(800));
        assert_eq!(feed.failure_threshold, 2);
        assert_eq!(feed.max_rates.get("position"), Some(&500.0));
        assert_eq!(feed.gauge("speed").map(|g| g.max), Some(10000.0));
        assert_eq!(feed.gauge("speed").map(|g| g.decimals), Some(1));
    }

    #[test]
    fn test_aliases_and_post_variant() {
        let config = parse_config(SAMPLE).unwrap();
        let rs232 = &config.panels[1];

        assert_eq!(rs232.variant, WireVariant::Post);
        assert_eq!(rs232.capacity, 100);
        assert_eq!(rs232.preload, 0);
        assert_eq!(
            rs232.signal_specs(),
            vec![SignalSpec::aliased("voltage", "data")]
        );
    }

    fn panel(id: &str) -> PanelConfig {
        PanelConfig {
            id: id.to_string(),
            title: id.to_string(),
            protocol: default_protocol(),
            endpoint: "http://localhost/feed.php".to_string(),
            variant: WireVariant::Query,
            signals: default_signals(),
            aliases: HashMap::new(),
            capacity: 20,
            interval_ms: 3000,
            failure_threshold: 2,
            max_rates: default_max_rates(),
            preload: 0,
            gauges: Vec::new(),
        }
    }

    fn config_with(panels: Vec<PanelConfig>) -> AppConfig {
        AppConfig {
            server: ServerSettings::default(),
            logging: LoggingConfig::default(),
            http: HttpSettings::default(),
            panels,
        }
    }

    #[test]
    fn test_validation_errors() {
        assert_eq!(
            config_with(vec![panel("a"), panel("a")]).validate(),
            Err(ConfigError::DuplicatePanel("a".to_string()))
        );

        let mut p = panel("a");
        p.endpoint = "  ".to_string();
        assert_eq!(
            config_with(vec![p]).validate(),
            Err(ConfigError::EmptyEndpoint("a".to_string()))
        );

        let mut p = panel("a");
        p.capacity = 0;
        assert_eq!(
            config_with(vec![p]).validate(),
            Err(ConfigError::ZeroCapacity("a".to_string()))
        );

        let mut p = panel("a");
        p.interval_ms = 0;
        assert_eq!(
            config_with(vec![p]).validate(),
            Err(ConfigError::ZeroInterval("a".to_string()))
        );

        let mut p = panel("a");
        p.max_rates.insert("speed".to_string(), -1.0);
        assert_eq!(
            config_with(vec![p]).validate(),
            Err(ConfigError::InvalidMaxRate {
                panel: "a".to_string(),
                signal: "speed".to_string()
            })
        );

        let mut p = panel("a");
        p.gauges.push(GaugeConfig {
            signal: "pressure".to_string(),
            title: "Pressure".to_string(),
            unit: "bar".to_string(),
            min: 0.0,
            max: 10.0,
            decimals: 1,
        });
        assert_eq!(
            config_with(vec![p]).validate(),
            Err(ConfigError::UnknownGaugeSignal {
                panel: "a".to_string(),
                signal: "pressure".to_string()
            })
        );

        assert_eq!(config_with(vec![panel("a"), panel("b")]).validate(), Ok(()));
    }
}
