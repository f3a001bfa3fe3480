// Plausibility check rejecting samples that imply impossible rates of change
use super::sample::Sample;
use std::collections::BTreeMap;
use std::fmt;

/// Fastest plausible travel for position-like signals, in units per second
pub const DEFAULT_POSITION_MAX_RATE: f64 = 500.0;

pub fn default_max_rates() -> BTreeMap<String, f64> {
    BTreeMap::from([("position".to_string(), DEFAULT_POSITION_MAX_RATE)])
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accept,
    Reject(Rejection),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    /// Candidate is not strictly newer than the previous sample
    NonIncreasingTime { delta_ms: i64 },
    ImplausibleRate {
        signal: String,
        implied_rate: f64,
        max_rate: f64,
    },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NonIncreasingTime { delta_ms } => {
                write!(f, "timestamp does not advance ({} ms)", delta_ms)
            }
            Rejection::ImplausibleRate {
                signal,
                implied_rate,
                max_rate,
            } => write!(
                f,
                "{} changes at {:.1}/s, above the plausible {:.1}/s",
                signal, implied_rate, max_rate
            ),
        }
    }
}

/// Stateless guard: the verdict depends only on the two samples and the
/// configured per-signal limits.
#[derive(Debug, Clone, Default)]
pub struct OutlierGuard {
    max_rates: BTreeMap<String, f64>,
}

impl OutlierGuard {
    pub fn new(max_rates: BTreeMap<String, f64>) -> Self {
        Self { max_rates }
    }

    pub fn check(&self, previous: Option<&Sample>, candidate: &Sample) -> Verdict {
        let Some(previous) = previous else {
            return Verdict::Accept;
        };
        if self.max_rates.is_empty() {
            return Verdict::Accept;
        }

        let delta_ms = (candidate.timestamp - previous.timestamp).num_milliseconds();
        if delta_ms <= 0 {
            return Verdict::Reject(Rejection::NonIncreasingTime { delta_ms });
        }
        let seconds = delta_ms as f64 / 1000.0;

        for (signal, &max_rate) in &self.max_rates {
            let implied_rate = (candidate.value(signal) - previous.value(signal)).abs() / seconds;
            if implied_rate > max_rate {
                return Verdict::Reject(Rejection::ImplausibleRate {
                    signal: signal.clone(),
                    implied_rate,
                    max_rate,
                });
            }
        }

        Verdict::Accept
    }
}
