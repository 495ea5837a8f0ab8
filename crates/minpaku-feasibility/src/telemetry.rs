use crate::config::TelemetryConfig;
use serde::Serialize;
use std::fmt;
use std::time::Instant;
use tracing::debug;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
pub enum TelemetryError {
    EnvFilter { value: String, source: ParseError },
    Subscriber(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryError::EnvFilter { value, .. } => {
                write!(f, "invalid log filter '{value}'")
            }
            TelemetryError::Subscriber(err) => write!(f, "subscriber install failed: {err}"),
        }
    }
}

impl std::error::Error for TelemetryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TelemetryError::EnvFilter { source, .. } => Some(source),
            TelemetryError::Subscriber(err) => Some(&**err),
        }
    }
}

/// Installs the global fmt subscriber. `RUST_LOG` wins over the configured level.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            EnvFilter::try_new(&config.log_level).map_err(|source| TelemetryError::EnvFilter {
                value: config.log_level.clone(),
                source,
            })?
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .with_ansi(false)
        .try_init()
        .map_err(TelemetryError::Subscriber)
}

/// Aggregated wall-clock statistics for one named pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageStats {
    pub stage: String,
    pub count: usize,
    pub total_ms: f64,
    pub average_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub latest_ms: f64,
}

/// Per-session ledger of stage durations, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct StageTimings {
    entries: Vec<(String, Vec<f64>)>,
}

impl StageTimings {
    pub fn time<T>(&mut self, stage: &str, work: impl FnOnce() -> T) -> T {
        let started = Instant::now();
        let output = work();
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        debug!(stage, elapsed_ms, "stage finished");
        self.record(stage, elapsed_ms);
        output
    }

    pub fn record(&mut self, stage: &str, elapsed_ms: f64) {
        match self.entries.iter_mut().find(|(name, _)| name == stage) {
            Some((_, samples)) => samples.push(elapsed_ms),
            None => self.entries.push((stage.to_string(), vec![elapsed_ms])),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> Vec<StageStats> {
        self.entries
            .iter()
            .filter(|(_, samples)| !samples.is_empty())
            .map(|(stage, samples)| {
                let total: f64 = samples.iter().sum();
                let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
                let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                StageStats {
                    stage: stage.clone(),
                    count: samples.len(),
                    total_ms: total,
                    average_ms: total / samples.len() as f64,
                    min_ms: min,
                    max_ms: max,
                    latest_ms: samples.last().copied().unwrap_or_default(),
                }
            })
            .collect()
    }

    /// Markdown table of the ledger, slowest total first.
    pub fn summary(&self) -> String {
        let mut stats = self.stats();
        if stats.is_empty() {
            return "実行時間データがありません。".to_string();
        }
        stats.sort_by(|a, b| b.total_ms.total_cmp(&a.total_ms));

        let mut lines = vec![
            "| 処理名 | 実行回数 | 合計時間 | 平均時間 | 最小時間 | 最大時間 | 最新時間 |".to_string(),
            "|---|---|---|---|---|---|---|".to_string(),
        ];
        for entry in stats {
            lines.push(format!(
                "| {} | {} | {:.0}ms | {:.0}ms | {:.0}ms | {:.0}ms | {:.0}ms |",
                entry.stage,
                entry.count,
                entry.total_ms,
                entry.average_ms,
                entry.min_ms,
                entry.max_ms,
                entry.latest_ms
            ));
        }
        lines.join("\n")
    }
}
