use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct MonitoringConfig {
    /// Stamp operations at submit, invoke, finish and callback, and record
    /// the stage latencies
    #[serde(default)]
    pub timing_enabled: bool,
}
