use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::route_validator::WorstValidityMode;
use crate::shared::Policy;

fn default_workers() -> usize {
    num_cpus::get().saturating_sub(1).max(1)
}

fn default_partition_prefix_len() -> u8 {
    8
}

fn default_cache_capacity() -> usize {
    10_000
}

/// Settings for one analysis run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Hijack relations must straddle this time (seconds since epoch).
    #[serde(default)]
    pub t_cutoff: Option<i64>,

    /// Announcements are split into buckets of this prefix length for the
    /// parallel stages.
    #[serde(default = "default_partition_prefix_len")]
    pub partition_prefix_len: u8,

    #[serde(default = "default_workers")]
    pub num_workers: usize,

    #[serde(default = "default_cache_capacity")]
    pub validity_cache_capacity: usize,

    #[serde(default)]
    pub show_progress: bool,

    #[serde(default)]
    pub worst_validity_mode: WorstValidityMode,
}

impl AnalysisConfig {
    pub fn new() -> Self {
        AnalysisConfig {
            t_cutoff: None,
            partition_prefix_len: default_partition_prefix_len(),
            num_workers: default_workers(),
            validity_cache_capacity: default_cache_capacity(),
            show_progress: false,
            worst_validity_mode: WorstValidityMode::default(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_cutoff(mut self, t_cutoff: i64) -> Self {
        self.t_cutoff = Some(t_cutoff);
        self
    }

    pub fn with_partition_prefix_len(mut self, len: u8) -> Self {
        self.partition_prefix_len = len;
        self
    }

    pub fn with_num_workers(mut self, workers: usize) -> Self {
        self.num_workers = workers.max(1);
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn with_worst_validity_mode(mut self, mode: WorstValidityMode) -> Self {
        self.worst_validity_mode = mode;
        self
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn default_percentages() -> Vec<f64> {
    vec![10.0, 20.0, 50.0, 80.0, 99.0]
}

fn default_trials() -> usize {
    1
}

/// An adoption sweep: one policy rolled out to growing shares of the
/// vantage ASes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub label: String,
    pub policy: Policy,

    #[serde(default = "default_percentages")]
    pub percent_ases_randomly_adopting: Vec<f64>,

    #[serde(default = "default_trials")]
    pub num_trials: usize,

    /// Seeds adopter selection for the whole sweep.
    #[serde(default)]
    pub seed: u64,
}

impl ScenarioConfig {
    pub fn new(label: String, policy: Policy) -> Self {
        ScenarioConfig {
            label,
            policy,
            percent_ases_randomly_adopting: default_percentages(),
            num_trials: default_trials(),
            seed: 0,
        }
    }

    pub fn with_adoption_percentages(mut self, percentages: Vec<f64>) -> Self {
        self.percent_ases_randomly_adopting = percentages;
        self
    }

    pub fn with_num_trials(mut self, trials: usize) -> Self {
        self.num_trials = trials;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        ScenarioConfig::new("ROV adopting".to_string(), Policy::Rov)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_from_empty_json() {
        let config = AnalysisConfig::from_json_str("{}").unwrap();
        assert_eq!(config.t_cutoff, None);
        assert_eq!(config.partition_prefix_len, 8);
        assert!(config.num_workers >= 1);
        assert_eq!(config.worst_validity_mode, WorstValidityMode::Literal);
    }

    #[test]
    fn test_config_overrides() {
        let config = AnalysisConfig::from_json_str(
            r#"{"t_cutoff": 1002, "partition_prefix_len": 4, "worst_validity_mode": "maximum"}"#,
        )
        .unwrap();
        assert_eq!(config.t_cutoff, Some(1002));
        assert_eq!(config.partition_prefix_len, 4);
        assert_eq!(config.worst_validity_mode, WorstValidityMode::Maximum);
    }

    #[test]
    fn test_scenario_config_defaults() {
        let config: ScenarioConfig = serde_json::from_str(r#"{"label": "asn", "policy": "ASN"}"#).unwrap();
        assert_eq!(config.policy, Policy::Asn);
        assert_eq!(config.percent_ases_randomly_adopting.len(), 5);
        assert_eq!(config.num_trials, 1);
    }
}
