use std::collections::BTreeMap;

use serde::Serialize;

use crate::aggregator::{OutcomeBucket, OutcomeTable};
use crate::error::Result;
use crate::shared::Policy;

/// Totals of every trial run at one adoption percentage.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DataTracker {
    pub scenario_label: String,
    pub percent_adopting: f64,
    /// Per-trial totals, summed over the adopting ASes.
    pub trials: Vec<BTreeMap<Policy, OutcomeBucket>>,
}

impl DataTracker {
    pub fn new(scenario_label: String, percent_adopting: f64) -> Self {
        DataTracker {
            scenario_label,
            percent_adopting,
            trials: Vec::new(),
        }
    }

    pub fn add_trial(&mut self, outcomes: &OutcomeTable) {
        self.trials.push(outcomes.totals_by_policy());
    }

    pub fn total(&self, policy: Policy) -> OutcomeBucket {
        let mut total = OutcomeBucket::default();
        for trial in &self.trials {
            if let Some(bucket) = trial.get(&policy) {
                total.merge(bucket);
            }
        }
        total
    }

    /// Percent of evaluated relations that ended at the attacker.
    pub fn hijack_rate(&self, policy: Policy) -> f64 {
        let total = self.total(policy);
        percent(total.hijacked(), total.total())
    }

    pub fn block_rate(&self, policy: Policy) -> f64 {
        let total = self.total(policy);
        percent(total.blocked(), total.total())
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (part as f64) * 100.0 / (whole as f64)
}

/// One point per adoption percentage of a sweep.
#[derive(Debug, Clone, Serialize)]
pub struct SweepSummary {
    pub scenario_label: String,
    pub policy: Policy,
    pub adoption_percentages: Vec<f64>,
    pub hijack_rates: Vec<f64>,
    pub block_rates: Vec<f64>,
    pub totals: Vec<OutcomeBucket>,
}

impl SweepSummary {
    pub fn new(scenario_label: String, policy: Policy) -> Self {
        SweepSummary {
            scenario_label,
            policy,
            adoption_percentages: Vec::new(),
            hijack_rates: Vec::new(),
            block_rates: Vec::new(),
            totals: Vec::new(),
        }
    }

    pub fn add_data_point(&mut self, tracker: &DataTracker) {
        self.adoption_percentages.push(tracker.percent_adopting);
        self.hijack_rates.push(tracker.hijack_rate(self.policy));
        self.block_rates.push(tracker.block_rate(self.policy));
        self.totals.push(tracker.total(self.policy));
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rates() {
        let mut table = OutcomeTable::new();
        table.record(1, Policy::Rov, true, false);
        table.record(2, Policy::Rov, false, true);
        table.record(3, Policy::Rov, true, false);
        table.record(4, Policy::Rov, true, false);

        let mut tracker = DataTracker::new("rov".into(), 50.0);
        tracker.add_trial(&table);
        assert_eq!(tracker.hijack_rate(Policy::Rov), 25.0);
        assert_eq!(tracker.block_rate(Policy::Rov), 75.0);
        assert_eq!(tracker.hijack_rate(Policy::Asn), 0.0);

        let mut summary = SweepSummary::new("rov".into(), Policy::Rov);
        summary.add_data_point(&tracker);
        assert!(summary.to_json().unwrap().contains("\"hijack_rates\""));
    }
}
