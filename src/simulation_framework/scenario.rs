use std::collections::BTreeSet;

use rand::Rng;

use crate::aggregator::{PolicyAssignment, SelectedOrigins};
use crate::error::Result;
use crate::shared::{Policy, ASN};

/// One hypothetical rollout: `policy` adopted by `adopting_asns`.
#[derive(Debug, Clone, PartialEq)]
pub struct AdoptionScenario {
    pub policy: Policy,
    pub percent_ases_randomly_adopting: f64,
    pub adopting_asns: BTreeSet<ASN>,
}

impl AdoptionScenario {
    pub fn new(policy: Policy, adopting_asns: BTreeSet<ASN>) -> Self {
        AdoptionScenario {
            policy,
            percent_ases_randomly_adopting: 100.0,
            adopting_asns,
        }
    }

    /// Picks `percent` of `candidates` uniformly at random.
    pub fn random<R: Rng>(candidates: &BTreeSet<ASN>, percent: f64, policy: Policy, rng: &mut R) -> Self {
        let num_to_adopt = ((candidates.len() as f64) * (percent / 100.0)) as usize;

        let mut remaining: Vec<ASN> = candidates.iter().copied().collect();
        let mut adopting = BTreeSet::new();
        for _ in 0..num_to_adopt.min(remaining.len()) {
            let idx = rng.gen_range(0..remaining.len());
            adopting.insert(remaining.swap_remove(idx));
        }

        AdoptionScenario {
            policy,
            percent_ases_randomly_adopting: percent,
            adopting_asns: adopting,
        }
    }

    pub fn assignment(&self) -> PolicyAssignment {
        PolicyAssignment::uniform(self.adopting_asns.iter().copied(), self.policy)
    }
}

/// Seam to the external route-propagation engine: given who adopts what,
/// report which origin every vantage AS selected.
pub trait RouteSelector: Send + Sync {
    fn vantage_asns(&self) -> BTreeSet<ASN>;

    fn select(&self, scenario: &AdoptionScenario) -> Result<SelectedOrigins>;
}

/// A precomputed selection that does not depend on the scenario.
impl RouteSelector for SelectedOrigins {
    fn vantage_asns(&self) -> BTreeSet<ASN> {
        SelectedOrigins::vantage_asns(self)
    }

    fn select(&self, _scenario: &AdoptionScenario) -> Result<SelectedOrigins> {
        Ok(self.clone())
    }
}
