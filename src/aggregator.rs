//! Per-(vantage AS, policy) outcome counts for hijack relations.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::announcement::ValidityTable;
use crate::error::{AnalysisError, Result};
use crate::hijack::HijackRelation;
use crate::shared::{normalize_prefix, Policy, Prefix, ASN};

/// Four-way split of evaluated hijack relations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeBucket {
    pub blocked_hijacked: u64,
    pub not_blocked_hijacked: u64,
    pub blocked_not_hijacked: u64,
    pub not_blocked_not_hijacked: u64,
}

impl OutcomeBucket {
    pub fn record(&mut self, blocked: bool, hijacked: bool) {
        let counter = match (blocked, hijacked) {
            (true, true) => &mut self.blocked_hijacked,
            (false, true) => &mut self.not_blocked_hijacked,
            (true, false) => &mut self.blocked_not_hijacked,
            (false, false) => &mut self.not_blocked_not_hijacked,
        };
        *counter += 1;
    }

    pub fn merge(&mut self, other: &OutcomeBucket) {
        self.blocked_hijacked += other.blocked_hijacked;
        self.not_blocked_hijacked += other.not_blocked_hijacked;
        self.blocked_not_hijacked += other.blocked_not_hijacked;
        self.not_blocked_not_hijacked += other.not_blocked_not_hijacked;
    }

    pub fn total(&self) -> u64 {
        self.blocked_hijacked + self.not_blocked_hijacked + self.blocked_not_hijacked + self.not_blocked_not_hijacked
    }

    pub fn hijacked(&self) -> u64 {
        self.blocked_hijacked + self.not_blocked_hijacked
    }

    pub fn blocked(&self) -> u64 {
        self.blocked_hijacked + self.blocked_not_hijacked
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeRow {
    pub asn: ASN,
    pub policy: Policy,
    #[serde(flatten)]
    pub bucket: OutcomeBucket,
}

/// Outcome buckets for one adoption scenario. A missing bucket reads as all
/// zeros.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutcomeTable {
    buckets: BTreeMap<(ASN, Policy), OutcomeBucket>,
}

impl OutcomeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, asn: ASN, policy: Policy, blocked: bool, hijacked: bool) {
        self.buckets.entry((asn, policy)).or_default().record(blocked, hijacked);
    }

    pub fn get(&self, asn: ASN, policy: Policy) -> OutcomeBucket {
        self.buckets.get(&(asn, policy)).copied().unwrap_or_default()
    }

    pub fn contains(&self, asn: ASN, policy: Policy) -> bool {
        self.buckets.contains_key(&(asn, policy))
    }

    /// Order of merging never changes the result.
    pub fn merge(&mut self, other: OutcomeTable) {
        for (key, bucket) in other.buckets {
            self.buckets.entry(key).or_default().merge(&bucket);
        }
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn rows(&self) -> Vec<OutcomeRow> {
        self.buckets
            .iter()
            .map(|(&(asn, policy), &bucket)| OutcomeRow { asn, policy, bucket })
            .collect()
    }

    pub fn totals_by_policy(&self) -> BTreeMap<Policy, OutcomeBucket> {
        let mut totals: BTreeMap<Policy, OutcomeBucket> = BTreeMap::new();
        for (&(_, policy), bucket) in &self.buckets {
            totals.entry(policy).or_default().merge(bucket);
        }
        totals
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.rows())?)
    }
}

impl FromIterator<OutcomeTable> for OutcomeTable {
    fn from_iter<I: IntoIterator<Item = OutcomeTable>>(iter: I) -> Self {
        let mut merged = OutcomeTable::new();
        for table in iter {
            merged.merge(table);
        }
        merged
    }
}

/// One row of the route-propagation engine's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedOriginRecord {
    pub asn: ASN,
    pub prefix: Prefix,
    pub origin: ASN,
}

/// Which origin each vantage AS ended up routing to, per prefix. Supplied by
/// the external route-propagation engine and never modified afterwards.
#[derive(Debug, Clone, Default)]
pub struct SelectedOrigins {
    by_prefix: HashMap<Prefix, HashMap<ASN, ASN>>,
}

impl SelectedOrigins {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, asn: ASN, prefix: Prefix, origin: ASN) {
        self.by_prefix
            .entry(normalize_prefix(prefix))
            .or_default()
            .insert(asn, origin);
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let records: Vec<SelectedOriginRecord> = serde_json::from_str(json)?;
        Ok(records.into_iter().collect())
    }

    pub fn selected_origin(&self, asn: ASN, prefix: &Prefix) -> Option<ASN> {
        self.by_prefix.get(prefix)?.get(&asn).copied()
    }

    /// ASes with a route for `prefix`.
    pub fn observers(&self, prefix: &Prefix) -> impl Iterator<Item = ASN> + '_ {
        self.by_prefix
            .get(prefix)
            .into_iter()
            .flat_map(|by_asn| by_asn.keys().copied())
    }

    pub fn vantage_asns(&self) -> BTreeSet<ASN> {
        self.by_prefix
            .values()
            .flat_map(|by_asn| by_asn.keys().copied())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_prefix.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_prefix.is_empty()
    }
}

impl FromIterator<SelectedOriginRecord> for SelectedOrigins {
    fn from_iter<I: IntoIterator<Item = SelectedOriginRecord>>(iter: I) -> Self {
        let mut selected = SelectedOrigins::new();
        for record in iter {
            selected.insert(record.asn, record.prefix, record.origin);
        }
        selected
    }
}

/// Which policy each vantage AS runs in a scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyAssignment {
    /// Every vantage AS is counted once under each policy.
    EveryPolicy,
    /// Only listed ASes are counted, under their own policy.
    PerAs(HashMap<ASN, Policy>),
}

impl PolicyAssignment {
    pub fn uniform<I: IntoIterator<Item = ASN>>(asns: I, policy: Policy) -> Self {
        PolicyAssignment::PerAs(asns.into_iter().map(|asn| (asn, policy)).collect())
    }

    /// Reads `{"<asn>": "ASN" | "LENGTH" | "ROV", ...}`.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let assignment: HashMap<ASN, Policy> = serde_json::from_str(json)?;
        Ok(PolicyAssignment::PerAs(assignment))
    }

    pub fn policies_for(&self, asn: ASN) -> &[Policy] {
        match self {
            PolicyAssignment::EveryPolicy => &Policy::ALL,
            PolicyAssignment::PerAs(assigned) => match assigned.get(&asn) {
                Some(policy) => std::slice::from_ref(policy),
                None => &[],
            },
        }
    }

    pub fn adopter_count(&self) -> Option<usize> {
        match self {
            PolicyAssignment::EveryPolicy => None,
            PolicyAssignment::PerAs(assigned) => Some(assigned.len()),
        }
    }
}

/// Counts, for every vantage AS that sees a relation, whether its policy
/// blocked the attacker and whether its selected route went to the attacker.
pub struct PolicyOutcomeAggregator<'a> {
    validity: &'a ValidityTable,
    selected: &'a SelectedOrigins,
    assignment: &'a PolicyAssignment,
}

impl<'a> PolicyOutcomeAggregator<'a> {
    pub fn new(validity: &'a ValidityTable, selected: &'a SelectedOrigins, assignment: &'a PolicyAssignment) -> Self {
        PolicyOutcomeAggregator {
            validity,
            selected,
            assignment,
        }
    }

    /// Fails when the attacker has no validity tag; a partially counted
    /// table is never returned.
    pub fn evaluate(&self, relation: &HijackRelation, table: &mut OutcomeTable) -> Result<()> {
        let attacker = relation.attacker;
        let validity = self
            .validity
            .get(&attacker)
            .ok_or(AnalysisError::MissingValidity(attacker))?;

        let mut observers: BTreeSet<ASN> = self.selected.observers(&attacker.prefix).collect();
        if let Some(victim) = relation.victim {
            observers.extend(self.selected.observers(&victim.prefix));
        }

        for asn in observers {
            let policies = self.assignment.policies_for(asn);
            if policies.is_empty() {
                continue;
            }
            let selected = self.selected.selected_origin(asn, &attacker.prefix).or_else(|| {
                relation
                    .victim
                    .and_then(|victim| self.selected.selected_origin(asn, &victim.prefix))
            });
            let hijacked = selected == Some(attacker.origin);
            for &policy in policies {
                table.record(asn, policy, policy.blocks(validity), hijacked);
            }
        }
        Ok(())
    }

    pub fn evaluate_all<'r, I>(&self, relations: I) -> Result<OutcomeTable>
    where
        I: IntoIterator<Item = &'r HijackRelation>,
    {
        let mut table = OutcomeTable::new();
        let mut evaluated = 0usize;
        for relation in relations {
            self.evaluate(relation, &mut table)?;
            evaluated += 1;
        }
        debug!(relations = evaluated, buckets = table.len(), "aggregated outcomes");
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_record_hits_one_counter() {
        let mut bucket = OutcomeBucket::default();
        bucket.record(true, false);
        assert_eq!(bucket.blocked_not_hijacked, 1);
        assert_eq!(bucket.total(), 1);
        bucket.record(false, true);
        assert_eq!(bucket.not_blocked_hijacked, 1);
        assert_eq!(bucket.hijacked(), 1);
        assert_eq!(bucket.blocked(), 1);
    }

    #[test]
    fn test_missing_bucket_reads_zero() {
        let table = OutcomeTable::new();
        assert_eq!(table.get(1, Policy::Rov), OutcomeBucket::default());
        assert!(!table.contains(1, Policy::Rov));
    }

    #[test]
    fn test_merge_is_order_independent() {
        let mut a = OutcomeTable::new();
        a.record(1, Policy::Asn, true, true);
        a.record(2, Policy::Rov, false, false);
        let mut b = OutcomeTable::new();
        b.record(1, Policy::Asn, false, true);
        b.record(3, Policy::Length, true, false);

        let mut ab = a.clone();
        ab.merge(b.clone());
        let mut ba = b;
        ba.merge(a);
        assert_eq!(ab, ba);
        assert_eq!(ab.get(1, Policy::Asn).total(), 2);
    }

    #[test]
    fn test_row_serialization_is_flat() {
        let mut table = OutcomeTable::new();
        table.record(64500, Policy::Length, true, false);
        let json = table.to_json().unwrap();
        assert!(json.contains("\"policy\": \"LENGTH\""));
        assert!(json.contains("\"blocked_not_hijacked\": 1"));
    }

    #[test]
    fn test_assignment_from_json() {
        let assignment = PolicyAssignment::from_json_str(r#"{"1": "ASN", "2": "ROV"}"#).unwrap();
        assert_eq!(assignment.policies_for(1), &[Policy::Asn]);
        assert_eq!(assignment.policies_for(2), &[Policy::Rov]);
        assert!(assignment.policies_for(3).is_empty());
        assert_eq!(PolicyAssignment::EveryPolicy.policies_for(3).len(), 3);
    }
}
