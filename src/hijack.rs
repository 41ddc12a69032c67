//! Attacker/victim relations between announcements.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::announcement::{format_time, ingest, parse_asn, parse_prefix, parse_time, Announcement, IngestStats};
use crate::error::{AnalysisError, Result};
use crate::prefix_trie::PrefixTrie;
use crate::shared::{prefix_contains, PrefixOrigin, ASN};

/// A recorded hijack incident. `victim` is `None` for hijacks of space
/// nobody else announced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HijackEvent {
    pub attacker: PrefixOrigin,
    /// When the attacker announcement started.
    pub time: i64,
    pub victim: Option<PrefixOrigin>,
    /// When the victim was first seen, if the catalog knows it.
    pub victim_time: Option<i64>,
}

impl HijackEvent {
    pub fn non_competing(attacker: PrefixOrigin, time: i64) -> Self {
        HijackEvent {
            attacker,
            time,
            victim: None,
            victim_time: None,
        }
    }

    pub fn competing(attacker: PrefixOrigin, time: i64, victim: PrefixOrigin) -> Self {
        HijackEvent {
            attacker,
            time,
            victim: Some(victim),
            victim_time: None,
        }
    }

    pub fn with_victim_time(mut self, victim_time: i64) -> Self {
        self.victim_time = Some(victim_time);
        self
    }

    pub fn is_non_competing(&self) -> bool {
        self.victim.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HijackEventRecord {
    pub attacker_prefix: String,
    pub attacker_asn: i64,
    #[serde(default)]
    pub victim_prefix: Option<String>,
    #[serde(default)]
    pub victim_asn: Option<i64>,
    pub time: i64,
    #[serde(default)]
    pub victim_time: Option<i64>,
}

impl TryFrom<HijackEventRecord> for HijackEvent {
    type Error = AnalysisError;

    fn try_from(record: HijackEventRecord) -> Result<Self> {
        let attacker = PrefixOrigin::new(
            parse_prefix(&record.attacker_prefix)?,
            parse_asn(record.attacker_asn)?,
        );
        let victim = match (record.victim_prefix.as_deref(), record.victim_asn) {
            (Some(prefix), Some(asn)) => Some(PrefixOrigin::new(parse_prefix(prefix)?, parse_asn(asn)?)),
            (None, None) => None,
            _ => return Err(AnalysisError::IncompleteVictim),
        };
        let victim_time = record.victim_time.map(parse_time).transpose()?;
        Ok(HijackEvent {
            attacker,
            time: parse_time(record.time)?,
            victim,
            victim_time,
        })
    }
}

pub fn ingest_hijack_events<I>(records: I, stats: &mut IngestStats) -> Result<Vec<HijackEvent>>
where
    I: IntoIterator<Item = HijackEventRecord>,
{
    ingest(records, &mut stats.hijack_events, "hijack_event")
}

/// Attacker equals the victim prefix or sits inside it, with a different
/// origin.
pub fn prefixes_overlap(attacker: &PrefixOrigin, victim: &PrefixOrigin) -> bool {
    attacker.origin != victim.origin && prefix_contains(&victim.prefix, &attacker.prefix)
}

/// The victim must be established before the cutoff and the attacker seen at
/// or after it. Without a cutoff nothing straddles.
pub fn straddles_cutoff(victim_time: i64, attacker_time: i64, t_cutoff: Option<i64>) -> bool {
    match t_cutoff {
        Some(cutoff) => victim_time < cutoff && cutoff <= attacker_time,
        None => false,
    }
}

pub fn is_hijack_relation(attacker: &Announcement, victim: &Announcement, t_cutoff: Option<i64>) -> bool {
    prefixes_overlap(&attacker.prefix_origin(), &victim.prefix_origin())
        && straddles_cutoff(victim.time, attacker.time, t_cutoff)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// From the hijack catalog.
    Curated,
    /// Any more-specific-or-equal announcement with another origin.
    Overlap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HijackRelation {
    pub victim: Option<PrefixOrigin>,
    pub attacker: PrefixOrigin,
    pub provenance: Provenance,
}

/// Victim (prefix, origin) -> attacker (prefix, origin) pairs, plus the
/// victimless hijacks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationTable {
    relations: BTreeMap<PrefixOrigin, BTreeMap<PrefixOrigin, Provenance>>,
    non_competing: BTreeSet<PrefixOrigin>,
}

impl RelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Curated provenance wins when a pair is found both ways.
    pub fn insert(&mut self, victim: PrefixOrigin, attacker: PrefixOrigin, provenance: Provenance) {
        let entry = self
            .relations
            .entry(victim)
            .or_default()
            .entry(attacker)
            .or_insert(provenance);
        *entry = (*entry).min(provenance);
    }

    pub fn insert_non_competing(&mut self, attacker: PrefixOrigin) {
        self.non_competing.insert(attacker);
    }

    pub fn merge(&mut self, other: RelationTable) {
        for (victim, attackers) in other.relations {
            for (attacker, provenance) in attackers {
                self.insert(victim, attacker, provenance);
            }
        }
        self.non_competing.extend(other.non_competing);
    }

    pub fn attackers_of(&self, victim: &PrefixOrigin) -> Option<&BTreeMap<PrefixOrigin, Provenance>> {
        self.relations.get(victim)
    }

    pub fn contains(&self, victim: &PrefixOrigin, attacker: &PrefixOrigin) -> bool {
        self.relations
            .get(victim)
            .map_or(false, |attackers| attackers.contains_key(attacker))
    }

    pub fn provenance(&self, victim: &PrefixOrigin, attacker: &PrefixOrigin) -> Option<Provenance> {
        self.relations.get(victim)?.get(attacker).copied()
    }

    pub fn is_non_competing(&self, attacker: &PrefixOrigin) -> bool {
        self.non_competing.contains(attacker)
    }

    pub fn pair_count(&self) -> usize {
        self.relations.values().map(BTreeMap::len).sum()
    }

    pub fn non_competing_count(&self) -> usize {
        self.non_competing.len()
    }

    pub fn len(&self) -> usize {
        self.pair_count() + self.non_competing_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every relation, competing ones first, in key order.
    pub fn iter(&self) -> impl Iterator<Item = HijackRelation> + '_ {
        let competing = self.relations.iter().flat_map(|(victim, attackers)| {
            attackers.iter().map(move |(attacker, provenance)| HijackRelation {
                victim: Some(*victim),
                attacker: *attacker,
                provenance: *provenance,
            })
        });
        let non_competing = self.non_competing.iter().map(|attacker| HijackRelation {
            victim: None,
            attacker: *attacker,
            provenance: Provenance::Curated,
        });
        competing.chain(non_competing)
    }

    /// Every attacker pair that the aggregator will need a validity for.
    pub fn attacker_pairs(&self) -> BTreeSet<PrefixOrigin> {
        self.iter().map(|relation| relation.attacker).collect()
    }
}

/// First and last time a (prefix, origin) pair was announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSpan {
    pub first_seen: i64,
    pub last_seen: i64,
}

impl TimeSpan {
    fn at(time: i64) -> Self {
        TimeSpan {
            first_seen: time,
            last_seen: time,
        }
    }

    fn widen(&mut self, time: i64) {
        self.first_seen = self.first_seen.min(time);
        self.last_seen = self.last_seen.max(time);
    }
}

#[derive(Debug, Clone, Copy)]
struct OriginSpan {
    origin: ASN,
    span: TimeSpan,
}

/// Outcome counts for curated events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EventResolution {
    pub competing: u64,
    pub non_competing: u64,
    /// Victim never announced and no victim time in the catalog.
    pub victim_unseen: u64,
    /// Fails the prefix or time rule.
    pub rejected: u64,
}

/// Frozen index of every announced (prefix, origin) pair with its time span.
pub struct RelationDetector {
    index: Arc<PrefixTrie<OriginSpan>>,
    spans: HashMap<PrefixOrigin, TimeSpan>,
}

impl RelationDetector {
    pub fn build<'a, I>(announcements: I) -> Self
    where
        I: IntoIterator<Item = &'a Announcement>,
    {
        let mut spans: HashMap<PrefixOrigin, TimeSpan> = HashMap::new();
        for ann in announcements {
            spans
                .entry(ann.prefix_origin())
                .and_modify(|span| span.widen(ann.time))
                .or_insert_with(|| TimeSpan::at(ann.time));
        }

        let mut index = PrefixTrie::new();
        for (pair, span) in &spans {
            index.insert(pair.prefix, OriginSpan { origin: pair.origin, span: *span });
        }
        debug!(pairs = spans.len(), "built relation index");

        RelationDetector {
            index: index.freeze(),
            spans,
        }
    }

    pub fn span(&self, pair: &PrefixOrigin) -> Option<TimeSpan> {
        self.spans.get(pair).copied()
    }

    /// Every indexed pair, sorted.
    pub fn pairs(&self) -> Vec<PrefixOrigin> {
        let mut pairs: Vec<PrefixOrigin> = self.spans.keys().copied().collect();
        pairs.sort();
        pairs
    }

    /// General overlap relation for the given victims. With a cutoff, a pair
    /// only counts when the victim was first seen before it and the attacker
    /// was still seen at or after it.
    pub fn detect_overlaps(&self, victims: &[PrefixOrigin], t_cutoff: Option<i64>) -> RelationTable {
        let mut table = RelationTable::new();
        for victim in victims {
            let Some(victim_span) = self.spans.get(victim) else {
                continue;
            };
            for (prefix, candidate) in self.index.contained(&victim.prefix) {
                let attacker = PrefixOrigin::new(prefix, candidate.origin);
                if !prefixes_overlap(&attacker, victim) {
                    continue;
                }
                let in_window = match t_cutoff {
                    Some(_) => straddles_cutoff(victim_span.first_seen, candidate.span.last_seen, t_cutoff),
                    None => true,
                };
                if in_window {
                    table.insert(*victim, attacker, Provenance::Overlap);
                }
            }
        }
        table
    }

    /// Turns catalog events into relations. Each event is judged against the
    /// run cutoff, or its own start time when the run has none.
    pub fn resolve_events(&self, events: &[HijackEvent], t_cutoff: Option<i64>) -> (RelationTable, EventResolution) {
        let mut table = RelationTable::new();
        let mut resolution = EventResolution::default();

        for event in events {
            let Some(victim) = event.victim else {
                // only the attacker half of the cutoff rule applies
                if t_cutoff.is_some_and(|cutoff| event.time < cutoff) {
                    debug!(attacker = %event.attacker, "non-competing event before cutoff");
                    resolution.rejected += 1;
                    continue;
                }
                table.insert_non_competing(event.attacker);
                resolution.non_competing += 1;
                continue;
            };

            let victim_time = event
                .victim_time
                .or_else(|| self.spans.get(&victim).map(|span| span.first_seen));
            let Some(victim_time) = victim_time else {
                debug!(victim = %victim, "victim of hijack event never announced");
                resolution.victim_unseen += 1;
                continue;
            };

            let cutoff = t_cutoff.unwrap_or(event.time);
            if prefixes_overlap(&event.attacker, &victim) && straddles_cutoff(victim_time, event.time, Some(cutoff)) {
                table.insert(victim, event.attacker, Provenance::Curated);
                resolution.competing += 1;
            } else {
                debug!(
                    attacker = %event.attacker,
                    victim = %victim,
                    cutoff = %format_time(cutoff),
                    "hijack event outside relation rule"
                );
                resolution.rejected += 1;
            }
        }

        info!(
            competing = resolution.competing,
            non_competing = resolution.non_competing,
            victim_unseen = resolution.victim_unseen,
            rejected = resolution.rejected,
            "resolved hijack events"
        );
        (table, resolution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipnetwork::IpNetwork;
    use std::str::FromStr;

    fn po(prefix: &str, origin: ASN) -> PrefixOrigin {
        PrefixOrigin::new(IpNetwork::from_str(prefix).unwrap(), origin)
    }

    #[test]
    fn test_curated_provenance_wins() {
        let mut table = RelationTable::new();
        let victim = po("10.0.0.0/24", 1);
        let attacker = po("10.0.0.0/25", 2);
        table.insert(victim, attacker, Provenance::Overlap);
        table.insert(victim, attacker, Provenance::Curated);
        table.insert(victim, attacker, Provenance::Overlap);
        assert_eq!(table.provenance(&victim, &attacker), Some(Provenance::Curated));
        assert_eq!(table.pair_count(), 1);
    }

    #[test]
    fn test_incomplete_victim_rejected() {
        let record = HijackEventRecord {
            attacker_prefix: "10.0.0.0/25".into(),
            attacker_asn: 666,
            victim_prefix: Some("10.0.0.0/24".into()),
            victim_asn: None,
            time: 10,
            victim_time: None,
        };
        assert!(matches!(HijackEvent::try_from(record), Err(AnalysisError::IncompleteVictim)));
    }

    #[test]
    fn test_same_origin_never_overlaps() {
        assert!(!prefixes_overlap(&po("10.0.0.0/25", 1), &po("10.0.0.0/24", 1)));
        assert!(prefixes_overlap(&po("10.0.0.0/24", 2), &po("10.0.0.0/24", 1)));
        assert!(!prefixes_overlap(&po("10.0.0.0/23", 2), &po("10.0.0.0/24", 1)));
    }
}
