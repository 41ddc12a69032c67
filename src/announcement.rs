use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{AnalysisError, Result};
use crate::route_validator::ROA;
use crate::shared::{normalize_prefix, Prefix, PrefixOrigin, ROAValidity, ASN};

/// How many skip reasons are kept per record kind for diagnostics.
const MAX_SKIP_SAMPLES: usize = 8;

/// A route announcement as observed by a collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    pub prefix: Prefix,
    #[serde(rename = "origin_asn")]
    pub origin: ASN,
    /// Empty for synthetic announcements.
    pub as_path: Vec<ASN>,
    /// Seconds since the epoch.
    pub time: i64,
    pub id: Option<u64>,
}

impl Announcement {
    pub fn new(prefix: Prefix, origin: ASN, time: i64) -> Self {
        Announcement {
            prefix: normalize_prefix(prefix),
            origin,
            as_path: Vec::new(),
            time,
            id: None,
        }
    }

    pub fn with_as_path(mut self, as_path: Vec<ASN>) -> Self {
        self.as_path = as_path;
        self
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn prefix_origin(&self) -> PrefixOrigin {
        PrefixOrigin::new(self.prefix, self.origin)
    }
}

/// An announcement tagged with its RPKI validity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedAnnouncement {
    #[serde(flatten)]
    pub announcement: Announcement,
    pub validity: ROAValidity,
}

impl ValidatedAnnouncement {
    pub fn prefix_origin(&self) -> PrefixOrigin {
        self.announcement.prefix_origin()
    }
}

/// Raw announcement as handed over by the collection stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnouncementRecord {
    pub prefix: String,
    pub origin_asn: i64,
    #[serde(default)]
    pub as_path: Vec<i64>,
    pub time: i64,
    #[serde(default)]
    pub id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoaRecord {
    pub prefix: String,
    pub max_length: i64,
    pub origin_asn: i64,
}

pub(crate) fn parse_prefix(input: &str) -> Result<Prefix> {
    Prefix::from_str(input.trim())
        .map(normalize_prefix)
        .map_err(|e| AnalysisError::MalformedPrefix {
            input: input.to_string(),
            reason: e.to_string(),
        })
}

pub(crate) fn parse_asn(value: i64) -> Result<ASN> {
    ASN::try_from(value).map_err(|_| AnalysisError::AsnOutOfRange(value))
}

pub(crate) fn parse_time(value: i64) -> Result<i64> {
    DateTime::<Utc>::from_timestamp(value, 0)
        .map(|_| value)
        .ok_or(AnalysisError::TimestampOutOfRange(value))
}

/// Renders an epoch timestamp for log lines.
pub fn format_time(value: i64) -> String {
    match DateTime::<Utc>::from_timestamp(value, 0) {
        Some(dt) => dt.to_rfc3339(),
        None => value.to_string(),
    }
}

impl TryFrom<AnnouncementRecord> for Announcement {
    type Error = AnalysisError;

    fn try_from(record: AnnouncementRecord) -> Result<Self> {
        let prefix = parse_prefix(&record.prefix)?;
        let origin = parse_asn(record.origin_asn)?;
        let as_path = record
            .as_path
            .into_iter()
            .map(parse_asn)
            .collect::<Result<Vec<_>>>()?;
        let time = parse_time(record.time)?;
        Ok(Announcement {
            prefix,
            origin,
            as_path,
            time,
            id: record.id,
        })
    }
}

impl TryFrom<RoaRecord> for ROA {
    type Error = AnalysisError;

    fn try_from(record: RoaRecord) -> Result<Self> {
        let prefix = parse_prefix(&record.prefix)?;
        let origin = parse_asn(record.origin_asn)?;
        let width = if prefix.is_ipv4() { 32 } else { 128 };
        if record.max_length < prefix.prefix() as i64 || record.max_length > width {
            return Err(AnalysisError::InvalidMaxLength {
                prefix: record.prefix,
                max_length: record.max_length,
            });
        }
        Ok(ROA::new(prefix, origin, Some(record.max_length as u8)))
    }
}

/// Skip counters for one record kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SkipCounter {
    pub accepted: u64,
    pub skipped: u64,
    pub samples: Vec<String>,
}

impl SkipCounter {
    fn record_skip(&mut self, error: &AnalysisError) {
        self.skipped += 1;
        if self.samples.len() < MAX_SKIP_SAMPLES {
            self.samples.push(error.to_string());
        }
    }
}

/// Ingestion context owned by the caller and threaded through every ingest
/// call of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub announcements: SkipCounter,
    pub roas: SkipCounter,
    pub hijack_events: SkipCounter,
}

impl IngestStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_skipped(&self) -> u64 {
        self.announcements.skipped + self.roas.skipped + self.hijack_events.skipped
    }
}

/// Converts records, skipping and counting the ones that fail. Only
/// record-level errors are swallowed.
pub(crate) fn ingest<R, T, I>(records: I, counter: &mut SkipCounter, kind: &str) -> Result<Vec<T>>
where
    I: IntoIterator<Item = R>,
    T: TryFrom<R, Error = AnalysisError>,
{
    let mut accepted = Vec::new();
    for record in records {
        match T::try_from(record) {
            Ok(value) => accepted.push(value),
            Err(e) if e.is_record_error() => {
                debug!(kind, error = %e, "skipping record");
                counter.record_skip(&e);
            }
            Err(e) => return Err(e),
        }
    }
    counter.accepted += accepted.len() as u64;
    if counter.skipped > 0 {
        warn!(kind, accepted = counter.accepted, skipped = counter.skipped, "skipped malformed records");
    } else {
        info!(kind, accepted = counter.accepted, "ingested records");
    }
    Ok(accepted)
}

pub fn ingest_announcements<I>(records: I, stats: &mut IngestStats) -> Result<Vec<Announcement>>
where
    I: IntoIterator<Item = AnnouncementRecord>,
{
    ingest(records, &mut stats.announcements, "announcement")
}

pub fn ingest_roas<I>(records: I, stats: &mut IngestStats) -> Result<Vec<ROA>>
where
    I: IntoIterator<Item = RoaRecord>,
{
    ingest(records, &mut stats.roas, "roa")
}

/// Validity per (prefix, origin).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidityTable {
    states: HashMap<PrefixOrigin, ROAValidity>,
}

impl ValidityTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_validated<'a, I>(validated: I) -> Self
    where
        I: IntoIterator<Item = &'a ValidatedAnnouncement>,
    {
        let mut table = ValidityTable::new();
        for ann in validated {
            table.insert(ann.prefix_origin(), ann.validity);
        }
        table
    }

    /// Loads tags cached by an earlier run. A foreign ordinal aborts the
    /// load since every consumer assumes exactly five states.
    pub fn from_tagged_json(json: &str) -> Result<Self> {
        let validated: Vec<ValidatedAnnouncement> = serde_json::from_str(json)?;
        Ok(Self::from_validated(&validated))
    }

    pub fn insert(&mut self, pair: PrefixOrigin, validity: ROAValidity) {
        self.states.insert(pair, validity);
    }

    pub fn get(&self, pair: &PrefixOrigin) -> Option<ROAValidity> {
        self.states.get(pair).copied()
    }

    pub fn contains(&self, pair: &PrefixOrigin) -> bool {
        self.states.contains_key(pair)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn extend(&mut self, other: ValidityTable) {
        self.states.extend(other.states);
    }

    pub fn counts_by_validity(&self) -> [u64; 5] {
        let mut counts = [0u64; 5];
        for validity in self.states.values() {
            counts[validity.ordinal() as usize] += 1;
        }
        counts
    }
}
