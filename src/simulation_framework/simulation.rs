use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::aggregator::{OutcomeTable, PolicyAssignment, PolicyOutcomeAggregator, SelectedOrigins};
use crate::announcement::{
    format_time, ingest_announcements, ingest_roas, Announcement, AnnouncementRecord, IngestStats,
    RoaRecord, ValidatedAnnouncement, ValidityTable,
};
use crate::error::{AnalysisError, Result};
use crate::hijack::{
    ingest_hijack_events, EventResolution, HijackEvent, HijackEventRecord, HijackRelation, RelationDetector,
    RelationTable,
};
use crate::prefix_trie::PrefixTrie;
use crate::route_validator::{RouteValidator, ROA};

use super::data_tracker::{DataTracker, SweepSummary};
use super::partition::{partition_by_prefix, Partition};
use super::scenario::{AdoptionScenario, RouteSelector};
use super::scenario_config::{AnalysisConfig, ScenarioConfig};

/// Everything derived from one set of inputs. Reused across scenarios.
#[derive(Debug, Clone)]
pub struct AnalysisOutput {
    pub validated: Vec<ValidatedAnnouncement>,
    pub validity: ValidityTable,
    pub relations: RelationTable,
    pub events: EventResolution,
    pub ingest: IngestStats,
    pub partitions: usize,
}

/// Batch analysis over in-memory inputs, run on a dedicated worker pool.
pub struct Simulation {
    pub config: AnalysisConfig,
    pool: rayon::ThreadPool,
}

impl Simulation {
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.num_workers.max(1))
            .thread_name(|i| format!("rov-worker-{}", i))
            .build()?;
        Ok(Simulation { config, pool })
    }

    fn progress_bar(&self, len: usize, what: &str) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        let template = format!("[{{elapsed_precise}}] {{bar:40}} {{pos}}/{{len}} {}", what);
        if let Ok(style) = ProgressStyle::default_bar().template(&template) {
            pb.set_style(style.progress_chars("##-"));
        }
        pb
    }

    /// Ingests raw records, skipping malformed ones, then runs the analysis.
    pub fn run_records(
        &self,
        announcements: Vec<AnnouncementRecord>,
        roas: Vec<RoaRecord>,
        events: Vec<HijackEventRecord>,
    ) -> Result<AnalysisOutput> {
        let mut stats = IngestStats::new();
        let announcements = ingest_announcements(announcements, &mut stats)?;
        let roas = ingest_roas(roas, &mut stats)?;
        let events = ingest_hijack_events(events, &mut stats)?;
        let mut output = self.run(announcements, roas, &events)?;
        output.ingest = stats;
        Ok(output)
    }

    pub fn run(&self, announcements: Vec<Announcement>, roas: Vec<ROA>, events: &[HijackEvent]) -> Result<AnalysisOutput> {
        let start_time = Instant::now();
        if let Some(cutoff) = self.config.t_cutoff {
            info!(cutoff = %format_time(cutoff), "running analysis");
        } else {
            info!("running analysis without cutoff");
        }

        let roa_index: PrefixTrie<ROA> = roas.into_iter().map(|roa| (roa.prefix, roa)).collect();
        info!(roas = roa_index.len(), "built ROA index");
        let validator = RouteValidator::with_options(
            roa_index.freeze(),
            self.config.worst_validity_mode,
            self.config.validity_cache_capacity,
        );

        let partitions = partition_by_prefix(announcements, self.config.partition_prefix_len, |ann| ann.prefix);
        let partition_count = partitions.len();
        info!(partitions = partition_count, "partitioned announcements");

        let pb = self.progress_bar(partition_count, "partitions validated");
        // Partitions move into the workers; each worker keeps its own cache.
        // collect() is the barrier before any later stage.
        let validated_parts: Vec<Vec<ValidatedAnnouncement>> = self.pool.install(|| {
            partitions
                .into_par_iter()
                .map_init(
                    || validator.clone(),
                    |validator, partition| {
                        let part = validate_partition(validator, partition);
                        pb.inc(1);
                        part
                    },
                )
                .collect()
        });
        pb.finish_and_clear();
        debug!("raw announcement partitions consumed");

        let validated: Vec<ValidatedAnnouncement> = validated_parts.into_iter().flatten().collect();

        let (mut validity, detector) = self.pool.install(|| {
            rayon::join(
                || ValidityTable::from_validated(&validated),
                || RelationDetector::build(validated.iter().map(|v| &v.announcement)),
            )
        });

        let relations = self.detect_relations(&detector);
        let (curated, resolution) = detector.resolve_events(events, self.config.t_cutoff);
        let mut all_relations = relations;
        all_relations.merge(curated);

        // Catalog attackers that never showed up in the corpus still need a tag.
        for pair in all_relations.attacker_pairs() {
            if !validity.contains(&pair) {
                validity.insert(pair, validator.validate(&pair));
            }
        }

        info!(
            announcements = validated.len(),
            pairs = validity.len(),
            relations = all_relations.len(),
            elapsed_secs = start_time.elapsed().as_secs_f64(),
            "analysis complete"
        );

        Ok(AnalysisOutput {
            validated,
            validity,
            relations: all_relations,
            events: resolution,
            ingest: IngestStats::new(),
            partitions: partition_count,
        })
    }

    fn detect_relations(&self, detector: &RelationDetector) -> RelationTable {
        let victims = partition_by_prefix(detector.pairs(), self.config.partition_prefix_len, |pair| pair.prefix);
        let pb = self.progress_bar(victims.len(), "partitions searched");
        let t_cutoff = self.config.t_cutoff;

        let table = self.pool.install(|| {
            victims
                .par_iter()
                .map(|partition| {
                    let part = detector.detect_overlaps(&partition.items, t_cutoff);
                    pb.inc(1);
                    part
                })
                .reduce(RelationTable::new, |mut acc, part| {
                    acc.merge(part);
                    acc
                })
        });
        pb.finish_and_clear();
        info!(overlaps = table.pair_count(), "detected overlap relations");
        table
    }

    /// Outcome counts for one scenario. Buckets are built from scratch and a
    /// failing partition fails the whole evaluation.
    pub fn evaluate(
        &self,
        output: &AnalysisOutput,
        selected: &SelectedOrigins,
        assignment: &PolicyAssignment,
    ) -> Result<OutcomeTable> {
        let aggregator = PolicyOutcomeAggregator::new(&output.validity, selected, assignment);
        let relations: Vec<HijackRelation> = output.relations.iter().collect();
        let partitions = partition_by_prefix(relations, self.config.partition_prefix_len, |relation| {
            relation.attacker.prefix
        });

        let table = self.pool.install(|| {
            partitions
                .par_iter()
                .map(|partition| evaluate_partition(&aggregator, partition))
                .try_reduce(OutcomeTable::new, |mut acc, part| {
                    acc.merge(part);
                    Ok(acc)
                })
        })?;

        debug!(
            buckets = table.len(),
            adopters = ?assignment.adopter_count(),
            "evaluated scenario"
        );
        Ok(table)
    }

    /// Rolls `config.policy` out to each adoption percentage, asking the
    /// selector for fresh route selections per trial.
    pub fn run_sweep<S: RouteSelector>(
        &self,
        output: &AnalysisOutput,
        config: &ScenarioConfig,
        selector: &S,
    ) -> Result<SweepSummary> {
        info!(label = %config.label, policy = %config.policy, "running adoption sweep");
        let mut summary = SweepSummary::new(config.label.clone(), config.policy);
        let mut rng = StdRng::seed_from_u64(config.seed);
        let vantage = selector.vantage_asns();

        let pb = self.progress_bar(
            config.percent_ases_randomly_adopting.len() * config.num_trials,
            "trials",
        );
        for &percent in &config.percent_ases_randomly_adopting {
            let mut tracker = DataTracker::new(config.label.clone(), percent);
            for _ in 0..config.num_trials {
                let scenario = AdoptionScenario::random(&vantage, percent, config.policy, &mut rng);
                let selected = selector.select(&scenario)?;
                let outcomes = self.evaluate(output, &selected, &scenario.assignment())?;
                tracker.add_trial(&outcomes);
                pb.inc(1);
            }
            info!(
                percent,
                hijack_rate = tracker.hijack_rate(config.policy),
                block_rate = tracker.block_rate(config.policy),
                "adoption level done"
            );
            summary.add_data_point(&tracker);
        }
        pb.finish_and_clear();

        Ok(summary)
    }
}

fn validate_partition(validator: &RouteValidator, partition: Partition<Announcement>) -> Vec<ValidatedAnnouncement> {
    partition
        .items
        .into_iter()
        .map(|announcement| ValidatedAnnouncement {
            validity: validator.get_validity(&announcement.prefix, announcement.origin),
            announcement,
        })
        .collect()
}

fn evaluate_partition(
    aggregator: &PolicyOutcomeAggregator<'_>,
    partition: &Partition<HijackRelation>,
) -> Result<OutcomeTable> {
    aggregator
        .evaluate_all(partition.items.iter())
        .map_err(|e| AnalysisError::PartitionFailed {
            partition: partition.key.to_string(),
            source: Box::new(e),
        })
}
