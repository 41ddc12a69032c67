// Re-export all public modules
pub mod error;
pub mod shared;
pub mod prefix_trie;
pub mod route_validator;
pub mod announcement;
pub mod hijack;
pub mod aggregator;
pub mod simulation_framework;

// Re-export commonly used types at the crate root
pub use aggregator::{OutcomeBucket, OutcomeRow, OutcomeTable, PolicyAssignment, PolicyOutcomeAggregator, SelectedOrigins};
pub use announcement::{Announcement, IngestStats, ValidatedAnnouncement, ValidityTable};
pub use error::{AnalysisError, Result};
pub use hijack::{is_hijack_relation, HijackEvent, HijackRelation, Provenance, RelationDetector, RelationTable};
pub use prefix_trie::PrefixTrie;
pub use route_validator::{RouteValidator, WorstValidityMode, ROA};
pub use shared::{Policy, Prefix, PrefixOrigin, ROAValidity, ASN};
pub use simulation_framework::{AnalysisConfig, AnalysisOutput, Simulation};
