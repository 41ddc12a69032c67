pub mod data_tracker;
pub mod partition;
pub mod scenario;
pub mod scenario_config;
pub mod simulation;

pub use data_tracker::{DataTracker, SweepSummary};
pub use partition::{partition_by_prefix, partition_key, Partition};
pub use scenario::{AdoptionScenario, RouteSelector};
pub use scenario_config::{AnalysisConfig, ScenarioConfig};
pub use simulation::{AnalysisOutput, Simulation};
