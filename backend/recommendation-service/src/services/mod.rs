pub mod aggregator;
pub mod content;
pub mod hybrid;
pub mod pipeline;
pub mod trainer;

pub use aggregator::{AggregationReport, AggregatorConfig, InteractionAggregator};
pub use content::{ContentScorer, ContentWeights};
pub use hybrid::{HybridConfig, HybridRanker, ScoringReport};
pub use pipeline::{CycleLease, CycleReport, Pipeline};
pub use trainer::{CfTrainer, TrainOutcome, TrainerConfig};
