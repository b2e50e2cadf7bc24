// Attribution — lift reports and probabilistic fan-credit assignment.

pub mod engine;
pub mod fans;

pub use engine::{AttributionEngine, AttributionReport, EngineConfig};
pub use fans::FanAttributionStats;
