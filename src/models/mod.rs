mod generation;
mod stats;

pub use generation::{GeneratedAssets, GenerationRequest, GenerationResult};
pub use stats::Statistics;
