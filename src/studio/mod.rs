pub mod catalog;
pub mod export;
pub mod orchestrator;
pub mod types;

pub use orchestrator::{GenerationOutcome, Studio};
pub use types::{AspectRatio, GenerationResult};
