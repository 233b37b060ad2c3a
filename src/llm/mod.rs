pub mod gemini;
pub mod generator;
pub mod media;

pub use gemini::GeminiClient;
pub use generator::ImageGenerator;
