use std::future::Future;

use thiserror::Error;

use crate::llm::media::ImageRef;
use crate::studio::types::AspectRatio;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Görsel oluşturulamadı: no image returned by {model}")]
    EmptyResult { model: String },
    #[error("Image generation failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub source_image: ImageRef,
    pub persona_label: String,
    pub pose_label: String,
    pub aspect_ratio: AspectRatio,
}

/// Seam between the studio and whatever produces model photos.
pub trait ImageGenerator: Send + Sync {
    fn generate(
        &self,
        request: GenerationRequest,
    ) -> impl Future<Output = Result<ImageRef, GenerationError>> + Send;
}
