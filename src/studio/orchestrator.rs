use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::config::DEFAULT_MAX_UPLOAD_BYTES;
use crate::llm::generator::{GenerationRequest, ImageGenerator};
use crate::llm::media::{self, DecodeError, ImageRef};
use crate::state::{AppState, SessionState};
use crate::studio::catalog::{resolve_model_label, resolve_pose_label};
use crate::studio::types::{describe_prompt, next_result_id, AspectRatio, GenerationResult};
use crate::utils::timing::{complete_intent_timer, start_intent_timer};

pub const GENERATION_FAILED_MESSAGE: &str =
    "İşlem sırasında bir hata oluştu. Lütfen tekrar deneyin.";

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    /// No override and nothing uploaded; state untouched.
    Skipped,
    /// Another generation is in flight; state untouched.
    Busy,
    Completed(GenerationResult),
    Failed(String),
}

/// Clears `is_generating` on every exit path, including a dropped future.
struct GeneratingGuard {
    session: Arc<Mutex<SessionState>>,
}

impl Drop for GeneratingGuard {
    fn drop(&mut self) {
        self.session.lock().is_generating = false;
    }
}

pub struct Studio<G> {
    generator: G,
    state: AppState,
    max_upload_bytes: usize,
}

impl<G: ImageGenerator> Studio<G> {
    pub fn new(generator: G) -> Self {
        Studio {
            generator,
            state: AppState::new(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_upload_limit(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.snapshot()
    }

    /// Replaces the uploaded garment. On failure the previous upload stays.
    pub async fn upload(&self, bytes: Vec<u8>) -> Result<(), DecodeError> {
        let image = media::encode(bytes).await?;
        self.set_uploaded_image(image);
        Ok(())
    }

    pub async fn upload_file(&self, path: &Path) -> Result<(), DecodeError> {
        let image = media::encode_file(path, self.max_upload_bytes).await?;
        self.set_uploaded_image(image);
        Ok(())
    }

    fn set_uploaded_image(&self, image: ImageRef) {
        info!("Garment uploaded: {}", image);
        self.state.session.lock().uploaded_image = Some(image);
    }

    pub fn select_model(&self, id: &str) {
        self.state.session.lock().selected_model_id = id.to_string();
    }

    pub fn select_pose(&self, id: &str) {
        self.state.session.lock().selected_pose_id = id.to_string();
    }

    pub async fn request_generation(
        &self,
        aspect_ratio: AspectRatio,
        override_source: Option<ImageRef>,
    ) -> GenerationOutcome {
        let (source_image, model_id, pose_id) = {
            let mut session = self.state.session.lock();
            let Some(source_image) = override_source.or_else(|| session.uploaded_image.clone())
            else {
                return GenerationOutcome::Skipped;
            };
            if session.is_generating {
                warn!("Generation requested while another one is in flight; ignoring");
                return GenerationOutcome::Busy;
            }
            session.is_generating = true;
            session.last_error = None;
            (
                source_image,
                session.selected_model_id.clone(),
                session.selected_pose_id.clone(),
            )
        };
        let _guard = GeneratingGuard {
            session: Arc::clone(&self.state.session),
        };

        let mut timer = start_intent_timer("generate", Some(aspect_ratio.as_str()));
        let persona_label = resolve_model_label(&model_id);
        let pose_label = resolve_pose_label(&pose_id);
        let request = GenerationRequest {
            source_image: source_image.clone(),
            persona_label: persona_label.to_string(),
            pose_label: pose_label.to_string(),
            aspect_ratio,
        };

        match self.generator.generate(request).await {
            Ok(generated_image) => {
                let mut session = self.state.session.lock();
                let id = next_result_id(
                    session.latest_result().map(|result| result.id.as_str()),
                    Utc::now().timestamp_millis(),
                );
                let result = GenerationResult {
                    id,
                    original_image: source_image,
                    generated_image,
                    timestamp: Utc::now(),
                    prompt: describe_prompt(persona_label, pose_label),
                    ratio: aspect_ratio,
                };
                session.results.insert(0, result.clone());
                drop(session);

                info!(
                    "Generated shot {} ({}, {})",
                    result.id, result.prompt, result.ratio
                );
                complete_intent_timer(&mut timer, "success", Some(result.id.clone()));
                GenerationOutcome::Completed(result)
            }
            Err(err) => {
                error!("Generation failed ({}): {}", aspect_ratio, err);
                self.state.session.lock().last_error = Some(GENERATION_FAILED_MESSAGE.to_string());
                complete_intent_timer(&mut timer, "error", Some(err.to_string()));
                GenerationOutcome::Failed(GENERATION_FAILED_MESSAGE.to_string())
            }
        }
    }

    /// Re-runs generation from the result's generated image so the subject
    /// stays consistent across formats.
    pub async fn request_resize(
        &self,
        result: &GenerationResult,
        aspect_ratio: AspectRatio,
    ) -> GenerationOutcome {
        self.request_generation(aspect_ratio, Some(result.generated_image.clone()))
            .await
    }
}
