use std::sync::Arc;

use parking_lot::Mutex;

use crate::llm::media::ImageRef;
use crate::studio::catalog::{default_model_id, default_pose_id};
use crate::studio::types::GenerationResult;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub is_generating: bool,
    pub selected_model_id: String,
    pub selected_pose_id: String,
    pub uploaded_image: Option<ImageRef>,
    /// Newest first.
    pub results: Vec<GenerationResult>,
    pub last_error: Option<String>,
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState {
            is_generating: false,
            selected_model_id: default_model_id().to_string(),
            selected_pose_id: default_pose_id().to_string(),
            uploaded_image: None,
            results: Vec::new(),
            last_error: None,
        }
    }
}

impl SessionState {
    pub fn latest_result(&self) -> Option<&GenerationResult> {
        self.results.first()
    }

    pub fn archived_results(&self) -> &[GenerationResult] {
        self.results.get(1..).unwrap_or(&[])
    }
}

/// Session state shared between the studio (single writer) and readers.
#[derive(Clone, Default)]
pub struct AppState {
    pub session: Arc<Mutex<SessionState>>,
}

impl AppState {
    pub fn new() -> Self {
        AppState::default()
    }

    pub fn snapshot(&self) -> SessionState {
        self.session.lock().clone()
    }
}
