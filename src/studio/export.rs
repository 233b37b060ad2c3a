use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::studio::types::GenerationResult;

pub fn export_file_name(prefix: &str, result: &GenerationResult) -> String {
    format!("{prefix}-{}.png", result.id)
}

/// Dumps the generated image bytes to `<dir>/<prefix>-<id>.png`.
pub async fn export_result(result: &GenerationResult, dir: &Path, prefix: &str) -> Result<PathBuf> {
    let bytes = result
        .generated_image
        .decode_bytes()
        .with_context(|| format!("Generated image for shot {} is not valid base64", result.id))?;

    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create export directory {}", dir.display()))?;

    let path = dir.join(export_file_name(prefix, result));
    tokio::fs::write(&path, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    info!("Exported shot {} to {} ({} bytes)", result.id, path.display(), bytes.len());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::llm::media::ImageRef;
    use crate::studio::types::AspectRatio;

    fn result_with(generated_image: ImageRef) -> GenerationResult {
        GenerationResult {
            id: "1700000000042".to_string(),
            original_image: ImageRef::from_bytes("image/png", b"garment"),
            generated_image,
            timestamp: Utc::now(),
            prompt: "Zarif Kadın in Klasik Ön Poz".to_string(),
            ratio: AspectRatio::Portrait3x4,
        }
    }

    #[test]
    fn file_name_is_derived_from_result_id() {
        let result = result_with(ImageRef::from_bytes("image/png", b"x"));
        assert_eq!(export_file_name("pera-fabrika", &result), "pera-fabrika-1700000000042.png");
    }

    #[tokio::test]
    async fn writes_decoded_generated_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested");
        let result = result_with(ImageRef::from_bytes("image/png", b"generated-photo"));

        let path = export_result(&result, &target, "pera-fabrika").await.unwrap();

        assert_eq!(path, target.join("pera-fabrika-1700000000042.png"));
        assert_eq!(std::fs::read(&path).unwrap(), b"generated-photo");
    }

    #[tokio::test]
    async fn invalid_payload_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let result = result_with(ImageRef::from_data_uri("data:image/png;base64,@@@"));

        let err = export_result(&result, dir.path(), "pera-fabrika")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not valid base64"));
    }
}
