use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use once_cell::sync::Lazy;
use tracing::warn;
use url::Url;

pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
pub const DEFAULT_EXPORT_PREFIX: &str = "pera-fabrika";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub gemini_api_key: String,
    pub gemini_image_model: String,
    pub gemini_api_base: Url,
    pub gemini_request_timeout_seconds: u64,
    pub log_level: String,
    pub log_dir: PathBuf,
    pub export_dir: PathBuf,
    pub export_prefix: String,
    pub max_upload_bytes: usize,
}

pub static CONFIG: Lazy<Config> = Lazy::new(|| Config::load().expect("Failed to load configuration"));

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(default)
}

fn resolve_api_key() -> String {
    let primary = env_string("GEMINI_API_KEY", "");
    if !primary.trim().is_empty() {
        return primary.trim().to_string();
    }
    env_string("API_KEY", "").trim().to_string()
}

pub(crate) fn parse_api_base(value: &str) -> Url {
    let trimmed = value.trim();
    let fallback = || Url::parse(DEFAULT_GEMINI_API_BASE).expect("default Gemini base URL is valid");
    if trimmed.is_empty() {
        return fallback();
    }

    match Url::parse(trimmed) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => url,
        Ok(url) => {
            warn!(
                "Unsupported GEMINI_API_BASE scheme '{}'; using {}",
                url.scheme(),
                DEFAULT_GEMINI_API_BASE
            );
            fallback()
        }
        Err(err) => {
            warn!(
                "Invalid GEMINI_API_BASE value '{}': {}; using {}",
                trimmed, err, DEFAULT_GEMINI_API_BASE
            );
            fallback()
        }
    }
}

fn normalize_export_prefix(value: String) -> String {
    let trimmed = value.trim().trim_matches('-');
    if trimmed.is_empty() {
        return DEFAULT_EXPORT_PREFIX.to_string();
    }
    trimmed.to_string()
}

impl Config {
    pub fn load() -> Result<Self> {
        let gemini_api_key = resolve_api_key();
        if gemini_api_key.is_empty() {
            warn!("GEMINI_API_KEY is not set; generation requests will be rejected upstream.");
        }

        Ok(Config {
            gemini_api_key,
            gemini_image_model: env_string("GEMINI_IMAGE_MODEL", DEFAULT_GEMINI_IMAGE_MODEL)
                .trim()
                .to_string(),
            gemini_api_base: parse_api_base(&env_string("GEMINI_API_BASE", "")),
            gemini_request_timeout_seconds: env_u64("GEMINI_REQUEST_TIMEOUT_SECONDS", 90).max(1),
            log_level: env_string("LOG_LEVEL", "info").to_lowercase(),
            log_dir: PathBuf::from(env_string("LOG_DIR", "logs")),
            export_dir: PathBuf::from(env_string("EXPORT_DIR", "exports")),
            export_prefix: normalize_export_prefix(env_string("EXPORT_PREFIX", DEFAULT_EXPORT_PREFIX)),
            max_upload_bytes: env_usize("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
        })
    }

    pub fn gemini_request_timeout(&self) -> Duration {
        Duration::from_secs(self.gemini_request_timeout_seconds)
    }
}
