//! Runtime configuration loaded from an optional YAML file.
//!
//! Every section falls back to defaults, so an empty or partial file is valid.
//! Durations are stored as milliseconds to keep the file format plain.
//!
//! ```yaml
//! retry:
//!   max_retries: 5
//! extraction:
//!   timeout_ms: 90000
//! fallback:
//!   min_keyword_chars: 5
//! ```
//!
//! Credentials are deliberately not part of this file; see [`Credentials`].

use crate::api::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub retry: RetrySettings,
    pub extraction: ExtractionSettings,
    pub generation: GenerationSettings,
    pub fallback: FallbackSettings,
    pub video: VideoSettings,
}

/// Retry budget shared by every outbound request.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Retries after the first attempt.
    pub max_retries: usize,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Upper bound of the random jitter added to each delay. Zero disables it.
    pub jitter_ms: u64,
    /// Per-request timeout of the HTTP client.
    pub request_timeout_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            jitter_ms: 0,
            request_timeout_secs: 60,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            max_jitter: Duration::from_millis(self.jitter_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Extraction service endpoint and polling behaviour.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExtractionSettings {
    pub base_url: String,
    /// Actor that runs the page function against the submitted URL.
    pub actor: String,
    pub poll_interval_ms: u64,
    /// Wall-clock budget for a job, measured from submission.
    pub timeout_ms: u64,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.apify.com".to_string(),
            actor: "apify~web-scraper".to_string(),
            poll_interval_ms: 2000,
            timeout_ms: 60_000,
        }
    }
}

impl ExtractionSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Generative text and image service settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub base_url: String,
    pub text_model: String,
    pub image_model: String,
    pub sample_count: u32,
    /// Image shown when generation fails; the label is appended as `?text=`.
    pub placeholder_image_url: String,
    pub placeholder_label: String,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            text_model: "gemini-2.5-flash-preview-05-20".to_string(),
            image_model: "imagen-3.0-generate-002".to_string(),
            sample_count: 1,
            placeholder_image_url: "https://via.placeholder.com/400x300/2563eb/ffffff"
                .to_string(),
            placeholder_label: "Meme Image".to_string(),
        }
    }
}

impl GenerationSettings {
    pub fn placeholder_image(&self) -> String {
        format!(
            "{}?text={}",
            self.placeholder_image_url,
            urlencoding::encode(&self.placeholder_label)
        )
    }
}

/// Quality bounds for the fallback headline path.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FallbackSettings {
    /// Shortest keyword phrase worth sending to the text service.
    pub min_keyword_chars: usize,
    /// Shortest generated headline accepted.
    pub min_headline_chars: usize,
}

impl Default for FallbackSettings {
    fn default() -> Self {
        Self {
            min_keyword_chars: 3,
            min_headline_chars: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VideoSettings {
    /// Processing time the simulated synthesis stage waits before completing.
    pub synthesis_latency_ms: u64,
    pub presenter: String,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            synthesis_latency_ms: 3000,
            presenter: "ai_moderator_v2".to_string(),
        }
    }
}

impl VideoSettings {
    pub fn synthesis_latency(&self) -> Duration {
        Duration::from_millis(self.synthesis_latency_ms)
    }
}

impl AppConfig {
    /// Load configuration from `path`, or return defaults when no path is given.
    #[instrument(level = "info", skip_all)]
    pub async fn load(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
        let Some(path) = path else {
            info!("No config file given; using defaults");
            return Ok(AppConfig::default());
        };
        let shown = path.display().to_string();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: shown.clone(),
                source,
            })?;
        let config = AppConfig::from_yaml(&raw).map_err(|source| ConfigError::Yaml {
            path: shown.clone(),
            source,
        })?;
        info!(path = %shown, "Loaded configuration");
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<AppConfig, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(AppConfig::default());
        }
        serde_yaml::from_str(raw)
    }
}

/// API credentials for the external services.
///
/// These come from the command line or the environment only, and are never
/// printed: the `Debug` impl redacts them.
#[derive(Clone, Default)]
pub struct Credentials {
    pub extraction_token: String,
    pub generation_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |s: &str| if s.is_empty() { "<unset>" } else { "<redacted>" };
        f.debug_struct("Credentials")
            .field("extraction_token", &redact(&self.extraction_token))
            .field("generation_key", &redact(&self.generation_key))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.policy().initial_delay, Duration::from_secs(1));
        assert_eq!(config.extraction.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.extraction.timeout(), Duration::from_secs(60));
        assert_eq!(config.fallback.min_headline_chars, 10);
        assert_eq!(config.video.synthesis_latency(), Duration::from_secs(3));
    }

    #[test]
    fn test_partial_yaml_keeps_other_defaults() {
        let yaml = r#"
retry:
  max_retries: 5
fallback:
  min_keyword_chars: 6
generation:
  text_model: gemini-test
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.initial_delay_ms, 1000);
        assert_eq!(config.fallback.min_keyword_chars, 6);
        assert_eq!(config.fallback.min_headline_chars, 10);
        assert_eq!(config.generation.text_model, "gemini-test");
        assert_eq!(config.generation.image_model, "imagen-3.0-generate-002");
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config = AppConfig::from_yaml("").unwrap();
        assert_eq!(config.extraction.actor, "apify~web-scraper");
    }

    #[test]
    fn test_placeholder_image_is_labeled() {
        let settings = GenerationSettings::default();
        assert_eq!(
            settings.placeholder_image(),
            "https://via.placeholder.com/400x300/2563eb/ffffff?text=Meme%20Image"
        );
    }

    #[test]
    fn test_credentials_debug_redacts() {
        let creds = Credentials {
            extraction_token: "apify_secret".to_string(),
            generation_key: String::new(),
        };
        let shown = format!("{creds:?}");
        assert!(!shown.contains("apify_secret"));
        assert!(shown.contains("<redacted>"));
        assert!(shown.contains("<unset>"));
    }

    #[tokio::test]
    async fn test_load_missing_file_errors() {
        let err = AppConfig::load(Some(Path::new("/nonexistent/msj.yaml")))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[tokio::test]
    async fn test_load_reads_yaml_file() {
        let path = std::env::temp_dir().join(format!("msj-config-{}.yaml", std::process::id()));
        tokio::fs::write(&path, "retry:\n  max_retries: 7\n").await.unwrap();

        let config = AppConfig::load(Some(&path)).await.unwrap();
        tokio::fs::remove_file(&path).await.unwrap();

        assert_eq!(config.retry.max_retries, 7);
        assert_eq!(config.extraction.timeout(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_load_invalid_yaml_names_the_file() {
        let path = std::env::temp_dir().join(format!("msj-bad-{}.yaml", std::process::id()));
        tokio::fs::write(&path, "retry: [unclosed").await.unwrap();

        let err = AppConfig::load(Some(&path)).await.unwrap_err();
        tokio::fs::remove_file(&path).await.unwrap();

        match err {
            ConfigError::Yaml { path: shown, .. } => assert!(shown.ends_with(".yaml")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
