//! Data models for pipeline runs and the external service payloads.
//!
//! This module defines the core data structures used throughout the application:
//! - [`ExtractionJob`]: A submitted content-extraction job and its last known status
//! - [`ArticleRecord`]: The headline a run settled on, extracted or synthesized
//! - [`MemeArtifact`]: The generated image + caption pair
//! - [`VideoState`] and [`PipelineState`]: What the presentation layer observes
//! - Wire types: [`RunEnvelope`], [`ExtractedItem`], [`GenerateContentResponse`],
//!   [`PredictResponse`]
//!
//! The wire types use camelCase field names to match the JSON returned by the
//! services, hence the `#[allow(non_snake_case)]` attributes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of an extraction job as reported by the extraction service.
///
/// The service reports more states than the pipeline cares about; anything
/// that is not terminal (`READY`, `RUNNING`, `ABORTING`, ...) is [`JobStatus::Pending`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Succeeded,
    #[serde(alias = "TIMED-OUT")]
    Failed,
    Aborted,
    #[serde(other)]
    Pending,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Pending)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Succeeded => "SUCCEEDED",
            JobStatus::Failed => "FAILED",
            JobStatus::Aborted => "ABORTED",
        };
        f.write_str(s)
    }
}

/// A content-extraction job submitted for one article URL.
///
/// Created on submission and updated only from poll responses. The job is
/// dropped as soon as it reaches a terminal status.
#[derive(Debug, Clone)]
pub struct ExtractionJob {
    /// Identifier assigned by the extraction service.
    pub job_id: String,
    /// Where the job's result set can be fetched once it succeeds.
    pub results_location: String,
    /// Last status observed for this job.
    pub status: JobStatus,
    /// When the job was accepted by the service.
    pub submitted_at: DateTime<Utc>,
}

/// How a run obtained its headline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Extracted,
    Fallback,
}

/// The headline a run will build its meme from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleRecord {
    /// The URL the user submitted.
    pub source_url: String,
    /// The headline handed to the generators.
    pub headline: String,
    /// What the presentation layer shows as the article title.
    pub display_title: String,
    pub provenance: Provenance,
}

impl ArticleRecord {
    pub fn used_fallback(&self) -> bool {
        self.provenance == Provenance::Fallback
    }
}

/// The primary output of a pipeline run.
///
/// `image_url` is either a `data:` URL holding the generated image or a
/// placeholder reference when image generation degraded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemeArtifact {
    pub title: String,
    pub source_url: String,
    pub image_url: String,
    pub caption_text: String,
    /// Set when the headline came from the fallback resolver.
    pub used_fallback: bool,
    pub created_at: DateTime<Utc>,
}

/// Progress of the narrated video for the current run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoState {
    pub script: String,
    pub generating: bool,
    pub generated: bool,
}

/// Which screen the presentation layer should show.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    #[default]
    Input,
    Working,
    Result,
}

/// Overall progress and error state of the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineState {
    pub step: Step,
    /// Empty when no loading indicator should be shown.
    pub loading_message: String,
    pub error_message: String,
}

impl PipelineState {
    pub fn is_loading(&self) -> bool {
        !self.loading_message.is_empty()
    }
}

/// Envelope the extraction service wraps job responses in.
#[derive(Debug, Deserialize)]
pub struct RunEnvelope {
    pub data: RunData,
}

/// Job fields returned on submission and on every status poll.
#[allow(non_snake_case)]
#[derive(Debug, Default, Deserialize)]
pub struct RunData {
    pub id: Option<String>,
    pub defaultDatasetId: Option<String>,
    pub status: Option<JobStatus>,
}

/// One record of an extraction job's result set.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct ExtractedItem {
    pub url: Option<String>,
    pub headline: Option<String>,
    pub title: Option<String>,
}

/// Response of the generative text service.
#[derive(Debug, Default, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Candidate {
    pub content: Option<Content>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Part {
    pub text: Option<String>,
}

impl GenerateContentResponse {
    /// Text of the first part of the first candidate, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .first()?
            .text
            .as_deref()
    }
}

/// Response of the generative image service.
#[derive(Debug, Default, Deserialize)]
pub struct PredictResponse {
    #[serde(default)]
    pub predictions: Vec<Prediction>,
}

#[allow(non_snake_case)]
#[derive(Debug, Default, Deserialize)]
pub struct Prediction {
    pub bytesBase64Encoded: Option<String>,
    pub mimeType: Option<String>,
}

impl PredictResponse {
    /// The first prediction rendered as a `data:` URL.
    pub fn first_data_url(&self) -> Option<String> {
        let prediction = self.predictions.first()?;
        let data = prediction
            .bytesBase64Encoded
            .as_deref()
            .filter(|d| !d.is_empty())?;
        let mime = prediction.mimeType.as_deref().unwrap_or("image/png");
        Some(format!("data:{mime};base64,{data}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_known_values() {
        let s: JobStatus = serde_json::from_str("\"SUCCEEDED\"").unwrap();
        assert_eq!(s, JobStatus::Succeeded);
        let s: JobStatus = serde_json::from_str("\"ABORTED\"").unwrap();
        assert_eq!(s, JobStatus::Aborted);
        let s: JobStatus = serde_json::from_str("\"TIMED-OUT\"").unwrap();
        assert_eq!(s, JobStatus::Failed);
    }

    #[test]
    fn test_job_status_non_terminal_values_are_pending() {
        for raw in ["\"READY\"", "\"RUNNING\"", "\"ABORTING\""] {
            let s: JobStatus = serde_json::from_str(raw).unwrap();
            assert_eq!(s, JobStatus::Pending);
            assert!(!s.is_terminal());
        }
    }

    #[test]
    fn test_run_envelope_deserialization() {
        let json = r#"{
            "data": {
                "id": "run-1",
                "defaultDatasetId": "ds-9",
                "status": "RUNNING",
                "actId": "ignored"
            }
        }"#;
        let envelope: RunEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.data.id.as_deref(), Some("run-1"));
        assert_eq!(envelope.data.defaultDatasetId.as_deref(), Some("ds-9"));
        assert_eq!(envelope.data.status, Some(JobStatus::Pending));
    }

    #[test]
    fn test_first_text() {
        let json = r#"{"candidates":[{"content":{"parts":[{"text":"hello"}]}}]}"#;
        let resp: GenerateContentResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.first_text(), Some("hello"));

        let empty: GenerateContentResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.first_text(), None);
    }

    #[test]
    fn test_first_data_url_defaults_to_png() {
        let json = r#"{"predictions":[{"bytesBase64Encoded":"QUJD"}]}"#;
        let resp: PredictResponse = serde_json::from_str(json).unwrap();
        assert_eq!(
            resp.first_data_url().as_deref(),
            Some("data:image/png;base64,QUJD")
        );
    }

    #[test]
    fn test_first_data_url_missing_payload() {
        let json = r#"{"predictions":[{"mimeType":"image/jpeg"}]}"#;
        let resp: PredictResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.first_data_url(), None);
    }

    #[test]
    fn test_meme_artifact_serialization() {
        let meme = MemeArtifact {
            title: "Apple event".to_string(),
            source_url: "https://example.com/a".to_string(),
            image_url: "data:image/png;base64,QUJD".to_string(),
            caption_text: "One more thing.".to_string(),
            used_fallback: true,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&meme).unwrap();
        assert!(json.contains("\"used_fallback\":true"));
        assert!(json.contains("One more thing."));
    }

    #[test]
    fn test_pipeline_state_defaults() {
        let state = PipelineState::default();
        assert_eq!(state.step, Step::Input);
        assert!(!state.is_loading());
        assert_eq!(VideoState::default().script, "");
    }
}
