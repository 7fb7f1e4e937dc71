//! Error taxonomy for the meme pipeline.
//!
//! Every stage of the pipeline reports failures through [`PipelineError`].
//! Transport-level failures ([`TransportError`]) never escape the
//! [`RetryingClient`](crate::api::RetryingClient) directly; once its retry
//! budget is spent they surface wrapped in [`PipelineError::ServiceUnavailable`].
//!
//! Which of these errors end a run and which are absorbed is not decided here
//! but in [`crate::pipeline::policy`].

use crate::api::TransportError;
use crate::models::JobStatus;
use std::time::Duration;

/// All failures a pipeline run can observe.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The submitted URL is not an absolute `http`/`https` URL.
    #[error("invalid article URL: {url:?}")]
    InvalidInput { url: String },

    /// A configured service endpoint could not be turned into a URL.
    #[error("invalid service endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    /// Retries were exhausted for one logical request.
    #[error("{operation} unavailable after {attempts} attempts: {source}")]
    ServiceUnavailable {
        operation: &'static str,
        attempts: usize,
        #[source]
        source: TransportError,
    },

    /// The extraction service did not hand back a job id or results location.
    #[error("failed to start the extraction job")]
    SubmissionError,

    /// The extraction job reached FAILED or ABORTED.
    #[error("extraction job {job_id} ended with status {status}")]
    JobFailed { job_id: String, status: JobStatus },

    /// The extraction job did not finish within the poll timeout.
    #[error("extraction job {job_id} timed out after {elapsed:?}")]
    TimedOut { job_id: String, elapsed: Duration },

    /// The extraction job finished but its headline is unusable.
    #[error("could not extract a valid title from the URL ({reason})")]
    InvalidExtraction { reason: String },

    /// No usable keyword phrase could be derived from the URL path.
    #[error("could not extract keywords from URL {url}")]
    NoKeywords { url: String },

    /// The generative fallback did not produce a usable headline.
    #[error("fallback search could not find a relevant article")]
    FallbackExhausted,

    /// The image service returned no image payload.
    #[error("image generation failed: {reason}")]
    ImageGenerationFailed { reason: String },

    #[error("caption generation failed: {reason}")]
    CaptionGenerationFailed { reason: String },

    #[error("video script generation failed: {reason}")]
    ScriptGenerationFailed { reason: String },

    #[error("video synthesis failed: {reason}")]
    SynthesisFailed { reason: String },
}

impl PipelineError {
    /// Message shown to the user when this error ends a run.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::InvalidInput { .. } => "Please enter a valid URL.".to_string(),
            PipelineError::NoKeywords { .. }
            | PipelineError::FallbackExhausted
            | PipelineError::ServiceUnavailable { .. }
            | PipelineError::Endpoint(_) => {
                format!("Fallback search failed: {self}. Please try a different URL.")
            }
            PipelineError::CaptionGenerationFailed { .. } => {
                format!("Could not create a meme for this article: {self}.")
            }
            other => format!("Something went wrong: {other}."),
        }
    }
}
