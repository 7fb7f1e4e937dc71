//! Video synthesis stage.
//!
//! A live renderer would take the script, the headline and the meme image and
//! return a finished video. No such integration exists yet, so
//! [`SimulatedSynthesizer`] stands in for it: it logs the payload a real call
//! would carry and waits for the renderer's typical processing time.

use crate::errors::PipelineError;
use crate::utils::truncate_for_log;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, instrument};

/// Everything the renderer needs for one video.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisRequest<'a> {
    pub script: &'a str,
    pub headline: &'a str,
    /// The meme image, as a `data:` URL or a placeholder link.
    pub image_ref: &'a str,
}

/// Renders a narrated video from a script.
pub trait VideoSynthesizer: Send + Sync {
    fn render(
        &self,
        request: &SynthesisRequest<'_>,
    ) -> impl Future<Output = Result<(), PipelineError>> + Send;
}

/// Stand-in renderer with a fixed processing latency.
#[derive(Debug, Clone)]
pub struct SimulatedSynthesizer {
    latency: Duration,
    presenter: String,
}

impl SimulatedSynthesizer {
    pub fn new(latency: Duration, presenter: impl Into<String>) -> Self {
        Self {
            latency,
            presenter: presenter.into(),
        }
    }
}

impl VideoSynthesizer for SimulatedSynthesizer {
    #[instrument(level = "info", skip_all, fields(presenter = %self.presenter))]
    async fn render(&self, request: &SynthesisRequest<'_>) -> Result<(), PipelineError> {
        info!(
            headline = %request.headline,
            script_chars = request.script.chars().count(),
            meme_image = %truncate_for_log(request.image_ref, 64),
            latency_ms = self.latency.as_millis(),
            "Simulating video synthesis call"
        );
        sleep(self.latency).await;
        info!("Simulated video synthesis finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_simulated_synthesizer_waits_for_latency() {
        let synthesizer = SimulatedSynthesizer::new(Duration::from_secs(3), "ai_moderator_v2");
        let request = SynthesisRequest {
            script: "Hello and welcome.",
            headline: "Markets rally",
            image_ref: "data:image/png;base64,QUJD",
        };

        let t0 = tokio::time::Instant::now();
        synthesizer.render(&request).await.unwrap();
        assert!(t0.elapsed() >= Duration::from_secs(3));
    }
}
