//! Meme generation: one image and one caption per headline.
//!
//! The two calls are independent and run concurrently. Their failure
//! handling is not: see [`crate::pipeline::policy`].

use crate::api::Transport;
use crate::errors::PipelineError;
use crate::models::{ArticleRecord, MemeArtifact};
use crate::pipeline::policy::{OnFailure, Stage, on_failure};
use crate::prompts;
use crate::services::generative::GenerativeClient;
use chrono::Utc;
use tracing::{error, info, instrument, warn};

pub struct MemeGenerator<T> {
    generative: GenerativeClient<T>,
}

impl<T> MemeGenerator<T>
where
    T: Transport,
{
    pub fn new(generative: GenerativeClient<T>) -> Self {
        Self { generative }
    }

    /// Generate the meme for `article`.
    ///
    /// # Errors
    ///
    /// [`PipelineError::CaptionGenerationFailed`] when no caption could be
    /// produced. Image failures never surface here.
    #[instrument(level = "info", skip_all, fields(headline = %article.headline))]
    pub async fn generate(&self, article: &ArticleRecord) -> Result<MemeArtifact, PipelineError> {
        let (image, caption) = futures::join!(
            self.image(&article.headline),
            self.caption(&article.headline)
        );

        let image_url = match image {
            Ok(url) => url,
            Err(e) => self.apply_policy(Stage::Image, e)?,
        };
        let caption_text = match caption {
            Ok(text) => text,
            Err(e) => self.apply_policy(Stage::Caption, e)?,
        };

        info!(used_fallback = article.used_fallback(), "Meme generated");
        Ok(MemeArtifact {
            title: article.display_title.clone(),
            source_url: article.source_url.clone(),
            image_url,
            caption_text,
            used_fallback: article.used_fallback(),
            created_at: Utc::now(),
        })
    }

    async fn image(&self, headline: &str) -> Result<String, PipelineError> {
        self.generative
            .generate_image(&prompts::meme_image(headline))
            .await?
            .ok_or_else(|| PipelineError::ImageGenerationFailed {
                reason: "no image payload in reply".to_string(),
            })
    }

    async fn caption(&self, headline: &str) -> Result<String, PipelineError> {
        match self
            .generative
            .generate_text("caption.generate", &prompts::meme_caption(headline))
            .await
        {
            Ok(Some(text)) => Ok(text),
            Ok(None) => Err(PipelineError::CaptionGenerationFailed {
                reason: "no caption text in reply".to_string(),
            }),
            Err(e) => Err(PipelineError::CaptionGenerationFailed {
                reason: e.to_string(),
            }),
        }
    }

    /// Turn a failed stage into its degraded value, or propagate the error.
    fn apply_policy(&self, stage: Stage, err: PipelineError) -> Result<String, PipelineError> {
        match (on_failure(stage), stage) {
            (OnFailure::Degrade, Stage::Image) => {
                let placeholder = self.generative.settings().placeholder_image();
                warn!(error = %err, %placeholder, "Image generation failed, using placeholder");
                Ok(placeholder)
            }
            _ => {
                error!(?stage, error = %err, "Meme generation aborted");
                Err(err)
            }
        }
    }
}
