//! Fallback headline resolution.
//!
//! When extraction cannot produce a usable headline, the article URL itself
//! usually still says what the story is about:
//! `…/2024/09/apple-event-iphone.html` becomes the keywords
//! `apple event iphone`, and the text service turns those into a headline.

use crate::api::Transport;
use crate::config::FallbackSettings;
use crate::errors::PipelineError;
use crate::models::{ArticleRecord, Provenance};
use crate::prompts;
use crate::services::generative::GenerativeClient;
use crate::utils::keywords_from_url;
use tracing::{info, instrument, warn};

pub struct FallbackResolver<T> {
    generative: GenerativeClient<T>,
    settings: FallbackSettings,
}

impl<T> FallbackResolver<T>
where
    T: Transport,
{
    pub fn new(generative: GenerativeClient<T>, settings: FallbackSettings) -> Self {
        Self {
            generative,
            settings,
        }
    }

    /// Keyword phrase for `failed_url`, if it meets the configured minimum length.
    pub fn keywords(&self, failed_url: &str) -> Result<String, PipelineError> {
        match keywords_from_url(failed_url) {
            Some(kw) if kw.chars().count() >= self.settings.min_keyword_chars => Ok(kw),
            other => {
                warn!(
                    url = %failed_url,
                    keywords = ?other,
                    min = self.settings.min_keyword_chars,
                    "No usable keywords in URL"
                );
                Err(PipelineError::NoKeywords {
                    url: failed_url.to_string(),
                })
            }
        }
    }

    /// Synthesize a headline for `failed_url` from the keywords in its path.
    #[instrument(level = "info", skip_all, fields(url = %failed_url))]
    pub async fn resolve(&self, failed_url: &str) -> Result<ArticleRecord, PipelineError> {
        let keywords = self.keywords(failed_url)?;
        info!(%keywords, "Resolving fallback headline");

        let text = self
            .generative
            .generate_text("fallback.generate", &prompts::fallback_headline(&keywords))
            .await?;
        let headline = text
            .as_deref()
            .map(|t| t.trim().trim_matches('"').trim().to_string())
            .unwrap_or_default();

        if headline.chars().count() < self.settings.min_headline_chars {
            warn!(
                %keywords,
                headline = %headline,
                min = self.settings.min_headline_chars,
                "Fallback headline too short"
            );
            return Err(PipelineError::FallbackExhausted);
        }

        info!(%headline, "Fallback headline resolved");
        Ok(ArticleRecord {
            source_url: failed_url.to_string(),
            display_title: headline.clone(),
            headline,
            provenance: Provenance::Fallback,
        })
    }
}
