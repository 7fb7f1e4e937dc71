//! The pipeline controller: one `submit` call per article URL.
//!
//! # Flow
//!
//! ```text
//! INPUT ──► WORKING ──► RESULT ──► (background) video task
//!   ▲          │
//!   └──────────┘  unrecoverable failure
//! ```
//!
//! | Loading message                                              | While                         |
//! |--------------------------------------------------------------|-------------------------------|
//! | `Reading the article...`                                     | submitting the extraction job |
//! | `Understanding the news...`                                  | polling and reading results   |
//! | `Original URL failed. Searching for a similar article...`    | resolving a fallback headline |
//! | `Getting meme inspiration...`                                | meme from the extracted story |
//! | `Found an alternative! Generating meme...`                   | meme from the fallback        |
//!
//! Each run gets a fresh [`RunId`] and a [`CancellationToken`] for its video
//! task. Submitting again cancels the previous token before any state of the
//! new run is written.

use crate::api::{ExhaustedHook, RetryingClient, Transport};
use crate::config::{AppConfig, Credentials};
use crate::errors::PipelineError;
use crate::models::{ArticleRecord, MemeArtifact};
use crate::pipeline::fallback::FallbackResolver;
use crate::pipeline::meme::MemeGenerator;
use crate::pipeline::policy::{OnFailure, Stage, on_failure};
use crate::pipeline::state::{PipelineStore, RunId};
use crate::pipeline::video::{VideoJob, VideoScriptOrchestrator};
use crate::services::extraction::ExtractionPoller;
use crate::services::generative::GenerativeClient;
use crate::services::synthesis::VideoSynthesizer;
use crate::utils::parse_article_url;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

pub const READING_ARTICLE: &str = "Reading the article...";
pub const UNDERSTANDING_NEWS: &str = "Understanding the news...";
pub const SEARCHING_ALTERNATIVE: &str = "Original URL failed. Searching for a similar article...";
pub const MEME_FROM_ARTICLE: &str = "Getting meme inspiration...";
pub const MEME_FROM_FALLBACK: &str = "Found an alternative! Generating meme...";

tokio::task_local! {
    /// Run whose stages the current task is executing.
    static ACTIVE_RUN: RunId;
}

pub struct PipelineController<T, S> {
    extraction: ExtractionPoller<T>,
    fallback: FallbackResolver<T>,
    memes: MemeGenerator<T>,
    video: Arc<VideoScriptOrchestrator<T, S>>,
    store: PipelineStore,
    video_task: Mutex<Option<CancellationToken>>,
}

impl<T, S> PipelineController<T, S>
where
    T: Transport + 'static,
    S: VideoSynthesizer + 'static,
{
    /// Wire every stage onto one shared retrying client.
    ///
    /// # Arguments
    ///
    /// * `transport` - HTTP transport used by every external call
    /// * `synthesizer` - renderer for the background video stage
    /// * `config` - loaded application configuration
    /// * `credentials` - API credentials for extraction and generation
    pub fn new(
        transport: T,
        synthesizer: S,
        config: &AppConfig,
        credentials: &Credentials,
    ) -> Self {
        let store = PipelineStore::new();

        let hook_store = store.clone();
        let hook: ExhaustedHook = Arc::new(move |_err: &PipelineError| {
            // Only requests made by a run's own stages own its loading message.
            if let Ok(run) = ACTIVE_RUN.try_with(|run| *run) {
                hook_store.clear_loading(run);
            }
        });
        let client =
            Arc::new(RetryingClient::new(transport, config.retry.policy()).with_exhausted_hook(hook));

        let generative = GenerativeClient::new(
            Arc::clone(&client),
            Arc::new(config.generation.clone()),
            &credentials.generation_key,
        );

        Self {
            extraction: ExtractionPoller::new(
                client,
                config.extraction.clone(),
                &credentials.extraction_token,
            ),
            fallback: FallbackResolver::new(generative.clone(), config.fallback.clone()),
            memes: MemeGenerator::new(generative.clone()),
            video: Arc::new(VideoScriptOrchestrator::new(
                generative,
                synthesizer,
                store.clone(),
            )),
            store,
            video_task: Mutex::new(None),
        }
    }

    /// Observable state of this controller.
    pub fn store(&self) -> &PipelineStore {
        &self.store
    }

    /// Turn `raw_url` into a meme and start its video in the background.
    ///
    /// # Returns
    ///
    /// The published [`MemeArtifact`]. On error the store already carries the
    /// user-facing message and is back at `Input`.
    #[instrument(level = "info", skip_all, fields(url = %raw_url.trim()))]
    pub async fn submit(&self, raw_url: &str) -> Result<MemeArtifact, PipelineError> {
        let Some(url) = parse_article_url(raw_url) else {
            let err = PipelineError::InvalidInput {
                url: raw_url.to_string(),
            };
            warn!(error = %err, "Rejected submission");
            self.store.reject_input(&err.user_message());
            return Err(err);
        };
        let article_url = url.as_str();

        self.cancel_video_task();
        let run = self.store.begin_run(READING_ARTICLE);
        ACTIVE_RUN.scope(run, self.run_stages(run, article_url)).await
    }

    async fn run_stages(&self, run: RunId, article_url: &str) -> Result<MemeArtifact, PipelineError> {
        let started = Instant::now();
        info!(%run, "Pipeline run started");

        let article = match self.extract(run, article_url).await {
            Ok(article) => {
                self.store.set_loading(run, MEME_FROM_ARTICLE);
                article
            }
            Err(e) if on_failure(Stage::Extraction) == OnFailure::Fallback => {
                warn!(%run, error = %e, "Extraction failed, trying the fallback path");
                self.store.set_loading(run, SEARCHING_ALTERNATIVE);
                match self.fallback.resolve(article_url).await {
                    Ok(article) => {
                        self.store.set_loading(run, MEME_FROM_FALLBACK);
                        article
                    }
                    Err(e) => {
                        error!(%run, error = %e, "Fallback path failed");
                        self.store.fail(run, &e.user_message());
                        return Err(e);
                    }
                }
            }
            Err(e) => {
                error!(%run, error = %e, "Extraction failed");
                self.store.fail(run, &e.user_message());
                return Err(e);
            }
        };

        let meme = match self.memes.generate(&article).await {
            Ok(meme) => meme,
            Err(e) => {
                error!(%run, error = %e, "Meme generation failed");
                self.store.fail(run, &e.user_message());
                return Err(e);
            }
        };

        if self.store.publish_result(run, meme.clone()) {
            self.spawn_video(run, &article, &meme);
        }
        info!(
            %run,
            used_fallback = meme.used_fallback,
            elapsed_ms_total = started.elapsed().as_millis(),
            "Meme published"
        );
        Ok(meme)
    }

    async fn extract(&self, run: RunId, article_url: &str) -> Result<ArticleRecord, PipelineError> {
        let job = self.extraction.submit(article_url).await?;
        self.store.set_loading(run, UNDERSTANDING_NEWS);
        let job = self.extraction.await_completion(job).await?;
        self.extraction.fetch_article(&job, article_url).await
    }

    fn spawn_video(&self, run: RunId, article: &ArticleRecord, meme: &MemeArtifact) {
        let token = CancellationToken::new();
        if let Ok(mut slot) = self.video_task.lock() {
            *slot = Some(token.clone());
        }

        let job = VideoJob {
            run,
            headline: article.headline.clone(),
            caption: meme.caption_text.clone(),
            image_ref: meme.image_url.clone(),
        };
        let video = Arc::clone(&self.video);
        tokio::spawn(async move { video.run(job, token).await });
    }

    fn cancel_video_task(&self) {
        let previous = match self.video_task.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(token) = previous {
            info!("Cancelling the previous run's video task");
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionSettings;
    use crate::models::{Provenance, Step, VideoState};
    use crate::pipeline::video::SCRIPT_UNAVAILABLE;
    use crate::testing::{RecordingSynthesizer, ScriptedTransport, image_reply, text_reply};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;

    const ARTICLE: &str = "https://example.com/2024/09/apple-event-iphone.html";

    type TestController = PipelineController<ScriptedTransport, RecordingSynthesizer>;

    fn controller(transport: &ScriptedTransport, synthesizer: RecordingSynthesizer) -> TestController {
        let config = AppConfig {
            extraction: ExtractionSettings {
                base_url: "https://extraction.test".to_string(),
                ..ExtractionSettings::default()
            },
            ..AppConfig::default()
        };
        let credentials = Credentials {
            extraction_token: "token".to_string(),
            generation_key: "key".to_string(),
        };
        PipelineController::new(transport.clone(), synthesizer, &config, &credentials)
    }

    fn script_extraction(transport: &ScriptedTransport, headline: &str) {
        transport
            .push_ok(
                "extraction.submit",
                json!({ "data": { "id": "run-1", "defaultDatasetId": "ds-1" } }),
            )
            .push_ok("extraction.status", json!({ "data": { "status": "SUCCEEDED" } }))
            .push_ok(
                "extraction.results",
                json!([{ "url": ARTICLE, "headline": headline, "title": "Apple event" }]),
            );
    }

    fn script_generation(transport: &ScriptedTransport) {
        transport
            .push_ok("image.generate", image_reply("QUJD"))
            .push_ok("caption.generate", text_reply("Shut up and take my money."))
            .push_ok("script.generate", text_reply("Hey folks, Apple did a thing."));
    }

    fn synthesizer() -> RecordingSynthesizer {
        RecordingSynthesizer {
            latency: Duration::from_secs(3),
            ..RecordingSynthesizer::default()
        }
    }

    async fn wait_for_video(controller: &TestController) -> VideoState {
        let mut rx = controller.store().subscribe_video();
        rx.wait_for(|v| v.generated).await.unwrap().clone()
    }

    #[tokio::test]
    async fn test_invalid_url_makes_no_calls() {
        let transport = ScriptedTransport::new();
        let controller = controller(&transport, synthesizer());

        for input in ["", "not a url", "ftp://example.com/file"] {
            let err = controller.submit(input).await.unwrap_err();
            assert!(matches!(err, PipelineError::InvalidInput { .. }));
        }

        assert_eq!(transport.total_calls(), 0);
        let state = controller.store().pipeline();
        assert_eq!(state.step, Step::Input);
        assert_eq!(state.error_message, "Please enter a valid URL.");
        assert!(!state.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn test_happy_path_publishes_meme_then_video() {
        let transport = ScriptedTransport::new();
        script_extraction(&transport, "Apple unveils iPhone 16");
        script_generation(&transport);
        let synthesizer = synthesizer();
        let rendered = Arc::clone(&synthesizer.rendered);
        let controller = controller(&transport, synthesizer);

        let meme = controller.submit(ARTICLE).await.unwrap();

        assert_eq!(meme.title, "Apple event");
        assert_eq!(meme.source_url, ARTICLE);
        assert_eq!(meme.image_url, "data:image/png;base64,QUJD");
        assert_eq!(meme.caption_text, "Shut up and take my money.");
        assert!(!meme.used_fallback);
        assert_eq!(controller.store().meme(), Some(meme));
        assert_eq!(controller.store().pipeline().step, Step::Result);
        assert!(!controller.store().pipeline().is_loading());
        assert_eq!(transport.calls("fallback.generate"), 0);

        let video = wait_for_video(&controller).await;
        assert_eq!(
            video,
            VideoState {
                script: "Hey folks, Apple did a thing.".to_string(),
                generating: false,
                generated: true,
            }
        );
        assert_eq!(rendered.lock().unwrap()[0].1, "Apple unveils iPhone 16");
    }

    #[tokio::test(start_paused = true)]
    async fn test_video_starts_only_after_meme_is_published() {
        let transport = ScriptedTransport::new();
        script_extraction(&transport, "Apple unveils iPhone 16");
        script_generation(&transport);
        let controller = controller(&transport, synthesizer());

        controller.submit(ARTICLE).await.unwrap();
        wait_for_video(&controller).await;

        let calls = transport.recorded();
        let position = |op: &str| calls.iter().position(|c| c.operation == op).unwrap();
        assert!(position("extraction.results") < position("image.generate"));
        assert!(position("extraction.results") < position("caption.generate"));
        assert!(position("caption.generate") < position("script.generate"));
        assert!(position("image.generate") < position("script.generate"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_headline_takes_fallback_path() {
        let transport = ScriptedTransport::new();
        script_extraction(&transport, "404 Page Not Found");
        script_generation(&transport);
        transport.push_ok(
            "fallback.generate",
            text_reply("Apple Unveils iPhone 16 at September Event"),
        );
        let controller = controller(&transport, synthesizer());

        let meme = controller.submit(ARTICLE).await.unwrap();

        assert!(meme.used_fallback);
        assert_eq!(meme.title, "Apple Unveils iPhone 16 at September Event");
        assert_eq!(meme.source_url, ARTICLE);
        assert_eq!(transport.calls("fallback.generate"), 1);
        assert_eq!(controller.store().pipeline().step, Step::Result);
    }

    #[tokio::test(start_paused = true)]
    async fn test_extraction_timeout_takes_fallback_path() {
        let transport = ScriptedTransport::new();
        transport
            .push_ok(
                "extraction.submit",
                json!({ "data": { "id": "run-1", "defaultDatasetId": "ds-1" } }),
            )
            .push_ok("extraction.status", json!({ "data": { "status": "RUNNING" } }));
        script_generation(&transport);
        transport.push_ok(
            "fallback.generate",
            text_reply("Apple Unveils iPhone 16 at September Event"),
        );
        let controller = controller(&transport, synthesizer());

        let t0 = Instant::now();
        let meme = controller.submit(ARTICLE).await.unwrap();

        assert!(meme.used_fallback);
        assert!(t0.elapsed() >= Duration::from_secs(60));
        assert_eq!(transport.calls("extraction.results"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_failure_returns_to_input() {
        let transport = ScriptedTransport::new();
        script_extraction(&transport, "");
        transport.push_ok("fallback.generate", text_reply("Nope"));
        let controller = controller(&transport, synthesizer());

        let err = controller.submit(ARTICLE).await.unwrap_err();

        assert!(matches!(err, PipelineError::FallbackExhausted));
        let state = controller.store().pipeline();
        assert_eq!(state.step, Step::Input);
        assert!(state.error_message.starts_with("Fallback search failed: "));
        assert!(state.error_message.ends_with("Please try a different URL."));
        assert!(!state.is_loading());
        assert_eq!(controller.store().meme(), None);
        assert_eq!(transport.calls("image.generate"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submission_outage_without_keywords_fails_cleanly() {
        let transport = ScriptedTransport::new();
        transport.push_status("extraction.submit", 503);
        let controller = controller(&transport, synthesizer());
        let mut rx = controller.store().subscribe_pipeline();

        let err = controller
            .submit("https://example.com/x.html")
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::NoKeywords { .. }));
        assert_eq!(transport.calls("extraction.submit"), 4);
        assert_eq!(transport.calls("fallback.generate"), 0);
        assert!(!rx.borrow_and_update().is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn test_caption_failure_ends_run() {
        let transport = ScriptedTransport::new();
        script_extraction(&transport, "Apple unveils iPhone 16");
        transport
            .push_ok("image.generate", image_reply("QUJD"))
            .push_ok("caption.generate", json!({ "candidates": [] }));
        let controller = controller(&transport, synthesizer());

        let err = controller.submit(ARTICLE).await.unwrap_err();

        assert!(matches!(err, PipelineError::CaptionGenerationFailed { .. }));
        assert_eq!(controller.store().pipeline().step, Step::Input);
        assert!(!controller.store().pipeline().error_message.is_empty());
        assert_eq!(controller.store().meme(), None);
        assert_eq!(transport.calls("script.generate"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_script_failure_still_completes_video() {
        let transport = ScriptedTransport::new();
        script_extraction(&transport, "Apple unveils iPhone 16");
        transport
            .push_ok("image.generate", image_reply("QUJD"))
            .push_ok("caption.generate", text_reply("Shut up and take my money."))
            .push_ok("script.generate", json!({ "candidates": [] }));
        let controller = controller(&transport, synthesizer());

        controller.submit(ARTICLE).await.unwrap();
        let video = wait_for_video(&controller).await;

        assert_eq!(video.script, SCRIPT_UNAVAILABLE);
        assert!(!video.generating);
        assert_eq!(controller.store().pipeline().step, Step::Result);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_run_resets_state_and_cancels_stale_video() {
        let transport = ScriptedTransport::new();
        script_extraction(&transport, "Apple unveils iPhone 16");
        script_generation(&transport);
        let synthesizer = synthesizer();
        let rendered = Arc::clone(&synthesizer.rendered);
        let controller = controller(&transport, synthesizer);

        controller.submit(ARTICLE).await.unwrap();
        // Let the first video task reach its synthesis wait.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(controller.store().video().generating);

        let first_meme = controller.store().meme();
        assert!(first_meme.is_some());
        let meme_rx = controller.store().subscribe_meme();

        controller
            .submit("https://example.com/2024/09/markets-rally-again.html")
            .await
            .unwrap();
        assert!(meme_rx.has_changed().unwrap());

        let video = wait_for_video(&controller).await;
        assert_eq!(video.script, "Hey folks, Apple did a thing.");
        tokio::time::sleep(Duration::from_secs(10)).await;

        // Only the second run's video was rendered.
        assert_eq!(rendered.lock().unwrap().len(), 1);
        assert_eq!(transport.calls("script.generate"), 2);
        assert_eq!(controller.store().pipeline().step, Step::Result);
    }

    fn headline_only() -> ArticleRecord {
        ArticleRecord {
            source_url: ARTICLE.to_string(),
            headline: "Apple unveils iPhone 16".to_string(),
            display_title: "Apple unveils iPhone 16".to_string(),
            provenance: Provenance::Extracted,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_clear_loading_of_their_own_run() {
        let transport = ScriptedTransport::new();
        transport
            .push_ok("image.generate", image_reply("QUJD"))
            .push_status("caption.generate", 503);
        let controller = controller(&transport, synthesizer());
        let run = controller.store().begin_run(MEME_FROM_ARTICLE);

        let err = ACTIVE_RUN
            .scope(run, controller.memes.generate(&headline_only()))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::CaptionGenerationFailed { .. }));
        assert!(!controller.store().pipeline().is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_outside_a_run_keep_loading_message() {
        let transport = ScriptedTransport::new();
        transport
            .push_ok("image.generate", image_reply("QUJD"))
            .push_status("caption.generate", 503);
        let controller = controller(&transport, synthesizer());
        let stale = controller.store().begin_run(READING_ARTICLE);
        controller.store().begin_run(READING_ARTICLE);

        // Stale run's request exhausting its retries.
        let _ = ACTIVE_RUN
            .scope(stale, controller.memes.generate(&headline_only()))
            .await;
        assert_eq!(controller.store().pipeline().loading_message, READING_ARTICLE);

        // Background request with no run scope at all.
        let _ = controller.memes.generate(&headline_only()).await;
        assert_eq!(controller.store().pipeline().loading_message, READING_ARTICLE);
    }

    #[tokio::test]
    async fn test_invalid_resubmission_keeps_previous_result() {
        let transport = ScriptedTransport::new();
        script_extraction(&transport, "Apple unveils iPhone 16");
        script_generation(&transport);
        let controller = controller(&transport, RecordingSynthesizer::default());

        controller.submit(ARTICLE).await.unwrap();
        let calls = transport.total_calls();
        controller.submit("mailto:someone@example.com").await.unwrap_err();

        assert_eq!(transport.total_calls(), calls);
        assert!(controller.store().meme().is_some());
        assert_eq!(controller.store().pipeline().error_message, "Please enter a valid URL.");
    }
}
