//! Background narration script and video synthesis.
//!
//! One task per run, spawned by the controller after the meme is published.
//! The task reports progress only through [`PipelineStore::update_video`]:
//!
//! ```text
//! { "", generating, - } ──► { script, -, generated }
//!                      └──► { "Could not generate video script.", -, generated }
//! ```
//!
//! It never returns an error. When the run's token is cancelled the task
//! stops and writes nothing further.

use crate::api::Transport;
use crate::errors::PipelineError;
use crate::models::VideoState;
use crate::pipeline::policy::{OnFailure, Stage, on_failure};
use crate::pipeline::state::{PipelineStore, RunId};
use crate::prompts;
use crate::services::generative::GenerativeClient;
use crate::services::synthesis::{SynthesisRequest, VideoSynthesizer};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

pub const SCRIPT_UNAVAILABLE: &str = "Could not generate video script.";

/// Inputs of one video task.
#[derive(Debug, Clone)]
pub struct VideoJob {
    pub run: RunId,
    pub headline: String,
    pub caption: String,
    pub image_ref: String,
}

pub struct VideoScriptOrchestrator<T, S> {
    generative: GenerativeClient<T>,
    synthesizer: S,
    store: PipelineStore,
}

impl<T, S> VideoScriptOrchestrator<T, S>
where
    T: Transport,
    S: VideoSynthesizer,
{
    pub fn new(generative: GenerativeClient<T>, synthesizer: S, store: PipelineStore) -> Self {
        Self {
            generative,
            synthesizer,
            store,
        }
    }

    #[instrument(level = "info", skip_all, fields(run = %job.run))]
    pub async fn run(&self, job: VideoJob, cancel: CancellationToken) {
        self.store.update_video(job.run, |v| {
            *v = VideoState {
                script: String::new(),
                generating: true,
                generated: false,
            }
        });

        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                info!("Video task cancelled");
                return;
            }
            outcome = self.produce(&job) => outcome,
        };

        let script = match outcome {
            Ok(script) => {
                info!(script_chars = script.chars().count(), "Video script ready");
                script
            }
            Err(e) => self.degrade(e),
        };

        if cancel.is_cancelled() {
            return;
        }
        self.store.update_video(job.run, |v| {
            *v = VideoState {
                script,
                generating: false,
                generated: true,
            }
        });
    }

    async fn produce(&self, job: &VideoJob) -> Result<String, PipelineError> {
        let script = match self
            .generative
            .generate_text(
                "script.generate",
                &prompts::video_script(&job.headline, &job.caption),
            )
            .await
        {
            Ok(Some(text)) => text,
            Ok(None) => {
                return Err(PipelineError::ScriptGenerationFailed {
                    reason: "no script text in reply".to_string(),
                });
            }
            Err(e) => {
                return Err(PipelineError::ScriptGenerationFailed {
                    reason: e.to_string(),
                });
            }
        };

        self.synthesizer
            .render(&SynthesisRequest {
                script: &script,
                headline: &job.headline,
                image_ref: &job.image_ref,
            })
            .await?;
        Ok(script)
    }

    fn degrade(&self, err: PipelineError) -> String {
        let stage = match err {
            PipelineError::SynthesisFailed { .. } => Stage::Synthesis,
            _ => Stage::Script,
        };
        match on_failure(stage) {
            OnFailure::Degrade => warn!(?stage, error = %err, "Video stage failed, degrading"),
            policy => error!(?stage, ?policy, error = %err, "Video stage failed"),
        }
        SCRIPT_UNAVAILABLE.to_string()
    }
}
