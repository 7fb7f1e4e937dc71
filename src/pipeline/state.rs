//! Observable state shared between the controller and the presentation layer.
//!
//! [`PipelineStore`] owns three `tokio::sync::watch` channels, one each for
//! [`PipelineState`], the current [`MemeArtifact`], and [`VideoState`].
//! Observers subscribe and read; only the controller and the tasks it spawns
//! write.
//!
//! Every write that belongs to a run is tagged with that run's [`RunId`].
//! Writes from a run that is no longer current are dropped, so a late
//! background task can never touch the state of a newer run.

use crate::models::{MemeArtifact, PipelineState, Step, VideoState};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tracing::debug;

/// Identifier of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RunId(u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

#[derive(Clone)]
pub struct PipelineStore {
    pipeline: Arc<watch::Sender<PipelineState>>,
    meme: Arc<watch::Sender<Option<MemeArtifact>>>,
    video: Arc<watch::Sender<VideoState>>,
    current_run: Arc<AtomicU64>,
}

impl Default for PipelineStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStore {
    pub fn new() -> Self {
        Self {
            pipeline: Arc::new(watch::Sender::new(PipelineState::default())),
            meme: Arc::new(watch::Sender::new(None)),
            video: Arc::new(watch::Sender::new(VideoState::default())),
            current_run: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn subscribe_pipeline(&self) -> watch::Receiver<PipelineState> {
        self.pipeline.subscribe()
    }

    pub fn subscribe_meme(&self) -> watch::Receiver<Option<MemeArtifact>> {
        self.meme.subscribe()
    }

    pub fn subscribe_video(&self) -> watch::Receiver<VideoState> {
        self.video.subscribe()
    }

    pub fn pipeline(&self) -> PipelineState {
        self.pipeline.borrow().clone()
    }

    pub fn meme(&self) -> Option<MemeArtifact> {
        self.meme.borrow().clone()
    }

    pub fn video(&self) -> VideoState {
        self.video.borrow().clone()
    }

    pub fn is_current(&self, run: RunId) -> bool {
        self.current_run.load(Ordering::SeqCst) == run.0
    }

    /// Start a new run: reset every observable value and enter `Working`.
    pub fn begin_run(&self, loading_message: &str) -> RunId {
        let run = RunId(self.current_run.fetch_add(1, Ordering::SeqCst) + 1);
        self.pipeline.send_modify(|s| s.error_message.clear());
        self.meme.send_if_modified(|m| m.take().is_some());
        self.video.send_if_modified(|v| {
            let changed = *v != VideoState::default();
            *v = VideoState::default();
            changed
        });
        self.pipeline.send_modify(|s| {
            s.step = Step::Working;
            s.loading_message = loading_message.to_string();
        });
        debug!(%run, "Run started");
        run
    }

    /// Reject a submission without starting a run.
    pub fn reject_input(&self, error_message: &str) {
        self.pipeline.send_modify(|s| {
            s.step = Step::Input;
            s.loading_message.clear();
            s.error_message = error_message.to_string();
        });
    }

    pub fn set_loading(&self, run: RunId, loading_message: &str) {
        if !self.is_current(run) {
            return;
        }
        self.pipeline
            .send_modify(|s| s.loading_message = loading_message.to_string());
    }

    /// Drop the loading indicator of `run`.
    pub fn clear_loading(&self, run: RunId) {
        if !self.is_current(run) {
            return;
        }
        self.pipeline.send_if_modified(|s| {
            let changed = !s.loading_message.is_empty();
            s.loading_message.clear();
            changed
        });
    }

    /// End `run` unsuccessfully and return to `Input`.
    pub fn fail(&self, run: RunId, error_message: &str) {
        if !self.is_current(run) {
            return;
        }
        self.pipeline.send_modify(|s| {
            s.step = Step::Input;
            s.loading_message.clear();
            s.error_message = error_message.to_string();
        });
    }

    /// Publish the meme of `run` and enter `Result`.
    ///
    /// The meme is written before the step changes, so an observer that sees
    /// `Result` always finds a meme.
    pub fn publish_result(&self, run: RunId, meme: MemeArtifact) -> bool {
        if !self.is_current(run) {
            return false;
        }
        self.meme.send_replace(Some(meme));
        self.pipeline.send_modify(|s| {
            s.step = Step::Result;
            s.loading_message.clear();
        });
        true
    }

    /// Apply `update` to the video state if `run` is still current.
    ///
    /// Observers are only notified when the state actually changed.
    pub fn update_video(&self, run: RunId, update: impl FnOnce(&mut VideoState)) -> bool {
        if !self.is_current(run) {
            debug!(%run, "Dropping video update from a stale run");
            return false;
        }
        self.video.send_if_modified(|v| {
            let before = v.clone();
            update(v);
            *v != before
        })
    }
}
