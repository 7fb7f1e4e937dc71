//! What each pipeline stage does when it fails.
//!
//! The asymmetry is intentional and kept in one table: the meme caption is the
//! product, so losing it ends the run, while the image and the video are
//! enhancements that degrade to placeholders.

/// A stage of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Extraction,
    FallbackHeadline,
    Image,
    Caption,
    Script,
    Synthesis,
}

/// Reaction to a failed stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnFailure {
    /// Recover through the fallback headline path.
    Fallback,
    /// Substitute a degraded result and carry on.
    Degrade,
    /// End the run and report the error to the user.
    Abort,
}

pub const STAGE_POLICIES: [(Stage, OnFailure); 6] = [
    (Stage::Extraction, OnFailure::Fallback),
    (Stage::FallbackHeadline, OnFailure::Abort),
    (Stage::Image, OnFailure::Degrade),
    (Stage::Caption, OnFailure::Abort),
    (Stage::Script, OnFailure::Degrade),
    (Stage::Synthesis, OnFailure::Degrade),
];

pub fn on_failure(stage: Stage) -> OnFailure {
    STAGE_POLICIES
        .iter()
        .find(|(s, _)| *s == stage)
        .map(|(_, policy)| *policy)
        .unwrap_or(OnFailure::Abort)
}
