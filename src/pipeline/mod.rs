//! The meme pipeline: from an article URL to a published meme and, in the
//! background, a narrated video script.
//!
//! # Architecture
//!
//! | Stage | Module | On failure |
//! |-------|--------|------------|
//! | Extraction | [`crate::services::extraction`] | Fallback path |
//! | Fallback headline | [`fallback`] | Abort the run |
//! | Meme image | [`meme`] | Placeholder image |
//! | Meme caption | [`meme`] | Abort the run |
//! | Video script | [`video`] | Placeholder script |
//! | Video synthesis | [`video`] | Placeholder script |
//!
//! [`controller`] sequences the stages and owns the [`state::PipelineStore`]
//! that observers subscribe to. The failure column is the table in
//! [`policy`].

pub mod controller;
pub mod fallback;
pub mod meme;
pub mod policy;
pub mod state;
pub mod video;
