//! Clients for the external services the pipeline depends on.
//!
//! Each submodule wraps one service category. All of them issue their HTTP
//! calls through [`RetryingClient`](crate::api::RetryingClient).
//!
//! # Services
//!
//! | Service | Module | Calls | Notes |
//! |---------|--------|-------|-------|
//! | Extraction (Apify web scraper) | [`extraction`] | submit, status, results | Asynchronous job, polled |
//! | Generative text (Gemini) | [`generative`] | `generateContent` | Fallback headline, caption, script |
//! | Generative image (Imagen) | [`generative`] | `predict` | One sample per meme |
//! | Video synthesis | [`synthesis`] | render | Simulated; trait seam for a live renderer |

pub mod extraction;
pub mod generative;
pub mod synthesis;
