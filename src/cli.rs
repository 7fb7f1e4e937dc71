//! Command-line interface definitions for the Meme Street Journal.
//!
//! Every option except the article URL can also come from the environment.
//! Credentials are only ever read from here, never from the config file.

use crate::config::{AppConfig, Credentials};
use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the Meme Street Journal.
///
/// # Examples
///
/// ```sh
/// # Credentials from the environment
/// export APIFY_TOKEN=... GEMINI_API_KEY=...
/// meme_street_journal https://example.com/2024/09/apple-event-iphone.html
///
/// # Custom config, JSON output
/// meme_street_journal -c ./config.yaml --json https://example.com/story.html
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// URL of the news article to turn into a meme
    pub url: String,

    /// Optional path to config.yaml file
    #[arg(short, long, env = "MSJ_CONFIG")]
    pub config: Option<PathBuf>,

    /// Apify API token for the extraction service
    #[arg(long, env = "APIFY_TOKEN", hide_env_values = true, default_value = "")]
    pub apify_token: String,

    /// Gemini API key for the generative services
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true, default_value = "")]
    pub gemini_api_key: String,

    /// Override the number of retries per request
    #[arg(long)]
    pub max_retries: Option<usize>,

    /// Override the minimum keyword length for the fallback search
    #[arg(long)]
    pub min_keyword_chars: Option<usize>,

    /// Print the meme and video script as JSON
    #[arg(short, long)]
    pub json: bool,
}

impl Cli {
    /// Apply command-line overrides on top of the loaded configuration.
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(max_retries) = self.max_retries {
            config.retry.max_retries = max_retries;
        }
        if let Some(min_keyword_chars) = self.min_keyword_chars {
            config.fallback.min_keyword_chars = min_keyword_chars;
        }
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            extraction_token: self.apify_token.clone(),
            generation_key: self.gemini_api_key.clone(),
        }
    }
}
