//! # Meme Street Journal
//!
//! Turns a news article URL into a meme (an image and a witty caption) and a
//! short narrated video script.
//!
//! ## Features
//!
//! - Extracts the article headline through a remote scraping job, polled
//!   until it finishes
//! - Falls back to a headline synthesized from the URL's keywords when the
//!   page cannot be read
//! - Generates the meme image and caption concurrently
//! - Writes the video script in the background after the meme is shown
//! - Retries every external call with exponential backoff
//!
//! ## Usage
//!
//! ```sh
//! APIFY_TOKEN=... GEMINI_API_KEY=... meme_street_journal https://example.com/story.html
//! ```
//!
//! ## Architecture
//!
//! 1. **Extraction**: submit a scraping job for the URL and poll it
//! 2. **Fallback**: derive a headline from the URL when extraction fails
//! 3. **Meme**: image and caption for the headline
//! 4. **Video**: narration script and (simulated) synthesis, in the background

use clap::Parser;
use serde_json::json;
use std::error::Error;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod config;
mod errors;
mod models;
mod pipeline;
mod prompts;
mod services;
mod utils;

#[cfg(test)]
mod testing;

use api::ReqwestTransport;
use cli::Cli;
use config::AppConfig;
use pipeline::controller::PipelineController;
use services::synthesis::SimulatedSynthesizer;

#[tokio::main(flavor = "current_thread")]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("meme_street_journal starting up");

    // Parse CLI
    let args = Cli::parse();
    let credentials = args.credentials();
    debug!(url = %args.url, config = ?args.config, ?credentials, "Parsed CLI arguments");

    // ---- Load config ----
    let mut config = AppConfig::load(args.config.as_deref()).await?;
    args.apply_overrides(&mut config);
    info!(
        max_retries = config.retry.max_retries,
        min_keyword_chars = config.fallback.min_keyword_chars,
        "Loaded configuration"
    );

    let transport = ReqwestTransport::new(config.retry.request_timeout())?;
    let synthesizer =
        SimulatedSynthesizer::new(config.video.synthesis_latency(), config.video.presenter.clone());
    let controller = PipelineController::new(transport, synthesizer, &config, &credentials);

    // ---- Progress reporting ----
    let mut progress = controller.store().subscribe_pipeline();
    let mut published = controller.store().subscribe_meme();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = progress.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = progress.borrow_and_update().clone();
                    if state.is_loading() {
                        info!(step = ?state.step, message = %state.loading_message, "Progress");
                    }
                }
                changed = published.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if let Some(meme) = published.borrow_and_update().as_ref() {
                        info!(title = %meme.title, used_fallback = meme.used_fallback, "Meme ready");
                    }
                }
            }
        }
    });

    // ---- Run ----
    let meme = match controller.submit(&args.url).await {
        Ok(meme) => meme,
        Err(e) => {
            let state = controller.store().pipeline();
            error!(error = %e, "Pipeline run failed");
            eprintln!("{}", state.error_message);
            return Err(e.into());
        }
    };

    let video = controller
        .store()
        .subscribe_video()
        .wait_for(|v| v.generated)
        .await?
        .clone();

    if args.json {
        let out = json!({ "meme": meme, "video": video });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{}", meme.title);
        if meme.used_fallback {
            println!("(headline reconstructed from the URL)");
        }
        println!();
        println!("Caption: {}", meme.caption_text);
        println!("Image:   {}", utils::truncate_for_log(&meme.image_url, 80));
        println!("Source:  {}", meme.source_url);
        println!();
        println!("Video script:");
        println!("{}", video.script);
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}
