//! Generative text and image service client.
//!
//! Both services authenticate with an API key passed as the `key` query
//! parameter:
//!
//! - Text: `POST {base}/v1beta/models/{text_model}:generateContent`
//! - Image: `POST {base}/v1beta/models/{image_model}:predict`

use crate::api::{RetryingClient, ServiceRequest, Transport};
use crate::config::GenerationSettings;
use crate::errors::PipelineError;
use crate::models::{GenerateContentResponse, PredictResponse};
use crate::utils::truncate_for_log;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use url::Url;

/// Shared handle to the generative services.
pub struct GenerativeClient<T> {
    client: Arc<RetryingClient<T>>,
    settings: Arc<GenerationSettings>,
    api_key: Arc<str>,
}

impl<T> Clone for GenerativeClient<T> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            settings: Arc::clone(&self.settings),
            api_key: Arc::clone(&self.api_key),
        }
    }
}

impl<T> GenerativeClient<T>
where
    T: Transport,
{
    pub fn new(
        client: Arc<RetryingClient<T>>,
        settings: Arc<GenerationSettings>,
        api_key: &str,
    ) -> Self {
        Self {
            client,
            settings,
            api_key: Arc::from(api_key),
        }
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    /// Ask the text model to answer `prompt`.
    ///
    /// # Returns
    ///
    /// The trimmed text of the first candidate, or `None` when the reply
    /// carries no (non-blank) text.
    #[instrument(level = "info", skip_all, fields(operation = operation))]
    pub async fn generate_text(
        &self,
        operation: &'static str,
        prompt: &str,
    ) -> Result<Option<String>, PipelineError> {
        let url = self.model_url(&self.settings.text_model, "generateContent")?;
        let body = json!({ "contents": [{ "parts": [{ "text": prompt }] }] });
        let value = self
            .client
            .send(&ServiceRequest::post_json(operation, url, body))
            .await?;

        let response: GenerateContentResponse = match serde_json::from_value(value) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Text reply did not match the expected shape");
                return Ok(None);
            }
        };
        let text = response
            .first_text()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        debug!(
            text = %text.as_deref().map(|t| truncate_for_log(t, 120)).unwrap_or_default(),
            "Text generated"
        );
        Ok(text)
    }

    /// Ask the image model for one illustration of `prompt`.
    ///
    /// # Returns
    ///
    /// A `data:` URL holding the first prediction, or `None` when the reply
    /// carries no image payload.
    #[instrument(level = "info", skip_all)]
    pub async fn generate_image(&self, prompt: &str) -> Result<Option<String>, PipelineError> {
        let url = self.model_url(&self.settings.image_model, "predict")?;
        let body = json!({
            "instances": [{ "prompt": prompt }],
            "parameters": { "sampleCount": self.settings.sample_count },
        });
        let value = self
            .client
            .send(&ServiceRequest::post_json("image.generate", url, body))
            .await?;

        let response: PredictResponse = match serde_json::from_value(value) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Image reply did not match the expected shape");
                return Ok(None);
            }
        };
        Ok(response.first_data_url())
    }

    fn model_url(&self, model: &str, method: &str) -> Result<Url, PipelineError> {
        let mut url = Url::parse(&format!(
            "{}/v1beta/models/{}:{}",
            self.settings.base_url.trim_end_matches('/'),
            model,
            method
        ))?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }
}
