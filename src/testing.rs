//! Test doubles shared by the unit tests of several modules.

use crate::api::{ServiceRequest, Transport, TransportError};
use crate::errors::PipelineError;
use crate::services::synthesis::{SynthesisRequest, VideoSynthesizer};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Clone)]
enum Reply {
    Ok(Value),
    Status(u16),
}

#[derive(Default)]
struct Script {
    replies: HashMap<&'static str, VecDeque<Reply>>,
    calls: Vec<Call>,
}

/// A recorded request.
#[derive(Debug, Clone)]
pub struct Call {
    pub operation: &'static str,
    pub body: Option<Value>,
    pub at: Instant,
}

/// [`Transport`] that answers from per-operation queues instead of the network.
///
/// Replies are consumed in order; the last reply of a queue repeats forever.
/// An operation without any scripted reply answers HTTP 500.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_ok(&self, operation: &'static str, value: Value) -> &Self {
        self.push(operation, Reply::Ok(value))
    }

    pub fn push_status(&self, operation: &'static str, status: u16) -> &Self {
        self.push(operation, Reply::Status(status))
    }

    fn push(&self, operation: &'static str, reply: Reply) -> &Self {
        self.script
            .lock()
            .unwrap()
            .replies
            .entry(operation)
            .or_default()
            .push_back(reply);
        self
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.script
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.script.lock().unwrap().calls.len()
    }

    pub fn recorded(&self) -> Vec<Call> {
        self.script.lock().unwrap().calls.clone()
    }

    /// Time of each call to `operation`, relative to `start`.
    pub fn call_offsets(&self, operation: &str, start: Instant) -> Vec<Duration> {
        self.script
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .map(|c| c.at.duration_since(start))
            .collect()
    }
}

impl Transport for ScriptedTransport {
    async fn send(&self, request: &ServiceRequest) -> Result<Value, TransportError> {
        let reply = {
            let mut script = self.script.lock().unwrap();
            script.calls.push(Call {
                operation: request.operation,
                body: request.body.clone(),
                at: Instant::now(),
            });
            match script.replies.get_mut(request.operation) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };
        match reply {
            Some(Reply::Ok(value)) => Ok(value),
            Some(Reply::Status(status)) => Err(TransportError::Status {
                status,
                body: "scripted failure".to_string(),
            }),
            None => Err(TransportError::Status {
                status: 500,
                body: format!("no scripted reply for {}", request.operation),
            }),
        }
    }
}

/// Synthesizer that records what it was asked to render.
#[derive(Clone, Default)]
pub struct RecordingSynthesizer {
    pub latency: Duration,
    pub fail: bool,
    pub rendered: Arc<Mutex<Vec<(String, String, String)>>>,
}

impl VideoSynthesizer for RecordingSynthesizer {
    async fn render(&self, request: &SynthesisRequest<'_>) -> Result<(), PipelineError> {
        tokio::time::sleep(self.latency).await;
        if self.fail {
            return Err(PipelineError::SynthesisFailed {
                reason: "renderer offline".to_string(),
            });
        }
        self.rendered.lock().unwrap().push((
            request.script.to_string(),
            request.headline.to_string(),
            request.image_ref.to_string(),
        ));
        Ok(())
    }
}

/// A text-service reply carrying `text`.
pub fn text_reply(text: &str) -> Value {
    serde_json::json!({
        "candidates": [{ "content": { "parts": [{ "text": text }] } }]
    })
}

/// An image-service reply carrying base64 `data`.
pub fn image_reply(data: &str) -> Value {
    serde_json::json!({
        "predictions": [{ "bytesBase64Encoded": data, "mimeType": "image/png" }]
    })
}
