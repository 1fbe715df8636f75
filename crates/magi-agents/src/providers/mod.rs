//! Vendor adapters between the canonical conversation and each chat API.
//!
//! An adapter is pure: it encodes a conversation into a `WireRequest` and
//! decodes a raw response body. `HttpProvider` does the I/O.

pub mod cost;
pub mod gemini;
pub mod openai;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use magi_models::{Message, ProviderKind, ProviderResponse, ToolDescriptor, Usage};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

pub use cost::CostRates;
pub use gemini::GeminiAdapter;
pub use openai::{OpenAiCompatibleAdapter, OpenAiFlavor};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("{vendor} transport error: {message}")]
    Transport { vendor: String, message: String },

    #[error("{vendor} returned status {status_code}: {raw_body}")]
    Status {
        vendor: String,
        status_code: u16,
        raw_body: String,
    },

    #[error("{vendor} response decode error: {message}")]
    Decode { vendor: String, message: String },
}

impl ProviderError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            ProviderError::Status {
                status_code: 429,
                ..
            }
        )
    }

    pub fn vendor(&self) -> &str {
        match self {
            ProviderError::Transport { vendor, .. }
            | ProviderError::Status { vendor, .. }
            | ProviderError::Decode { vendor, .. } => vendor,
        }
    }

    pub(crate) fn decode(vendor: &str, message: impl Into<String>) -> Self {
        ProviderError::Decode {
            vendor: vendor.to_string(),
            message: message.into(),
        }
    }
}

/// A fully-formed HTTP request, ready to POST.
#[derive(Debug, Clone, PartialEq)]
pub struct WireRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

/// Encoding and decoding for one vendor's tool-calling dialect.
pub trait ProviderAdapter: Send + Sync {
    fn vendor(&self) -> &str;

    fn model(&self) -> &str;

    fn encode(&self, conversation: &[Message], tools: &[ToolDescriptor]) -> WireRequest;

    /// Decode a response body. Any non-2xx `status` is a `ProviderError::Status`.
    fn decode(&self, status: u16, body: &str) -> Result<ProviderResponse, ProviderError>;

    fn rates(&self) -> CostRates;
}

/// Something that can take one turn of a conversation.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn vendor(&self) -> &str;

    fn model(&self) -> &str;

    fn estimate_cost(&self, usage: Usage) -> f64;

    async fn complete(
        &self,
        conversation: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<ProviderResponse, ProviderError>;
}

/// Build the adapter for a vendor. `model` and `base_url` fall back to the
/// vendor defaults. A Gemini `base_url` ending in `/openai` selects Google's
/// OpenAI-compatibility endpoint instead of the native dialect.
pub fn adapter_for(
    kind: ProviderKind,
    api_key: String,
    model: Option<String>,
    base_url: Option<String>,
) -> Box<dyn ProviderAdapter> {
    let gemini_compat = base_url
        .as_deref()
        .is_some_and(|url| url.trim_end_matches('/').ends_with("/openai"));
    match kind {
        ProviderKind::Gemini if !gemini_compat => {
            Box::new(GeminiAdapter::new(api_key, model, base_url))
        }
        other => {
            let flavor = OpenAiFlavor::for_kind(other);
            Box::new(OpenAiCompatibleAdapter::new(flavor, api_key, model, base_url))
        }
    }
}

/// Adapter plus a pooled HTTP client.
pub struct HttpProvider {
    client: reqwest::Client,
    adapter: Box<dyn ProviderAdapter>,
}

impl HttpProvider {
    pub fn new(adapter: Box<dyn ProviderAdapter>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Transport {
                vendor: adapter.vendor().to_string(),
                message: e.to_string(),
            })?;
        Ok(Self { client, adapter })
    }

    pub fn adapter(&self) -> &dyn ProviderAdapter {
        self.adapter.as_ref()
    }

    fn transport_error(&self, err: reqwest::Error) -> ProviderError {
        ProviderError::Transport {
            vendor: self.adapter.vendor().to_string(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl ChatProvider for HttpProvider {
    fn vendor(&self) -> &str {
        self.adapter.vendor()
    }

    fn model(&self) -> &str {
        self.adapter.model()
    }

    fn estimate_cost(&self, usage: Usage) -> f64 {
        self.adapter.rates().estimate(usage)
    }

    async fn complete(
        &self,
        conversation: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<ProviderResponse, ProviderError> {
        let wire = self.adapter.encode(conversation, tools);
        let started = Instant::now();

        let mut request = self.client.post(&wire.url).json(&wire.body);
        for (name, value) in &wire.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        debug!(
            vendor = self.adapter.vendor(),
            status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Provider responded"
        );

        self.adapter.decode(status, &body)
    }
}

/// Split out the system prompt. Multiple system messages are joined so the
/// prompt is emitted once, ahead of everything else.
pub(crate) fn split_system(conversation: &[Message]) -> (Option<String>, Vec<&Message>) {
    let mut system_parts = Vec::new();
    let mut rest = Vec::with_capacity(conversation.len());
    for message in conversation {
        match message {
            Message::System { text } => system_parts.push(text.as_str()),
            other => rest.push(other),
        }
    }
    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };
    (system, rest)
}

/// Id for a tool call the vendor did not identify.
pub(crate) fn fresh_call_id() -> String {
    format!("call_{}", Uuid::new_v4().simple())
}

pub(crate) fn check_status(vendor: &str, status: u16, body: &str) -> Result<(), ProviderError> {
    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(ProviderError::Status {
            vendor: vendor.to_string(),
            status_code: status,
            raw_body: body.to_string(),
        })
    }
}
