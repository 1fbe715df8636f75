use magi_models::{Message, ProviderKind, ProviderResponse, ToolCallRequest, ToolDescriptor, Usage};
use serde::Deserialize;
use serde_json::{json, Value};

use super::cost::GEMINI_RATES;
use super::{
    check_status, fresh_call_id, split_system, CostRates, ProviderAdapter, ProviderError,
    WireRequest,
};
use crate::parser::arguments_from_value;

/// Per-vendor constants for the OpenAI-compatible chat completions dialect.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenAiFlavor {
    pub vendor: &'static str,
    pub base_url: &'static str,
    pub default_model: &'static str,
    pub rates: CostRates,
    /// Mistral rejects tool messages that do not repeat the function name.
    pub name_on_tool_results: bool,
}

impl OpenAiFlavor {
    pub fn for_kind(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::OpenAi => Self {
                vendor: "openai",
                base_url: "https://api.openai.com/v1",
                default_model: "gpt-4o-mini",
                rates: CostRates::new(0.15, 0.60),
                name_on_tool_results: false,
            },
            ProviderKind::Groq => Self {
                vendor: "groq",
                base_url: "https://api.groq.com/openai/v1",
                default_model: "llama-3.3-70b-versatile",
                rates: CostRates::new(0.59, 0.79),
                name_on_tool_results: false,
            },
            ProviderKind::Mistral => Self {
                vendor: "mistral",
                base_url: "https://api.mistral.ai/v1",
                default_model: "mistral-small-latest",
                rates: CostRates::new(0.20, 0.60),
                name_on_tool_results: true,
            },
            ProviderKind::DeepSeek => Self {
                vendor: "deepseek",
                base_url: "https://api.deepseek.com/v1",
                default_model: "deepseek-chat",
                rates: CostRates::new(0.27, 1.10),
                name_on_tool_results: false,
            },
            ProviderKind::Xai => Self {
                vendor: "xai",
                base_url: "https://api.x.ai/v1",
                default_model: "grok-2-latest",
                rates: CostRates::new(2.00, 10.00),
                name_on_tool_results: false,
            },
            // Google's OpenAI-compatibility endpoint. `adapter_for` picks it
            // when `base_url` ends in `/openai`; otherwise Gemini is native.
            ProviderKind::Gemini => Self {
                vendor: "gemini",
                base_url: "https://generativelanguage.googleapis.com/v1beta/openai",
                default_model: "gemini-1.5-flash",
                rates: GEMINI_RATES,
                name_on_tool_results: false,
            },
        }
    }
}

pub struct OpenAiCompatibleAdapter {
    flavor: OpenAiFlavor,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiCompatibleAdapter {
    pub fn new(
        flavor: OpenAiFlavor,
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
    ) -> Self {
        let model = model.unwrap_or_else(|| flavor.default_model.to_string());
        let base_url = base_url
            .unwrap_or_else(|| flavor.base_url.to_string())
            .trim_end_matches('/')
            .to_string();
        Self {
            flavor,
            api_key,
            model,
            base_url,
        }
    }

    fn encode_message(&self, message: &Message) -> Value {
        match message {
            Message::System { text } => json!({"role": "system", "content": text}),
            Message::User { text } => json!({"role": "user", "content": text}),
            Message::Assistant { text, tool_calls } if tool_calls.is_empty() => {
                json!({"role": "assistant", "content": text})
            }
            Message::Assistant { text, tool_calls } => {
                let calls: Vec<Value> = tool_calls
                    .iter()
                    .map(|call| {
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": call.name,
                                "arguments": Value::Object(call.arguments.clone()).to_string(),
                            }
                        })
                    })
                    .collect();
                let content = if text.is_empty() {
                    Value::Null
                } else {
                    Value::String(text.clone())
                };
                json!({"role": "assistant", "content": content, "tool_calls": calls})
            }
            Message::ToolResult {
                tool_call_id,
                tool_name,
                payload,
            } => {
                let content = match payload {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                let mut encoded = json!({
                    "role": "tool",
                    "tool_call_id": tool_call_id,
                    "content": content,
                });
                if self.flavor.name_on_tool_results {
                    encoded["name"] = Value::String(tool_name.clone());
                }
                encoded
            }
        }
    }
}

impl ProviderAdapter for OpenAiCompatibleAdapter {
    fn vendor(&self) -> &str {
        self.flavor.vendor
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn encode(&self, conversation: &[Message], tools: &[ToolDescriptor]) -> WireRequest {
        let (system, rest) = split_system(conversation);

        let mut messages = Vec::with_capacity(conversation.len());
        if let Some(system) = system {
            messages.push(self.encode_message(&Message::system(system)));
        }
        messages.extend(rest.into_iter().map(|m| self.encode_message(m)));

        let mut body = json!({
            "model": self.model,
            "messages": messages,
        });
        if !tools.is_empty() {
            let functions: Vec<Value> = tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.parameter_schema,
                        }
                    })
                })
                .collect();
            body["tools"] = Value::Array(functions);
            body["tool_choice"] = Value::String("auto".to_string());
        }

        WireRequest {
            url: format!("{}/chat/completions", self.base_url),
            headers: vec![(
                "Authorization".to_string(),
                format!("Bearer {}", self.api_key),
            )],
            body,
        }
    }

    fn decode(&self, status: u16, body: &str) -> Result<ProviderResponse, ProviderError> {
        let vendor = self.flavor.vendor;
        check_status(vendor, status, body)?;

        let response: ChatCompletion = serde_json::from_str(body)
            .map_err(|e| ProviderError::decode(vendor, format!("invalid response JSON: {e}")))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::decode(vendor, "response contained no choices"))?;

        let mut tool_calls = Vec::new();
        for call in choice.message.tool_calls.unwrap_or_default() {
            let arguments = arguments_from_value(call.function.arguments).map_err(|e| {
                ProviderError::decode(vendor, format!("tool call {}: {e}", call.function.name))
            })?;
            let id = call
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(fresh_call_id);
            tool_calls.push(ToolCallRequest::new(id, call.function.name, arguments));
        }

        let usage = response
            .usage
            .map(|u| {
                Usage::new(
                    u.prompt_tokens.unwrap_or(0),
                    u.completion_tokens.unwrap_or(0),
                )
            })
            .unwrap_or_default();

        Ok(ProviderResponse {
            assistant_text: choice.message.content.unwrap_or_default(),
            tool_calls,
            usage,
        })
    }

    fn rates(&self) -> CostRates {
        self.flavor.rates
    }
}

#[derive(Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<CompletionUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Deserialize)]
struct WireToolCall {
    id: Option<String>,
    function: WireFunction,
}

#[derive(Deserialize)]
struct WireFunction {
    name: String,
    /// A JSON string per the dialect, but some vendors send an object.
    #[serde(default)]
    arguments: Value,
}

#[derive(Deserialize)]
struct CompletionUsage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
}
