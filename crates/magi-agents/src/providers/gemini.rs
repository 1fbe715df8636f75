use magi_models::{Message, ProviderResponse, ToolCallRequest, ToolDescriptor, Usage};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::cost::GEMINI_RATES;
use super::{
    check_status, fresh_call_id, split_system, CostRates, ProviderAdapter, ProviderError,
    WireRequest,
};
use crate::parser::arguments_from_value;

const VENDOR: &str = "gemini";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-1.5-flash";
/// Stands in for a model turn that came back with no parts at all (for
/// example a SAFETY stop). Gemini rejects empty text parts.
const EMPTY_TURN_PLACEHOLDER: &str = "(no response)";

/// Native `generateContent` dialect.
///
/// The system prompt travels in `systemInstruction`, assistant turns use the
/// `model` role, and every run of consecutive tool results collapses into a
/// single `function` turn of `functionResponse` parts.
pub struct GeminiAdapter {
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiAdapter {
    pub fn new(api_key: String, model: Option<String>, base_url: Option<String>) -> Self {
        Self {
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }
}

fn function_response_part(tool_call_id: &str, tool_name: &str, payload: &Value) -> Value {
    // `response` must be a JSON object on the wire.
    let response = match payload {
        Value::Object(_) => payload.clone(),
        other => json!({ "result": other }),
    };
    json!({
        "functionResponse": {
            "id": tool_call_id,
            "name": tool_name,
            "response": response,
        }
    })
}

fn encode_contents(messages: &[&Message]) -> Vec<Value> {
    let mut contents: Vec<Value> = Vec::new();
    let mut pending_responses: Vec<Value> = Vec::new();

    let flush = |contents: &mut Vec<Value>, pending: &mut Vec<Value>| {
        if !pending.is_empty() {
            contents.push(json!({"role": "function", "parts": std::mem::take(pending)}));
        }
    };

    for message in messages {
        match message {
            Message::ToolResult {
                tool_call_id,
                tool_name,
                payload,
            } => {
                pending_responses.push(function_response_part(tool_call_id, tool_name, payload));
                continue;
            }
            Message::System { .. } => continue,
            _ => flush(&mut contents, &mut pending_responses),
        }

        match message {
            Message::User { text } => {
                contents.push(json!({"role": "user", "parts": [{"text": text}]}));
            }
            Message::Assistant { text, tool_calls } => {
                let mut parts = Vec::with_capacity(tool_calls.len() + 1);
                if !text.is_empty() {
                    parts.push(json!({"text": text}));
                } else if tool_calls.is_empty() {
                    parts.push(json!({"text": EMPTY_TURN_PLACEHOLDER}));
                }
                for call in tool_calls {
                    parts.push(json!({
                        "functionCall": {
                            "id": call.id,
                            "name": call.name,
                            "args": Value::Object(call.arguments.clone()),
                        }
                    }));
                }
                contents.push(json!({"role": "model", "parts": parts}));
            }
            Message::System { .. } | Message::ToolResult { .. } => {}
        }
    }
    flush(&mut contents, &mut pending_responses);
    contents
}

impl ProviderAdapter for GeminiAdapter {
    fn vendor(&self) -> &str {
        VENDOR
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn encode(&self, conversation: &[Message], tools: &[ToolDescriptor]) -> WireRequest {
        let (system, rest) = split_system(conversation);

        let mut body = json!({ "contents": encode_contents(&rest) });
        if let Some(system) = system {
            body["systemInstruction"] = json!({"parts": [{"text": system}]});
        }
        if !tools.is_empty() {
            let declarations: Vec<Value> = tools
                .iter()
                .map(|tool| {
                    json!({
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameter_schema,
                    })
                })
                .collect();
            body["tools"] = json!([{ "functionDeclarations": declarations }]);
            body["toolConfig"] = json!({"functionCallingConfig": {"mode": "AUTO"}});
        }

        WireRequest {
            url: format!("{}/models/{}:generateContent", self.base_url, self.model),
            headers: vec![("x-goog-api-key".to_string(), self.api_key.clone())],
            body,
        }
    }

    fn decode(&self, status: u16, body: &str) -> Result<ProviderResponse, ProviderError> {
        check_status(VENDOR, status, body)?;

        let response: GenerateContentResponse = serde_json::from_str(body)
            .map_err(|e| ProviderError::decode(VENDOR, format!("invalid response JSON: {e}")))?;

        let candidate = response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::decode(VENDOR, "no candidate in response"))?;

        let mut texts = Vec::new();
        let mut tool_calls = Vec::new();
        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if let Some(text) = part.text {
                texts.push(text);
            }
            if let Some(call) = part.function_call {
                let arguments = match call.args {
                    Some(args) => arguments_from_value(args).map_err(|e| {
                        ProviderError::decode(VENDOR, format!("function call {}: {e}", call.name))
                    })?,
                    None => Map::new(),
                };
                let id = call
                    .id
                    .filter(|id| !id.trim().is_empty())
                    .unwrap_or_else(fresh_call_id);
                tool_calls.push(ToolCallRequest::new(id, call.name, arguments));
            }
        }

        let usage = response
            .usage_metadata
            .map(|u| {
                Usage::new(
                    u.prompt_token_count.unwrap_or(0),
                    u.candidates_token_count.unwrap_or(0),
                )
            })
            .unwrap_or_default();

        Ok(ProviderResponse {
            assistant_text: texts.join("\n"),
            tool_calls,
            usage,
        })
    }

    fn rates(&self) -> CostRates {
        GEMINI_RATES
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    text: Option<String>,
    function_call: Option<FunctionCall>,
}

#[derive(Deserialize)]
struct FunctionCall {
    id: Option<String>,
    name: String,
    args: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u64>,
    candidates_token_count: Option<u64>,
}
