use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// A tool invocation requested by the model.
///
/// `arguments` comes straight from the vendor and is untrusted: the tool
/// registry validates it before anything reaches a collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRequest {
    /// Opaque token, unique within one conversation.
    pub id: String,
    pub name: String,
    pub arguments: Map<String, Value>,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// One entry of the canonical conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    System {
        text: String,
    },
    User {
        text: String,
    },
    Assistant {
        text: String,
        #[serde(default)]
        tool_calls: Vec<ToolCallRequest>,
    },
    ToolResult {
        tool_call_id: String,
        /// Carried for vendors that address function responses by name.
        tool_name: String,
        payload: Value,
    },
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self::System { text: text.into() }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::User { text: text.into() }
    }

    pub fn assistant(text: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self::Assistant {
            text: text.into(),
            tool_calls,
        }
    }

    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self::ToolResult {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            payload,
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            Self::System { .. } => "system",
            Self::User { .. } => "user",
            Self::Assistant { .. } => "assistant",
            Self::ToolResult { .. } => "tool",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversationError {
    #[error("tool result references unknown call id: {0}")]
    UnknownToolCall(String),

    #[error("tool call id issued twice: {0}")]
    DuplicateToolCall(String),

    #[error("system message must precede all other messages")]
    MisplacedSystem,
}

/// Append-only conversation.
///
/// Enforces that every `ToolResult` answers a call issued earlier by an
/// `Assistant` message, that call ids are unique, and that the single
/// `System` message (if any) comes first.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a conversation with a system prompt and the kickoff user message.
    pub fn seeded(system: impl Into<String>, kickoff: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system), Message::user(kickoff)],
        }
    }

    pub fn push(&mut self, message: Message) -> Result<(), ConversationError> {
        match &message {
            Message::System { .. } if !self.messages.is_empty() => {
                return Err(ConversationError::MisplacedSystem);
            }
            Message::Assistant { tool_calls, .. } => {
                for (i, call) in tool_calls.iter().enumerate() {
                    let repeated_in_turn = tool_calls[..i].iter().any(|c| c.id == call.id);
                    if repeated_in_turn || self.find_call(&call.id).is_some() {
                        return Err(ConversationError::DuplicateToolCall(call.id.clone()));
                    }
                }
            }
            Message::ToolResult { tool_call_id, .. } => {
                if self.find_call(tool_call_id).is_none() {
                    return Err(ConversationError::UnknownToolCall(tool_call_id.clone()));
                }
            }
            _ => {}
        }
        self.messages.push(message);
        Ok(())
    }

    /// Look up an issued tool call by id.
    pub fn find_call(&self, id: &str) -> Option<&ToolCallRequest> {
        self.messages.iter().find_map(|m| match m {
            Message::Assistant { tool_calls, .. } => tool_calls.iter().find(|c| c.id == id),
            _ => None,
        })
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Token (or other billing unit) counts reported by a vendor.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub input_units: u64,
    pub output_units: u64,
}

impl Usage {
    pub fn new(input_units: u64, output_units: u64) -> Self {
        Self {
            input_units,
            output_units,
        }
    }

    pub fn add(&mut self, other: Usage) {
        self.input_units += other.input_units;
        self.output_units += other.output_units;
    }
}

/// A decoded vendor reply in canonical form.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProviderResponse {
    pub assistant_text: String,
    pub tool_calls: Vec<ToolCallRequest>,
    pub usage: Usage,
}

impl ProviderResponse {
    pub fn into_message(self) -> (Message, Usage) {
        (
            Message::Assistant {
                text: self.assistant_text,
                tool_calls: self.tool_calls,
            },
            self.usage,
        )
    }
}
