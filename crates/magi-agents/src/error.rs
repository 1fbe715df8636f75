use magi_models::ConversationError;
use thiserror::Error;

use crate::providers::ProviderError;

/// Failure talking to the brokerage, statistics, or notification collaborator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollaboratorError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for CollaboratorError {
    fn from(err: reqwest::Error) -> Self {
        CollaboratorError::Http(err.to_string())
    }
}

/// A durability write that did not land. Logged by callers, never fatal.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("persistence failure on {table}: {message}")]
pub struct PersistenceError {
    pub table: String,
    pub message: String,
}

impl PersistenceError {
    pub fn new(table: &str, message: impl Into<String>) -> Self {
        Self {
            table: table.to_string(),
            message: message.into(),
        }
    }
}

/// Errors that end an agent run in the `Failed` state.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Conversation error: {0}")]
    Conversation(#[from] ConversationError),

    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
