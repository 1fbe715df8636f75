use serde::{Deserialize, Serialize};

/// A tool the model may call: name, human description, JSON-schema parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameter_schema: serde_json::Value,
}

impl ToolDescriptor {
    pub fn new(name: &str, description: &str, parameter_schema: serde_json::Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameter_schema,
        }
    }
}
