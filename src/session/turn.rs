//! Turns and the tool call/result payloads they carry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
    Tool,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Correlates the call with its result on the wire.
    pub id: String,
    /// Registered tool name.
    pub name: String,
    /// Arguments as a JSON object.
    pub arguments: Map<String, Value>,
}

impl ToolCallRequest {
    /// Create a request with a fresh call id.
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            id: format!("call_{}", Uuid::new_v4().simple()),
            name: name.into(),
            arguments,
        }
    }

    /// Arguments serialized as a JSON string.
    pub fn arguments_json(&self) -> String {
        Value::Object(self.arguments.clone()).to_string()
    }
}

impl std::fmt::Display for ToolCallRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name, self.arguments_json())
    }
}

/// Outcome of a tool execution. Failures are data, not errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub name: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(call: &ToolCallRequest, payload: Value) -> Self {
        Self {
            call_id: call.id.clone(),
            name: call.name.clone(),
            success: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn failure(call: &ToolCallRequest, error: impl Into<String>) -> Self {
        Self {
            call_id: call.id.clone(),
            name: call.name.clone(),
            success: false,
            payload: None,
            error: Some(error.into()),
        }
    }

    /// Text handed back to the model.
    pub fn to_model_content(&self) -> String {
        match (&self.payload, &self.error) {
            (Some(Value::String(text)), _) if self.success => text.clone(),
            (Some(payload), _) if self.success => payload.to_string(),
            (_, Some(error)) => format!("Tool error: {}", error),
            _ => "Tool error: no output".to_string(),
        }
    }
}

/// One message or event in a session. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCallRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolResult>,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content.into(), None, None)
    }

    pub fn agent(content: impl Into<String>) -> Self {
        Self::new(Role::Agent, content.into(), None, None)
    }

    /// An agent turn recording a tool call.
    pub fn tool_call(call: ToolCallRequest) -> Self {
        Self::new(Role::Agent, call.to_string(), Some(call), None)
    }

    pub fn tool_result(result: ToolResult) -> Self {
        Self::new(Role::Tool, result.to_model_content(), None, Some(result))
    }

    fn new(
        role: Role,
        content: String,
        tool_call: Option<ToolCallRequest>,
        tool_result: Option<ToolResult>,
    ) -> Self {
        Self {
            role,
            content,
            tool_call,
            tool_result,
            created_at: Utc::now(),
        }
    }

    pub fn is_tool_call(&self) -> bool {
        self.tool_call.is_some()
    }

    pub fn is_tool_result(&self) -> bool {
        self.tool_result.is_some()
    }
}
