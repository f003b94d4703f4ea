//! Tool registry and dispatch for the agent system.

use crate::error::{BookMindError, Result};
use crate::session::{ToolCallRequest, ToolResult};
use async_trait::async_trait;
use futures::FutureExt;
use jsonschema::JSONSchema;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

/// Description of a tool offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema of the argument object.
    pub parameters: Value,
}

/// A capability the model may invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema for the argument object.
    fn parameters(&self) -> Value;

    /// Run the tool with validated arguments.
    async fn execute(&self, arguments: &Map<String, Value>) -> Result<Value>;
}

/// Executes tool calls requested by the model.
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    /// Tools offered to the model.
    fn specs(&self) -> Vec<ToolSpec>;

    /// Execute a call.
    ///
    /// Only a lookup miss is an error (`UnknownTool`); anything that goes wrong
    /// while running the tool comes back as an unsuccessful `ToolResult`.
    async fn dispatch(&self, call: &ToolCallRequest) -> Result<ToolResult>;
}

struct RegisteredTool {
    spec: ToolSpec,
    tool: Arc<dyn Tool>,
    validator: JSONSchema,
}

/// Name-keyed set of tools whose schemas were checked at registration.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, rejecting duplicate names and malformed schemas.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.name().to_string();
        if !tool_name_pattern().is_match(&name) {
            return Err(BookMindError::Config(format!("Invalid tool name: '{}'", name)));
        }
        if self.tools.contains_key(&name) {
            return Err(BookMindError::Config(format!("Tool '{}' registered twice", name)));
        }

        let parameters = tool.parameters();
        let validator = compile_schema(&name, &parameters)?;

        let spec = ToolSpec {
            name: name.clone(),
            description: tool.description().to_string(),
            parameters,
        };
        self.tools.insert(
            name,
            RegisteredTool {
                spec,
                tool,
                validator,
            },
        );
        Ok(())
    }

    /// Builder-style registration.
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Result<Self> {
        self.register(tool)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }
}

#[async_trait]
impl ToolDispatcher for ToolRegistry {
    fn specs(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|t| t.spec.clone()).collect()
    }

    async fn dispatch(&self, call: &ToolCallRequest) -> Result<ToolResult> {
        let registered = self
            .tools
            .get(&call.name)
            .ok_or_else(|| BookMindError::UnknownTool(call.name.clone()))?;

        info!("Agent calling tool: {} with args: {}", call.name, call.arguments_json());

        if let Err(reason) = validate_arguments(&registered.validator, &call.arguments) {
            warn!("Rejected arguments for {}: {}", call.name, reason);
            return Ok(ToolResult::failure(call, format!("Invalid arguments: {}", reason)));
        }

        let outcome = AssertUnwindSafe(registered.tool.execute(&call.arguments))
            .catch_unwind()
            .await;

        Ok(match outcome {
            Ok(Ok(payload)) => ToolResult::success(call, payload),
            Ok(Err(e)) => {
                warn!("Tool {} failed: {}", call.name, e);
                ToolResult::failure(call, e.to_string())
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                warn!("Tool {} panicked: {}", call.name, reason);
                ToolResult::failure(call, format!("Tool crashed: {}", reason))
            }
        })
    }
}

/// Function names accepted by OpenAI-compatible APIs.
fn tool_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]{0,63}$").expect("valid regex"))
}

/// Compile a tool's parameter schema. The argument object must be a JSON
/// object and every required key must be declared.
fn compile_schema(name: &str, schema: &Value) -> Result<JSONSchema> {
    let invalid = |reason: String| {
        BookMindError::Config(format!("Invalid parameter schema for tool '{}': {}", name, reason))
    };

    if schema.get("type").and_then(Value::as_str) != Some("object") {
        return Err(invalid("top-level type must be \"object\"".to_string()));
    }

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        let properties = schema.get("properties").and_then(Value::as_object);
        for key in required.iter().filter_map(Value::as_str) {
            if !properties.is_some_and(|props| props.contains_key(key)) {
                return Err(invalid(format!("required property '{}' is not declared", key)));
            }
        }
    }

    JSONSchema::compile(schema).map_err(|e| invalid(e.to_string()))
}

/// Check call arguments against the tool's compiled schema.
fn validate_arguments(
    validator: &JSONSchema,
    arguments: &Map<String, Value>,
) -> std::result::Result<(), String> {
    let instance = Value::Object(arguments.clone());
    validator.validate(&instance).map_err(|errors| {
        errors
            .map(|error| {
                let path = error.instance_path.to_string();
                if path.is_empty() {
                    error.to_string()
                } else {
                    format!("{}: {}", path, error)
                }
            })
            .collect::<Vec<_>>()
            .join("; ")
    })
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
