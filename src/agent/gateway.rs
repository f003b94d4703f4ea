//! Model gateway: the only component that talks to the hosted model.

use super::tools::ToolSpec;
use crate::config::ModelSettings;
use crate::error::{BookMindError, Result};
use crate::http::create_client_with_timeout;
use crate::session::{Role, ToolCallRequest, ToolResult, Turn};
use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
    ChatCompletionTool, ChatCompletionToolType, CreateChatCompletionRequest,
    CreateChatCompletionRequestArgs, CreateChatCompletionResponse, FunctionCall, FunctionObject,
    ResponseFormat, ResponseFormatJsonSchema,
};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

/// Longest slice of an upstream error body kept in error messages.
const MAX_ERROR_BODY_CHARS: usize = 500;

/// A message in a model request. Unlike `Turn`, carries no timestamps.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelMessage {
    User(String),
    Agent(String),
    ToolCall(ToolCallRequest),
    ToolResult(ToolResult),
}

impl From<&Turn> for ModelMessage {
    fn from(turn: &Turn) -> Self {
        if let Some(call) = &turn.tool_call {
            return ModelMessage::ToolCall(call.clone());
        }
        if let Some(result) = &turn.tool_result {
            return ModelMessage::ToolResult(result.clone());
        }
        match turn.role {
            Role::Agent => ModelMessage::Agent(turn.content.clone()),
            Role::User | Role::Tool => ModelMessage::User(turn.content.clone()),
        }
    }
}

/// JSON schema the model's final answer must match.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSchema {
    pub name: String,
    pub description: Option<String>,
    pub schema: Value,
}

/// Everything the model sees in one call.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub system_instruction: String,
    pub messages: Vec<ModelMessage>,
    pub tools: Vec<ToolSpec>,
    pub response_schema: Option<ResponseSchema>,
}

impl ModelRequest {
    /// Constrain the final answer to a JSON schema.
    pub fn with_response_schema(mut self, schema: ResponseSchema) -> Self {
        self.response_schema = Some(schema);
        self
    }
}

/// What the model decided to do.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelResponse {
    FinalAnswer(String),
    ToolCall(ToolCallRequest),
}

/// Sends requests to the hosted model.
///
/// Failures are `UpstreamUnavailable` when repeating the call may help and
/// `UpstreamError` when it cannot.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse>;
}

/// Gateway for OpenAI-compatible chat completion APIs, Gemini included.
pub struct OpenAiCompatGateway {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiCompatGateway {
    /// Create a gateway, reading the API key from the environment.
    pub fn new(settings: &ModelSettings) -> Result<Self> {
        let api_key = settings.api_key()?;
        Self::with_api_key(settings, api_key)
    }

    /// Create a gateway with an explicit API key.
    pub fn with_api_key(settings: &ModelSettings, api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: create_client_with_timeout(settings.timeout())?,
            endpoint: format!("{}/chat/completions", settings.api_base.trim_end_matches('/')),
            api_key: api_key.into(),
            model: settings.model.clone(),
            temperature: settings.temperature,
        })
    }

    fn to_chat_request(&self, request: &ModelRequest) -> Result<CreateChatCompletionRequest> {
        let mut messages: Vec<ChatCompletionRequestMessage> =
            Vec::with_capacity(request.messages.len() + 1);

        if !request.system_instruction.is_empty() {
            messages.push(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(request.system_instruction.clone())
                    .build()
                    .map_err(build_error)?
                    .into(),
            );
        }

        for message in &request.messages {
            let converted: ChatCompletionRequestMessage = match message {
                ModelMessage::User(text) => ChatCompletionRequestUserMessageArgs::default()
                    .content(text.clone())
                    .build()
                    .map_err(build_error)?
                    .into(),
                ModelMessage::Agent(text) => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(text.clone())
                    .build()
                    .map_err(build_error)?
                    .into(),
                ModelMessage::ToolCall(call) => ChatCompletionRequestAssistantMessageArgs::default()
                    .tool_calls(vec![ChatCompletionMessageToolCall {
                        id: call.id.clone(),
                        r#type: ChatCompletionToolType::Function,
                        function: FunctionCall {
                            name: call.name.clone(),
                            arguments: call.arguments_json(),
                        },
                    }])
                    .build()
                    .map_err(build_error)?
                    .into(),
                ModelMessage::ToolResult(result) => ChatCompletionRequestToolMessageArgs::default()
                    .tool_call_id(result.call_id.clone())
                    .content(result.to_model_content())
                    .build()
                    .map_err(build_error)?
                    .into(),
            };
            messages.push(converted);
        }

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model)
            .messages(messages)
            .temperature(self.temperature);

        if !request.tools.is_empty() {
            args.tools(request.tools.iter().map(tool_definition).collect::<Vec<_>>());
        }

        if let Some(schema) = &request.response_schema {
            args.response_format(ResponseFormat::JsonSchema {
                json_schema: ResponseFormatJsonSchema {
                    name: schema.name.clone(),
                    description: schema.description.clone(),
                    schema: Some(schema.schema.clone()),
                    strict: None,
                },
            });
        }

        args.build().map_err(build_error)
    }
}

#[async_trait]
impl ModelGateway for OpenAiCompatGateway {
    #[instrument(
        skip(self, request),
        fields(model = %self.model, messages = request.messages.len())
    )]
    async fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse> {
        let body = self.to_chat_request(request)?;

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BookMindError::UpstreamUnavailable(format!("transport failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_string());
            return Err(classify_status(status, &body));
        }

        let completion: CreateChatCompletionResponse = response.json().await.map_err(|e| {
            if e.is_decode() {
                BookMindError::UpstreamError(format!("malformed response: {}", e))
            } else {
                BookMindError::UpstreamUnavailable(format!("response read failed: {}", e))
            }
        })?;

        if let Some(usage) = &completion.usage {
            debug!(
                "Model usage: {} prompt + {} completion tokens",
                usage.prompt_tokens, usage.completion_tokens
            );
        }

        parse_completion(completion)
    }
}

/// Map a non-success HTTP status to the retryable / non-retryable split.
fn classify_status(status: StatusCode, body: &str) -> BookMindError {
    let body: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    let message = format!("HTTP {}: {}", status.as_u16(), body);
    match status.as_u16() {
        408 | 429 | 500..=599 => BookMindError::UpstreamUnavailable(message),
        _ => BookMindError::UpstreamError(message),
    }
}

fn parse_completion(completion: CreateChatCompletionResponse) -> Result<ModelResponse> {
    let choice = completion
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| BookMindError::UpstreamError("No choices in model response".to_string()))?;

    let tool_calls = choice.message.tool_calls.unwrap_or_default();
    if let Some(first) = tool_calls.first() {
        if tool_calls.len() > 1 {
            warn!(
                "Model requested {} tool calls at once; only '{}' will run",
                tool_calls.len(),
                first.function.name
            );
        }
        let arguments = parse_arguments(&first.function.arguments)?;
        let mut call = ToolCallRequest::new(first.function.name.clone(), arguments);
        if !first.id.is_empty() {
            call.id = first.id.clone();
        }
        return Ok(ModelResponse::ToolCall(call));
    }

    match choice.message.content {
        Some(text) if !text.trim().is_empty() => Ok(ModelResponse::FinalAnswer(text)),
        _ => Err(BookMindError::UpstreamError(
            "Model returned neither text nor a tool call".to_string(),
        )),
    }
}

fn parse_arguments(raw: &str) -> Result<Map<String, Value>> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(BookMindError::UpstreamError(
            "Tool arguments are not a JSON object".to_string(),
        )),
        Err(e) => Err(BookMindError::UpstreamError(format!("Invalid tool arguments: {}", e))),
    }
}

fn tool_definition(spec: &ToolSpec) -> ChatCompletionTool {
    ChatCompletionTool {
        r#type: ChatCompletionToolType::Function,
        function: FunctionObject {
            name: spec.name.clone(),
            description: Some(spec.description.clone()),
            parameters: Some(spec.parameters.clone()),
            strict: None,
        },
    }
}

fn build_error(e: impl std::fmt::Display) -> BookMindError {
    BookMindError::UpstreamError(format!("Failed to build model request: {}", e))
}
