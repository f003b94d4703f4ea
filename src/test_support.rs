//! Shared stubs for unit tests.

use crate::agent::{ModelGateway, ModelRequest, ModelResponse, Tool};
use crate::error::{BookMindError, Result};
use async_trait::async_trait;
use axum::http::StatusCode;
use axum::routing::any;
use axum::{Json, Router};
use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Serve `router` on an ephemeral local port and return its base URL.
pub(crate) async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Serve a fixed JSON body with a fixed status at `path`.
pub(crate) async fn serve_json(path: &str, status: StatusCode, body: Value) -> String {
    let router = Router::new().route(
        path,
        any(move || {
            let body = body.clone();
            async move { (status, Json(body)) }
        }),
    );
    serve(router).await
}

/// Gateway that replays scripted responses, then repeats `fallback` if set.
pub(crate) struct ScriptedGateway {
    script: Mutex<VecDeque<Result<ModelResponse>>>,
    fallback: Option<ModelResponse>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedGateway {
    pub(crate) fn new(script: Vec<Result<ModelResponse>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn repeating(response: ModelResponse) -> Self {
        Self {
            fallback: Some(response),
            ..Self::new(Vec::new())
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub(crate) fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    async fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.script.lock().unwrap().pop_front();
        match (next, &self.fallback) {
            (Some(response), _) => response,
            (None, Some(fallback)) => Ok(fallback.clone()),
            (None, None) => Err(BookMindError::UpstreamError("script exhausted".to_string())),
        }
    }
}

/// Gateway whose calls never complete.
pub(crate) struct PendingGateway;

#[async_trait]
impl ModelGateway for PendingGateway {
    async fn invoke(&self, _request: &ModelRequest) -> Result<ModelResponse> {
        futures::future::pending().await
    }
}

/// Tool returning a fixed payload and counting its invocations.
pub(crate) struct StaticTool {
    name: String,
    payload: Value,
    calls: Arc<AtomicUsize>,
}

impl StaticTool {
    pub(crate) fn new(name: &str, payload: Value) -> Self {
        Self {
            name: name.to_string(),
            payload,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl Tool for StaticTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Returns a fixed payload"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "genre": { "type": "string" } }
        })
    }

    async fn execute(&self, _arguments: &Map<String, Value>) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.payload.clone())
    }
}

/// Build a JSON object argument map.
pub(crate) fn args(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}
