//! Agent orchestrator for BookMind.
//!
//! Drives one exchange: assemble a request, invoke the model, dispatch any
//! requested tool, and repeat until the model answers or the step budget runs
//! out. Turns produced by the exchange are committed to the session all at once.

use crate::agent::{
    retry_with_backoff, ModelGateway, ModelResponse, OpenAiCompatGateway, PromptAssembler,
    RetryPolicy, ToolDispatcher, ToolRegistry,
};
use crate::catalog::{register_book_tools, OpenLibraryClient};
use crate::config::{AgentSettings, Prompts, Settings};
use crate::error::{BookMindError, Result};
use crate::session::{SessionStore, Turn};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Phase of a single exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Assembling,
    Invoking,
    Dispatching,
    Done,
    Failed,
}

/// Result of a completed exchange.
#[derive(Debug, Clone, Serialize)]
pub struct AgentResponse {
    pub session_id: String,
    /// The model's final answer.
    pub text: String,
    /// Every turn the exchange appended, in order.
    pub turns: Vec<Turn>,
    /// Tool dispatches used.
    pub steps: usize,
}

/// The agent loop, shared by the HTTP server and the CLI.
pub struct Orchestrator {
    store: Arc<SessionStore>,
    assembler: PromptAssembler,
    gateway: Arc<dyn ModelGateway>,
    dispatcher: Arc<dyn ToolDispatcher>,
    max_steps: usize,
    retry: RetryPolicy,
}

impl Orchestrator {
    /// Create an orchestrator with the built-in book tools and a fresh session store.
    pub fn new(
        settings: &Settings,
        gateway: Arc<dyn ModelGateway>,
        catalog: Arc<OpenLibraryClient>,
    ) -> Result<Self> {
        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;

        let mut registry = ToolRegistry::new();
        register_book_tools(&mut registry, catalog)?;
        info!("Registered {} tool(s)", registry.len());

        Ok(Self::with_components(
            Arc::new(SessionStore::new()),
            gateway,
            Arc::new(registry),
            prompts.agent_system(),
            &settings.agent,
        ))
    }

    /// Create an orchestrator that talks to the configured hosted model.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let gateway = Arc::new(OpenAiCompatGateway::new(&settings.model)?);
        let catalog = Arc::new(OpenLibraryClient::new(&settings.catalog)?);
        Self::new(settings, gateway, catalog)
    }

    /// Create an orchestrator with custom components.
    pub fn with_components(
        store: Arc<SessionStore>,
        gateway: Arc<dyn ModelGateway>,
        dispatcher: Arc<dyn ToolDispatcher>,
        system_instruction: impl Into<String>,
        settings: &AgentSettings,
    ) -> Self {
        let assembler = PromptAssembler::new(system_instruction, settings.max_context_turns)
            .with_tools(dispatcher.specs());

        Self {
            store,
            assembler,
            gateway,
            dispatcher,
            max_steps: settings.max_steps,
            retry: RetryPolicy::from(settings),
        }
    }

    /// Get the session store.
    pub fn store(&self) -> Arc<SessionStore> {
        self.store.clone()
    }

    /// Run one exchange in `session_id`, creating the session if needed.
    ///
    /// Exchanges on the same session run one at a time. If the exchange fails
    /// or its future is dropped, the session is left untouched.
    #[instrument(skip(self, session_id, message), fields(session_id = tracing::field::Empty))]
    pub async fn run(&self, session_id: Option<&str>, message: &str) -> Result<AgentResponse> {
        if message.trim().is_empty() {
            return Err(BookMindError::InvalidInput("message must not be empty".to_string()));
        }

        let session_id = match session_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().to_string(),
        };
        tracing::Span::current().record("session_id", session_id.as_str());

        let (handle, mut session) = self.store.lock_or_create(&session_id).await;

        let user_turn = Turn::user(message);
        let mut exchange: Vec<Turn> = Vec::new();
        let mut steps = 0;
        let mut state = ExchangeState::Assembling;

        let outcome: Result<String> = loop {
            let request = self
                .assembler
                .build_continuation(&session, message, &exchange);

            transition(&mut state, ExchangeState::Invoking, steps);
            let response =
                match retry_with_backoff(self.retry, || self.gateway.invoke(&request)).await {
                    Ok(response) => response,
                    Err(e) => break Err(e),
                };

            match response {
                ModelResponse::FinalAnswer(text) => break Ok(text),
                ModelResponse::ToolCall(call) => {
                    if steps >= self.max_steps {
                        break Err(BookMindError::StepBudgetExceeded(self.max_steps));
                    }
                    steps += 1;

                    transition(&mut state, ExchangeState::Dispatching, steps);
                    let result = match self.dispatcher.dispatch(&call).await {
                        Ok(result) => result,
                        Err(e) => break Err(e),
                    };
                    exchange.push(Turn::tool_call(call));
                    exchange.push(Turn::tool_result(result));
                }
            }
        };

        let text = match outcome {
            Ok(text) => text,
            Err(e) => {
                transition(&mut state, ExchangeState::Failed, steps);
                warn!("Exchange failed after {} step(s): {}", steps, e);
                return Err(e);
            }
        };

        let mut turns = Vec::with_capacity(exchange.len() + 2);
        turns.push(user_turn);
        turns.extend(exchange);
        turns.push(Turn::agent(text.clone()));

        self.store.commit(&handle, &mut session, turns.clone()).await?;
        transition(&mut state, ExchangeState::Done, steps);
        info!("Exchange completed in {} step(s)", steps);

        Ok(AgentResponse {
            session_id,
            text,
            turns,
            steps,
        })
    }
}

fn transition(state: &mut ExchangeState, next: ExchangeState, steps: usize) {
    debug!("Exchange {:?} -> {:?} (step {})", state, next, steps);
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{ModelMessage, ModelRequest, Tool};
    use crate::session::{Role, ToolCallRequest};
    use crate::test_support::{args, PendingGateway, ScriptedGateway, StaticTool};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn agent_settings(max_steps: usize, max_retries: usize) -> AgentSettings {
        AgentSettings {
            max_steps,
            max_retries,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            max_context_turns: 40,
        }
    }

    fn no_tools() -> Arc<ToolRegistry> {
        Arc::new(ToolRegistry::new())
    }

    fn registry_with(tool: StaticTool) -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(tool)).unwrap();
        Arc::new(registry)
    }

    fn orchestrator(
        gateway: Arc<dyn ModelGateway>,
        dispatcher: Arc<dyn ToolDispatcher>,
        settings: AgentSettings,
    ) -> Orchestrator {
        Orchestrator::with_components(
            Arc::new(SessionStore::new()),
            gateway,
            dispatcher,
            "You recommend books.",
            &settings,
        )
    }

    fn search_call() -> ModelResponse {
        ModelResponse::ToolCall(ToolCallRequest::new(
            "search_catalog",
            args(json!({"genre": "scifi"})),
        ))
    }

    /// Answers with the latest user message, yielding first so exchanges
    /// have a chance to interleave.
    struct EchoGateway;

    #[async_trait]
    impl ModelGateway for EchoGateway {
        async fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse> {
            tokio::task::yield_now().await;
            let last_user = request
                .messages
                .iter()
                .rev()
                .find_map(|m| match m {
                    ModelMessage::User(text) => Some(text.clone()),
                    _ => None,
                })
                .unwrap_or_default();
            if last_user == "block" {
                futures::future::pending::<()>().await;
            }
            Ok(ModelResponse::FinalAnswer(format!("re: {}", last_user)))
        }
    }

    #[tokio::test]
    async fn test_direct_answer() {
        let gateway = Arc::new(ScriptedGateway::new(vec![Ok(ModelResponse::FinalAnswer(
            "Dune".to_string(),
        ))]));
        let orchestrator = orchestrator(
            gateway.clone(),
            Arc::new(ToolRegistry::new()),
            agent_settings(5, 0),
        );

        let response = orchestrator
            .run(Some("s1"), "recommend a sci-fi book")
            .await
            .unwrap();
        assert_eq!(response.text, "Dune");
        assert_eq!(response.session_id, "s1");
        assert_eq!(response.steps, 0);

        let session = orchestrator.store().get("s1").await.unwrap();
        let roles: Vec<_> = session.turns().iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Agent]);
        assert_eq!(session.turns()[0].content, "recommend a sci-fi book");
        assert_eq!(session.turns()[1].content, "Dune");
    }

    #[tokio::test]
    async fn test_tool_round_trip() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            Ok(search_call()),
            Ok(ModelResponse::FinalAnswer("Dune".to_string())),
        ]));
        let tool = StaticTool::new("search_catalog", json!("Dune"));
        let counter = tool.counter();
        let orchestrator = orchestrator(gateway.clone(), registry_with(tool), agent_settings(5, 0));

        let response = orchestrator
            .run(Some("s1"), "recommend a sci-fi book")
            .await
            .unwrap();
        assert_eq!(response.text, "Dune");
        assert_eq!(response.steps, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let session = orchestrator.store().get("s1").await.unwrap();
        let turns = session.turns();
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[0].role, Role::User);
        assert!(turns[1].is_tool_call());
        assert_eq!(turns[1].tool_call.as_ref().unwrap().arguments["genre"], "scifi");
        let result = turns[2].tool_result.as_ref().unwrap();
        assert!(result.success);
        assert_eq!(result.payload, Some(json!("Dune")));
        assert_eq!(turns[3].role, Role::Agent);
        assert_eq!(turns[3].content, "Dune");
        assert_eq!(response.turns, turns.to_vec());

        // The follow-up call saw the tool call and its result.
        let second = &gateway.requests()[1];
        assert!(matches!(second.messages[1], ModelMessage::ToolCall(_)));
        assert!(matches!(second.messages[2], ModelMessage::ToolResult(_)));
        assert_eq!(second.tools.len(), 1);
    }

    #[tokio::test]
    async fn test_step_budget_exceeded() {
        let gateway = Arc::new(ScriptedGateway::repeating(search_call()));
        let tool = StaticTool::new("search_catalog", json!("more"));
        let counter = tool.counter();
        let orchestrator = orchestrator(gateway.clone(), registry_with(tool), agent_settings(3, 0));

        let err = orchestrator.run(Some("s1"), "loop forever").await.unwrap_err();
        assert!(matches!(err, BookMindError::StepBudgetExceeded(3)));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(gateway.calls(), 4);
        assert!(orchestrator.store().get("s1").await.unwrap().turns().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_tool_surfaces() {
        let gateway = Arc::new(ScriptedGateway::new(vec![Ok(ModelResponse::ToolCall(
            ToolCallRequest::new("summon_dragon", args(json!({}))),
        ))]));
        let orchestrator = orchestrator(gateway, no_tools(), agent_settings(5, 0));

        let err = orchestrator.run(Some("s1"), "hi").await.unwrap_err();
        assert!(matches!(err, BookMindError::UnknownTool(name) if name == "summon_dragon"));
        assert!(orchestrator.store().get("s1").await.unwrap().turns().is_empty());
    }

    #[tokio::test]
    async fn test_failing_tool_is_fed_back() {
        struct BrokenSearch;

        #[async_trait]
        impl Tool for BrokenSearch {
            fn name(&self) -> &str {
                "search_catalog"
            }
            fn description(&self) -> &str {
                "Broken"
            }
            fn parameters(&self) -> serde_json::Value {
                json!({"type": "object", "properties": {"genre": {"type": "string"}}})
            }
            async fn execute(
                &self,
                _arguments: &serde_json::Map<String, serde_json::Value>,
            ) -> Result<serde_json::Value> {
                Err(BookMindError::CatalogUnavailable("timeout".to_string()))
            }
        }

        let gateway = Arc::new(ScriptedGateway::new(vec![
            Ok(search_call()),
            Ok(ModelResponse::FinalAnswer("Try Dune.".to_string())),
        ]));
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(BrokenSearch)).unwrap();
        let orchestrator = orchestrator(gateway, Arc::new(registry), agent_settings(5, 0));

        let response = orchestrator.run(Some("s1"), "sci-fi?").await.unwrap();
        assert_eq!(response.text, "Try Dune.");
        let result = response.turns[2].tool_result.as_ref().unwrap();
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_retries_unavailable_upstream() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            Err(BookMindError::UpstreamUnavailable("503".to_string())),
            Err(BookMindError::UpstreamUnavailable("503".to_string())),
            Ok(ModelResponse::FinalAnswer("Dune".to_string())),
        ]));
        let orchestrator = orchestrator(gateway.clone(), no_tools(), agent_settings(5, 2));

        let response = orchestrator.run(Some("s1"), "hi").await.unwrap();
        assert_eq!(response.text, "Dune");
        assert_eq!(gateway.calls(), 3);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_fails() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            Err(BookMindError::UpstreamUnavailable("503".to_string())),
            Err(BookMindError::UpstreamUnavailable("503".to_string())),
            Ok(ModelResponse::FinalAnswer("too late".to_string())),
        ]));
        let orchestrator = orchestrator(gateway.clone(), no_tools(), agent_settings(5, 1));

        let err = orchestrator.run(Some("s1"), "hi").await.unwrap_err();
        assert!(matches!(err, BookMindError::UpstreamUnavailable(_)));
        assert_eq!(gateway.calls(), 2);
    }

    #[tokio::test]
    async fn test_upstream_error_not_retried() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            Err(BookMindError::UpstreamError("400".to_string())),
            Ok(ModelResponse::FinalAnswer("unreachable".to_string())),
        ]));
        let orchestrator = orchestrator(gateway.clone(), no_tools(), agent_settings(5, 3));

        let err = orchestrator.run(Some("s1"), "hi").await.unwrap_err();
        assert!(matches!(err, BookMindError::UpstreamError(_)));
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_exchange_leaves_no_turns() {
        let orchestrator = orchestrator(
            Arc::new(PendingGateway),
            Arc::new(ToolRegistry::new()),
            agent_settings(5, 0),
        );

        let outcome = tokio::time::timeout(
            Duration::from_millis(50),
            orchestrator.run(Some("s1"), "hello?"),
        )
        .await;
        assert!(outcome.is_err());

        let session = orchestrator.store().get("s1").await.unwrap();
        assert!(session.turns().is_empty());
    }

    #[tokio::test]
    async fn test_sequential_exchanges_keep_order() {
        let orchestrator = orchestrator(Arc::new(EchoGateway), no_tools(), agent_settings(5, 0));
        for message in ["one", "two", "three"] {
            orchestrator.run(Some("s1"), message).await.unwrap();
        }

        let session = orchestrator.store().get("s1").await.unwrap();
        let contents: Vec<_> = session.turns().iter().map(|t| t.content.as_str()).collect();
        assert_eq!(
            contents,
            vec!["one", "re: one", "two", "re: two", "three", "re: three"]
        );
    }

    #[tokio::test]
    async fn test_concurrent_exchanges_on_one_session_serialize() {
        let orchestrator = Arc::new(orchestrator(
            Arc::new(EchoGateway),
            Arc::new(ToolRegistry::new()),
            agent_settings(5, 0),
        ));

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let orchestrator = orchestrator.clone();
                tokio::spawn(async move {
                    orchestrator.run(Some("shared"), &format!("m{}", i)).await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let session = orchestrator.store().get("shared").await.unwrap();
        let turns = session.turns();
        assert_eq!(turns.len(), 32);
        for pair in turns.chunks(2) {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[1].content, format!("re: {}", pair[0].content));
        }
    }

    #[tokio::test]
    async fn test_sessions_do_not_block_each_other() {
        let orchestrator = Arc::new(orchestrator(
            Arc::new(EchoGateway),
            Arc::new(ToolRegistry::new()),
            agent_settings(5, 0),
        ));

        let blocked = orchestrator.clone();
        let stuck = tokio::spawn(async move { blocked.run(Some("a"), "block").await });

        let response = tokio::time::timeout(
            Duration::from_secs(2),
            orchestrator.run(Some("b"), "hello"),
        )
        .await
        .expect("session b must not wait for session a")
        .unwrap();
        assert_eq!(response.text, "re: hello");
        stuck.abort();
    }

    #[tokio::test]
    async fn test_generates_session_id() {
        let orchestrator = orchestrator(Arc::new(EchoGateway), no_tools(), agent_settings(5, 0));
        let response = orchestrator.run(None, "hi").await.unwrap();
        assert!(Uuid::parse_str(&response.session_id).is_ok());
        assert_eq!(
            orchestrator.store().get(&response.session_id).await.unwrap().turns().len(),
            2
        );
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let orchestrator = orchestrator(Arc::new(EchoGateway), no_tools(), agent_settings(5, 0));
        let err = orchestrator.run(Some("s1"), "   ").await.unwrap_err();
        assert!(matches!(err, BookMindError::InvalidInput(_)));
        assert!(orchestrator.store().is_empty().await);
    }
}
