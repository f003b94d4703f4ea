//! HTTP API server.
//!
//! Exposes the agent, the recommender and the book catalog as REST endpoints.

use crate::agent::{ModelGateway, OpenAiCompatGateway};
use crate::catalog::{CatalogSearch, OpenLibraryClient};
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::error::BookMindError;
use crate::orchestrator::Orchestrator;
use crate::recommend::{RecommendationList, Recommender};
use crate::session::{Session, SessionStore};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, FromRequestParts, Path, State,
    },
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::{debug, error, info, warn};

/// Shared application state.
pub struct AppState {
    orchestrator: Orchestrator,
    recommender: Recommender,
    catalog: Arc<OpenLibraryClient>,
}

impl AppState {
    pub fn new(
        orchestrator: Orchestrator,
        recommender: Recommender,
        catalog: Arc<OpenLibraryClient>,
    ) -> Self {
        Self {
            orchestrator,
            recommender,
            catalog,
        }
    }
}

/// Run the HTTP API server.
pub async fn run_serve(
    host: Option<String>,
    port: Option<u16>,
    settings: Settings,
) -> anyhow::Result<()> {
    if let Err(e) = preflight::check(Operation::Model, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let gateway: Arc<dyn ModelGateway> = Arc::new(OpenAiCompatGateway::new(&settings.model)?);
    let catalog = Arc::new(OpenLibraryClient::new(&settings.catalog)?);
    let orchestrator = Orchestrator::new(&settings, gateway.clone(), catalog.clone())?;
    let recommender = Recommender::new(&settings, gateway, catalog.clone())?;

    let sweeper = spawn_sweeper(
        orchestrator.store(),
        settings.sessions.idle_timeout(),
        settings.sessions.sweep_interval(),
    );

    let state = Arc::new(AppState::new(orchestrator, recommender, catalog));
    let app = router(state, &settings.server.cors_origins);

    let host = host.unwrap_or_else(|| settings.server.host.clone());
    let port = port.unwrap_or(settings.server.port);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("BookMind API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    Output::kv("Model", &settings.model.model);
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET    /health");
    Output::kv("Chat", "POST   /chat");
    Output::kv("Session", "GET    /sessions/{id}");
    Output::kv("End session", "DELETE /sessions/{id}");
    Output::kv("Recommend", "POST   /books/recommendations");
    Output::kv("Search", "GET    /books/search?title=&author=");
    Output::kv("Cover", "GET    /books/covers?title=&author=");
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    axum::serve(listener, app).await?;
    sweeper.abort();

    Ok(())
}

/// Build the API router.
pub fn router(state: Arc<AppState>, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/chat", post(chat))
        .route("/sessions/{session_id}", get(get_session).delete(delete_session))
        .route("/books/recommendations", post(recommendations))
        .route("/books/search", get(search_books))
        .route("/books/covers", get(book_cover))
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

/// Credentialed CORS. Wildcards cannot be combined with credentials, so
/// methods and headers are mirrored from the preflight, and a `*` origin
/// mirrors the caller's origin.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request());

    if origins.iter().any(|o| o == "*") {
        return cors.allow_origin(AllowOrigin::mirror_request());
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(allowed))
}

/// Periodically drop sessions that have been idle too long.
pub fn spawn_sweeper(
    store: Arc<SessionStore>,
    idle_timeout: Duration,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let evicted = store.evict_idle(idle_timeout).await;
            if evicted > 0 {
                debug!("Sweeper removed {} session(s)", evicted);
            }
        }
    })
}

// === Extractors ===

/// JSON body extractor whose rejections use the API error format.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
struct ApiJson<T>(T);

/// Query string extractor whose rejections use the API error format.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
struct ApiQuery<T>(T);

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        debug!("Rejected request body: {}", rejection.body_text());
        let message = match rejection {
            JsonRejection::JsonDataError(_) => {
                "Request body is missing a field or has a field of the wrong type"
            }
            JsonRejection::JsonSyntaxError(_) => "Request body is not valid JSON",
            JsonRejection::MissingJsonContentType(_) => "Content-Type must be application/json",
            _ => "Invalid request body",
        };
        Self(BookMindError::InvalidInput(message.to_string()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        debug!("Rejected query string: {}", rejection.body_text());
        Self(BookMindError::InvalidInput("Invalid query string".to_string()))
    }
}

// === Request/Response Types ===

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    session_id: Option<String>,
    message: String,
}

#[derive(Serialize)]
struct ChatResponse {
    session_id: String,
    reply: String,
    steps: usize,
}

#[derive(Deserialize)]
struct RecommendationRequest {
    prompt: String,
}

#[derive(Deserialize)]
struct BookQuery {
    title: Option<String>,
    author: Option<String>,
}

#[derive(Serialize)]
struct CoverResponse {
    title: String,
    author: String,
    cover_url: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    kind: &'static str,
    message: String,
}

/// A failed request, rendered as `{"error": {"kind", "message"}}`.
struct ApiError(BookMindError);

impl From<BookMindError> for ApiError {
    fn from(error: BookMindError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            error!("Request failed with {}: {}", status, self.0);
        } else {
            debug!("Request rejected with {}: {}", status, self.0);
        }

        let body = ErrorResponse {
            error: ErrorBody {
                kind: self.0.kind(),
                message: self.0.public_message(),
            },
        };
        (status, Json(body)).into_response()
    }
}

fn status_for(error: &BookMindError) -> StatusCode {
    match error {
        BookMindError::UnknownSession(_) => StatusCode::NOT_FOUND,
        BookMindError::UnknownTool(_) | BookMindError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        BookMindError::UpstreamUnavailable(_) | BookMindError::CatalogUnavailable(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        BookMindError::UpstreamError(_) | BookMindError::StepBudgetExceeded(_) => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// === Handlers ===

async fn root() -> impl IntoResponse {
    Json(serde_json::json!({ "message": "Welcome to the Book Library API" }))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn chat(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let response = state
        .orchestrator
        .run(req.session_id.as_deref(), &req.message)
        .await?;

    info!(
        "Session {} answered in {} step(s)",
        response.session_id, response.steps
    );
    Ok(Json(ChatResponse {
        session_id: response.session_id,
        reply: response.text,
        steps: response.steps,
    }))
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    Ok(Json(state.orchestrator.store().get(&session_id).await?))
}

async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.orchestrator.store().delete(&session_id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(BookMindError::UnknownSession(session_id).into())
    }
}

async fn recommendations(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<RecommendationRequest>,
) -> Result<Json<RecommendationList>, ApiError> {
    Ok(Json(state.recommender.recommend(&req.prompt).await?))
}

async fn search_books(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<BookQuery>,
) -> Result<Json<CatalogSearch>, ApiError> {
    let title = non_blank(query.title.as_deref());
    let author = non_blank(query.author.as_deref());
    if title.is_none() && author.is_none() {
        return Err(BookMindError::InvalidInput(
            "Please provide at least a title or author".to_string(),
        )
        .into());
    }

    Ok(Json(state.catalog.search(title, author).await?))
}

async fn book_cover(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<BookQuery>,
) -> Result<Json<CoverResponse>, ApiError> {
    let title = non_blank(query.title.as_deref())
        .ok_or_else(|| BookMindError::InvalidInput("Please provide a title".to_string()))?;
    let author = non_blank(query.author.as_deref()).unwrap_or("");

    let cover_url = state.catalog.lookup_cover(title, author).await;
    Ok(Json(CoverResponse {
        title: title.to_string(),
        author: author.to_string(),
        cover_url,
    }))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
