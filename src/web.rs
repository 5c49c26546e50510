use crate::browser::{Browser, IntentOutcome, LocationSummary, PageSizeUpdate, SessionView};
use crate::config::BrowserConfig;
use crate::error::BrowseError;
use crate::format::PanelContent;
use crate::search::{SearchForm, SearchMode};
use crate::service::{DirectoryService, HttpDirectory};
use crate::view::DisplayMode;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::info;

type SharedState<S> = Arc<AppState<S>>;

pub struct AppState<S> {
    pub browser: Browser<S>,
}

#[derive(Clone)]
pub struct WebConfig {
    pub addr: SocketAddr,
    pub browser: BrowserConfig,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            browser: BrowserConfig::default(),
        }
    }
}

#[derive(Debug)]
pub enum WebError {
    Io(std::io::Error),
    Directory(BrowseError),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::Io(err) => write!(f, "io error: {err}"),
            WebError::Directory(err) => write!(f, "directory client error: {err}"),
        }
    }
}

impl std::error::Error for WebError {}

impl From<std::io::Error> for WebError {
    fn from(value: std::io::Error) -> Self {
        WebError::Io(value)
    }
}

impl From<BrowseError> for WebError {
    fn from(value: BrowseError) -> Self {
        WebError::Directory(value)
    }
}

pub async fn serve(config: WebConfig) -> Result<(), WebError> {
    let directory = HttpDirectory::new(&config.browser)?;
    let state = Arc::new(AppState {
        browser: Browser::new(directory, config.browser.clone()),
    });
    let router = build_router(state);
    info!(
        %config.addr,
        endpoint = %config.browser.endpoint,
        page_size = config.browser.page_size(),
        "Binding HTTP listener"
    );
    let listener = TcpListener::bind(config.addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("HTTP server exited");
    Ok(())
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<BrowseError> for ApiError {
    fn from(err: BrowseError) -> Self {
        let status = match &err {
            BrowseError::Validation { .. } => StatusCode::BAD_REQUEST,
            BrowseError::NotFound(_) => StatusCode::NOT_FOUND,
            BrowseError::Service(_) => StatusCode::BAD_GATEWAY,
            BrowseError::MissingKey => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = json!({ "error": self.message });
        (self.status, Json(payload)).into_response()
    }
}

fn build_router<S: DirectoryService>(state: SharedState<S>) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/api/session", get(api_session::<S>))
        .route("/api/panel", get(api_panel::<S>))
        .route("/api/location", get(api_location::<S>))
        .route("/api/search", post(api_search::<S>))
        .route("/api/search-mode", post(api_search_mode::<S>))
        .route("/api/select", post(api_select::<S>))
        .route("/api/display-mode", post(api_display_mode::<S>))
        .route("/api/page", post(api_page::<S>))
        .route("/api/page-size", post(api_page_size::<S>))
        .route("/api/follow", post(api_follow::<S>))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CompressionLayer::new())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            let _ = stream.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "placename-web" }))
}

#[derive(Debug, Serialize)]
struct IntentResponse {
    outcome: IntentOutcome,
    session: SessionView,
}

impl IntentResponse {
    fn new<S: DirectoryService>(outcome: IntentOutcome, browser: &Browser<S>) -> Json<Self> {
        Json(Self {
            outcome,
            session: browser.snapshot(),
        })
    }
}

#[derive(Debug, Serialize)]
struct PanelResponse {
    mode: DisplayMode,
    panel: Option<PanelContent>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SearchRequest {
    name: Option<String>,
    /// Accepts either a JSON number or the raw text of the year field.
    year: Option<Value>,
    #[serde(rename = "type")]
    kind: Option<String>,
    sys_id: Option<String>,
}

impl SearchRequest {
    fn into_form(self) -> SearchForm {
        let year = match self.year {
            Some(Value::String(text)) => Some(text),
            Some(Value::Number(number)) => Some(number.to_string()),
            _ => None,
        };
        SearchForm {
            name: self.name,
            year,
            kind: self.kind,
            sys_id: self.sys_id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ModeRequest {
    mode: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SelectRequest {
    sys_id: String,
    mode: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PageRequest {
    delta: i64,
}

#[derive(Debug, Deserialize)]
struct PageSizeRequest {
    value: Value,
    #[serde(default)]
    stepper: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FollowRequest {
    sys_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocationParams {
    sys_id: String,
}

fn parse_display_mode(raw: &str) -> Result<DisplayMode, ApiError> {
    raw.parse::<DisplayMode>().map_err(ApiError::bad_request)
}

async fn api_session<S: DirectoryService>(State(state): State<SharedState<S>>) -> Json<SessionView> {
    Json(state.browser.snapshot())
}

async fn api_panel<S: DirectoryService>(State(state): State<SharedState<S>>) -> Json<PanelResponse> {
    let session = state.browser.snapshot();
    Json(PanelResponse {
        mode: session.detail.mode,
        panel: state.browser.panel(),
    })
}

async fn api_location<S: DirectoryService>(
    State(state): State<SharedState<S>>,
    Query(params): Query<LocationParams>,
) -> Result<Json<LocationSummary>, ApiError> {
    let record = state
        .browser
        .snapshot()
        .results
        .find(&params.sys_id)
        .cloned()
        .ok_or_else(|| ApiError::not_found(format!("sysId {:?} is not in the current results", params.sys_id)))?;
    Ok(Json(state.browser.location_summary(&record).await))
}

async fn api_search<S: DirectoryService>(
    State(state): State<SharedState<S>>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<IntentResponse>, ApiError> {
    let outcome = state.browser.submit_search(request.into_form()).await?;
    Ok(IntentResponse::new(outcome, &state.browser))
}

async fn api_search_mode<S: DirectoryService>(
    State(state): State<SharedState<S>>,
    Json(request): Json<ModeRequest>,
) -> Result<Json<SessionView>, ApiError> {
    let mode = request
        .mode
        .parse::<SearchMode>()
        .map_err(ApiError::bad_request)?;
    state.browser.switch_search_mode(mode);
    Ok(Json(state.browser.snapshot()))
}

async fn api_select<S: DirectoryService>(
    State(state): State<SharedState<S>>,
    Json(request): Json<SelectRequest>,
) -> Result<Json<IntentResponse>, ApiError> {
    let mode = match request.mode.as_deref() {
        Some(raw) => parse_display_mode(raw)?,
        None => state.browser.snapshot().detail.mode,
    };
    let outcome = state.browser.select_by_id(&request.sys_id, mode).await?;
    Ok(IntentResponse::new(outcome, &state.browser))
}

async fn api_display_mode<S: DirectoryService>(
    State(state): State<SharedState<S>>,
    Json(request): Json<ModeRequest>,
) -> Result<Json<SessionView>, ApiError> {
    let mode = parse_display_mode(&request.mode)?;
    state.browser.change_display_mode(mode);
    Ok(Json(state.browser.snapshot()))
}

async fn api_page<S: DirectoryService>(
    State(state): State<SharedState<S>>,
    Json(request): Json<PageRequest>,
) -> Result<Json<IntentResponse>, ApiError> {
    let outcome = state.browser.change_page(request.delta).await?;
    Ok(IntentResponse::new(outcome, &state.browser))
}

async fn api_page_size<S: DirectoryService>(
    State(state): State<SharedState<S>>,
    Json(request): Json<PageSizeRequest>,
) -> Result<Json<PageSizeUpdate>, ApiError> {
    let raw = match request.value {
        Value::String(text) => text,
        other => other.to_string(),
    };
    let update = state.browser.change_page_size(&raw, request.stepper).await?;
    Ok(Json(update))
}

async fn api_follow<S: DirectoryService>(
    State(state): State<SharedState<S>>,
    Json(request): Json<FollowRequest>,
) -> Result<Json<IntentResponse>, ApiError> {
    let outcome = state.browser.follow_relation(&request.sys_id).await?;
    Ok(IntentResponse::new(outcome, &state.browser))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::{FakeDirectory, envelope};
    use axum::{body, body::Body, http::Request};
    use tower::ServiceExt;

    fn test_router() -> Router {
        let directory = FakeDirectory::default()
            .with_page("Hanoi", envelope(23, 10, Some(3), Some(1), &["A", "B"]))
            .with_detail("A", json!({"sysId": "A", "nameVn": "Thăng Long"}));
        let state = Arc::new(AppState {
            browser: Browser::new(directory, BrowserConfig::default()),
        });
        build_router(state)
    }

    fn post_json(uri: &str, payload: Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap()
    }

    async fn read_json(response: Response) -> Value {
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let response = test_router()
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_success());
    }

    #[tokio::test]
    async fn search_returns_reconciled_session() {
        let response = test_router()
            .oneshot(post_json("/api/search", json!({"name": "Hanoi", "year": 1800})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let payload = read_json(response).await;
        assert_eq!(payload["outcome"], "applied");
        assert_eq!(payload["session"]["pagination"]["pageCount"], 3);
        assert_eq!(payload["session"]["results"]["records"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failing_search_maps_to_bad_gateway() {
        let response = test_router()
            .oneshot(post_json("/api/search", json!({"name": "Hue"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let payload = read_json(response).await;
        assert_eq!(payload["error"], "connection refused");
    }

    #[tokio::test]
    async fn unknown_modes_are_bad_requests() {
        let response = test_router()
            .oneshot(post_json("/api/search-mode", json!({"mode": "fuzzy"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn follow_then_panel_shows_the_summary() {
        let router = test_router();
        let response = router
            .clone()
            .oneshot(post_json("/api/follow", json!({"sysId": "A"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let payload = read_json(response).await;
        assert_eq!(payload["session"]["searchMode"], "direct");

        let response = router
            .oneshot(Request::get("/api/panel").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let payload = read_json(response).await;
        assert_eq!(payload["mode"], "summary");
        assert_eq!(payload["panel"]["mode"], "summary");
        assert_eq!(payload["panel"]["content"]["title"], "Thăng Long");
    }

    #[tokio::test]
    async fn missing_identifier_is_not_found() {
        let response = test_router()
            .oneshot(post_json("/api/follow", json!({"sysId": "nope"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = test_router()
            .oneshot(post_json("/api/select", json!({"sysId": "A"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn rejected_page_size_reports_the_revert_value() {
        let response = test_router()
            .oneshot(post_json("/api/page-size", json!({"value": "-5"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let payload = read_json(response).await;
        assert_eq!(payload["pageSize"], 10);
        assert_eq!(payload["outcome"], "ignored");
    }
}
