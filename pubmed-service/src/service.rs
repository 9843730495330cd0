use axum::{
    Extension, Router,
    extract::{
        DefaultBodyLimit, Multipart, State, multipart::MultipartRejection,
        rejection::JsonRejection,
    },
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use pubmed_flow::{
    Feature, FlowError, IntentParams, IntentRunner, Normalized, ProcessInvoker, RequestIntent,
    TokioProcessInvoker, envelope::normalize_error,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{info, warn};

use crate::{
    auth::{AuthenticatedUser, require_authorization},
    config::{ConfigError, DOWNLOAD_ROUTE, ServiceConfig},
    models::{HealthResponse, read_translate_form},
};

type JsonParams = Result<Json<IntentParams>, JsonRejection>;

#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<IntentRunner>,
    pub config: Arc<ServiceConfig>,
}

impl AppState {
    pub fn new(
        config: ServiceConfig,
        invoker: Arc<dyn ProcessInvoker>,
    ) -> Result<Self, ConfigError> {
        let runner = config.build_runner(invoker)?;
        Ok(Self {
            runner: Arc::new(runner),
            config: Arc::new(config),
        })
    }
}

/// Renders a normalized result with its status code.
pub struct EnvelopeResponse(pub Normalized);

impl IntoResponse for EnvelopeResponse {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0.envelope)).into_response()
    }
}

pub async fn create_app(config: ServiceConfig) -> Result<Router, ConfigError> {
    let state = AppState::new(config, Arc::new(TokioProcessInvoker::new()))?;

    if let Err(e) = state.runner.cache().ensure_dir().await {
        warn!("Download directory is not ready yet: {}", e);
    }

    Ok(build_router(state))
}

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/search", post(search))
        .route("/advanced-search", post(advanced_search))
        .route("/details", post(details))
        .route(
            "/translate",
            post(translate).layer(DefaultBodyLimit::max(state.config.max_upload_bytes)),
        )
        .route("/download", post(download))
        .route("/resolve", post(resolve))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_authorization,
        ));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .nest("/api", api)
        .nest_service(DOWNLOAD_ROUTE, ServeDir::new(&state.config.download_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "PubMed Literature Service",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Search, inspect, translate and download PubMed literature",
        "endpoints": {
            "POST /api/search": "Search PubMed and return matching PMIDs",
            "POST /api/advanced-search": "Search with journal, author, year and keyword filters",
            "POST /api/details": "Fetch article details for a PMID",
            "POST /api/translate": "Translate an uploaded file or text (multipart)",
            "POST /api/download": "Download the PDF for a PMID",
            "POST /api/resolve": "Resolve a query to a single PMID",
            "GET /download/{pmid}.pdf": "Fetch a downloaded PDF",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: chrono::Utc::now().to_rfc3339(),
        download_dir: state.config.download_dir.display().to_string(),
        auth_required: state.config.api_token.is_some(),
    })
}

async fn search(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    params: JsonParams,
) -> EnvelopeResponse {
    dispatch(&state, &user, Feature::Search, params).await
}

async fn advanced_search(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    params: JsonParams,
) -> EnvelopeResponse {
    dispatch(&state, &user, Feature::AdvancedSearch, params).await
}

async fn details(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    params: JsonParams,
) -> EnvelopeResponse {
    dispatch(&state, &user, Feature::Details, params).await
}

async fn download(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    params: JsonParams,
) -> EnvelopeResponse {
    dispatch(&state, &user, Feature::Download, params).await
}

async fn resolve(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    params: JsonParams,
) -> EnvelopeResponse {
    dispatch(&state, &user, Feature::Resolve, params).await
}

async fn translate(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    multipart: Result<Multipart, MultipartRejection>,
) -> EnvelopeResponse {
    let params = match multipart {
        Ok(multipart) => read_translate_form(multipart).await,
        Err(rejection) => Err(FlowError::invalid(format!(
            "Invalid request body: {}",
            rejection.body_text()
        ))),
    };

    match params {
        Ok(params) => run(&state, &user, Feature::Translate, params).await,
        Err(e) => reject(Feature::Translate, &e),
    }
}

async fn dispatch(
    state: &AppState,
    user: &AuthenticatedUser,
    feature: Feature,
    params: JsonParams,
) -> EnvelopeResponse {
    match params {
        Ok(Json(params)) => run(state, user, feature, params).await,
        Err(rejection) => reject(
            feature,
            &FlowError::invalid(format!("Invalid request body: {}", rejection.body_text())),
        ),
    }
}

async fn run(
    state: &AppState,
    user: &AuthenticatedUser,
    feature: Feature,
    params: IntentParams,
) -> EnvelopeResponse {
    info!(
        feature = %feature,
        user = user.user_id.as_deref().unwrap_or("anonymous"),
        "Running request"
    );
    EnvelopeResponse(state.runner.run(RequestIntent::new(feature, params)).await)
}

fn reject(feature: Feature, error: &FlowError) -> EnvelopeResponse {
    warn!("Rejected {} request: {}", feature, error);
    EnvelopeResponse(normalize_error(error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, header};
    use pubmed_flow::{ProcessResult, ScriptedInvoker};
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const BOUNDARY: &str = "pubmed-test-boundary";

    fn config(root: &Path, token: Option<&str>) -> ServiceConfig {
        let root = root.display().to_string();
        let token = token.map(str::to_string);
        ServiceConfig::from_lookup(|name| match name {
            "PUBMED_PROJECT_ROOT" => Some(root.clone()),
            "PUBMED_API_TOKEN" => token.clone(),
            _ => None,
        })
        .unwrap()
    }

    fn app(root: &Path, token: Option<&str>, invoker: Arc<ScriptedInvoker>) -> Router {
        app_with(config(root, token), invoker)
    }

    fn app_with(config: ServiceConfig, invoker: Arc<ScriptedInvoker>) -> Router {
        build_router(AppState::new(config, invoker).unwrap())
    }

    fn stdout(text: &str) -> ProcessResult {
        ProcessResult {
            stdout: text.to_string(),
            stderr: String::new(),
            exit_code: Some(0),
        }
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn read(response: Response) -> (StatusCode, Value) {
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_search_returns_identifiers() {
        let root = TempDir::new().unwrap();
        let invoker = Arc::new(ScriptedInvoker::replying(stdout(
            "PMIDs for cancer: [39979984, 39979985]\n",
        )));
        let app = app(root.path(), None, invoker.clone());

        let response = app
            .oneshot(post_json("/api/search", r#"{"query":"cancer"}"#))
            .await
            .unwrap();
        let (status, body) = read(response).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({ "success": true, "result": ["39979984", "39979985"] })
        );
        assert_eq!(invoker.call_count(), 1);
        assert_eq!(
            invoker.calls()[0].arguments(),
            ["test/test_search_metapub.py", "--query", "cancer"]
        );
    }

    #[tokio::test]
    async fn test_missing_pmid_is_rejected_without_invocation() {
        let root = TempDir::new().unwrap();
        let invoker = Arc::new(ScriptedInvoker::replying(stdout("unused")));
        let app = app(root.path(), None, invoker.clone());

        let response = app.oneshot(post_json("/api/details", "{}")).await.unwrap();
        let (status, body) = read(response).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "success": false, "error": "PMID is required" }));
        assert_eq!(invoker.call_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_json_gets_error_envelope() {
        let root = TempDir::new().unwrap();
        let invoker = Arc::new(ScriptedInvoker::replying(stdout("unused")));
        let app = app(root.path(), None, invoker.clone());

        let response = app
            .oneshot(post_json("/api/search", "{not json"))
            .await
            .unwrap();
        let (status, body) = read(response).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], json!(false));
        assert!(body["error"].as_str().unwrap().starts_with("Invalid request body"));
        assert_eq!(invoker.call_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_details_hides_diagnostics() {
        let root = TempDir::new().unwrap();
        let invoker = Arc::new(ScriptedInvoker::replying(ProcessResult {
            stdout: String::new(),
            stderr: "Traceback (most recent call last):\nKeyError: 'title'".to_string(),
            exit_code: Some(1),
        }));
        let app = app(root.path(), None, invoker);

        let response = app
            .oneshot(post_json("/api/details", r#"{"pmid":"39979984"}"#))
            .await
            .unwrap();
        let (status, body) = read(response).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body,
            json!({ "success": false, "error": "Failed to fetch article details" })
        );
    }

    #[tokio::test]
    async fn test_cached_download_is_served() {
        let root = TempDir::new().unwrap();
        let download_dir = root.path().join("public").join("download");
        std::fs::create_dir_all(&download_dir).unwrap();
        std::fs::write(download_dir.join("42.pdf"), b"%PDF-1.4 test").unwrap();

        let invoker = Arc::new(ScriptedInvoker::replying(stdout("unused")));
        let app = app(root.path(), None, invoker.clone());

        let response = app
            .clone()
            .oneshot(post_json("/api/download", r#"{"pmid":"42"}"#))
            .await
            .unwrap();
        let (status, body) = read(response).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["downloadPath"], json!("/download/42.pdf"));
        assert_eq!(body["pmid"], json!("42"));
        assert_eq!(invoker.call_count(), 0);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/download/42.pdf")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"%PDF-1.4 test");
    }

    #[tokio::test]
    async fn test_translate_multipart_text() {
        let root = TempDir::new().unwrap();
        let invoker = Arc::new(ScriptedInvoker::replying(stdout("Hola mundo\n")));
        let app = app(root.path(), None, invoker.clone());

        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"text\"\r\n\r\nHello world\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"targetLang\"\r\n\r\nes\r\n\
             --{b}--\r\n",
            b = BOUNDARY
        );
        let request = Request::builder()
            .method("POST")
            .uri("/api/translate")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap();

        let (status, body) = read(app.oneshot(request).await.unwrap()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "success": true, "result": "Hola mundo\n" }));

        let args = invoker.calls()[0].arguments().to_vec();
        assert_eq!(args[1], "--file");
        assert!(args[2].ends_with("input.txt"));
        assert_eq!(&args[3..], ["--target_lang", "es"]);

        let leftovers = std::fs::read_dir(root.path().join("uploads"))
            .map(|entries| entries.count())
            .unwrap_or(0);
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_translate_requires_multipart() {
        let root = TempDir::new().unwrap();
        let invoker = Arc::new(ScriptedInvoker::replying(stdout("unused")));
        let app = app(root.path(), None, invoker.clone());

        let response = app
            .oneshot(post_json("/api/translate", r#"{"text":"hi"}"#))
            .await
            .unwrap();
        let (status, body) = read(response).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], json!(false));
        assert_eq!(invoker.call_count(), 0);
    }

    #[tokio::test]
    async fn test_timed_out_request_gets_error_envelope() {
        let root = TempDir::new().unwrap();
        let mut config = config(root.path(), None);
        config.request_timeout = Some(Duration::from_millis(50));
        let invoker = Arc::new(
            ScriptedInvoker::replying(stdout("PMIDs: [1]")).with_delay(Duration::from_secs(5)),
        );
        let app = app_with(config, invoker.clone());

        let response = app
            .oneshot(post_json("/api/search", r#"{"query":"slow"}"#))
            .await
            .unwrap();
        let (status, body) = read(response).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body,
            json!({ "success": false, "error": "Error executing search" })
        );
        assert_eq!(invoker.call_count(), 1);
    }

    #[tokio::test]
    async fn test_token_gate() {
        let root = TempDir::new().unwrap();
        let invoker = Arc::new(ScriptedInvoker::replying(stdout("PMIDs: [7]")));
        let app = app(root.path(), Some("s3cret"), invoker.clone());

        let response = app
            .clone()
            .oneshot(post_json("/api/search", r#"{"query":"x"}"#))
            .await
            .unwrap();
        let (status, body) = read(response).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({ "success": false, "error": "Unauthorized" }));
        assert_eq!(invoker.call_count(), 0);

        let mut request = post_json("/api/search", r#"{"query":"x"}"#);
        request.headers_mut().insert(
            header::AUTHORIZATION,
            "Bearer s3cret".parse().unwrap(),
        );
        request
            .headers_mut()
            .insert("x-user-id", "reader-1".parse().unwrap());
        let (status, body) = read(app.clone().oneshot(request).await.unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"], json!(["7"]));

        let health = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let (status, body) = read(health).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("healthy"));
        assert_eq!(body["auth_required"], json!(true));
    }
}
