//! Axum-based HTTP gateway for the sorting service.
//!
//! Request routing, bearer-credential extraction, and JSON mapping live
//! here; the interesting work happens in the stores and the sorter.
//! Handlers authenticate against the session token registry, read and
//! mutate arrays through the repository, and persist sorted output back
//! into it.

use crate::auth::{CredentialStore, SessionTokenRegistry, TokenError};
use crate::config::Config;
use crate::sort;
use crate::store::{ArrayRepository, Placement, StoreError};
use anyhow::Result;
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use rand::Rng;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Maximum request body size (4 MiB) — a full-length upload of 100k
/// integers fits with room to spare.
pub const MAX_BODY_SIZE: usize = 4 * 1024 * 1024;
/// Request timeout (30s).
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub credentials: Arc<CredentialStore>,
    pub tokens: Arc<SessionTokenRegistry>,
    pub arrays: Arc<ArrayRepository>,
    /// Largest array any identity may store.
    pub max_array_len: usize,
}

/// Run the HTTP gateway.
pub async fn run_gateway(host: &str, port: u16, config: &Config) -> Result<()> {
    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_port = listener.local_addr()?.port();

    std::fs::create_dir_all(&config.data_dir)?;
    let db_path = config.data_dir.join("credentials.db");
    let credentials = Arc::new(CredentialStore::open(&db_path)?);
    tracing::info!("Credential store initialized at {}", db_path.display());

    let state = AppState {
        credentials,
        tokens: Arc::new(SessionTokenRegistry::with_lifetime(
            config.auth.session_lifetime_secs,
        )),
        arrays: Arc::new(ArrayRepository::new()),
        max_array_len: config.limits.max_array_len,
    };

    println!("🔺 Pyramid gateway listening on http://{host}:{actual_port}");
    println!("  POST /auth/register   — create an account, returns a session token");
    println!("  POST /auth/login      — authenticate, returns a session token");
    println!("  POST /auth/logout     — revoke the current session");
    println!("  POST /array/upload    — store numbers (inline or from a file path)");
    println!("  POST /array/generate  — store a random array");
    println!("  POST /array/add       — insert elements (Start/End/AfterIndex)");
    println!("  GET  /array           — current array");
    println!("  DELETE /array         — drop the current array");
    println!("  POST /sort            — heap-sort a range, returns instrumentation");
    println!("  GET  /health          — health check");
    println!("  Press Ctrl+C to stop.\n");

    // ── CORS — allow browser clients to connect from any origin ──
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/auth/register", post(handle_register))
        .route("/auth/login", post(handle_login))
        .route("/auth/logout", post(handle_logout))
        .route("/array/upload", post(handle_upload))
        .route("/array/generate", post(handle_generate))
        .route("/array/add", post(handle_add))
        .route("/array", get(handle_get_array).delete(handle_delete_array))
        .route("/sort", post(handle_sort))
        .with_state(state)
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::new(Duration::from_secs(REQUEST_TIMEOUT_SECS)));

    axum::serve(listener, app).await?;

    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
// AXUM HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

/// Concrete return type for handlers (avoids `impl IntoResponse` inference issues).
type ApiResponse = (StatusCode, Json<serde_json::Value>);

type JsonBody<T> = Result<Json<T>, axum::extract::rejection::JsonRejection>;

/// Request body for registration and login.
#[derive(Deserialize)]
struct AuthBody {
    login: String,
    password: String,
}

/// Request body for array upload.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadBody {
    numbers: Option<Vec<i64>>,
    source_file_path: Option<String>,
}

/// Request body for random array generation.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateBody {
    length: usize,
    min_value: i64,
    max_value: i64,
}

/// Request body for element insertion.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddElementsBody {
    placement: Placement,
    after_index: Option<i64>,
    values: Option<Vec<i64>>,
}

/// Which fields a sort response should carry. Everything defaults on.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SortOutputOptions {
    include_original: bool,
    include_sorted: bool,
    include_operations: bool,
    include_duration: bool,
    include_timestamp: bool,
}

impl Default for SortOutputOptions {
    fn default() -> Self {
        Self {
            include_original: true,
            include_sorted: true,
            include_operations: true,
            include_duration: true,
            include_timestamp: true,
        }
    }
}

/// Request body for sorting. An empty object sorts the whole array.
#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SortBody {
    range_start: Option<i64>,
    range_end: Option<i64>,
    output_options: Option<SortOutputOptions>,
}

/// Extract bearer token from Authorization header.
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Resolve the bearer token to an identity. Returns an error response
/// when the header is missing or the token does not validate.
fn require_identity(state: &AppState, headers: &HeaderMap) -> Result<String, ApiResponse> {
    let token = extract_bearer_token(headers).ok_or_else(|| {
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "Missing bearer token"})),
        )
    })?;

    state.tokens.validate(token).map_err(|e| {
        let message = match e {
            TokenError::Invalid => "Invalid session token",
            TokenError::Expired => "Session token has expired",
        };
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": message})),
        )
    })
}

fn bad_request(message: impl Into<String>) -> ApiResponse {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({"error": message.into()})),
    )
}

fn store_error_response(error: &StoreError) -> ApiResponse {
    match error {
        StoreError::NotFound => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "No array is stored for this account"})),
        ),
        StoreError::InvalidIndex { .. } | StoreError::MissingIndex => bad_request(error.to_string()),
    }
}

/// GET /health — always public.
async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// POST /auth/register — create an account and issue a session token.
async fn handle_register(State(state): State<AppState>, body: JsonBody<AuthBody>) -> ApiResponse {
    let body = match body {
        Ok(Json(b)) => b,
        Err(e) => return bad_request(format!("Invalid request: {e}")),
    };

    let login = body.login.trim().to_owned();
    if login.is_empty() || body.password.trim().is_empty() {
        return bad_request("Login and password are required");
    }

    match state.credentials.register(&login, &body.password) {
        Ok(()) => {
            let token = state.tokens.issue(&login);
            tracing::info!(login = %login, "account registered");
            (
                StatusCode::CREATED,
                Json(serde_json::json!({"token": token})),
            )
        }
        Err(e) => {
            let msg = e.to_string();
            let status = if msg.contains("already registered") {
                StatusCode::CONFLICT
            } else {
                StatusCode::BAD_REQUEST
            };
            (status, Json(serde_json::json!({"error": msg})))
        }
    }
}

/// POST /auth/login — verify credentials and issue a session token.
async fn handle_login(State(state): State<AppState>, body: JsonBody<AuthBody>) -> ApiResponse {
    let body = match body {
        Ok(Json(b)) => b,
        Err(e) => return bad_request(format!("Invalid request: {e}")),
    };

    match state.credentials.verify(&body.login, &body.password) {
        Ok(true) => {
            let login = body.login.trim().to_owned();
            let token = state.tokens.issue(&login);
            tracing::info!(login = %login, "login succeeded");
            (StatusCode::OK, Json(serde_json::json!({"token": token})))
        }
        Ok(false) => (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "Invalid login or password"})),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": format!("Credential check failed: {e}")})),
        ),
    }
}

/// POST /auth/logout — revoke the current session token.
async fn handle_logout(State(state): State<AppState>, headers: HeaderMap) -> ApiResponse {
    let identity = match require_identity(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };

    // The token validated just above, so it is present to revoke.
    if let Some(token) = extract_bearer_token(&headers) {
        state.tokens.revoke(token);
    }
    (
        StatusCode::OK,
        Json(serde_json::json!({"message": format!("{identity} logged out")})),
    )
}

/// POST /array/upload — store numbers sent inline or read from a file.
async fn handle_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: JsonBody<UploadBody>,
) -> ApiResponse {
    let identity = match require_identity(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    let body = match body {
        Ok(Json(b)) => b,
        Err(e) => return bad_request(format!("Invalid request: {e}")),
    };

    let (numbers, provenance) = match (body.numbers, body.source_file_path) {
        (Some(numbers), source) if !numbers.is_empty() => (numbers, source),
        (_, Some(path)) if !path.trim().is_empty() => {
            let path = path.trim().to_owned();
            if !Path::new(&path).is_absolute() {
                return bad_request("Source file path must be absolute");
            }
            let contents = match tokio::fs::read_to_string(&path).await {
                Ok(contents) => contents,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return (
                        StatusCode::NOT_FOUND,
                        Json(serde_json::json!({"error": format!("File {path} not found")})),
                    );
                }
                Err(e) => return bad_request(format!("Failed to read {path}: {e}")),
            };
            match parse_numbers_text(&contents) {
                Ok(numbers) => (numbers, Some(path)),
                Err(e) => return bad_request(e),
            }
        }
        _ => return bad_request("Either numbers or a source file path is required"),
    };

    if numbers.len() > state.max_array_len {
        return bad_request(format!(
            "Array length {} exceeds the maximum of {}",
            numbers.len(),
            state.max_array_len
        ));
    }

    let stored = state
        .arrays
        .replace(&identity, &numbers, provenance.as_deref());
    tracing::info!(
        identity = %identity,
        length = stored.numbers.len(),
        "array uploaded"
    );
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "message": format!("Array stored for {identity}"),
            "length": stored.numbers.len(),
            "source": stored.provenance,
        })),
    )
}

/// POST /array/generate — store a randomly generated array.
async fn handle_generate(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: JsonBody<GenerateBody>,
) -> ApiResponse {
    let identity = match require_identity(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    let body = match body {
        Ok(Json(b)) => b,
        Err(e) => return bad_request(format!("Invalid request: {e}")),
    };

    if body.length == 0 || body.length > state.max_array_len {
        return bad_request(format!(
            "Length must be between 1 and {}",
            state.max_array_len
        ));
    }
    if body.min_value > body.max_value {
        return bad_request("minValue must not exceed maxValue");
    }

    let numbers: Vec<i64> = {
        let mut rng = rand::rng();
        (0..body.length)
            .map(|_| rng.random_range(body.min_value..=body.max_value))
            .collect()
    };

    state.arrays.replace(&identity, &numbers, Some("generated"));
    tracing::info!(
        identity = %identity,
        length = numbers.len(),
        "array generated"
    );
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "message": format!("Random array of {} elements stored for {identity}", numbers.len()),
            "min": body.min_value,
            "max": body.max_value,
        })),
    )
}

/// POST /array/add — insert elements into the stored array.
async fn handle_add(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: JsonBody<AddElementsBody>,
) -> ApiResponse {
    let identity = match require_identity(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    let body = match body {
        Ok(Json(b)) => b,
        Err(e) => return bad_request(format!("Invalid request: {e}")),
    };

    let values = match body.values {
        Some(values) if !values.is_empty() => values,
        _ => return bad_request("At least one value is required"),
    };

    let current = match state.arrays.get(&identity) {
        Ok(stored) => stored,
        Err(e) => return store_error_response(&e),
    };
    if current.numbers.len() + values.len() > state.max_array_len {
        return bad_request(format!(
            "Resulting array would exceed the maximum length of {}",
            state.max_array_len
        ));
    }

    match state
        .arrays
        .append(&identity, body.placement, &values, body.after_index)
    {
        Ok(updated) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "message": "Array updated",
                "length": updated.numbers.len(),
                "updatedAt": updated.updated_at,
            })),
        ),
        Err(e) => store_error_response(&e),
    }
}

/// GET /array — return the stored array.
async fn handle_get_array(State(state): State<AppState>, headers: HeaderMap) -> ApiResponse {
    let identity = match require_identity(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };

    match state.arrays.get(&identity) {
        Ok(stored) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "numbers": stored.numbers,
                "sourceFilePath": stored.provenance,
                "updatedAt": stored.updated_at,
            })),
        ),
        Err(e) => store_error_response(&e),
    }
}

/// DELETE /array — drop the stored array.
async fn handle_delete_array(State(state): State<AppState>, headers: HeaderMap) -> ApiResponse {
    let identity = match require_identity(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };

    if !state.arrays.delete(&identity) {
        return store_error_response(&StoreError::NotFound);
    }
    (
        StatusCode::OK,
        Json(serde_json::json!({"message": format!("Array deleted for {identity}")})),
    )
}

/// POST /sort — heap-sort a range of the stored array and persist the
/// sorted content back.
async fn handle_sort(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: JsonBody<SortBody>,
) -> ApiResponse {
    let identity = match require_identity(&state, &headers) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    let body = match body {
        Ok(Json(b)) => b,
        Err(e) => return bad_request(format!("Invalid request: {e}")),
    };
    let options = body.output_options.unwrap_or_default();

    let stored = match state.arrays.get(&identity) {
        Ok(stored) => stored,
        Err(e) => return store_error_response(&e),
    };

    // CPU-bound and non-yielding — keep it off the dispatch threads.
    let numbers = stored.numbers.clone();
    let (range_start, range_end) = (body.range_start, body.range_end);
    let outcome = match tokio::task::spawn_blocking(move || {
        sort::sort_range(&numbers, range_start, range_end)
    })
    .await
    {
        Ok(Ok(outcome)) => outcome,
        // Every sorter failure is a caller mistake, not a server fault.
        Ok(Err(e)) => return bad_request(e.to_string()),
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": format!("Sort task failed: {e}")})),
            );
        }
    };

    state.arrays.replace(
        &identity,
        &outcome.sorted_numbers,
        stored.provenance.as_deref(),
    );
    tracing::info!(
        identity = %identity,
        range_start = outcome.range_start,
        range_end = outcome.range_end,
        build_operations = outcome.build_operations,
        restore_operations = outcome.restore_operations,
        duration_ms = outcome.duration_milliseconds,
        "sort completed"
    );

    let mut response = serde_json::json!({
        "message": "Sort completed",
        "rangeStart": outcome.range_start,
        "rangeEnd": outcome.range_end,
        "sourceFilePath": stored.provenance,
    });
    if options.include_original {
        response["originalNumbers"] = serde_json::json!(outcome.original_numbers);
    }
    if options.include_sorted {
        response["sortedNumbers"] = serde_json::json!(outcome.sorted_numbers);
    }
    if options.include_operations {
        response["buildOperations"] = serde_json::json!(outcome.build_operations);
        response["restoreOperations"] = serde_json::json!(outcome.restore_operations);
    }
    if options.include_duration {
        response["durationMilliseconds"] = serde_json::json!(outcome.duration_milliseconds);
    }
    if options.include_timestamp {
        response["timestampUtc"] = serde_json::json!(outcome.finished_at);
    }

    (StatusCode::OK, Json(response))
}

/// Parse whitespace/comma/semicolon-separated integers from file text.
fn parse_numbers_text(contents: &str) -> Result<Vec<i64>, String> {
    let fields = contents
        .split(|c: char| c.is_whitespace() || c == ',' || c == ';')
        .filter(|field| !field.is_empty());

    let mut numbers = Vec::new();
    for field in fields {
        match field.parse::<i64>() {
            Ok(value) => numbers.push(value),
            Err(_) => return Err(format!("Could not parse \"{field}\" as an integer")),
        }
    }

    if numbers.is_empty() {
        return Err("File contains no numbers".into());
    }
    Ok(numbers)
}

// ── Tests ───────────────────────────────────────────────────────────
