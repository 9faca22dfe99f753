// 🌐 REST API - duplicate checks and policy lookups over HTTP
// Router lives in the library so it can be tested without binding a socket.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tracing::error;

use crate::controller::{CheckState, DuplicateCheckController};
use crate::db::{get_policies_for_user, get_policy, SqlitePolicyStore};
use crate::policy::{DuplicateMatch, PolicyRecord, PolicyTypeTag, UserId};
use crate::resolver::DuplicateResolver;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    db: Arc<Mutex<Connection>>,
    resolver: Arc<DuplicateResolver>,
}

impl AppState {
    pub fn new(store: SqlitePolicyStore) -> Self {
        AppState {
            db: store.connection(),
            resolver: Arc::new(DuplicateResolver::new(Arc::new(store))),
        }
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Response {
        (
            StatusCode::OK,
            Json(ApiResponse {
                success: true,
                data: Some(data),
                error: None,
            }),
        )
            .into_response()
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(message.into()),
        }),
    )
        .into_response()
}

#[derive(Deserialize)]
struct DuplicateQuery {
    #[serde(default)]
    policy_number: String,
}

/// Duplicate check result for the presenter
#[derive(Serialize)]
struct DuplicateCheckResponse {
    /// false when the input was too short to check
    checked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    duplicate: Option<DuplicateResponse>,
}

#[derive(Serialize)]
struct DuplicateResponse {
    #[serde(flatten)]
    found: DuplicateMatch,
    link: String,
}

impl From<DuplicateMatch> for DuplicateResponse {
    fn from(found: DuplicateMatch) -> Self {
        let link = found.link();
        DuplicateResponse { found, link }
    }
}

/// Run a blocking query on the shared connection
async fn with_db<T, F>(state: &AppState, query: F) -> anyhow::Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> anyhow::Result<T> + Send + 'static,
{
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| anyhow::anyhow!("database lock poisoned"))?;
        query(&conn)
    })
    .await?
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    ApiResponse::ok("OK")
}

/// GET /api/users/:user_id/duplicates?policy_number=... - Cross-type duplicate check
async fn check_duplicate(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<DuplicateQuery>,
) -> Response {
    let mut controller = DuplicateCheckController::new(UserId::new(user_id));

    let response = match controller.check(&state.resolver, &query.policy_number).await {
        CheckState::Resolved(found) => DuplicateCheckResponse {
            checked: true,
            duplicate: found.map(DuplicateResponse::from),
        },
        CheckState::Idle | CheckState::Checking => DuplicateCheckResponse {
            checked: false,
            duplicate: None,
        },
    };

    ApiResponse::ok(response)
}

/// GET /api/users/:user_id/policies/:policy_type - A user's policies of one type
async fn list_user_policies(
    State(state): State<AppState>,
    Path((user_id, policy_type)): Path<(String, String)>,
) -> Response {
    let policy_type: PolicyTypeTag = match policy_type.parse() {
        Ok(tag) => tag,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("{}", e)),
    };

    let user = UserId::new(user_id);
    let result = with_db(&state, move |conn| get_policies_for_user(conn, &user, policy_type)).await;

    match result {
        Ok(policies) => ApiResponse::<Vec<PolicyRecord>>::ok(policies),
        Err(e) => {
            error!(error = %e, policy_type = %policy_type, "Error listing policies");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to list policies")
        }
    }
}

/// GET /policies/:policy_type/:id - Target of a duplicate warning link
async fn get_policy_detail(
    State(state): State<AppState>,
    Path((policy_type, id)): Path<(String, String)>,
) -> Response {
    let policy_type: PolicyTypeTag = match policy_type.parse() {
        Ok(tag) => tag,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("{}", e)),
    };

    let lookup_id = id.clone();
    let result = with_db(&state, move |conn| get_policy(conn, policy_type, &lookup_id)).await;

    match result {
        Ok(Some(policy)) => ApiResponse::ok(policy),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "policy not found"),
        Err(e) => {
            error!(error = %e, policy_type = %policy_type, policy_id = %id, "Error loading policy");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to load policy")
        }
    }
}

pub fn router(state: AppState) -> Router {
    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/users/:user_id/duplicates", get(check_duplicate))
        .route("/users/:user_id/policies/:policy_type", get(list_user_policies))
        .route("/policies/:policy_type/:id", get(get_policy_detail))
        .with_state(state.clone());

    // Links handed to presenters point at /policies/{type}/{id}
    Router::new()
        .route("/policies/:policy_type/:id", get(get_policy_detail))
        .with_state(state)
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}

// ============================================================================
// TESTS
// ============================================================================
