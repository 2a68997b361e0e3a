use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::info;
use uuid::Uuid;

use manifold_core::config::ServiceConfig;
use manifold_core::{Actor, Role};

use crate::authz;
use crate::directive::DirectiveSet;
use crate::engine::{Evaluator, RetryPolicy};
use crate::error::RuleError;
use crate::predicate::ClientContext;
use crate::rule::{MatchKind, ModRule, RuleDraft};
use crate::store::{Cursor, ListFilter, RuleStore};

/// Header carrying the authenticated caller identity, placed by the
/// external session layer in front of this service.
pub const IDENTITY_HEADER: &str = "x-manifold-identity";
/// Header carrying the caller's role.
pub const ROLE_HEADER: &str = "x-manifold-role";

/// Configuration for the rule API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleServiceConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for RuleServiceConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

impl RuleServiceConfig {
    /// Derives the service config from the shared env configuration.
    pub fn from_service(config: &ServiceConfig) -> Self {
        Self {
            bind_address: config
                .http_bind
                .clone()
                .unwrap_or_else(default_bind_address),
        }
    }
}

#[derive(Clone)]
struct RuleServiceState {
    store: RuleStore,
    evaluator: Evaluator,
    retry: RetryPolicy,
}

/// Helper used by services to compose the REST API router.
#[derive(Clone)]
pub struct RuleApiBuilder {
    state: RuleServiceState,
}

impl RuleApiBuilder {
    pub fn new(store: RuleStore) -> Self {
        let evaluator = Evaluator::for_store(store.clone());
        Self {
            state: RuleServiceState {
                store,
                evaluator,
                retry: RetryPolicy::default(),
            },
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.state.retry = retry;
        self
    }

    pub fn into_router(self) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/rules", get(list_rules).post(create_rule))
            .route("/rules/:key", get(get_rule).delete(delete_rule))
            .route("/rules/:key/enabled", put(toggle_rule))
            .route("/evaluate", post(evaluate_manifest))
            .with_state(self.state)
    }

    /// Spawns an HTTP server binding to the configured address.
    pub async fn serve(self, config: RuleServiceConfig) -> anyhow::Result<oneshot::Sender<()>> {
        let (tx, rx) = oneshot::channel();
        let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
        let state = self.state.clone();

        tokio::spawn(async move {
            info!(address = %config.bind_address, "starting manifest rule service");
            let app = RuleApiBuilder { state }.into_router();
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = rx.await;
                })
                .await
                .ok();
        });

        Ok(tx)
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: String,
    message: String,
}

struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }
}

impl From<RuleError> for ApiError {
    fn from(err: RuleError) -> Self {
        let (status, code) = match &err {
            RuleError::Validation(_) => (StatusCode::BAD_REQUEST, "invalid_rule"),
            RuleError::Permission(_) => (StatusCode::FORBIDDEN, "permission_denied"),
            RuleError::Conflict { .. } => (StatusCode::CONFLICT, "version_conflict"),
            RuleError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            RuleError::StoreUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable"),
            RuleError::Io { .. } | RuleError::Parse { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };
        Self::new(status, code, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (
            self.status,
            Json(ErrorResponse {
                code: self.code.into(),
                message: self.message,
            }),
        )
            .into_response()
    }
}

fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, ApiError> {
    let identity = headers
        .get(IDENTITY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::unauthorized("missing caller identity"))?;

    let role = headers
        .get(ROLE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("missing caller role"))?;

    let role = role
        .parse::<Role>()
        .map_err(|err| ApiError::new(StatusCode::FORBIDDEN, "permission_denied", err))?;

    Ok(Actor::new(identity, role))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    cursor: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct PageResponse {
    rules: Vec<ModRule>,
    next: Option<String>,
}

async fn list_rules(
    State(state): State<RuleServiceState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<PageResponse>, ApiError> {
    actor_from_headers(&headers)?;

    let mut filter = ListFilter::new();
    if let Some(kind) = &query.kind {
        filter = filter.kind(kind.parse::<MatchKind>()?);
    }
    if let Some(cursor) = &query.cursor {
        filter = filter.cursor(Cursor::decode(cursor)?);
    }
    if let Some(limit) = query.limit {
        filter = filter.limit(limit);
    }

    let page = state.store.list(filter)?;
    Ok(Json(PageResponse {
        next: page.next.map(|cursor| cursor.encode()),
        rules: page.rules,
    }))
}

async fn create_rule(
    State(state): State<RuleServiceState>,
    headers: HeaderMap,
    Json(draft): Json<RuleDraft>,
) -> Result<(StatusCode, Json<ModRule>), ApiError> {
    let actor = actor_from_headers(&headers)?;
    let allowed = authz::authorize_create(&actor, draft)?;
    let rule = state.store.create(allowed, &actor.identity)?;
    Ok((StatusCode::CREATED, Json(rule)))
}

async fn get_rule(
    State(state): State<RuleServiceState>,
    headers: HeaderMap,
    Path(key): Path<Uuid>,
) -> Result<Json<ModRule>, ApiError> {
    actor_from_headers(&headers)?;
    Ok(Json(state.store.get(key)?))
}

#[derive(Debug, Deserialize)]
struct ToggleRequest {
    enabled: bool,
    expected_version: u32,
}

async fn toggle_rule(
    State(state): State<RuleServiceState>,
    headers: HeaderMap,
    Path(key): Path<Uuid>,
    Json(payload): Json<ToggleRequest>,
) -> Result<Json<ModRule>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let rule = state.store.get(key)?;
    authz::authorize_mutation(&actor, &rule)?;

    let updated = state
        .store
        .set_enabled(key, payload.enabled, payload.expected_version, &actor.identity)?;
    Ok(Json(updated))
}

#[derive(Debug, Deserialize)]
struct DeleteQuery {
    expected_version: u32,
}

async fn delete_rule(
    State(state): State<RuleServiceState>,
    headers: HeaderMap,
    Path(key): Path<Uuid>,
    Query(query): Query<DeleteQuery>,
) -> Result<StatusCode, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let rule = state.store.get(key)?;
    authz::authorize_mutation(&actor, &rule)?;

    state
        .store
        .delete(key, query.expected_version, &actor.identity)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct EvaluationRequest {
    #[serde(default)]
    context: ClientContext,
    manifest: String,
}

async fn evaluate_manifest(
    State(state): State<RuleServiceState>,
    Json(payload): Json<EvaluationRequest>,
) -> Result<Json<DirectiveSet>, ApiError> {
    let directives = state
        .evaluator
        .evaluate_with_retry(&payload.context, &payload.manifest, &state.retry)
        .await?;
    Ok(Json(directives))
}
