//! Main axum router and HTTP request handlers for the account service.
//!
//! Routes:
//! - `POST /auth/login`                - Exchange credentials for a bearer token
//! - `POST /users`                     - Public registration (role: customer)
//! - `GET  /users/me`                  - Caller's own account (customer)
//! - `GET  /users/{id}`                - Account by id (customer)
//! - `GET  /users`                     - Paged account listing (admin)
//! - `POST /admin/users`               - Create an account with explicit role (admin)
//! - `PUT  /admin/users/{id}/role`     - Change an account's role (admin)
//! - `GET  /healthz`                   - Health check
//! - `GET  /metrics`                   - Prometheus metrics
//!
//! Authorization happens at the top of each protected handler; the declared
//! role requirement is static per route.  Error responses carry a category
//! and a generic message only; internal detail stays in the logs.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, instrument, warn};

use crate::auth::guard::GuardError;
use crate::auth::service::{AuthError, Registration};
use crate::metrics::{DenialReason, LoginOutcome};
use crate::store::{Account, Role, StoreError};
use crate::AppState;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the axum [`Router`] with all HTTP routes and shared state.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Authentication
        .route("/auth/login", post(handle_login))
        // Accounts
        .route("/users", post(handle_register).get(handle_list_users))
        .route("/users/me", get(handle_me))
        .route("/users/{id}", get(handle_get_user))
        // Admin
        .route("/admin/users", post(handle_admin_create_user))
        .route("/admin/users/{id}/role", put(handle_update_role))
        // Health, metrics
        .route("/healthz", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    access_token: String,
    token_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    email: String,
    password: String,
    first_name: String,
    last_name: String,
    #[serde(default)]
    phone_number: Option<String>,
}

impl From<RegisterRequest> for Registration {
    fn from(req: RegisterRequest) -> Self {
        Registration {
            email: req.email,
            password: req.password,
            first_name: req.first_name,
            last_name: req.last_name,
            phone_number: req.phone_number,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AdminRegisterRequest {
    #[serde(flatten)]
    registration: RegisterRequest,
    role: Role,
}

#[derive(Debug, Deserialize)]
struct RoleUpdateRequest {
    role: Role,
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default)]
    skip: i64,
    #[serde(default = "default_list_limit")]
    limit: i64,
}

fn default_list_limit() -> i64 {
    100
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Convert a domain error into an [`AppError`], counting infrastructure
/// failures in the store-error metric on the way through.
fn record_unavailable(state: &AppState, err: impl Into<AppError>) -> AppError {
    let err = err.into();
    if matches!(err, AppError::Unavailable) {
        state.metrics.metrics.store_errors.inc();
    }
    err
}

/// Enforce the route's role requirement against the `Authorization` header.
fn require_role(
    state: &AppState,
    headers: &HeaderMap,
    role: Role,
) -> Result<crate::auth::guard::Identity, AppError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    state.guard.require(auth_header, role).map_err(|e| {
        let reason = match e {
            GuardError::Unauthorized => DenialReason::Unauthorized,
            GuardError::Forbidden => DenialReason::Forbidden,
        };
        state.metrics.metrics.record_denial(reason);
        AppError::from(e)
    })
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `POST /auth/login`
#[instrument(skip(state, request))]
async fn handle_login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    match state
        .authenticator
        .login(&request.email, &request.password)
        .await
    {
        Ok(access_token) => {
            state.metrics.metrics.record_login(LoginOutcome::Success);
            Ok(Json(LoginResponse {
                access_token,
                token_type: "bearer",
            }))
        }
        Err(e) => {
            if matches!(e, AuthError::InvalidCredentials) {
                state.metrics.metrics.record_login(LoginOutcome::Failure);
            }
            Err(record_unavailable(&state, e))
        }
    }
}

/// `POST /users`
///
/// Public registration; the role is always Customer.
#[instrument(skip(state, request))]
async fn handle_register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Account>), AppError> {
    let account = state
        .authenticator
        .register(request.into())
        .await
        .map_err(|e| record_unavailable(&state, e))?;
    state.metrics.metrics.registrations.inc();
    Ok((StatusCode::CREATED, Json(account)))
}

/// `GET /users/me`
#[instrument(skip(state, headers))]
async fn handle_me(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Account>, AppError> {
    let identity = require_role(&state, &headers, Role::Customer)?;
    // A valid token whose account has since disappeared is treated as not
    // authenticated rather than not-found.
    let account = state
        .store
        .find_by_id(identity.account_id)
        .await
        .map_err(|e| record_unavailable(&state, e))?
        .ok_or(AppError::Unauthorized)?;
    Ok(Json(account))
}

/// `GET /users/{id}`
#[instrument(skip(state, headers))]
async fn handle_get_user(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<Account>, AppError> {
    require_role(&state, &headers, Role::Customer)?;
    let account = state
        .store
        .find_by_id(account_id)
        .await
        .map_err(|e| record_unavailable(&state, e))?
        .ok_or_else(|| AppError::NotFound("user not found".into()))?;
    Ok(Json(account))
}

/// `GET /users?skip=0&limit=100`
#[instrument(skip(state, headers))]
async fn handle_list_users(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<Account>>, AppError> {
    require_role(&state, &headers, Role::Admin)?;
    let accounts = state
        .store
        .list(query.skip, query.limit)
        .await
        .map_err(|e| record_unavailable(&state, e))?;
    Ok(Json(accounts))
}

/// `POST /admin/users`
///
/// Registration with an explicit role, admin-only.
#[instrument(skip(state, headers, request))]
async fn handle_admin_create_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<AdminRegisterRequest>,
) -> Result<(StatusCode, Json<Account>), AppError> {
    require_role(&state, &headers, Role::Admin)?;
    let account = state
        .authenticator
        .register_with_role(request.registration.into(), request.role)
        .await
        .map_err(|e| record_unavailable(&state, e))?;
    state.metrics.metrics.registrations.inc();
    Ok((StatusCode::CREATED, Json(account)))
}

/// `PUT /admin/users/{id}/role`
#[instrument(skip(state, headers, request))]
async fn handle_update_role(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<i64>,
    headers: HeaderMap,
    Json(request): Json<RoleUpdateRequest>,
) -> Result<Json<Account>, AppError> {
    require_role(&state, &headers, Role::Admin)?;
    let account = state
        .store
        .update_role(account_id, request.role)
        .await
        .map_err(|e| record_unavailable(&state, e))?
        .ok_or_else(|| AppError::NotFound("user not found".into()))?;
    Ok(Json(account))
}

/// `GET /healthz`
async fn handle_health(State(state): State<Arc<AppState>>) -> Response {
    crate::health::health_response(state.store.as_ref()).await
}

/// `GET /metrics`
///
/// Returns Prometheus metrics in text exposition format.
async fn handle_metrics(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let mut buf = String::new();
    prometheus_client::encoding::text::encode(&mut buf, &state.metrics.registry)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("metrics encoding failed: {e}")))?;

    Ok((
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        buf,
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Application-level error that maps each failure category to exactly one
/// HTTP status.  Raw store and internal errors are logged here and replaced
/// with generic messages before leaving the process.
#[derive(Debug)]
pub enum AppError {
    /// Not authenticated: bad credentials or an unverifiable token (401).
    Unauthorized,
    /// Bad login credentials; same status as Unauthorized but keeps the
    /// login-specific message the original clients expect.
    InvalidCredentials,
    /// Authenticated but lacking the required role (403).
    Forbidden,
    /// Registration conflict (409).
    Conflict(String),
    /// Well-formed request whose content fails validation (422).
    Unprocessable(String),
    /// Requested entity does not exist (404).
    NotFound(String),
    /// Infrastructure failure, retriable with backoff (503).
    Unavailable,
    /// An unexpected internal error (500).
    Internal(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "authentication required".into()),
            AppError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, "incorrect email or password".into())
            }
            AppError::Forbidden => (StatusCode::FORBIDDEN, "insufficient permissions".into()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Unavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service temporarily unavailable".into(),
            ),
            AppError::Internal(err) => {
                error!(error = %err, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".into())
            }
        };

        let body = Json(serde_json::json!({ "error": message }));
        if status == StatusCode::UNAUTHORIZED {
            (status, [(header::WWW_AUTHENTICATE, "Bearer")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => AppError::InvalidCredentials,
            AuthError::EmailTaken => AppError::Conflict("email already registered".into()),
            AuthError::InvalidEmail => {
                AppError::Unprocessable("invalid email address".into())
            }
            AuthError::Unavailable => AppError::Unavailable,
        }
    }
}

impl From<GuardError> for AppError {
    fn from(err: GuardError) -> Self {
        match err {
            GuardError::Unauthorized => AppError::Unauthorized,
            GuardError::Forbidden => AppError::Forbidden,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateEmail => AppError::Conflict("email already registered".into()),
            StoreError::Unavailable(detail) => {
                warn!(%detail, "credential store error");
                AppError::Unavailable
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::guard::AccessGuard;
    use crate::auth::service::Authenticator;
    use crate::auth::token::TokenCodec;
    use crate::config::Config;
    use crate::store::memory::MemoryCredentialStore;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    fn test_state() -> AppState {
        let config: Config = serde_yaml::from_str(
            r#"
            server:
              listen: "127.0.0.1:0"
            database: {}
            auth: {}
            "#,
        )
        .unwrap();
        let store = Arc::new(MemoryCredentialStore::new());
        let codec = TokenCodec::new("test-secret");
        AppState {
            config: Arc::new(config),
            store: store.clone(),
            authenticator: Authenticator::new(store, codec.clone(), 30, 4),
            guard: AccessGuard::new(codec),
            metrics: crate::metrics::MetricsRegistry::new(),
        }
    }

    // ── Status mapping ───────────────────────────────────────────────

    #[test]
    fn error_categories_map_to_expected_statuses() {
        assert_eq!(status_of(AppError::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_of(AppError::InvalidCredentials),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(status_of(AppError::Forbidden), StatusCode::FORBIDDEN);
        assert_eq!(
            status_of(AppError::Conflict("taken".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(AppError::Unprocessable("bad email".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(AppError::NotFound("missing".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(AppError::Unavailable),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(AppError::Internal(anyhow::anyhow!("boom"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn unauthorized_carries_www_authenticate() {
        let response = AppError::Unauthorized.into_response();
        assert_eq!(
            response
                .headers()
                .get(header::WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok()),
            Some("Bearer")
        );
        let forbidden = AppError::Forbidden.into_response();
        assert!(forbidden.headers().get(header::WWW_AUTHENTICATE).is_none());
    }

    // ── Domain error translation ─────────────────────────────────────

    #[test]
    fn auth_errors_translate_to_categories() {
        assert!(matches!(
            AppError::from(AuthError::InvalidCredentials),
            AppError::InvalidCredentials
        ));
        assert!(matches!(
            AppError::from(AuthError::EmailTaken),
            AppError::Conflict(_)
        ));
        assert!(matches!(
            AppError::from(AuthError::InvalidEmail),
            AppError::Unprocessable(_)
        ));
        assert!(matches!(
            AppError::from(AuthError::Unavailable),
            AppError::Unavailable
        ));
    }

    #[test]
    fn store_unavailable_detail_is_not_surfaced() {
        let err = AppError::from(StoreError::Unavailable("password=secret host=db1".into()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        // The generic message replaces the internal detail; nothing from the
        // store error reaches the body.
    }

    #[test]
    fn guard_errors_translate_to_categories() {
        assert!(matches!(
            AppError::from(GuardError::Unauthorized),
            AppError::Unauthorized
        ));
        assert!(matches!(
            AppError::from(GuardError::Forbidden),
            AppError::Forbidden
        ));
    }

    // ── Store-error metric ───────────────────────────────────────────

    #[test]
    fn unavailable_errors_increment_store_error_counter() {
        let state = test_state();
        assert_eq!(state.metrics.metrics.store_errors.get(), 0);

        let err = record_unavailable(&state, StoreError::Unavailable("connection reset".into()));
        assert!(matches!(err, AppError::Unavailable));
        assert_eq!(state.metrics.metrics.store_errors.get(), 1);

        let err = record_unavailable(&state, AuthError::Unavailable);
        assert!(matches!(err, AppError::Unavailable));
        assert_eq!(state.metrics.metrics.store_errors.get(), 2);
    }

    #[test]
    fn domain_errors_do_not_touch_store_error_counter() {
        let state = test_state();
        record_unavailable(&state, StoreError::DuplicateEmail);
        record_unavailable(&state, AuthError::InvalidCredentials);
        record_unavailable(&state, GuardError::Forbidden);
        assert_eq!(state.metrics.metrics.store_errors.get(), 0);
    }

    // ── Request parsing ──────────────────────────────────────────────

    #[test]
    fn admin_register_request_flattens_profile_fields() {
        let request: AdminRegisterRequest = serde_json::from_str(
            r#"{
                "email": "ops@example.com",
                "password": "s3cret",
                "first_name": "Op",
                "last_name": "Erator",
                "role": "admin"
            }"#,
        )
        .unwrap();
        assert_eq!(request.role, Role::Admin);
        assert_eq!(request.registration.email, "ops@example.com");
        assert!(request.registration.phone_number.is_none());
    }

    #[test]
    fn list_query_defaults() {
        let query: ListQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(query.skip, 0);
        assert_eq!(query.limit, 100);
    }
}
