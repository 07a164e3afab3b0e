//! Authentication API Endpoints
//! Mission: Login, logout, profile, password change and admin creation

use crate::auth::{
    admin_store::{AdminStore, StoreError},
    jwt::JwtHandler,
    middleware::{bearer_token, AuthenticatedAdmin},
    models::{
        AdminEnvelope, AdminProfile, AdminRole, AdminSummary, ApiResponse,
        ChangePasswordRequest, CreateAdminRequest, CreatedAdmin, LoginData, LoginRequest,
        NewAdmin, MIN_PASSWORD_LEN,
    },
    revocation::RevocationList,
};
use crate::config::AppConfig;
use crate::db::Database;
use crate::middleware::RejectionReason;
use crate::retry::{RetryPolicy, Sleeper, TokioSleeper};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt::Display;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Shared auth state
#[derive(Clone)]
pub struct AuthState {
    pub admins: Arc<AdminStore>,
    pub revocations: Arc<RevocationList>,
    pub jwt_handler: Arc<JwtHandler>,
    pub retry_policy: RetryPolicy,
    pub sleeper: Arc<dyn Sleeper>,
    /// Echo internal error detail to clients (development only)
    pub expose_error_detail: bool,
}

impl AuthState {
    pub fn new(db: Database, config: &AppConfig) -> Self {
        Self {
            admins: Arc::new(AdminStore::new(db.clone(), config.bcrypt_cost)),
            revocations: Arc::new(RevocationList::new(db)),
            jwt_handler: Arc::new(JwtHandler::with_ttl(&config.jwt_secret, config.token_ttl)),
            retry_policy: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
            expose_error_detail: config.expose_error_detail(),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Log an unexpected failure and turn it into a 500
    fn internal(&self, message: &'static str, err: impl Display) -> AuthApiError {
        error!("{}: {}", message, err);
        AuthApiError::Internal {
            message,
            detail: self.expose_error_detail.then(|| err.to_string()),
        }
    }

    fn store_error(&self, message: &'static str, err: StoreError) -> AuthApiError {
        match err {
            StoreError::Validation(msg) => AuthApiError::Validation(msg),
            StoreError::DuplicateUsername(_) => AuthApiError::UsernameTaken,
            StoreError::NotFound => AuthApiError::AdminNotFound,
            other => self.internal(message, other),
        }
    }
}

/// Structured failure body: `{success:false, message, error?}`
#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    success: bool,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Build the failure body and tag the response with `reason` for the access log
pub(crate) fn error_response(
    status: StatusCode,
    reason: &'static str,
    message: &str,
    detail: Option<String>,
) -> Response {
    let body = ErrorBody {
        success: false,
        message,
        error: detail,
    };
    let mut response = (status, Json(body)).into_response();
    response.extensions_mut().insert(RejectionReason(reason));
    response
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl LoginRequest {
    /// Returns the trimmed username and the password as sent
    fn into_credentials(self) -> Result<(String, String), AuthApiError> {
        let username = self.username.map(|u| u.trim().to_string());
        match (non_empty(username), non_empty(self.password)) {
            (Some(username), Some(password)) => Ok((username, password)),
            _ => Err(AuthApiError::MissingCredentials),
        }
    }
}

impl ChangePasswordRequest {
    fn into_passwords(self) -> Result<(String, String), AuthApiError> {
        let (current, new) = match (non_empty(self.current_password), non_empty(self.new_password)) {
            (Some(current), Some(new)) => (current, new),
            _ => return Err(AuthApiError::MissingPasswordFields),
        };
        if new.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthApiError::WeakNewPassword);
        }
        Ok((current, new))
    }
}

impl CreateAdminRequest {
    fn into_new_admin(self) -> Result<NewAdmin, AuthApiError> {
        let username = self.username.map(|u| u.trim().to_string());
        let (username, password) = match (non_empty(username), non_empty(self.password)) {
            (Some(username), Some(password)) => (username, password),
            _ => return Err(AuthApiError::MissingCredentials),
        };
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthApiError::WeakPassword);
        }
        let role = match non_empty(self.role) {
            Some(raw) => AdminRole::from_str(&raw).ok_or(AuthApiError::InvalidRole)?,
            None => AdminRole::default(),
        };
        Ok(NewAdmin {
            username,
            password,
            email: self.email,
            role,
        })
    }
}

/// Login endpoint - POST /api/auth/login
pub async fn login(
    State(state): State<AuthState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<LoginData>>, AuthApiError> {
    let Json(payload) = payload.map_err(|_| AuthApiError::MalformedBody)?;
    let (username, password) = payload.into_credentials()?;

    info!("🔐 Login attempt: {}", username);

    let admin = state
        .admins
        .find_by_username_with_retry(&username, &state.retry_policy, state.sleeper.as_ref())
        .await
        .map_err(|e| state.internal("Server error during login", e))?;

    // Distinct messages for unknown username and wrong password are kept as-is
    let Some(mut admin) = admin else {
        warn!("❌ Login failed, unknown username: {}", username);
        return Err(AuthApiError::UnknownUsername);
    };

    let valid = state
        .admins
        .verify_password(&admin, &password)
        .map_err(|e| state.internal("Server error during login", e))?;
    if !valid {
        warn!("❌ Login failed, wrong password: {}", admin.username);
        return Err(AuthApiError::WrongPassword);
    }

    // Best effort: a failed timestamp update never blocks the login
    match state.admins.touch_last_login(&admin) {
        Ok(ts) => admin.last_login = Some(ts),
        Err(e) => warn!("Failed to update last login for {}: {}", admin.username, e),
    }

    let (token, _expires_in) = state
        .jwt_handler
        .issue(&admin.id)
        .map_err(|e| state.internal("Server error during login", e))?;

    info!(
        "✅ Login successful: {} ({})",
        admin.username,
        admin.role.as_str()
    );

    Ok(Json(ApiResponse::ok(
        "Login successful",
        LoginData {
            token,
            admin: AdminSummary::from_admin(&admin),
        },
    )))
}

/// Current admin profile - GET /api/auth/profile
pub async fn profile(
    current: AuthenticatedAdmin,
) -> Json<ApiResponse<AdminEnvelope<AdminProfile>>> {
    Json(ApiResponse::data(AdminEnvelope {
        admin: AdminProfile::from_admin(&current.admin),
    }))
}

/// Logout - POST /api/auth/logout
///
/// Revokes the bearer token when one is sent. Succeeds without a token.
pub async fn logout(
    State(state): State<AuthState>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<()>>, AuthApiError> {
    if let Some(token) = bearer_token(&headers) {
        state
            .revocations
            .revoke(&token)
            .map_err(|e| state.internal("Server error during logout", e))?;
        info!("👋 Logout, token revoked");
    }

    Ok(Json(ApiResponse::message("Logout successful")))
}

/// Change password - POST /api/auth/change-password
pub async fn change_password(
    State(state): State<AuthState>,
    current: AuthenticatedAdmin,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<()>>, AuthApiError> {
    let Json(payload) = payload.map_err(|_| AuthApiError::MalformedBody)?;
    let (current_password, new_password) = payload.into_passwords()?;

    // Reload so the check runs against the latest stored hash
    let admin = state
        .admins
        .find_by_id(&current.admin.id)
        .map_err(|e| state.internal("Server error", e))?
        .ok_or(AuthApiError::AdminNotFound)?;

    let valid = state
        .admins
        .verify_password(&admin, &current_password)
        .map_err(|e| state.internal("Server error", e))?;
    if !valid {
        warn!("❌ Password change rejected, wrong current password: {}", admin.username);
        return Err(AuthApiError::IncorrectCurrentPassword);
    }

    state
        .admins
        .change_password(&admin, &new_password)
        .map_err(|e| state.store_error("Server error", e))?;

    Ok(Json(ApiResponse::message("Password changed successfully")))
}

/// Create admin - POST /api/auth/admins
///
/// Any authenticated admin may call this; there is no role check yet.
pub async fn create_admin(
    State(state): State<AuthState>,
    caller: AuthenticatedAdmin,
    payload: Result<Json<CreateAdminRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<AdminEnvelope<CreatedAdmin>>>), AuthApiError> {
    let Json(payload) = payload.map_err(|_| AuthApiError::MalformedBody)?;
    let new_admin = payload.into_new_admin()?;

    let admin = state
        .admins
        .create(new_admin)
        .map_err(|e| state.store_error("Server error", e))?;

    info!(
        created_by = %caller.admin.username,
        "✅ Admin created: {} ({})",
        admin.username,
        admin.role.as_str()
    );

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(
            "Admin created successfully",
            AdminEnvelope {
                admin: CreatedAdmin::from_admin(&admin),
            },
        )),
    ))
}

/// Auth API errors
#[derive(Debug)]
pub enum AuthApiError {
    MalformedBody,
    MissingCredentials,
    UnknownUsername,
    WrongPassword,
    MissingPasswordFields,
    WeakPassword,
    WeakNewPassword,
    IncorrectCurrentPassword,
    InvalidRole,
    UsernameTaken,
    Validation(String),
    AdminNotFound,
    Internal {
        message: &'static str,
        detail: Option<String>,
    },
}

impl AuthApiError {
    /// Stable short code for logs
    pub fn reason(&self) -> &'static str {
        match self {
            AuthApiError::MalformedBody => "malformed_body",
            AuthApiError::MissingCredentials => "missing_credentials",
            AuthApiError::UnknownUsername => "unknown_username",
            AuthApiError::WrongPassword => "wrong_password",
            AuthApiError::MissingPasswordFields => "missing_password_fields",
            AuthApiError::WeakPassword | AuthApiError::WeakNewPassword => "weak_password",
            AuthApiError::IncorrectCurrentPassword => "incorrect_current_password",
            AuthApiError::InvalidRole => "invalid_role",
            AuthApiError::UsernameTaken => "username_taken",
            AuthApiError::Validation(_) => "validation",
            AuthApiError::AdminNotFound => "admin_not_found",
            AuthApiError::Internal { .. } => "internal",
        }
    }
}

impl IntoResponse for AuthApiError {
    fn into_response(self) -> Response {
        let reason = self.reason();
        let (status, message, detail) = match self {
            AuthApiError::MalformedBody => (
                StatusCode::BAD_REQUEST,
                "Request body must be valid JSON".to_string(),
                None,
            ),
            AuthApiError::MissingCredentials => (
                StatusCode::BAD_REQUEST,
                "Username and password are required".to_string(),
                None,
            ),
            AuthApiError::UnknownUsername => (
                StatusCode::UNAUTHORIZED,
                "Username is incorrect".to_string(),
                None,
            ),
            AuthApiError::WrongPassword => (
                StatusCode::UNAUTHORIZED,
                "Password is incorrect".to_string(),
                None,
            ),
            AuthApiError::MissingPasswordFields => (
                StatusCode::BAD_REQUEST,
                "Current password and new password are required".to_string(),
                None,
            ),
            AuthApiError::WeakPassword => (
                StatusCode::BAD_REQUEST,
                format!("Password must be at least {} characters", MIN_PASSWORD_LEN),
                None,
            ),
            AuthApiError::WeakNewPassword => (
                StatusCode::BAD_REQUEST,
                format!("New password must be at least {} characters", MIN_PASSWORD_LEN),
                None,
            ),
            AuthApiError::IncorrectCurrentPassword => (
                StatusCode::BAD_REQUEST,
                "Current password is incorrect".to_string(),
                None,
            ),
            AuthApiError::InvalidRole => (
                StatusCode::BAD_REQUEST,
                "Role must be one of: admin, superadmin".to_string(),
                None,
            ),
            AuthApiError::UsernameTaken => (
                StatusCode::BAD_REQUEST,
                "Username is already taken".to_string(),
                None,
            ),
            AuthApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg, None),
            AuthApiError::AdminNotFound => {
                (StatusCode::NOT_FOUND, "Admin not found".to_string(), None)
            }
            AuthApiError::Internal { message, detail } => {
                (StatusCode::INTERNAL_SERVER_ERROR, message.to_string(), detail)
            }
        };

        error_response(status, reason, &message, detail)
    }
}
