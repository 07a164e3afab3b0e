//! Authentication Middleware
//! Mission: Admit only requests carrying a valid, unrevoked token for a known admin

use crate::auth::{api::AuthState, api::error_response, models::Admin};
use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Admin resolved by the gateway, attached to the request extensions
#[derive(Debug, Clone)]
pub struct AuthenticatedAdmin {
    pub admin: Admin,
}

/// Pull the bearer token out of the Authorization header, if any
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Gateway middleware.
///
/// Missing token, bad signature or expiry, revoked token and unknown admin
/// each short-circuit with 401. On success the resolved admin is attached
/// as [`AuthenticatedAdmin`].
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = bearer_token(req.headers()).ok_or(AuthError::MissingToken)?;

    let claims = state
        .jwt_handler
        .validate(&token)
        .map_err(|_| AuthError::InvalidToken)?;

    let revoked = state.revocations.is_revoked(&token).map_err(|e| {
        error!("Revocation lookup failed: {}", e);
        AuthError::Internal {
            detail: state.expose_error_detail.then(|| e.to_string()),
        }
    })?;
    if revoked {
        warn!(admin_id = %claims.admin_id, "Rejected revoked token");
        return Err(AuthError::RevokedToken);
    }

    let admin_id = Uuid::parse_str(&claims.admin_id).map_err(|_| AuthError::UnknownAdmin)?;
    let admin = state
        .admins
        .find_by_id(&admin_id)
        .map_err(|e| {
            error!("Admin lookup failed: {}", e);
            AuthError::Internal {
                detail: state.expose_error_detail.then(|| e.to_string()),
            }
        })?
        .ok_or(AuthError::UnknownAdmin)?;

    debug!(admin = %admin.username, "Request admitted");

    req.extensions_mut().insert(AuthenticatedAdmin { admin });

    Ok(next.run(req).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedAdmin
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedAdmin>()
            .cloned()
            .ok_or(AuthError::MissingToken)
    }
}

/// Gateway rejections
#[derive(Debug)]
pub enum AuthError {
    MissingToken,
    InvalidToken,
    RevokedToken,
    UnknownAdmin,
    Internal { detail: Option<String> },
}

impl AuthError {
    /// Stable short code for logs
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "missing_token",
            AuthError::InvalidToken => "invalid_token",
            AuthError::RevokedToken => "revoked_token",
            AuthError::UnknownAdmin => "unknown_admin",
            AuthError::Internal { .. } => "internal",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let reason = self.reason();
        let (status, message, detail) = match self {
            AuthError::MissingToken => {
                (StatusCode::UNAUTHORIZED, "Missing authorization token", None)
            }
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid or expired token", None),
            AuthError::RevokedToken => (StatusCode::UNAUTHORIZED, "Token has been revoked", None),
            AuthError::UnknownAdmin => (StatusCode::UNAUTHORIZED, "Admin not found", None),
            AuthError::Internal { detail } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Server error", detail)
            }
        };

        error_response(status, reason, message, detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::RejectionReason;
    use axum::http::{header::AUTHORIZATION, HeaderValue};

    #[test]
    fn test_auth_error_responses() {
        for err in [
            AuthError::MissingToken,
            AuthError::InvalidToken,
            AuthError::RevokedToken,
            AuthError::UnknownAdmin,
        ] {
            let reason = err.reason();
            let response = err.into_response();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(
                response.extensions().get::<RejectionReason>().copied(),
                Some(RejectionReason(reason))
            );
        }

        let internal = AuthError::Internal { detail: None }.into_response();
        assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc.def.ghi"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwYXNz"));
        assert!(bearer_token(&headers).is_none());
    }
}
