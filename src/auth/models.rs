//! Authentication Models
//! Mission: Define administrator records and the per-endpoint wire types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Minimum accepted password length, in characters
pub const MIN_PASSWORD_LEN: usize = 6;

/// Administrator account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Admin {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // bcrypt hash - never serialize
    pub email: Option<String>,
    pub role: AdminRole,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Administrator roles
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum AdminRole {
    #[default]
    #[serde(rename = "admin")]
    Admin,
    #[serde(rename = "superadmin")]
    SuperAdmin,
}

impl AdminRole {
    pub fn as_str(&self) -> &str {
        match self {
            AdminRole::Admin => "admin",
            AdminRole::SuperAdmin => "superadmin",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Some(AdminRole::Admin),
            "superadmin" => Some(AdminRole::SuperAdmin),
            _ => None,
        }
    }
}

/// JWT Claims payload. The administrator id is the only identity claim;
/// `jti` keeps two tokens issued in the same second distinct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "adminId")]
    pub admin_id: String,
    pub jti: String,
    pub iat: usize,
    pub exp: usize,
}

/// Input for creating an administrator
#[derive(Debug, Clone)]
pub struct NewAdmin {
    pub username: String,
    pub password: String,
    pub email: Option<String>,
    pub role: AdminRole,
}

// ---------------------------------------------------------------------------
// Request bodies. Every field is optional on the wire so that missing fields
// surface as a structured validation error rather than an extractor rejection.
// ---------------------------------------------------------------------------

/// Login request body
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Change password request body
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

/// Create admin request body
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateAdminRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
}

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

/// Standard success envelope: `{success, message?, data?}`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: Some(data),
        }
    }

    pub fn data(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: None,
        }
    }
}

/// `{admin: ...}` wrapper used by every admin-bearing payload
#[derive(Debug, Serialize)]
pub struct AdminEnvelope<T> {
    pub admin: T,
}

/// Login payload
#[derive(Debug, Serialize)]
pub struct LoginData {
    pub token: String,
    pub admin: AdminSummary,
}

/// Public administrator fields returned on login
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminSummary {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub role: AdminRole,
    pub last_login: Option<DateTime<Utc>>,
}

impl AdminSummary {
    pub fn from_admin(admin: &Admin) -> Self {
        Self {
            id: admin.id.to_string(),
            username: admin.username.clone(),
            email: admin.email.clone(),
            role: admin.role,
            last_login: admin.last_login,
        }
    }
}

/// Public administrator fields returned by the profile endpoint
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminProfile {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub role: AdminRole,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl AdminProfile {
    pub fn from_admin(admin: &Admin) -> Self {
        Self {
            id: admin.id.to_string(),
            username: admin.username.clone(),
            email: admin.email.clone(),
            role: admin.role,
            last_login: admin.last_login,
            created_at: admin.created_at,
        }
    }
}

/// Public administrator fields returned after creation
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedAdmin {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub role: AdminRole,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl CreatedAdmin {
    pub fn from_admin(admin: &Admin) -> Self {
        Self {
            id: admin.id.to_string(),
            username: admin.username.clone(),
            email: admin.email.clone(),
            role: admin.role,
            is_active: admin.is_active,
            created_at: admin.created_at,
        }
    }
}
