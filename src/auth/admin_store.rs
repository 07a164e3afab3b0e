//! Administrator Storage
//! Mission: Store administrator accounts with hashed credentials in SQLite

use crate::auth::models::{Admin, AdminRole, NewAdmin, MIN_PASSWORD_LEN};
use crate::config::BootstrapAdmin;
use crate::db::Database;
use crate::retry::{RetryPolicy, Retryable, Sleeper};
use anyhow::Context;
use bcrypt::{hash, verify};
use chrono::{DateTime, Utc};
use rusqlite::{params, types::Type, OptionalExtension, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

const ADMIN_COLUMNS: &str =
    "id, username, password_hash, email, role, is_active, last_login, created_at";

/// Administrator store errors
#[derive(Debug)]
pub enum StoreError {
    /// Input rejected before anything was written
    Validation(String),
    DuplicateUsername(String),
    NotFound,
    Hashing(bcrypt::BcryptError),
    /// The store itself failed; the only retryable kind
    Persistence(rusqlite::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Validation(msg) => write!(f, "Validation error: {}", msg),
            StoreError::DuplicateUsername(name) => write!(f, "Username already taken: {}", name),
            StoreError::NotFound => write!(f, "Admin not found"),
            StoreError::Hashing(e) => write!(f, "Password hashing error: {}", e),
            StoreError::Persistence(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Persistence(e)
    }
}

impl From<bcrypt::BcryptError> for StoreError {
    fn from(e: bcrypt::BcryptError) -> Self {
        StoreError::Hashing(e)
    }
}

impl Retryable for StoreError {
    fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Persistence(_))
    }
}

/// Lookups compare and store usernames in this form
pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

fn validate_password(password: &str) -> Result<(), StoreError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(StoreError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Administrator storage on top of the shared database handle
#[derive(Clone)]
pub struct AdminStore {
    db: Database,
    hash_cost: u32,
}

impl AdminStore {
    pub fn new(db: Database, hash_cost: u32) -> Self {
        Self { db, hash_cost }
    }

    /// Get admin by username (case-insensitive)
    pub fn find_by_username(&self, username: &str) -> Result<Option<Admin>, StoreError> {
        let username = normalize_username(username);
        let sql = format!("SELECT {} FROM admins WHERE username = ?1", ADMIN_COLUMNS);

        let admin = self.db.with_conn(|conn| {
            conn.query_row(&sql, params![username], row_to_admin)
                .optional()
        })?;

        debug!(
            username = %username,
            found = admin.is_some(),
            "Admin lookup"
        );
        Ok(admin)
    }

    /// Username lookup that tolerates a briefly unavailable store.
    ///
    /// Only persistence failures are retried; an unknown username is a
    /// successful `None` and returns on the first attempt.
    pub async fn find_by_username_with_retry(
        &self,
        username: &str,
        policy: &RetryPolicy,
        sleeper: &dyn Sleeper,
    ) -> Result<Option<Admin>, StoreError> {
        policy
            .run(sleeper, || async { self.find_by_username(username) })
            .await
    }

    pub fn find_by_id(&self, id: &Uuid) -> Result<Option<Admin>, StoreError> {
        let sql = format!("SELECT {} FROM admins WHERE id = ?1", ADMIN_COLUMNS);
        let admin = self.db.with_conn(|conn| {
            conn.query_row(&sql, params![id.to_string()], row_to_admin)
                .optional()
        })?;
        Ok(admin)
    }

    /// Compare a plaintext candidate against the stored bcrypt hash
    pub fn verify_password(&self, admin: &Admin, password: &str) -> Result<bool, StoreError> {
        Ok(verify(password, &admin.password_hash)?)
    }

    /// Create a new admin. Nothing is written when validation fails.
    pub fn create(&self, new_admin: NewAdmin) -> Result<Admin, StoreError> {
        let username = normalize_username(&new_admin.username);
        if username.is_empty() {
            return Err(StoreError::Validation(
                "Username and password are required".to_string(),
            ));
        }
        validate_password(&new_admin.password)?;

        if self.find_by_username(&username)?.is_some() {
            return Err(StoreError::DuplicateUsername(username));
        }

        let password_hash = hash(&new_admin.password, self.hash_cost)?;

        let admin = Admin {
            id: Uuid::new_v4(),
            username,
            password_hash,
            email: new_admin
                .email
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty()),
            role: new_admin.role,
            is_active: true,
            last_login: None,
            created_at: Utc::now(),
        };

        let inserted = self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO admins (id, username, password_hash, email, role, is_active, last_login, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    admin.id.to_string(),
                    admin.username,
                    admin.password_hash,
                    admin.email,
                    admin.role.as_str(),
                    admin.is_active,
                    Option::<String>::None,
                    admin.created_at.to_rfc3339(),
                ],
            )
        });

        match inserted {
            Ok(_) => {}
            // Lost a race with a concurrent create for the same name
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(StoreError::DuplicateUsername(admin.username));
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            "✅ Created admin: {} ({})",
            admin.username,
            admin.role.as_str()
        );

        Ok(admin)
    }

    /// Replace the stored hash. The old hash stays when validation fails.
    pub fn change_password(&self, admin: &Admin, new_password: &str) -> Result<(), StoreError> {
        validate_password(new_password)?;

        let password_hash = hash(new_password, self.hash_cost)?;
        let rows_affected = self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE admins SET password_hash = ?1 WHERE id = ?2",
                params![password_hash, admin.id.to_string()],
            )
        })?;

        if rows_affected == 0 {
            return Err(StoreError::NotFound);
        }

        info!("🔑 Password changed for admin: {}", admin.username);
        Ok(())
    }

    /// Stamp the last-login time and return it
    pub fn touch_last_login(&self, admin: &Admin) -> Result<DateTime<Utc>, StoreError> {
        let now = Utc::now();
        let rows_affected = self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE admins SET last_login = ?1 WHERE id = ?2",
                params![now.to_rfc3339(), admin.id.to_string()],
            )
        })?;

        if rows_affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(now)
    }

    pub fn count_admins(&self) -> Result<i64, StoreError> {
        let count = self
            .db
            .with_conn(|conn| conn.query_row("SELECT COUNT(*) FROM admins", [], |row| row.get(0)))?;
        Ok(count)
    }

    /// Create the first superadmin when the store is empty
    pub fn ensure_bootstrap_admin(&self, bootstrap: Option<&BootstrapAdmin>) -> anyhow::Result<()> {
        let count = self
            .count_admins()
            .context("Failed to check for admin accounts")?;
        if count > 0 {
            return Ok(());
        }

        let Some(bootstrap) = bootstrap else {
            warn!("⚠️  No admin accounts exist and no bootstrap credentials are configured");
            return Ok(());
        };

        let admin = self
            .create(NewAdmin {
                username: bootstrap.username.clone(),
                password: bootstrap.password.clone(),
                email: None,
                role: AdminRole::SuperAdmin,
            })
            .context("Failed to create bootstrap admin")?;

        info!("🔐 Bootstrap admin created (username: {})", admin.username);
        warn!("⚠️  CHANGE THE BOOTSTRAP PASSWORD AFTER FIRST LOGIN!");
        Ok(())
    }
}

fn conversion_error<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn row_to_admin(row: &Row<'_>) -> rusqlite::Result<Admin> {
    let id: String = row.get(0)?;
    let role: String = row.get(4)?;
    let last_login: Option<String> = row.get(6)?;
    let created_at: String = row.get(7)?;

    Ok(Admin {
        id: Uuid::parse_str(&id).map_err(|e| conversion_error(0, e))?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        email: row.get(3)?,
        role: AdminRole::from_str(&role).unwrap_or_default(),
        is_active: row.get(5)?,
        last_login: last_login
            .as_deref()
            .map(|raw| parse_timestamp(6, raw))
            .transpose()?,
        created_at: parse_timestamp(7, &created_at)?,
    })
}
