//! JWT Token Handler
//! Mission: Issue and validate signed session tokens bound to an admin id

use crate::auth::models::Claims;
use anyhow::{Context, Result};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// JWT Handler for token operations.
///
/// Keys and lifetime are fixed at construction; the handler holds no
/// mutable state and is shared behind an `Arc`.
pub struct JwtHandler {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl JwtHandler {
    /// Create a new JWT handler with secret key and 24-hour tokens
    pub fn new(secret: &str) -> Self {
        Self::with_ttl(secret, Duration::from_secs(24 * 3600))
    }

    pub fn with_ttl(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token for an admin. Returns the token and its lifetime in seconds.
    pub fn issue(&self, admin_id: &Uuid) -> Result<(String, usize)> {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(self.ttl).context("Token lifetime out of range")?;
        let expiration = now
            .checked_add_signed(ttl)
            .context("Invalid timestamp")?
            .timestamp() as usize;

        let claims = Claims {
            admin_id: admin_id.to_string(),
            jti: Uuid::new_v4().simple().to_string(),
            iat: now.timestamp() as usize,
            exp: expiration,
        };

        debug!(
            "Issuing JWT for admin {}, expires in {}s",
            admin_id,
            self.ttl.as_secs()
        );

        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .context("Failed to generate JWT")?;

        Ok((token, self.ttl.as_secs() as usize))
    }

    /// Validate signature and expiry and extract claims
    pub fn validate(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::default();
        validation.leeway = 0;

        let decoded = decode::<Claims>(token, &self.decoding_key, &validation)
            .context("Invalid or expired token")?;

        debug!("Validated JWT for admin {}", decoded.claims.admin_id);

        Ok(decoded.claims)
    }
}
