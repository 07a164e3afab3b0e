//! Token Revocation List
//! Mission: Reject logged-out tokens before their natural expiry
//!
//! Entries are keyed by the SHA-256 of the token so raw session tokens never
//! land on disk. Every entry lives for a fixed window after revocation,
//! regardless of the token's own `exp`. `is_revoked` answers by entry
//! presence alone; expired entries keep rejecting until `purge_expired` runs.

use crate::db::Database;
use chrono::{DateTime, Duration, Utc};
use rusqlite::params;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

/// Lifetime of a revocation entry
pub const REVOCATION_TTL_HOURS: i64 = 24;

fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Denylist of session tokens
#[derive(Clone)]
pub struct RevocationList {
    db: Database,
    ttl: Duration,
}

impl RevocationList {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            ttl: Duration::hours(REVOCATION_TTL_HOURS),
        }
    }

    /// Revoke `token` as of now
    pub fn revoke(&self, token: &str) -> rusqlite::Result<()> {
        self.revoke_at(token, Utc::now())
    }

    /// Revoke `token` as of `revoked_at`. Revoking an already revoked token
    /// keeps the original entry.
    pub fn revoke_at(&self, token: &str, revoked_at: DateTime<Utc>) -> rusqlite::Result<()> {
        let expires_at = revoked_at + self.ttl;
        let inserted = self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO revoked_tokens (token_hash, expires_at, revoked_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(token_hash) DO NOTHING",
                params![
                    hash_token(token),
                    expires_at.timestamp(),
                    revoked_at.timestamp()
                ],
            )
        })?;

        debug!(
            newly_revoked = inserted > 0,
            expires_at = %expires_at,
            "Token revoked"
        );
        Ok(())
    }

    pub fn is_revoked(&self, token: &str) -> rusqlite::Result<bool> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM revoked_tokens WHERE token_hash = ?1)",
                params![hash_token(token)],
                |row| row.get(0),
            )
        })
    }

    /// Delete entries whose window has passed. Returns the number removed.
    pub fn purge_expired(&self) -> rusqlite::Result<usize> {
        self.purge_expired_at(Utc::now())
    }

    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> rusqlite::Result<usize> {
        let removed = self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM revoked_tokens WHERE expires_at <= ?1",
                params![now.timestamp()],
            )
        })?;

        if removed > 0 {
            info!("🧹 Purged {} expired revocation entries", removed);
        }
        Ok(removed)
    }
}
