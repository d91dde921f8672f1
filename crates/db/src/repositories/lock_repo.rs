//! Repository for the `task_locks` table.
//!
//! A row is a lock. Acquisition is one upsert: insert wins a free key,
//! and the conflict branch takes over only rows whose TTL has expired.
//! Renew and release are token-guarded so a stale owner can never touch
//! a lock that was taken over.

use sqlx::PgPool;
use uuid::Uuid;

/// Lock operations for the database-backed lock provider.
pub struct LockRepo;

impl LockRepo {
    /// Try to take the lock. Returns `true` on success.
    pub async fn acquire(
        pool: &PgPool,
        key: &str,
        token: Uuid,
        ttl_secs: f64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO task_locks (lock_key, token, expires_at) \
             VALUES ($1, $2, NOW() + make_interval(secs => $3)) \
             ON CONFLICT (lock_key) DO UPDATE \
             SET token = EXCLUDED.token, expires_at = EXCLUDED.expires_at \
             WHERE task_locks.expires_at <= NOW()",
        )
        .bind(key)
        .bind(token)
        .bind(ttl_secs)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Extend a held lock. Returns `false` if the token lost ownership.
    pub async fn renew(
        pool: &PgPool,
        key: &str,
        token: Uuid,
        ttl_secs: f64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE task_locks \
             SET expires_at = NOW() + make_interval(secs => $3) \
             WHERE lock_key = $1 AND token = $2 AND expires_at > NOW()",
        )
        .bind(key)
        .bind(token)
        .bind(ttl_secs)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Drop the lock if the token still owns it.
    pub async fn release(pool: &PgPool, key: &str, token: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM task_locks WHERE lock_key = $1 AND token = $2")
            .bind(key)
            .bind(token)
            .execute(pool)
            .await?;
        Ok(())
    }
}
