//! Repository for the `bus_messages` queue table.
//!
//! The claim uses `FOR UPDATE SKIP LOCKED` so any number of consumers
//! can poll the same topic without double-claiming, and bumps the
//! attempt counter while pushing `visible_at` forward by the redelivery
//! lease. An unacked (undeleted) message becomes visible again when the
//! lease expires.

use sqlx::PgPool;

use crate::models::message::MessageRow;

/// Column list for `bus_messages` queries.
const COLUMNS: &str = "id, topic, envelope, attempts, visible_at";

/// Queue operations for the durable bus.
pub struct QueueRepo;

impl QueueRepo {
    /// Append a message, immediately visible.
    pub async fn enqueue(
        pool: &PgPool,
        topic: &str,
        envelope: &serde_json::Value,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO bus_messages (topic, envelope) VALUES ($1, $2) RETURNING id",
        )
        .bind(topic)
        .bind(envelope)
        .fetch_one(pool)
        .await
    }

    /// Claim the next visible message for a topic, if any.
    pub async fn claim_next(
        pool: &PgPool,
        topic: &str,
        lease_secs: f64,
        max_attempts: i32,
    ) -> Result<Option<MessageRow>, sqlx::Error> {
        let query = format!(
            "UPDATE bus_messages \
             SET attempts = attempts + 1, \
                 visible_at = NOW() + make_interval(secs => $3) \
             WHERE id = ( \
                 SELECT id FROM bus_messages \
                 WHERE topic = $1 AND NOT dead \
                   AND visible_at <= NOW() AND attempts < $2 \
                 ORDER BY id ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, MessageRow>(&query)
            .bind(topic)
            .bind(max_attempts)
            .bind(lease_secs)
            .fetch_optional(pool)
            .await
    }

    /// Park messages whose attempts are exhausted so they are never
    /// redelivered. Returns how many rows were parked.
    pub async fn park_exhausted(
        pool: &PgPool,
        topic: &str,
        max_attempts: i32,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE bus_messages SET dead = TRUE \
             WHERE topic = $1 AND NOT dead \
               AND visible_at <= NOW() AND attempts >= $2",
        )
        .bind(topic)
        .bind(max_attempts)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Acknowledge (consume) a claimed message.
    pub async fn delete(pool: &PgPool, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM bus_messages WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }
}
