//! Row model for the `bus_messages` queue table.

use sqlcheck_core::types::Timestamp;
use sqlx::FromRow;

/// A claimed row from the `bus_messages` table.
#[derive(Debug, Clone, FromRow)]
pub struct MessageRow {
    pub id: i64,
    pub topic: String,
    pub envelope: serde_json::Value,
    pub attempts: i32,
    pub visible_at: Timestamp,
}
