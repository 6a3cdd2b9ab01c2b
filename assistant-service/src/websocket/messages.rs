//! Live channel message types.
//!
//! Events are the only frames the server sends. Clients send nothing the
//! server acts on; inbound frames only keep the connection alive.

use serde::Serialize;

use crate::db::UserId;

/// What happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    TodoAdded,
    TodoDeleted,
    FinanceAdded,
    RecurringAdded,
    RecurringDeleted,
    RecurringProcessed,
    CreditAdded,
    CreditDeleted,
}

/// Notification pushed to a user's live client
///
/// Serialized as `{"type": ..., "user_id": ..., "data": ..., "timestamp": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub user_id: UserId,
    pub data: serde_json::Value,
    /// Unix seconds
    pub timestamp: i64,
}

impl Event {
    /// Build an event stamped with the current time
    pub fn new(kind: EventKind, user_id: UserId, data: impl Serialize) -> Self {
        let data = serde_json::to_value(data).unwrap_or_else(|e| {
            tracing::warn!(error = %e, ?kind, "Failed to serialize event payload");
            serde_json::Value::Null
        });

        Self {
            kind,
            user_id,
            data,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}
