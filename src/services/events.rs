use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::db::now_ts;

/// Change notification pushed to dashboard clients over `/api/events`.
#[derive(Clone, Debug, Serialize)]
pub struct AppEvent {
    pub event_type: String,
    pub user_id: String,
    pub entity: String,
    pub entity_id: Option<i32>,
    pub payload: Value,
    pub timestamp: i64,
}

impl AppEvent {
    pub fn new(
        event_type: &str,
        user_id: &str,
        entity: &str,
        entity_id: Option<i32>,
        payload: Value,
    ) -> Self {
        Self {
            event_type: event_type.to_string(),
            user_id: user_id.to_string(),
            entity: entity.to_string(),
            entity_id,
            payload,
            timestamp: now_ts(),
        }
    }
}

/// Sends without caring whether anyone is subscribed.
pub fn publish(tx: &broadcast::Sender<AppEvent>, event: AppEvent) {
    let _ = tx.send(event);
}
