use chrono::Utc;
use sea_orm::{ActiveModelTrait, ConnectionTrait, Set};
use uuid::Uuid;

use crate::{entities::audit_log, errors::ServiceError};

/// Writes an audit row inside the caller's transaction, so the entry
/// commits or rolls back together with the mutation it describes. Failed
/// operations therefore never leave a log entry.
pub async fn record<C: ConnectionTrait>(
    conn: &C,
    user_id: Option<Uuid>,
    action: &str,
    entity_type: &str,
    entity_id: impl ToString,
    detail: Option<serde_json::Value>,
) -> Result<(), ServiceError> {
    let entry = audit_log::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        action: Set(action.to_string()),
        entity_type: Set(entity_type.to_string()),
        entity_id: Set(entity_id.to_string()),
        detail: Set(detail.map(|d| d.to_string())),
        created_at: Set(Utc::now()),
    };
    entry.insert(conn).await?;
    Ok(())
}
