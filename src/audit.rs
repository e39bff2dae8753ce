use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::middleware::client_meta::ClientMeta;

/// Append one audit entry. Best-effort: a failed write is logged and
/// swallowed so it can never fail the operation being audited.
pub async fn record(db: &PgPool, user_id: Uuid, action: &str, details: Value, meta: &ClientMeta) {
    let res = sqlx::query(
        r#"
        INSERT INTO audit_log (user_id, action, details, ip_address, user_agent)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(user_id)
    .bind(action)
    .bind(details)
    .bind(&meta.ip_address)
    .bind(&meta.user_agent)
    .execute(db)
    .await;

    if let Err(e) = res {
        tracing::warn!("audit write failed for action {action}: {e}");
    }
}
