use crate::database::{ConnectionProvider, DataAccess, Payload, SqlExecutor};
use crate::middleware::{AuthUser, RequestContext};

pub const ACTIVITY_TABLE: &str = "activity_logs";

/// One audit entry written after a mutating request.
#[derive(Debug, Clone)]
pub struct Activity<'a> {
    pub action: &'a str,
    pub target_type: &'a str,
    pub target_id: Option<u64>,
}

impl<'a> Activity<'a> {
    pub fn new(action: &'a str, target_type: &'a str, target_id: Option<u64>) -> Self {
        Self {
            action,
            target_type,
            target_id,
        }
    }

    pub fn payload(&self, actor: Option<&AuthUser>, ctx: &RequestContext) -> Payload {
        Payload::new()
            .set_opt("user_id", actor.map(|u| u.user_id))
            .set("action", self.action)
            .set("target_type", self.target_type)
            .set_opt("target_id", self.target_id)
            .set_opt("ip_address", ctx.client_ip.clone())
            .set_opt("user_agent", ctx.user_agent.clone())
            .set("request_id", ctx.request_id.to_string())
    }
}

/// Append to `activity_logs`. Failures are logged and swallowed: the
/// request that triggered the entry has already succeeded.
pub async fn write<E: SqlExecutor>(
    access: &DataAccess<E>,
    activity: &Activity<'_>,
    actor: Option<&AuthUser>,
    ctx: &RequestContext,
) {
    if let Err(e) = access.insert(&activity.payload(actor, ctx)).await {
        tracing::warn!(
            "Failed to record activity '{}' on {} {:?}: {}",
            activity.action,
            activity.target_type,
            activity.target_id,
            e
        );
    }
}

pub async fn record(db: &ConnectionProvider, activity: Activity<'_>, actor: Option<&AuthUser>, ctx: &RequestContext) {
    match db.table(ACTIVITY_TABLE) {
        Ok(access) => write(&access, &activity, actor, ctx).await,
        Err(e) => tracing::warn!("Activity log unavailable: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::testing::{CallKind, RecordingExecutor};
    use chrono::Utc;
    use serde_json::json;
    use std::sync::Arc;
    use uuid::Uuid;

    fn ctx() -> RequestContext {
        RequestContext {
            request_id: Uuid::nil(),
            client_ip: Some("192.0.2.10".into()),
            forwarded_for: vec![],
            user_agent: None,
            method: "POST".into(),
            path: "/api/communities".into(),
            received_at: Utc::now(),
        }
    }

    fn actor() -> AuthUser {
        AuthUser {
            user_id: 9,
            role: Role::Convener,
            email: None,
            status: None,
        }
    }

    #[tokio::test]
    async fn writes_one_insert_with_context() {
        let executor = Arc::new(RecordingExecutor::new());
        let access = DataAccess::for_table(executor.clone(), "cohort", ACTIVITY_TABLE).unwrap();
        let actor = actor();
        write(&access, &Activity::new("community.create", "community", Some(3)), Some(&actor), &ctx()).await;

        let calls = executor.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].kind, CallKind::Execute);
        assert!(calls[0]
            .statement
            .query
            .starts_with("INSERT INTO `cohort`.`activity_logs` (`user_id`, `action`, `target_type`, `target_id`, `ip_address`, `request_id`"));
        assert_eq!(calls[0].statement.params[0], json!(9));
        assert_eq!(calls[0].statement.params[4], json!("192.0.2.10"));
    }

    #[tokio::test]
    async fn failures_are_swallowed() {
        let executor = Arc::new(RecordingExecutor::new().failing("table missing"));
        let access = DataAccess::for_table(executor.clone(), "cohort", ACTIVITY_TABLE).unwrap();
        write(&access, &Activity::new("community.delete", "community", None), None, &ctx()).await;
        assert_eq!(executor.call_count(), 1);
    }
}
