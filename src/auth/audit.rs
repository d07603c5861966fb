//! Append-only security audit trail.
//!
//! Recording never fails the operation being audited: the append is bounded
//! by a timeout and any failure is logged.

use super::{bounded, AuthError, Clock};
use crate::store::{AuditAction, AuditEntry, AuditSeverity, Store, TenantId};
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use time::OffsetDateTime;
use tracing::{error, warn};
use uuid::Uuid;

pub const MAX_AUDIT_PAGE: i64 = 200;

pub struct AuditRecorder {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    storage_timeout: Duration,
}

impl AuditRecorder {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        timeout: Duration,
        storage_timeout: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            timeout,
            storage_timeout,
        }
    }

    pub async fn record(
        &self,
        tenant_id: TenantId,
        actor_email: &str,
        action: AuditAction,
        payload: Value,
        source_address: Option<&str>,
    ) {
        let entry = AuditEntry {
            id: Uuid::now_v7(),
            tenant_id,
            actor_email: actor_email.to_string(),
            action,
            severity: action.severity(),
            payload,
            source_address: source_address.map(ToString::to_string),
            recorded_at: self.clock.now(),
        };

        if entry.severity == AuditSeverity::High {
            warn!(
                tenant_id,
                actor = %entry.actor_email,
                action = %action,
                "High severity security event"
            );
        }

        match tokio::time::timeout(self.timeout, self.store.append_audit(&entry)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!(tenant_id, action = %action, "Failed to record audit entry: {err}"),
            Err(_) => error!(
                tenant_id,
                action = %action,
                "Timed out recording audit entry after {:?}",
                self.timeout
            ),
        }
    }

    /// Newest first, at most [`MAX_AUDIT_PAGE`] entries.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::StorageUnavailable`] when the store cannot answer in time.
    pub async fn list(
        &self,
        tenant_id: TenantId,
        before: Option<OffsetDateTime>,
        limit: Option<i64>,
    ) -> Result<Vec<AuditEntry>, AuthError> {
        let limit = limit.unwrap_or(50).clamp(1, MAX_AUDIT_PAGE);
        bounded(
            self.storage_timeout,
            self.store.list_audit(tenant_id, before, limit),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ManualClock;
    use crate::store::MemoryStore;
    use serde_json::json;
    use time::macros::datetime;

    fn recorder(store: Arc<MemoryStore>) -> AuditRecorder {
        AuditRecorder::new(
            store,
            Arc::new(ManualClock::new(datetime!(2026-03-01 12:00 UTC))),
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn record_appends_with_action_severity() -> Result<(), AuthError> {
        let store = Arc::new(MemoryStore::new());
        let audit = recorder(Arc::clone(&store));
        audit
            .record(
                7,
                "owner@bistro.fr",
                AuditAction::SessionReplayDetected,
                json!({"session_id": "x"}),
                Some("10.0.0.1"),
            )
            .await;

        let entries = audit.list(7, None, None).await?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].severity, AuditSeverity::High);
        assert_eq!(entries[0].actor_email, "owner@bistro.fr");
        assert_eq!(entries[0].source_address.as_deref(), Some("10.0.0.1"));
        Ok(())
    }

    #[tokio::test]
    async fn failed_append_does_not_propagate() {
        let store = Arc::new(MemoryStore::new());
        store.fail_audit_appends();
        let audit = recorder(Arc::clone(&store));
        audit
            .record(7, "owner@bistro.fr", AuditAction::Login, json!({}), None)
            .await;
        assert_eq!(store.audit_len().await, 0);
    }

    #[tokio::test]
    async fn list_is_scoped_to_tenant() -> Result<(), AuthError> {
        let store = Arc::new(MemoryStore::new());
        let audit = recorder(Arc::clone(&store));
        audit
            .record(1, "a@bistro.fr", AuditAction::Login, json!({}), None)
            .await;
        audit
            .record(2, "b@bistro.fr", AuditAction::Login, json!({}), None)
            .await;
        let entries = audit.list(1, None, Some(1_000)).await?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].actor_email, "a@bistro.fr");
        Ok(())
    }
}
