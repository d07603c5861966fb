//! Postgres backend.

use super::{
    classify_unconsumed, AdminUser, AuditEntry, ClientMeta, Consumption, Invitation, NewAdmin,
    NewSession, ResetApplied, ResetRequest, Role, Session, SessionScope, Store, StoreError,
    TenantId,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    types::Json,
    PgConnection, PgPool, Row,
};
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{Instrument, Span};
use uuid::Uuid;

const SCHEMA: &str = include_str!("../../sql/schema.sql");

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot establish its first connection.
    pub async fn connect(dsn: &str, acquire_timeout: Duration) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .max_lifetime(Duration::from_secs(60 * 2))
            .acquire_timeout(acquire_timeout)
            .test_before_acquire(true)
            .connect(dsn)
            .await
            .context("Failed to connect to database")?;
        Ok(Self { pool })
    }

    /// Apply the idempotent schema.
    ///
    /// # Errors
    ///
    /// Returns an error if any DDL statement fails.
    pub async fn apply_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .instrument(db_span("DDL", "sql/schema.sql"))
            .await
            .context("failed to apply schema")?;
        Ok(())
    }
}

fn db_span(operation: &'static str, statement: &'static str) -> Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn map_sqlx(err: sqlx::Error) -> StoreError {
    if is_unique_violation(&err) {
        return StoreError::Conflict(err.to_string());
    }
    match err {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
        other => StoreError::Backend(other.to_string()),
    }
}

fn decode_error(message: String) -> sqlx::Error {
    sqlx::Error::Decode(message.into())
}

fn admin_from_row(row: &PgRow) -> Result<AdminUser, sqlx::Error> {
    let role: String = row.try_get("role")?;
    let permissions: Json<Vec<String>> = row.try_get("permissions")?;
    Ok(AdminUser {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role: role.parse().map_err(decode_error)?,
        permissions: permissions.0,
        disabled: row.try_get("disabled")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn session_from_row(row: &PgRow) -> Result<Session, sqlx::Error> {
    Ok(Session {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        admin_id: row.try_get("admin_id")?,
        current_token_hash: row.try_get("current_token_hash")?,
        rotation_count: row.try_get("rotation_count")?,
        created_at: row.try_get("created_at")?,
        last_used_at: row.try_get("last_used_at")?,
        expires_at: row.try_get("expires_at")?,
        revoked: row.try_get("revoked")?,
        revoked_at: row.try_get("revoked_at")?,
        client: ClientMeta {
            address: row.try_get("client_address")?,
            user_agent: row.try_get("user_agent")?,
        },
    })
}

fn audit_from_row(row: &PgRow) -> Result<AuditEntry, sqlx::Error> {
    let action: String = row.try_get("action")?;
    let severity: String = row.try_get("severity")?;
    let payload: Json<serde_json::Value> = row.try_get("payload")?;
    Ok(AuditEntry {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        actor_email: row.try_get("actor_email")?,
        action: action.parse().map_err(decode_error)?,
        severity: severity.parse().map_err(decode_error)?,
        payload: payload.0,
        source_address: row.try_get("source_address")?,
        recorded_at: row.try_get("recorded_at")?,
    })
}

async fn upsert_admin_row(
    conn: &mut PgConnection,
    admin: &NewAdmin,
    now: OffsetDateTime,
) -> Result<AdminUser, sqlx::Error> {
    let query = r"
        INSERT INTO admin_users
            (id, tenant_id, email, password_hash, role, permissions, disabled, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, FALSE, $7, $7)
        ON CONFLICT (tenant_id, email) DO UPDATE
        SET password_hash = EXCLUDED.password_hash,
            role = EXCLUDED.role,
            permissions = EXCLUDED.permissions,
            disabled = FALSE,
            updated_at = EXCLUDED.updated_at
        RETURNING id, tenant_id, email, password_hash, role, permissions, disabled, created_at, updated_at
    ";
    let row = sqlx::query(query)
        .bind(Uuid::now_v7())
        .bind(admin.tenant_id)
        .bind(&admin.email)
        .bind(&admin.password_hash)
        .bind(admin.role.as_str())
        .bind(Json(&admin.permissions))
        .bind(now)
        .fetch_one(&mut *conn)
        .instrument(db_span("INSERT", query))
        .await?;
    admin_from_row(&row)
}

async fn revoke_admin_sessions_in(
    conn: &mut PgConnection,
    admin_id: Uuid,
    keep: Option<Uuid>,
    now: OffsetDateTime,
) -> Result<u64, sqlx::Error> {
    let query = r"
        UPDATE admin_sessions
        SET revoked = TRUE, revoked_at = $3
        WHERE admin_id = $1
          AND revoked = FALSE
          AND ($2::uuid IS NULL OR id <> $2)
    ";
    let result = sqlx::query(query)
        .bind(admin_id)
        .bind(keep)
        .bind(now)
        .execute(&mut *conn)
        .instrument(db_span("UPDATE", query))
        .await?;
    Ok(result.rows_affected())
}

#[async_trait]
impl Store for PgStore {
    async fn admin_by_email(
        &self,
        tenant_id: TenantId,
        email: &str,
    ) -> Result<Option<AdminUser>, StoreError> {
        let query = r"
            SELECT id, tenant_id, email, password_hash, role, permissions, disabled, created_at, updated_at
            FROM admin_users
            WHERE tenant_id = $1 AND email = $2
        ";
        let row = sqlx::query(query)
            .bind(tenant_id)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .map_err(map_sqlx)?;
        row.as_ref()
            .map(admin_from_row)
            .transpose()
            .map_err(map_sqlx)
    }

    async fn admin_by_id(&self, id: Uuid) -> Result<Option<AdminUser>, StoreError> {
        let query = r"
            SELECT id, tenant_id, email, password_hash, role, permissions, disabled, created_at, updated_at
            FROM admin_users
            WHERE id = $1
        ";
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .map_err(map_sqlx)?;
        row.as_ref()
            .map(admin_from_row)
            .transpose()
            .map_err(map_sqlx)
    }

    async fn upsert_admin(
        &self,
        admin: &NewAdmin,
        now: OffsetDateTime,
    ) -> Result<AdminUser, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(map_sqlx)?;
        upsert_admin_row(&mut conn, admin, now)
            .await
            .map_err(map_sqlx)
    }

    async fn insert_session(&self, session: &NewSession) -> Result<Session, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        let query = r"
            INSERT INTO admin_sessions
                (id, tenant_id, admin_id, current_token_hash, created_at, last_used_at, expires_at,
                 client_address, user_agent)
            VALUES ($1, $2, $3, $4, $5, $5, $6, $7, $8)
            RETURNING id, tenant_id, admin_id, current_token_hash, rotation_count, created_at,
                      last_used_at, expires_at, revoked, revoked_at, client_address, user_agent
        ";
        let row = sqlx::query(query)
            .bind(session.id)
            .bind(session.tenant_id)
            .bind(session.admin_id)
            .bind(&session.token_hash)
            .bind(session.created_at)
            .bind(session.expires_at)
            .bind(&session.client.address)
            .bind(&session.client.user_agent)
            .fetch_one(&mut *tx)
            .instrument(db_span("INSERT", query))
            .await
            .map_err(map_sqlx)?;
        let record = session_from_row(&row).map_err(map_sqlx)?;

        let query = r"
            INSERT INTO admin_session_tokens (token_hash, session_id, issued_at)
            VALUES ($1, $2, $3)
        ";
        sqlx::query(query)
            .bind(&session.token_hash)
            .bind(session.id)
            .bind(session.created_at)
            .execute(&mut *tx)
            .instrument(db_span("INSERT", query))
            .await
            .map_err(map_sqlx)?;

        tx.commit().await.map_err(map_sqlx)?;
        Ok(record)
    }

    async fn session_by_token_hash(
        &self,
        token_hash: &[u8],
    ) -> Result<Option<Session>, StoreError> {
        let query = r"
            SELECT id, tenant_id, admin_id, current_token_hash, rotation_count, created_at,
                   last_used_at, expires_at, revoked, revoked_at, client_address, user_agent
            FROM admin_sessions
            WHERE id = (SELECT session_id FROM admin_session_tokens WHERE token_hash = $1)
        ";
        let row = sqlx::query(query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .map_err(map_sqlx)?;
        row.as_ref()
            .map(session_from_row)
            .transpose()
            .map_err(map_sqlx)
    }

    async fn session_by_id(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        let query = r"
            SELECT id, tenant_id, admin_id, current_token_hash, rotation_count, created_at,
                   last_used_at, expires_at, revoked, revoked_at, client_address, user_agent
            FROM admin_sessions
            WHERE id = $1
        ";
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .map_err(map_sqlx)?;
        row.as_ref()
            .map(session_from_row)
            .transpose()
            .map_err(map_sqlx)
    }

    async fn swap_session_token(
        &self,
        id: Uuid,
        expected_hash: &[u8],
        new_hash: &[u8],
        now: OffsetDateTime,
        client: &ClientMeta,
    ) -> Result<Option<Session>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        // The row lock taken here serializes rotation against revocation.
        let query = r"
            UPDATE admin_sessions
            SET current_token_hash = $3,
                rotation_count = rotation_count + 1,
                last_used_at = $4,
                client_address = COALESCE($5, client_address),
                user_agent = COALESCE($6, user_agent)
            WHERE id = $1
              AND current_token_hash = $2
              AND revoked = FALSE
              AND expires_at > $4
            RETURNING id, tenant_id, admin_id, current_token_hash, rotation_count, created_at,
                      last_used_at, expires_at, revoked, revoked_at, client_address, user_agent
        ";
        let row = sqlx::query(query)
            .bind(id)
            .bind(expected_hash)
            .bind(new_hash)
            .bind(now)
            .bind(&client.address)
            .bind(&client.user_agent)
            .fetch_optional(&mut *tx)
            .instrument(db_span("UPDATE", query))
            .await
            .map_err(map_sqlx)?;

        let Some(row) = row else {
            tx.rollback().await.map_err(map_sqlx)?;
            return Ok(None);
        };
        let session = session_from_row(&row).map_err(map_sqlx)?;

        let query = r"
            INSERT INTO admin_session_tokens (token_hash, session_id, issued_at)
            VALUES ($1, $2, $3)
        ";
        sqlx::query(query)
            .bind(new_hash)
            .bind(id)
            .bind(now)
            .execute(&mut *tx)
            .instrument(db_span("INSERT", query))
            .await
            .map_err(map_sqlx)?;

        tx.commit().await.map_err(map_sqlx)?;
        Ok(Some(session))
    }

    async fn revoke_session(&self, id: Uuid, now: OffsetDateTime) -> Result<bool, StoreError> {
        let query = r"
            UPDATE admin_sessions
            SET revoked = TRUE, revoked_at = $2
            WHERE id = $1 AND revoked = FALSE
        ";
        let result = sqlx::query(query)
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .map_err(map_sqlx)?;
        Ok(result.rows_affected() == 1)
    }

    async fn revoke_admin_sessions(
        &self,
        admin_id: Uuid,
        keep: Option<Uuid>,
        now: OffsetDateTime,
    ) -> Result<u64, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(map_sqlx)?;
        revoke_admin_sessions_in(&mut conn, admin_id, keep, now)
            .await
            .map_err(map_sqlx)
    }

    async fn list_sessions(
        &self,
        scope: SessionScope,
        limit: i64,
    ) -> Result<Vec<Session>, StoreError> {
        let (tenant_id, admin_id) = match scope {
            SessionScope::Tenant(tenant_id) => (Some(tenant_id), None),
            SessionScope::Admin(admin_id) => (None, Some(admin_id)),
        };
        let query = r"
            SELECT id, tenant_id, admin_id, current_token_hash, rotation_count, created_at,
                   last_used_at, expires_at, revoked, revoked_at, client_address, user_agent
            FROM admin_sessions
            WHERE ($1::bigint IS NULL OR tenant_id = $1)
              AND ($2::uuid IS NULL OR admin_id = $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3
        ";
        let rows = sqlx::query(query)
            .bind(tenant_id)
            .bind(admin_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .map_err(map_sqlx)?;
        rows.iter()
            .map(session_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_sqlx)
    }

    async fn purge_sessions(&self, cutoff: OffsetDateTime) -> Result<u64, StoreError> {
        let query = r"
            DELETE FROM admin_sessions
            WHERE expires_at < $1
               OR (revoked AND revoked_at < $1)
        ";
        let result = sqlx::query(query)
            .bind(cutoff)
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await
            .map_err(map_sqlx)?;
        Ok(result.rows_affected())
    }

    async fn replace_invitation(&self, invitation: &Invitation) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        let query = r"
            DELETE FROM admin_invitations
            WHERE tenant_id = $1 AND email = $2 AND consumed_at IS NULL
        ";
        sqlx::query(query)
            .bind(invitation.tenant_id)
            .bind(&invitation.email)
            .execute(&mut *tx)
            .instrument(db_span("DELETE", query))
            .await
            .map_err(map_sqlx)?;

        let query = r"
            INSERT INTO admin_invitations
                (token_hash, tenant_id, email, role, invited_by, issued_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        ";
        sqlx::query(query)
            .bind(&invitation.token_hash)
            .bind(invitation.tenant_id)
            .bind(&invitation.email)
            .bind(invitation.role.as_str())
            .bind(&invitation.invited_by)
            .bind(invitation.issued_at)
            .bind(invitation.expires_at)
            .execute(&mut *tx)
            .instrument(db_span("INSERT", query))
            .await
            .map_err(map_sqlx)?;

        tx.commit().await.map_err(map_sqlx)?;
        Ok(())
    }

    async fn accept_invitation(
        &self,
        token_hash: &[u8],
        password_hash: &str,
        now: OffsetDateTime,
    ) -> Result<Consumption<AdminUser>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        let query = r"
            UPDATE admin_invitations
            SET consumed_at = $2
            WHERE token_hash = $1
              AND consumed_at IS NULL
              AND expires_at > $2
            RETURNING tenant_id, email, role
        ";
        let row = sqlx::query(query)
            .bind(token_hash)
            .bind(now)
            .fetch_optional(&mut *tx)
            .instrument(db_span("UPDATE", query))
            .await
            .map_err(map_sqlx)?;

        let Some(row) = row else {
            let query = r"
                SELECT consumed_at, expires_at
                FROM admin_invitations
                WHERE token_hash = $1
            ";
            let existing = sqlx::query(query)
                .bind(token_hash)
                .fetch_optional(&mut *tx)
                .instrument(db_span("SELECT", query))
                .await
                .map_err(map_sqlx)?;
            tx.rollback().await.map_err(map_sqlx)?;
            return match existing {
                None => Ok(Consumption::NotFound),
                Some(row) => Ok(classify_unconsumed(
                    row.try_get("consumed_at").map_err(map_sqlx)?,
                    row.try_get("expires_at").map_err(map_sqlx)?,
                    now,
                )),
            };
        };

        let role: String = row.try_get("role").map_err(map_sqlx)?;
        let role: Role = role.parse().map_err(StoreError::Backend)?;
        let admin = NewAdmin {
            tenant_id: row.try_get("tenant_id").map_err(map_sqlx)?,
            email: row.try_get("email").map_err(map_sqlx)?,
            password_hash: password_hash.to_string(),
            role,
            permissions: role.default_permissions(),
        };
        let user = upsert_admin_row(&mut tx, &admin, now)
            .await
            .map_err(map_sqlx)?;
        revoke_admin_sessions_in(&mut tx, user.id, None, now)
            .await
            .map_err(map_sqlx)?;

        tx.commit().await.map_err(map_sqlx)?;
        Ok(Consumption::Consumed(user))
    }

    async fn replace_reset_request(&self, request: &ResetRequest) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        let query = r"
            UPDATE password_reset_requests
            SET consumed_at = $2
            WHERE admin_id = $1 AND consumed_at IS NULL
        ";
        sqlx::query(query)
            .bind(request.admin_id)
            .bind(request.issued_at)
            .execute(&mut *tx)
            .instrument(db_span("UPDATE", query))
            .await
            .map_err(map_sqlx)?;

        let query = r"
            INSERT INTO password_reset_requests
                (token_hash, tenant_id, admin_id, issued_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
        ";
        sqlx::query(query)
            .bind(&request.token_hash)
            .bind(request.tenant_id)
            .bind(request.admin_id)
            .bind(request.issued_at)
            .bind(request.expires_at)
            .execute(&mut *tx)
            .instrument(db_span("INSERT", query))
            .await
            .map_err(map_sqlx)?;

        tx.commit().await.map_err(map_sqlx)?;
        Ok(())
    }

    async fn confirm_reset(
        &self,
        token_hash: &[u8],
        password_hash: &str,
        now: OffsetDateTime,
    ) -> Result<Consumption<ResetApplied>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        let query = r"
            UPDATE password_reset_requests
            SET consumed_at = $2
            WHERE token_hash = $1
              AND consumed_at IS NULL
              AND expires_at > $2
            RETURNING admin_id
        ";
        let row = sqlx::query(query)
            .bind(token_hash)
            .bind(now)
            .fetch_optional(&mut *tx)
            .instrument(db_span("UPDATE", query))
            .await
            .map_err(map_sqlx)?;

        let Some(row) = row else {
            let query = r"
                SELECT consumed_at, expires_at
                FROM password_reset_requests
                WHERE token_hash = $1
            ";
            let existing = sqlx::query(query)
                .bind(token_hash)
                .fetch_optional(&mut *tx)
                .instrument(db_span("SELECT", query))
                .await
                .map_err(map_sqlx)?;
            tx.rollback().await.map_err(map_sqlx)?;
            return match existing {
                None => Ok(Consumption::NotFound),
                Some(row) => Ok(classify_unconsumed(
                    row.try_get("consumed_at").map_err(map_sqlx)?,
                    row.try_get("expires_at").map_err(map_sqlx)?,
                    now,
                )),
            };
        };
        let admin_id: Uuid = row.try_get("admin_id").map_err(map_sqlx)?;

        let query = r"
            UPDATE admin_users
            SET password_hash = $2, updated_at = $3
            WHERE id = $1
            RETURNING id, tenant_id, email, password_hash, role, permissions, disabled, created_at, updated_at
        ";
        let row = sqlx::query(query)
            .bind(admin_id)
            .bind(password_hash)
            .bind(now)
            .fetch_one(&mut *tx)
            .instrument(db_span("UPDATE", query))
            .await
            .map_err(map_sqlx)?;
        let admin = admin_from_row(&row).map_err(map_sqlx)?;

        let revoked_sessions = revoke_admin_sessions_in(&mut tx, admin_id, None, now)
            .await
            .map_err(map_sqlx)?;

        tx.commit().await.map_err(map_sqlx)?;
        Ok(Consumption::Consumed(ResetApplied {
            admin,
            revoked_sessions,
        }))
    }

    async fn append_audit(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        let query = r"
            INSERT INTO audit_log
                (id, tenant_id, actor_email, action, severity, payload, source_address, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ";
        sqlx::query(query)
            .bind(entry.id)
            .bind(entry.tenant_id)
            .bind(&entry.actor_email)
            .bind(entry.action.as_str())
            .bind(entry.severity.as_str())
            .bind(Json(&entry.payload))
            .bind(&entry.source_address)
            .bind(entry.recorded_at)
            .execute(&self.pool)
            .instrument(db_span("INSERT", query))
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    async fn list_audit(
        &self,
        tenant_id: TenantId,
        before: Option<OffsetDateTime>,
        limit: i64,
    ) -> Result<Vec<AuditEntry>, StoreError> {
        let query = r"
            SELECT id, tenant_id, actor_email, action, severity, payload, source_address, recorded_at
            FROM audit_log
            WHERE tenant_id = $1
              AND ($2::timestamptz IS NULL OR recorded_at < $2)
            ORDER BY recorded_at DESC, id DESC
            LIMIT $3
        ";
        let rows = sqlx::query(query)
            .bind(tenant_id)
            .bind(before)
            .bind(limit)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .map_err(map_sqlx)?;
        rows.iter()
            .map(audit_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_sqlx)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let query = "SELECT 1";
        sqlx::query(query)
            .execute(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    //! Run against a disposable database by exporting `MAITRE_TEST_DSN`;
    //! skipped otherwise.

    use super::*;
    use std::sync::Arc;

    async fn test_store() -> Result<Option<PgStore>> {
        let Ok(dsn) = std::env::var("MAITRE_TEST_DSN") else {
            eprintln!("Skipping Postgres test: MAITRE_TEST_DSN not set");
            return Ok(None);
        };
        let store = PgStore::connect(&dsn, Duration::from_secs(5)).await?;
        store.apply_schema().await?;
        Ok(Some(store))
    }

    fn unique_tenant() -> TenantId {
        let bytes = *Uuid::new_v4().as_bytes();
        i64::from(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    async fn seeded_session(store: &PgStore, hash: &[u8]) -> Result<Session> {
        let now = OffsetDateTime::now_utc();
        let admin = store
            .upsert_admin(
                &NewAdmin {
                    tenant_id: unique_tenant(),
                    email: "chef@example.com".to_string(),
                    password_hash: "hash".to_string(),
                    role: Role::Chef,
                    permissions: Role::Chef.default_permissions(),
                },
                now,
            )
            .await?;
        Ok(store
            .insert_session(&NewSession {
                id: Uuid::now_v7(),
                tenant_id: admin.tenant_id,
                admin_id: admin.id,
                token_hash: hash.to_vec(),
                created_at: now,
                expires_at: now + time::Duration::days(30),
                client: ClientMeta::default(),
            })
            .await?)
    }

    #[tokio::test]
    async fn concurrent_swaps_have_one_winner() -> Result<()> {
        let Some(store) = test_store().await? else {
            return Ok(());
        };
        let store = Arc::new(store);
        let original = Uuid::new_v4().as_bytes().to_vec();
        let session = seeded_session(&store, &original).await?;
        let now = OffsetDateTime::now_utc();
        let client = ClientMeta::default();

        let left = Uuid::new_v4().as_bytes().to_vec();
        let right = Uuid::new_v4().as_bytes().to_vec();
        let (a, b) = tokio::join!(
            store.swap_session_token(session.id, &original, &left, now, &client),
            store.swap_session_token(session.id, &original, &right, now, &client),
        );
        let winners = [a?, b?].iter().filter(|outcome| outcome.is_some()).count();
        assert_eq!(winners, 1);
        Ok(())
    }

    #[tokio::test]
    async fn revoked_session_refuses_swap() -> Result<()> {
        let Some(store) = test_store().await? else {
            return Ok(());
        };
        let original = Uuid::new_v4().as_bytes().to_vec();
        let session = seeded_session(&store, &original).await?;
        let now = OffsetDateTime::now_utc();

        assert!(store.revoke_session(session.id, now).await?);
        let next = Uuid::new_v4().as_bytes().to_vec();
        let swapped = store
            .swap_session_token(session.id, &original, &next, now, &ClientMeta::default())
            .await?;
        assert!(swapped.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn invitation_accepts_once() -> Result<()> {
        let Some(store) = test_store().await? else {
            return Ok(());
        };
        let now = OffsetDateTime::now_utc();
        let token_hash = Uuid::new_v4().as_bytes().to_vec();
        store
            .replace_invitation(&Invitation {
                token_hash: token_hash.clone(),
                tenant_id: unique_tenant(),
                email: "new@example.com".to_string(),
                role: Role::Chef,
                invited_by: "owner@example.com".to_string(),
                issued_at: now,
                expires_at: now + time::Duration::hours(72),
                consumed_at: None,
            })
            .await?;

        let first = store.accept_invitation(&token_hash, "hash", now).await?;
        assert!(matches!(first, Consumption::Consumed(_)));
        let second = store.accept_invitation(&token_hash, "hash", now).await?;
        assert!(matches!(second, Consumption::AlreadyConsumed));
        Ok(())
    }

    #[tokio::test]
    async fn invitation_for_existing_account_revokes_its_sessions() -> Result<()> {
        let Some(store) = test_store().await? else {
            return Ok(());
        };
        let session = seeded_session(&store, Uuid::new_v4().as_bytes()).await?;
        let now = OffsetDateTime::now_utc();
        let token_hash = Uuid::new_v4().as_bytes().to_vec();
        store
            .replace_invitation(&Invitation {
                token_hash: token_hash.clone(),
                tenant_id: session.tenant_id,
                email: "chef@example.com".to_string(),
                role: Role::Owner,
                invited_by: "owner@example.com".to_string(),
                issued_at: now,
                expires_at: now + time::Duration::hours(72),
                consumed_at: None,
            })
            .await?;

        let accepted = store.accept_invitation(&token_hash, "new-hash", now).await?;
        assert!(matches!(
            accepted,
            Consumption::Consumed(ref admin) if admin.id == session.admin_id
        ));
        let after = store.session_by_id(session.id).await?;
        assert!(after.is_some_and(|session| session.revoked));
        Ok(())
    }
}
