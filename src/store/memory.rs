//! Process-local store for development and tests.
//!
//! All state sits behind one async mutex, so every trait method observes and
//! mutates it atomically, which gives the same compare-and-swap guarantees as
//! the single-statement updates of the Postgres backend.

use super::{
    classify_unconsumed, AdminUser, AuditEntry, ClientMeta, Consumption, Invitation, NewAdmin,
    NewSession, ResetApplied, ResetRequest, Session, SessionScope, Store, StoreError, TenantId,
};
use async_trait::async_trait;
use std::collections::HashMap;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

#[cfg(test)]
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, OnceLock,
};
#[cfg(test)]
use tokio::sync::Barrier;

#[derive(Default)]
struct State {
    admins: HashMap<Uuid, AdminUser>,
    sessions: HashMap<Uuid, Session>,
    session_tokens: HashMap<Vec<u8>, Uuid>,
    invitations: HashMap<Vec<u8>, Invitation>,
    resets: HashMap<Vec<u8>, ResetRequest>,
    audit: Vec<AuditEntry>,
}

impl State {
    fn upsert_admin(&mut self, admin: &NewAdmin, now: OffsetDateTime) -> AdminUser {
        let existing = self
            .admins
            .values_mut()
            .find(|user| user.tenant_id == admin.tenant_id && user.email == admin.email);

        if let Some(user) = existing {
            user.password_hash.clone_from(&admin.password_hash);
            user.role = admin.role;
            user.permissions.clone_from(&admin.permissions);
            user.disabled = false;
            user.updated_at = now;
            return user.clone();
        }

        let user = AdminUser {
            id: Uuid::now_v7(),
            tenant_id: admin.tenant_id,
            email: admin.email.clone(),
            password_hash: admin.password_hash.clone(),
            role: admin.role,
            permissions: admin.permissions.clone(),
            disabled: false,
            created_at: now,
            updated_at: now,
        };
        self.admins.insert(user.id, user.clone());
        user
    }

    fn revoke_admin_sessions(
        &mut self,
        admin_id: Uuid,
        keep: Option<Uuid>,
        now: OffsetDateTime,
    ) -> u64 {
        let mut revoked = 0;
        for session in self.sessions.values_mut() {
            if session.admin_id == admin_id && !session.revoked && Some(session.id) != keep {
                session.revoked = true;
                session.revoked_at = Some(now);
                revoked += 1;
            }
        }
        revoked
    }
}

/// Failures and interleavings injected by tests.
#[cfg(test)]
#[derive(Default)]
struct Faults {
    audit_appends: AtomicBool,
    admin_lookups: AtomicUsize,
    session_revokes: AtomicUsize,
    hidden_admins: AtomicBool,
    revoke_after_lookup: AtomicBool,
    lookup_gate: OnceLock<Arc<Barrier>>,
    gated_lookups: AtomicUsize,
}

#[cfg(test)]
fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    #[cfg(test)]
    faults: Faults,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent audit append fail.
    #[cfg(test)]
    pub(crate) fn fail_audit_appends(&self) {
        self.faults.audit_appends.store(true, Ordering::SeqCst);
    }

    /// Fail the next `count` lookups of an administrator by id.
    #[cfg(test)]
    pub(crate) fn fail_admin_lookups(&self, count: usize) {
        self.faults.admin_lookups.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` single-session revocations.
    #[cfg(test)]
    pub(crate) fn fail_session_revokes(&self, count: usize) {
        self.faults.session_revokes.store(count, Ordering::SeqCst);
    }

    /// Answer every lookup of an administrator by id with `None`.
    #[cfg(test)]
    pub(crate) fn hide_admins(&self) {
        self.faults.hidden_admins.store(true, Ordering::SeqCst);
    }

    /// Revoke the session found by the next token lookup after the lookup
    /// has returned it, as a concurrent revocation would.
    #[cfg(test)]
    pub(crate) fn revoke_after_next_lookup(&self) {
        self.faults.revoke_after_lookup.store(true, Ordering::SeqCst);
    }

    /// Hold the next `parties` token lookups until all of them have read the
    /// session, so their callers race on the same snapshot.
    #[cfg(test)]
    pub(crate) fn gate_token_lookups(&self, parties: usize) {
        if self
            .faults
            .lookup_gate
            .set(Arc::new(Barrier::new(parties)))
            .is_ok()
        {
            self.faults.gated_lookups.store(parties, Ordering::SeqCst);
        }
    }

    #[cfg(test)]
    async fn after_token_lookup(&self, found: Option<&Session>) {
        if let Some(gate) = self.faults.lookup_gate.get() {
            if take_one(&self.faults.gated_lookups) {
                gate.wait().await;
            }
        }
        if self.faults.revoke_after_lookup.swap(false, Ordering::SeqCst) {
            if let Some(found) = found {
                let mut state = self.state.lock().await;
                if let Some(session) = state.sessions.get_mut(&found.id) {
                    session.revoked = true;
                    session.revoked_at = Some(found.last_used_at);
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) async fn audit_len(&self) -> usize {
        self.state.lock().await.audit.len()
    }

    #[cfg(test)]
    pub(crate) async fn admin_count(&self) -> usize {
        self.state.lock().await.admins.len()
    }
}

fn to_limit(limit: i64) -> usize {
    usize::try_from(limit).unwrap_or(0)
}

#[async_trait]
impl Store for MemoryStore {
    async fn admin_by_email(
        &self,
        tenant_id: TenantId,
        email: &str,
    ) -> Result<Option<AdminUser>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .admins
            .values()
            .find(|user| user.tenant_id == tenant_id && user.email == email)
            .cloned())
    }

    async fn admin_by_id(&self, id: Uuid) -> Result<Option<AdminUser>, StoreError> {
        #[cfg(test)]
        {
            if take_one(&self.faults.admin_lookups) {
                return Err(StoreError::Unavailable("admin lookup failed".to_string()));
            }
            if self.faults.hidden_admins.load(Ordering::SeqCst) {
                return Ok(None);
            }
        }
        Ok(self.state.lock().await.admins.get(&id).cloned())
    }

    async fn upsert_admin(
        &self,
        admin: &NewAdmin,
        now: OffsetDateTime,
    ) -> Result<AdminUser, StoreError> {
        Ok(self.state.lock().await.upsert_admin(admin, now))
    }

    async fn insert_session(&self, session: &NewSession) -> Result<Session, StoreError> {
        let mut state = self.state.lock().await;
        if state.session_tokens.contains_key(&session.token_hash) {
            return Err(StoreError::Conflict("session token hash".to_string()));
        }
        let record = Session {
            id: session.id,
            tenant_id: session.tenant_id,
            admin_id: session.admin_id,
            current_token_hash: session.token_hash.clone(),
            rotation_count: 0,
            created_at: session.created_at,
            last_used_at: session.created_at,
            expires_at: session.expires_at,
            revoked: false,
            revoked_at: None,
            client: session.client.clone(),
        };
        state
            .session_tokens
            .insert(session.token_hash.clone(), session.id);
        state.sessions.insert(session.id, record.clone());
        Ok(record)
    }

    async fn session_by_token_hash(
        &self,
        token_hash: &[u8],
    ) -> Result<Option<Session>, StoreError> {
        let found = {
            let state = self.state.lock().await;
            state
                .session_tokens
                .get(token_hash)
                .and_then(|id| state.sessions.get(id))
                .cloned()
        };
        #[cfg(test)]
        self.after_token_lookup(found.as_ref()).await;
        Ok(found)
    }

    async fn session_by_id(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        Ok(self.state.lock().await.sessions.get(&id).cloned())
    }

    async fn swap_session_token(
        &self,
        id: Uuid,
        expected_hash: &[u8],
        new_hash: &[u8],
        now: OffsetDateTime,
        client: &ClientMeta,
    ) -> Result<Option<Session>, StoreError> {
        let mut state = self.state.lock().await;
        if state.session_tokens.contains_key(new_hash) {
            return Err(StoreError::Conflict("session token hash".to_string()));
        }
        let Some(session) = state.sessions.get_mut(&id) else {
            return Ok(None);
        };
        if session.current_token_hash != expected_hash
            || session.revoked
            || session.expires_at <= now
        {
            return Ok(None);
        }

        session.current_token_hash = new_hash.to_vec();
        session.rotation_count += 1;
        session.last_used_at = now;
        if client.address.is_some() {
            session.client.address.clone_from(&client.address);
        }
        if client.user_agent.is_some() {
            session.client.user_agent.clone_from(&client.user_agent);
        }
        let updated = session.clone();
        state.session_tokens.insert(new_hash.to_vec(), id);
        Ok(Some(updated))
    }

    async fn revoke_session(&self, id: Uuid, now: OffsetDateTime) -> Result<bool, StoreError> {
        #[cfg(test)]
        {
            if take_one(&self.faults.session_revokes) {
                return Err(StoreError::Unavailable("session revoke failed".to_string()));
            }
        }
        let mut state = self.state.lock().await;
        match state.sessions.get_mut(&id) {
            Some(session) if !session.revoked => {
                session.revoked = true;
                session.revoked_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_admin_sessions(
        &self,
        admin_id: Uuid,
        keep: Option<Uuid>,
        now: OffsetDateTime,
    ) -> Result<u64, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .revoke_admin_sessions(admin_id, keep, now))
    }

    async fn list_sessions(
        &self,
        scope: SessionScope,
        limit: i64,
    ) -> Result<Vec<Session>, StoreError> {
        let state = self.state.lock().await;
        let mut sessions: Vec<Session> = state
            .sessions
            .values()
            .filter(|session| match scope {
                SessionScope::Tenant(tenant_id) => session.tenant_id == tenant_id,
                SessionScope::Admin(admin_id) => session.admin_id == admin_id,
            })
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        sessions.truncate(to_limit(limit));
        Ok(sessions)
    }

    async fn purge_sessions(&self, cutoff: OffsetDateTime) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let doomed: Vec<Uuid> = state
            .sessions
            .values()
            .filter(|session| {
                session.expires_at < cutoff
                    || (session.revoked && session.revoked_at.is_some_and(|at| at < cutoff))
            })
            .map(|session| session.id)
            .collect();
        for id in &doomed {
            state.sessions.remove(id);
        }
        state
            .session_tokens
            .retain(|_, session_id| !doomed.contains(session_id));
        Ok(doomed.len() as u64)
    }

    async fn replace_invitation(&self, invitation: &Invitation) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.invitations.retain(|_, existing| {
            existing.consumed_at.is_some()
                || existing.tenant_id != invitation.tenant_id
                || existing.email != invitation.email
        });
        state
            .invitations
            .insert(invitation.token_hash.clone(), invitation.clone());
        Ok(())
    }

    async fn accept_invitation(
        &self,
        token_hash: &[u8],
        password_hash: &str,
        now: OffsetDateTime,
    ) -> Result<Consumption<AdminUser>, StoreError> {
        let mut state = self.state.lock().await;
        let Some(invitation) = state.invitations.get_mut(token_hash) else {
            return Ok(Consumption::NotFound);
        };
        if invitation.consumed_at.is_some() || invitation.expires_at <= now {
            return Ok(classify_unconsumed(
                invitation.consumed_at,
                invitation.expires_at,
                now,
            ));
        }
        invitation.consumed_at = Some(now);
        let admin = NewAdmin {
            tenant_id: invitation.tenant_id,
            email: invitation.email.clone(),
            password_hash: password_hash.to_string(),
            role: invitation.role,
            permissions: invitation.role.default_permissions(),
        };
        let user = state.upsert_admin(&admin, now);
        state.revoke_admin_sessions(user.id, None, now);
        Ok(Consumption::Consumed(user))
    }

    async fn replace_reset_request(&self, request: &ResetRequest) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        for existing in state.resets.values_mut() {
            if existing.admin_id == request.admin_id && existing.consumed_at.is_none() {
                existing.consumed_at = Some(request.issued_at);
            }
        }
        state
            .resets
            .insert(request.token_hash.clone(), request.clone());
        Ok(())
    }

    async fn confirm_reset(
        &self,
        token_hash: &[u8],
        password_hash: &str,
        now: OffsetDateTime,
    ) -> Result<Consumption<ResetApplied>, StoreError> {
        let mut state = self.state.lock().await;
        let Some(request) = state.resets.get_mut(token_hash) else {
            return Ok(Consumption::NotFound);
        };
        if request.consumed_at.is_some() || request.expires_at <= now {
            return Ok(classify_unconsumed(
                request.consumed_at,
                request.expires_at,
                now,
            ));
        }
        let admin_id = request.admin_id;
        let Some(admin) = state.admins.get_mut(&admin_id) else {
            return Ok(Consumption::NotFound);
        };
        admin.password_hash = password_hash.to_string();
        admin.updated_at = now;
        let admin = admin.clone();

        if let Some(request) = state.resets.get_mut(token_hash) {
            request.consumed_at = Some(now);
        }
        let revoked_sessions = state.revoke_admin_sessions(admin_id, None, now);
        Ok(Consumption::Consumed(ResetApplied {
            admin,
            revoked_sessions,
        }))
    }

    async fn append_audit(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        #[cfg(test)]
        {
            if self.faults.audit_appends.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("audit log offline".to_string()));
            }
        }
        self.state.lock().await.audit.push(entry.clone());
        Ok(())
    }

    async fn list_audit(
        &self,
        tenant_id: TenantId,
        before: Option<OffsetDateTime>,
        limit: i64,
    ) -> Result<Vec<AuditEntry>, StoreError> {
        let state = self.state.lock().await;
        let mut entries: Vec<AuditEntry> = state
            .audit
            .iter()
            .rev()
            .filter(|entry| entry.tenant_id == tenant_id)
            .filter(|entry| before.map_or(true, |cutoff| entry.recorded_at < cutoff))
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        entries.truncate(to_limit(limit));
        Ok(entries)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
