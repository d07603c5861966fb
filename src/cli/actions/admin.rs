use crate::{
    auth::{CredentialStore, PasswordHashing, SystemClock},
    cli::commands::{auth::HashingOptions, store},
    store::{Role, TenantId},
};
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub tenant_id: TenantId,
    pub email: String,
    pub password: SecretString,
    pub role: Role,
    pub store: store::Options,
    pub hashing: HashingOptions,
}

/// Create the administrator, or reset its password and role if it exists.
/// # Errors
/// Returns an error if storage is unreachable or the email or password is rejected.
pub async fn execute(args: Args) -> Result<()> {
    let store = super::open_store(&args.store).await?;
    let hashing = PasswordHashing::new(args.hashing.concurrency, args.hashing.timeout);
    let credentials = CredentialStore::new(
        store,
        Arc::new(hashing),
        Arc::new(SystemClock),
        args.store.timeout,
        args.hashing.min_password_length,
    );

    let admin = credentials
        .upsert(
            args.tenant_id,
            &args.email,
            args.password.expose_secret(),
            args.role,
        )
        .await
        .context("failed to create administrator")?;

    info!(
        admin_id = %admin.id,
        tenant_id = admin.tenant_id,
        role = admin.role.as_str(),
        "Administrator ready"
    );
    println!("{} ({}) {}", admin.email, admin.role.as_str(), admin.id);
    Ok(())
}
