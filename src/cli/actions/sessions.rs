use crate::{
    auth::{Clock, SessionStore, SystemClock},
    cli::commands::store,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub retention_days: i64,
    pub store: store::Options,
}

/// Delete sessions that died more than `retention_days` ago.
/// # Errors
/// Returns an error if storage is unreachable.
pub async fn execute(args: Args) -> Result<()> {
    let store = super::open_store(&args.store).await?;
    let clock = Arc::new(SystemClock);
    let cutoff = clock.now() - time::Duration::days(args.retention_days);
    // The TTL only matters for new sessions, which purge never creates.
    let sessions = SessionStore::new(store, clock, time::Duration::ZERO, args.store.timeout);

    let purged = sessions
        .purge(cutoff)
        .await
        .context("failed to purge sessions")?;
    info!(purged, %cutoff, "Purged dead sessions");
    println!("{purged}");
    Ok(())
}
