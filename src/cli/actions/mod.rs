pub mod admin;
pub mod server;
pub mod sessions;

// Internal "interpreter" for `Action`.
mod run;

use crate::{
    cli::commands::store::{Backend, Options},
    store::{MemoryStore, PgStore, Store},
};
use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug)]
pub enum Action {
    Server(server::Args),
    CreateAdmin(admin::Args),
    PurgeSessions(sessions::Args),
}

impl Action {
    /// Execute the action.
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> Result<()> {
        run::execute(self).await
    }
}

/// Open the configured backend, applying the schema on Postgres.
async fn open_store(options: &Options) -> Result<Arc<dyn Store>> {
    match &options.backend {
        Backend::Postgres(dsn) => {
            let store = PgStore::connect(dsn, options.timeout).await?;
            store.apply_schema().await?;
            info!("Connected to Postgres");
            Ok(Arc::new(store))
        }
        Backend::Memory => {
            warn!("Using the in-memory store; nothing survives a restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
