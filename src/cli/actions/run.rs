use crate::cli::actions::{admin, server, sessions, Action};
use anyhow::Result;

/// Execute the provided action.
// Single dispatch point: every `Action::*` variant maps to one `execute` here.
/// # Errors
/// Returns an error if the action fails.
pub async fn execute(action: Action) -> Result<()> {
    match action {
        Action::Server(args) => server::execute(args).await,
        Action::CreateAdmin(args) => admin::execute(args).await,
        Action::PurgeSessions(args) => sessions::execute(args).await,
    }
}
