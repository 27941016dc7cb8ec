use crate::cli::actions::{intake, server, Action};
use anyhow::Result;

/// Single dispatch point for every CLI action.
/// # Errors
/// Returns an error if the action fails.
pub async fn execute(action: Action) -> Result<()> {
    match action {
        Action::Server(args) => server::execute(args).await,
        Action::Intake(args) => intake::execute(args).await,
    }
}
