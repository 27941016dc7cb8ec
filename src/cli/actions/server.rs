use crate::{
    api::{self, Credentials, IntakeConfig},
    token::verification::TokenMode,
    GIT_COMMIT_HASH,
};
use anyhow::Result;
use tracing::{info, warn};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub config: IntakeConfig,
    pub credentials: Credentials,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    info!(
        "Starting {} {} ({}) with database {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_hash(GIT_COMMIT_HASH),
        redact_dsn(&args.dsn)
    );

    if args.config.token_mode() == TokenMode::Unsigned {
        warn!("Verification tokens are unsigned; anyone can forge them");
    }

    api::new(args.port, args.dsn, args.config, args.credentials).await
}

fn short_hash(hash: &str) -> &str {
    hash.get(..7).unwrap_or(hash)
}

/// Hide the password in a connection string before logging it.
fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut url) => {
            if url.password().is_some() && url.set_password(Some("****")).is_err() {
                return "<invalid dsn>".to_string();
            }
            url.to_string()
        }
        Err(_) => "<invalid dsn>".to_string(),
    }
}
