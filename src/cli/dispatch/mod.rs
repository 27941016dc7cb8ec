//! Map parsed command-line arguments to the action to run.

use crate::{
    api::{Credentials, IntakeConfig},
    cli::{
        actions::{intake, server, Action},
        commands,
    },
};
use anyhow::{bail, Result};

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    match matches.subcommand() {
        Some((commands::server::NAME, sub)) => server_action(sub),
        Some((commands::intake::NAME, sub)) => intake_action(sub),
        Some((other, _)) => bail!("unknown command: {other}"),
        None => bail!("missing command"),
    }
}

fn server_action(matches: &clap::ArgMatches) -> Result<Action> {
    let options = commands::server::Options::parse(matches)?;

    let mut config = IntakeConfig::new(options.site_url)
        .with_continuation_ttl_seconds(options.continuation_ttl_seconds)
        .with_verification_ttl_seconds(options.verification_ttl_seconds)
        .with_token_mode(options.token_mode)
        .with_audio_dir(options.audio_dir);
    if let Some(from) = options.email_from {
        config = config.with_email_from(from);
    }

    Ok(Action::Server(server::Args {
        port: options.port,
        dsn: options.dsn,
        config,
        credentials: Credentials {
            token_secret: options.token_secret,
            resend_api_key: options.resend_api_key,
            openai_api_key: options.openai_api_key,
        },
    }))
}

fn intake_action(matches: &clap::ArgMatches) -> Result<Action> {
    let options = commands::intake::Options::parse(matches)?;

    Ok(Action::Intake(intake::Args {
        api_url: options.api_url,
        mode: options.mode,
        draft_dir: options.draft_dir,
        attribution: options.attribution,
    }))
}
