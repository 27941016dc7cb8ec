use crate::flow::client::Attribution;
use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;

pub const NAME: &str = "intake";

pub const ARG_API_URL: &str = "api-url";
pub const ARG_RESUME: &str = "resume";
pub const ARG_QUICK: &str = "quick";
pub const ARG_LANDING_URL: &str = "landing-url";
pub const ARG_DRAFT_DIR: &str = "draft-dir";
pub const ARG_UTM_SOURCE: &str = "utm-source";
pub const ARG_UTM_CAMPAIGN: &str = "utm-campaign";
pub const ARG_UTM_ADSET: &str = "utm-adset";
pub const ARG_UTM_AD: &str = "utm-ad";

#[must_use]
pub fn command() -> Command {
    let command = Command::new(NAME)
        .about("Fill in the intake form from the terminal")
        .arg(
            Arg::new(ARG_API_URL)
                .long(ARG_API_URL)
                .help("Base URL of the intake API")
                .env("CONCIERGE_API_URL")
                .default_value("http://localhost:8080"),
        )
        .arg(
            Arg::new(ARG_RESUME)
                .long(ARG_RESUME)
                .value_name("URL|TOKEN")
                .help("Continue from an emailed link or its token")
                .conflicts_with(ARG_QUICK),
        )
        .arg(
            Arg::new(ARG_QUICK)
                .long(ARG_QUICK)
                .help("Two-step form confirmed by an emailed code")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_DRAFT_DIR)
                .long(ARG_DRAFT_DIR)
                .help("Directory where unfinished drafts are kept")
                .env("CONCIERGE_DRAFT_DIR")
                .default_value(".concierge")
                .value_parser(clap::value_parser!(PathBuf)),
        );

    with_attribution_args(command)
}

fn with_attribution_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_LANDING_URL)
                .long(ARG_LANDING_URL)
                .help("Landing page URL; its utm_* query parameters are used for attribution"),
        )
        .arg(Arg::new(ARG_UTM_SOURCE).long(ARG_UTM_SOURCE).help("utm_source"))
        .arg(
            Arg::new(ARG_UTM_CAMPAIGN)
                .long(ARG_UTM_CAMPAIGN)
                .help("utm_campaign"),
        )
        .arg(Arg::new(ARG_UTM_ADSET).long(ARG_UTM_ADSET).help("utm_adset"))
        .arg(Arg::new(ARG_UTM_AD).long(ARG_UTM_AD).help("utm_ad"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Intake,
    Quick,
    Resume(String),
}

#[derive(Debug)]
pub struct Options {
    pub api_url: String,
    pub mode: Mode,
    pub draft_dir: PathBuf,
    pub attribution: Attribution,
}

impl Options {
    /// Explicit `--utm-*` flags win over the landing URL.
    ///
    /// # Errors
    /// Returns an error if the landing URL cannot be parsed.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let mode = match matches.get_one::<String>(ARG_RESUME) {
            Some(link) => Mode::Resume(link.trim().to_string()),
            None if matches.get_flag(ARG_QUICK) => Mode::Quick,
            None => Mode::Intake,
        };

        let flags = Attribution {
            utm_source: matches.get_one::<String>(ARG_UTM_SOURCE).cloned(),
            utm_campaign: matches.get_one::<String>(ARG_UTM_CAMPAIGN).cloned(),
            utm_adset: matches.get_one::<String>(ARG_UTM_ADSET).cloned(),
            utm_ad: matches.get_one::<String>(ARG_UTM_AD).cloned(),
        };
        let attribution = match matches.get_one::<String>(ARG_LANDING_URL) {
            Some(url) => flags.or(Attribution::from_landing_url(url)?),
            None => flags,
        };

        Ok(Self {
            api_url: matches
                .get_one::<String>(ARG_API_URL)
                .cloned()
                .context("missing required argument: --api-url")?,
            mode,
            draft_dir: matches
                .get_one::<PathBuf>(ARG_DRAFT_DIR)
                .cloned()
                .unwrap_or_else(|| PathBuf::from(".concierge")),
            attribution,
        })
    }
}
