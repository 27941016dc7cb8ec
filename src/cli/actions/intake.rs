//! Terminal front end for the intake form.
//!
//! Each prompt reads one line. An empty line is Enter and commits the step,
//! `<` goes back, and `+N` toggles category `N`. Multi-line answers collect
//! lines until an empty one. On the description step `!audio <file>` uploads a
//! recording for transcription; while awaiting verification `!resend` asks for
//! a new code.

use crate::{
    analytics::{Analytics, TracingSink},
    cli::commands::intake::Mode,
    flow::{
        client::{Attribution, HttpIntakeClient},
        draft::FileDraftStore,
        keys::{Focus, KeyAction, KeyEvent},
        voice::{AudioClip, InputMode, PermissionError},
        Collaborators, Outcome, Step, StepFlow, CATEGORIES,
    },
    token::{continuation::token_from_link, Clock, SystemClock, INVALID_LINK_MESSAGE},
};
use anyhow::{anyhow, Context, Result};
use base64ct::{Base64, Encoding};
use std::{path::PathBuf, sync::Arc};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub api_url: String,
    pub mode: Mode,
    pub draft_dir: PathBuf,
    pub attribution: Attribution,
}

/// Execute the intake action.
/// # Errors
/// Returns an error if the link is invalid or the terminal cannot be read.
pub async fn execute(args: Args) -> Result<()> {
    let analytics = Arc::new(Analytics::new(Arc::new(TracingSink)));
    analytics.init();

    let deps = Collaborators {
        client: Arc::new(HttpIntakeClient::new(&args.api_url)?),
        drafts: Arc::new(FileDraftStore::new(args.draft_dir)),
        analytics: analytics.clone(),
    };

    let flow = match args.mode {
        Mode::Intake => StepFlow::intake(deps),
        Mode::Quick => StepFlow::quick_intake(deps),
        Mode::Resume(link) => {
            let token = token_from_link(&link).ok_or_else(|| anyhow!(INVALID_LINK_MESSAGE))?;
            StepFlow::resume(&token, SystemClock.now_ms(), deps).map_err(|err| {
                debug!(reason = err.reason(), "rejected continuation link");
                anyhow!(INVALID_LINK_MESSAGE)
            })?
        }
    };
    let mut flow = flow.with_attribution(args.attribution);

    let mut terminal = Terminal::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout());
    let result = terminal.run(&mut flow).await;

    analytics.shutdown();
    result
}

/// Line-oriented driver for a [`StepFlow`].
pub struct Terminal<R, W> {
    input: R,
    output: W,
}

enum Line {
    Back,
    Commit,
    Text(String),
}

impl<R, W> Terminal<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub const fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Prompt until the flow finishes or input runs out. The draft survives
    /// an early exit.
    ///
    /// # Errors
    /// Returns an error if reading input or writing output fails.
    pub async fn run(&mut self, flow: &mut StepFlow) -> Result<()> {
        if flow.step() == Step::Description {
            flow.set_input_mode(InputMode::Type);
        }

        loop {
            self.render(flow).await?;
            let keep_going = match flow.step() {
                Step::Done => {
                    self.say("Thanks! We'll be in touch.").await?;
                    return Ok(());
                }
                Step::Category => self.category(flow).await?,
                Step::Details => self.details(flow).await?,
                Step::Email => self.single_line(flow, "Email", StepFlow::set_email).await?,
                Step::Company => {
                    self.single_line(flow, "Company", StepFlow::set_company)
                        .await?
                }
                Step::Description => self.description(flow).await?,
                Step::AwaitingVerification => self.verification(flow).await?,
            };
            if !keep_going {
                self.say("Draft saved. Run the same command to pick up where you left off.")
                    .await?;
                return Ok(());
            }
        }
    }

    async fn render(&mut self, flow: &StepFlow) -> Result<()> {
        let mut screen = String::new();
        if let Some((current, total)) = flow.position() {
            screen.push_str(&format!("\nStep {current} of {total}\n"));
        }
        if let Some(error) = flow.error() {
            screen.push_str(&format!("! {error}\n"));
        }
        self.write(&screen).await
    }

    async fn category(&mut self, flow: &mut StepFlow) -> Result<bool> {
        let mut menu = String::from("Which calls would you rather not make?\n");
        for (index, category) in CATEGORIES.iter().enumerate() {
            let mark = if flow.form().selected_categories.iter().any(|c| c == category) {
                'x'
            } else {
                ' '
            };
            menu.push_str(&format!("  [{mark}] {}. {category}\n", index + 1));
        }
        if !flow.form().free_text.is_empty() {
            menu.push_str(&format!("  Other: {}\n", flow.form().free_text));
        }
        menu.push_str("+N toggles, any other text describes your own, Enter continues\n");
        self.write(&menu).await?;

        let Some(line) = self.read_line().await? else {
            return Ok(false);
        };
        match parse(&line) {
            Line::Back => {
                flow.go_back();
            }
            Line::Commit => self.commit(flow, Focus::SingleLine).await?,
            Line::Text(text) => match toggle_index(&text) {
                Some(Some(category)) => flow.toggle_selection(category),
                Some(None) => self.say("No such category.").await?,
                None => flow.set_free_text(&text),
            },
        }
        Ok(true)
    }

    async fn details(&mut self, flow: &mut StepFlow) -> Result<bool> {
        let company = flow.form().company.clone();
        self.write(&prompt("Company (optional)", &company)).await?;
        let Some(line) = self.read_line().await? else {
            return Ok(false);
        };
        match parse(&line) {
            Line::Back => {
                flow.go_back();
                return Ok(true);
            }
            Line::Text(text) => flow.set_company(&text),
            Line::Commit => {}
        }

        self.write("Anything else we should know? (optional, empty line to finish)\n")
            .await?;
        let Some(text) = self.read_block().await? else {
            return Ok(false);
        };
        if !text.is_empty() {
            flow.set_details(&text);
        }
        self.commit(flow, Focus::Elsewhere).await?;
        Ok(true)
    }

    async fn description(&mut self, flow: &mut StepFlow) -> Result<bool> {
        if !flow.form().details.is_empty() {
            self.write(&format!("Current description:\n{}\n", flow.form().details))
                .await?;
        }
        self.write("Describe what you need (empty line to finish, !audio <file> to transcribe a recording)\n")
            .await?;

        let Some(first) = self.read_line().await? else {
            return Ok(false);
        };
        if let Some(path) = first.trim().strip_prefix("!audio") {
            self.transcribe(flow, path.trim()).await?;
            return Ok(true);
        }
        match parse(&first) {
            Line::Back => {
                flow.go_back();
                return Ok(true);
            }
            Line::Commit => {}
            Line::Text(text) => {
                let Some(rest) = self.read_block().await? else {
                    return Ok(false);
                };
                let text = if rest.is_empty() {
                    text
                } else {
                    format!("{text}\n{rest}")
                };
                flow.set_details(&text);
            }
        }
        self.commit(flow, Focus::Elsewhere).await?;
        Ok(true)
    }

    async fn transcribe(&mut self, flow: &mut StepFlow, path: &str) -> Result<()> {
        flow.set_input_mode(InputMode::Speak);
        let audio = if path.is_empty() {
            Err(PermissionError::new("no recording given"))
        } else {
            tokio::fs::read(path)
                .await
                .map_err(|err| PermissionError::new(format!("{path}: {err}")))
        };

        match audio {
            Ok(bytes) => {
                if flow.start_recording(Ok(())) {
                    self.say("Transcribing...").await?;
                    let clip = AudioClip {
                        base64: Base64::encode_string(&bytes),
                        mime: audio_mime(path).to_string(),
                    };
                    if flow.finish_recording(clip).await {
                        self.say("Transcript added.").await?;
                    }
                }
            }
            Err(denied) => {
                flow.start_recording(Err(denied));
            }
        }
        flow.set_input_mode(InputMode::Type);
        Ok(())
    }

    async fn verification(&mut self, flow: &mut StepFlow) -> Result<bool> {
        self.write(&format!(
            "We emailed a 6-digit code to {}. Enter it below (!resend for a new one)\n",
            flow.form().email.trim()
        ))
        .await?;
        let Some(line) = self.read_line().await? else {
            return Ok(false);
        };
        match parse(&line) {
            Line::Back => {
                flow.go_back();
            }
            Line::Commit => {}
            Line::Text(text) if text == "!resend" => {
                if flow.resend_code().await == Outcome::Submitted(Step::AwaitingVerification) {
                    self.say("A new code is on its way.").await?;
                }
            }
            Line::Text(code) => {
                flow.confirm_code(&code).await;
            }
        }
        Ok(true)
    }

    async fn single_line(
        &mut self,
        flow: &mut StepFlow,
        label: &str,
        set: fn(&mut StepFlow, &str),
    ) -> Result<bool> {
        let current = match flow.step() {
            Step::Company => flow.form().company.clone(),
            _ => flow.form().email.clone(),
        };
        self.write(&prompt(label, &current)).await?;

        let Some(line) = self.read_line().await? else {
            return Ok(false);
        };
        match parse(&line) {
            Line::Back => {
                flow.go_back();
                return Ok(true);
            }
            Line::Text(text) => set(flow, &text),
            Line::Commit => {}
        }
        self.commit(flow, Focus::SingleLine).await?;
        Ok(true)
    }

    async fn commit(&mut self, flow: &mut StepFlow, focus: Focus) -> Result<()> {
        if flow.handle_key(KeyEvent::enter(), focus) != KeyAction::Commit {
            return Ok(());
        }
        if flow.is_submitting() {
            return Ok(());
        }
        if flow.go_next().await == Outcome::Submitted(Step::AwaitingVerification) {
            self.say("Check your inbox for a verification code.").await?;
        }
        Ok(())
    }

    async fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .await
            .context("Failed to read from terminal")?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    /// Lines up to the first empty one, joined with newlines.
    async fn read_block(&mut self) -> Result<Option<String>> {
        let mut lines = Vec::new();
        loop {
            match self.read_line().await? {
                None if lines.is_empty() => return Ok(None),
                None => break,
                Some(line) if line.trim().is_empty() => break,
                Some(line) => lines.push(line),
            }
        }
        Ok(Some(lines.join("\n")))
    }

    async fn say(&mut self, message: &str) -> Result<()> {
        self.write(&format!("{message}\n")).await
    }

    async fn write(&mut self, text: &str) -> Result<()> {
        self.output
            .write_all(text.as_bytes())
            .await
            .context("Failed to write to terminal")?;
        self.output.flush().await?;
        Ok(())
    }
}

fn parse(line: &str) -> Line {
    match line.trim() {
        "" => Line::Commit,
        "<" => Line::Back,
        text => Line::Text(text.to_string()),
    }
}

/// `+N` → `Some(category)`, `Some(None)` when N is out of range.
fn toggle_index(text: &str) -> Option<Option<&'static str>> {
    let number = text.strip_prefix('+')?.trim().parse::<usize>().ok()?;
    Some(
        number
            .checked_sub(1)
            .and_then(|index| CATEGORIES.get(index).copied()),
    )
}

fn prompt(label: &str, current: &str) -> String {
    if current.is_empty() {
        format!("{label}: ")
    } else {
        format!("{label} [{current}]: ")
    }
}

fn audio_mime(path: &str) -> &'static str {
    match path.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()) {
        Some(ext) if ext == "mp3" => "audio/mpeg",
        Some(ext) if ext == "mp4" || ext == "m4a" => "audio/mp4",
        Some(ext) if ext == "ogg" => "audio/ogg",
        Some(ext) if ext == "wav" => "audio/wav",
        _ => "audio/webm",
    }
}
