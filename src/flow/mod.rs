//! Step flow controller for the intake form.
//!
//! A [`StepFlow`] walks an ordered list of [`Step`]s for one [`FlowVariant`].
//! Forward moves run the step's validation gate; the last step hands the draft
//! to the [`client::IntakeClient`]. The draft is written through to a
//! [`draft::DraftStore`] on every edit and removed after a successful
//! submission.
//!
//! Submissions can be driven in one call with [`StepFlow::go_next`], or split
//! into [`StepFlow::step_forward`] and [`StepFlow::complete`] when the caller
//! runs the request itself. Each ticket remembers the flow generation it was
//! issued for, and a reply for an older generation is dropped.

pub mod client;
pub mod draft;
pub mod keys;
pub mod validate;
pub mod voice;

use crate::{
    analytics::{Analytics, Event},
    token::{self, continuation::ContinuationClaims},
};
use client::{
    Attribution, CollaboratorError, DetailsSubmission, IntakeClient, LeadSubmission, Receipt,
    Submission, TranscriptionRequest,
};
use draft::{DraftForm, DraftStore};
use keys::{Focus, KeyAction, KeyEvent};
use std::{fmt, sync::Arc};
use tracing::{debug, warn};
use voice::{AudioClip, InputMode, PermissionError, VoiceCapture};

pub const GENERIC_FAILURE: &str = "Something went wrong. Please try again.";

/// Shown when a verification code is confirmed without a code having been sent.
pub const CODE_NOT_SENT: &str = "Please request a new code.";

/// Call categories offered on the first step, in display order.
pub const CATEGORIES: [&str; 8] = [
    "Book or reschedule",
    "Cancel something",
    "Billing issue or dispute",
    "Status tracking",
    "Account change",
    "Fix a mistake",
    "Escalate to a human",
    "Other",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowVariant {
    /// Category, details, email.
    Intake,
    /// Category, email, then an emailed code.
    QuickIntake,
    /// Company and description, authorized by a continuation token.
    Continuation,
}

impl FlowVariant {
    #[must_use]
    pub const fn steps(self) -> &'static [Step] {
        match self {
            Self::Intake => &[Step::Category, Step::Details, Step::Email],
            Self::QuickIntake => &[Step::Category, Step::Email],
            Self::Continuation => &[Step::Company, Step::Description],
        }
    }

    #[must_use]
    pub const fn draft_key(self) -> &'static str {
        match self {
            Self::Intake | Self::QuickIntake => draft::INTAKE_KEY,
            Self::Continuation => draft::CONTINUATION_KEY,
        }
    }

    const fn first_step(self) -> Step {
        match self {
            Self::Intake | Self::QuickIntake => Step::Category,
            Self::Continuation => Step::Company,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Category,
    Details,
    Email,
    Company,
    Description,
    AwaitingVerification,
    Done,
}

impl Step {
    /// Steps whose main input is a multi-line text area.
    #[must_use]
    pub const fn is_multiline(self) -> bool {
        matches!(self, Self::Details | Self::Description)
    }
}

const fn view_event(variant: FlowVariant, step: Step) -> Option<Event> {
    match (variant, step) {
        (FlowVariant::Intake | FlowVariant::QuickIntake, Step::Category) => Some(Event::Step1View),
        (FlowVariant::Intake, Step::Details) | (FlowVariant::QuickIntake, Step::Email) => {
            Some(Event::Step2View)
        }
        (FlowVariant::Intake, Step::Email) => Some(Event::Step3View),
        (FlowVariant::Continuation, Step::Company) => Some(Event::IntakeView),
        _ => None,
    }
}

const fn complete_event(step: Step) -> Option<Event> {
    match step {
        Step::Category => Some(Event::Step1Complete),
        Step::Details => Some(Event::Step2Complete),
        _ => None,
    }
}

/// Result of a forward move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The validation gate failed; see [`StepFlow::error`].
    Blocked,
    Advanced(Step),
    /// The collaborator accepted the submission.
    Submitted(Step),
    /// The collaborator refused; see [`StepFlow::error`].
    Failed,
    /// Nothing to do in the current state.
    Ignored,
    /// The reply belonged to a flow that has since moved on.
    Stale,
}

/// A collaborator call the flow is waiting on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Submit(Submission),
    SendCode {
        email: String,
    },
    ConfirmCode {
        token: String,
        code: String,
        lead: LeadSubmission,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Submitted(Receipt),
    CodeSent(String),
    Confirmed(Receipt),
}

impl Request {
    /// Run the request against `client`.
    ///
    /// # Errors
    ///
    /// Returns the collaborator's error unchanged.
    pub async fn send(&self, client: &dyn IntakeClient) -> Result<Reply, CollaboratorError> {
        match self {
            Self::Submit(submission) => client.submit(submission).await.map(Reply::Submitted),
            Self::SendCode { email } => client.send_verification(email).await.map(Reply::CodeSent),
            Self::ConfirmCode { token, code, lead } => {
                client.verify_code(token, code).await?;
                client
                    .submit(&Submission::Lead(lead.clone()))
                    .await
                    .map(Reply::Confirmed)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionTicket {
    generation: u64,
    pub request: Request,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    Settled(Outcome),
    Submit(SubmissionTicket),
}

/// Everything the controller talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub client: Arc<dyn IntakeClient>,
    pub drafts: Arc<dyn DraftStore>,
    pub analytics: Arc<Analytics>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("analytics", &self.analytics)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct StepFlow {
    variant: FlowVariant,
    step: Step,
    form: DraftForm,
    error: Option<String>,
    attribution: Attribution,
    continuation_token: Option<String>,
    verification_token: Option<String>,
    audio_path: Option<String>,
    voice: VoiceCapture,
    submitting: bool,
    generation: u64,
    deps: Collaborators,
}

impl StepFlow {
    /// Three-step intake: category, details, email.
    #[must_use]
    pub fn intake(deps: Collaborators) -> Self {
        Self::new(FlowVariant::Intake, None, deps)
    }

    /// Two-step intake confirmed by an emailed code.
    #[must_use]
    pub fn quick_intake(deps: Collaborators) -> Self {
        Self::new(FlowVariant::QuickIntake, None, deps)
    }

    /// Resume from a continuation link.
    ///
    /// Only the token's shape and expiry can be checked here; the server
    /// verifies the signature when the details are submitted.
    ///
    /// # Errors
    ///
    /// Returns the token error if the link is malformed or expired.
    pub fn resume(token: &str, now_ms: i64, deps: Collaborators) -> Result<Self, token::Error> {
        let claims: ContinuationClaims = token::inspect(token, now_ms)?;
        if claims.subject_id.is_empty() {
            return Err(token::Error::MalformedToken);
        }
        Ok(Self::new(
            FlowVariant::Continuation,
            Some(token.to_string()),
            deps,
        ))
    }

    fn new(variant: FlowVariant, continuation_token: Option<String>, deps: Collaborators) -> Self {
        let form = match deps.drafts.load(variant.draft_key()) {
            Ok(Some(form)) => restore(variant, form),
            Ok(None) => DraftForm::default(),
            Err(err) => {
                warn!("Failed to load saved draft: {err:#}");
                DraftForm::default()
            }
        };

        let flow = Self {
            variant,
            step: variant.first_step(),
            form,
            error: None,
            attribution: Attribution::default(),
            continuation_token,
            verification_token: None,
            audio_path: None,
            voice: VoiceCapture::default(),
            submitting: false,
            generation: 0,
            deps,
        };
        flow.track_view();
        flow
    }

    #[must_use]
    pub fn with_attribution(mut self, attribution: Attribution) -> Self {
        self.attribution = attribution;
        self
    }

    #[must_use]
    pub const fn variant(&self) -> FlowVariant {
        self.variant
    }

    #[must_use]
    pub const fn step(&self) -> Step {
        self.step
    }

    /// `(n, total)` for the progress label, `None` outside the numbered steps.
    #[must_use]
    pub fn position(&self) -> Option<(usize, usize)> {
        let steps = self.variant.steps();
        self.index().map(|index| (index + 1, steps.len()))
    }

    #[must_use]
    pub const fn form(&self) -> &DraftForm {
        &self.form
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    #[must_use]
    pub const fn is_submitting(&self) -> bool {
        self.submitting
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.step == Step::Done
    }

    #[must_use]
    pub fn audio_path(&self) -> Option<&str> {
        self.audio_path.as_deref()
    }

    #[must_use]
    pub const fn voice(&self) -> &VoiceCapture {
        &self.voice
    }

    #[must_use]
    pub fn continuation_token(&self) -> Option<&str> {
        self.continuation_token.as_deref()
    }

    #[must_use]
    pub fn client(&self) -> Arc<dyn IntakeClient> {
        Arc::clone(&self.deps.client)
    }

    fn index(&self) -> Option<usize> {
        self.variant.steps().iter().position(|s| *s == self.step)
    }

    fn track_view(&self) {
        if let Some(event) = view_event(self.variant, self.step) {
            self.deps.analytics.track(event);
        }
    }

    fn enter(&mut self, step: Step) {
        self.step = step;
        self.generation = self.generation.wrapping_add(1);
        self.track_view();
    }

    fn persist(&self) {
        if let Err(err) = self.deps.drafts.save(self.variant.draft_key(), &self.form) {
            warn!("Failed to save draft: {err:#}");
        }
    }

    fn discard_snapshot(&self) {
        if let Err(err) = self.deps.drafts.remove(self.variant.draft_key()) {
            warn!("Failed to remove saved draft: {err:#}");
        }
    }

    fn edit(&mut self, apply: impl FnOnce(&mut DraftForm)) {
        apply(&mut self.form);
        self.error = None;
        self.persist();
    }

    pub fn toggle_selection(&mut self, item: &str) {
        self.edit(|form| form.toggle(item));
    }

    pub fn set_free_text(&mut self, value: &str) {
        self.edit(|form| form.free_text = value.to_string());
    }

    pub fn set_company(&mut self, value: &str) {
        self.edit(|form| form.company = value.to_string());
    }

    pub fn set_details(&mut self, value: &str) {
        self.edit(|form| form.details = value.to_string());
    }

    pub fn set_email(&mut self, value: &str) {
        self.edit(|form| form.email = value.to_string());
    }

    /// Validate the current step and either move on or prepare the final
    /// submission.
    pub fn step_forward(&mut self) -> Progress {
        if self.submitting || self.voice.is_busy() {
            return Progress::Settled(Outcome::Ignored);
        }
        let Some(index) = self.index() else {
            return Progress::Settled(Outcome::Ignored);
        };

        self.error = None;
        if let Err(invalid) = validate::check(self.step, &self.form) {
            self.error = Some(invalid.message.to_string());
            return Progress::Settled(Outcome::Blocked);
        }

        let steps = self.variant.steps();
        if let Some(next) = steps.get(index + 1).copied() {
            if let Some(event) = complete_event(self.step) {
                self.deps.analytics.track(event);
            }
            self.enter(next);
            return Progress::Settled(Outcome::Advanced(next));
        }

        let request = match self.variant {
            FlowVariant::Intake => Request::Submit(Submission::Lead(self.lead())),
            FlowVariant::QuickIntake => Request::SendCode {
                email: self.form.email.trim().to_string(),
            },
            FlowVariant::Continuation => match self.details() {
                Some(details) => Request::Submit(Submission::Details(details)),
                None => {
                    self.error = Some(token::INVALID_LINK_MESSAGE.to_string());
                    return Progress::Settled(Outcome::Failed);
                }
            },
        };
        Progress::Submit(self.issue(request))
    }

    fn issue(&mut self, request: Request) -> SubmissionTicket {
        self.submitting = true;
        SubmissionTicket {
            generation: self.generation,
            request,
        }
    }

    /// Apply the reply for a ticket from [`Self::step_forward`] or
    /// [`Self::begin_confirm`].
    pub fn complete(
        &mut self,
        ticket: SubmissionTicket,
        reply: Result<Reply, CollaboratorError>,
    ) -> Outcome {
        if ticket.generation != self.generation {
            debug!(
                ticket = ticket.generation,
                current = self.generation,
                "discarding reply for a stale submission"
            );
            return Outcome::Stale;
        }
        self.submitting = false;

        match reply {
            Err(err) => {
                warn!("Submission failed: {err}");
                self.error = Some(err.user_message());
                Outcome::Failed
            }
            Ok(Reply::Submitted(_)) => {
                let event = match self.variant {
                    FlowVariant::Continuation => Event::IntakeSubmit,
                    _ => Event::FormSubmit,
                };
                self.deps.analytics.track(event);
                self.discard_snapshot();
                self.audio_path = None;
                self.enter(Step::Done);
                Outcome::Submitted(Step::Done)
            }
            Ok(Reply::CodeSent(token)) => {
                self.verification_token = Some(token);
                self.deps.analytics.track(Event::EmailSent);
                self.discard_snapshot();
                if self.step != Step::AwaitingVerification {
                    self.enter(Step::AwaitingVerification);
                }
                Outcome::Submitted(Step::AwaitingVerification)
            }
            Ok(Reply::Confirmed(_)) => {
                self.deps.analytics.track(Event::EmailVerified);
                self.deps.analytics.identify(self.form.email.trim());
                self.deps.analytics.track(Event::FormSubmit);
                self.verification_token = None;
                self.discard_snapshot();
                self.enter(Step::Done);
                Outcome::Submitted(Step::Done)
            }
        }
    }

    /// Run [`Self::step_forward`] and, on the final step, the submission itself.
    pub async fn go_next(&mut self) -> Outcome {
        match self.step_forward() {
            Progress::Settled(outcome) => outcome,
            Progress::Submit(ticket) => self.run(ticket).await,
        }
    }

    async fn run(&mut self, ticket: SubmissionTicket) -> Outcome {
        let client = self.client();
        let reply = ticket.request.send(client.as_ref()).await;
        self.complete(ticket, reply)
    }

    /// Prepare the code check while awaiting verification.
    pub fn begin_confirm(&mut self, code: &str) -> Progress {
        if self.step != Step::AwaitingVerification || self.submitting {
            return Progress::Settled(Outcome::Ignored);
        }
        self.error = None;
        let Some(token) = self.verification_token.clone() else {
            self.error = Some(CODE_NOT_SENT.to_string());
            return Progress::Settled(Outcome::Failed);
        };
        let request = Request::ConfirmCode {
            token,
            code: code.trim().to_string(),
            lead: self.lead(),
        };
        Progress::Submit(self.issue(request))
    }

    /// Check an emailed code; on success the lead is stored and the flow ends.
    pub async fn confirm_code(&mut self, code: &str) -> Outcome {
        match self.begin_confirm(code) {
            Progress::Settled(outcome) => outcome,
            Progress::Submit(ticket) => self.run(ticket).await,
        }
    }

    /// Send a fresh code to the same address.
    pub async fn resend_code(&mut self) -> Outcome {
        if self.step != Step::AwaitingVerification || self.submitting {
            return Outcome::Ignored;
        }
        self.error = None;
        let ticket = self.issue(Request::SendCode {
            email: self.form.email.trim().to_string(),
        });
        self.run(ticket).await
    }

    /// Move one step back. Never validates or submits.
    pub fn go_back(&mut self) -> bool {
        if self.submitting || self.voice.is_busy() {
            return false;
        }
        let previous = match self.step {
            Step::Done => return false,
            Step::AwaitingVerification => self.variant.steps().last().copied(),
            _ => self
                .index()
                .and_then(|index| index.checked_sub(1))
                .and_then(|index| self.variant.steps().get(index).copied()),
        };
        let Some(previous) = previous else {
            return false;
        };

        self.error = None;
        self.verification_token = None;
        self.enter(previous);
        true
    }

    /// Clear the draft and start over from the first step.
    pub fn reset(&mut self) {
        self.form = DraftForm::default();
        self.error = None;
        self.audio_path = None;
        self.verification_token = None;
        self.voice.reset();
        self.submitting = false;
        self.discard_snapshot();
        self.enter(self.variant.first_step());
    }

    /// Enter/Shift+Enter policy for the current state.
    #[must_use]
    pub fn handle_key(&self, event: KeyEvent, focus: Focus) -> KeyAction {
        keys::resolve(event, focus, self.is_terminal(), self.voice.is_busy())
    }

    fn can_record(&self) -> bool {
        self.variant == FlowVariant::Continuation
            && self.step == Step::Description
            && !self.submitting
    }

    pub fn set_input_mode(&mut self, mode: InputMode) {
        self.voice.set_mode(mode);
    }

    /// Start voice capture. A denied microphone switches to typing and shows a
    /// hint; it never aborts the flow.
    pub fn start_recording(&mut self, permission: Result<(), PermissionError>) -> bool {
        if !self.can_record() {
            return false;
        }
        match permission {
            Ok(()) => {
                let started = self.voice.start(Ok(()));
                if started {
                    self.error = None;
                    self.deps.analytics.track(Event::AudioRecordStart);
                }
                started
            }
            Err(denied) => {
                warn!("Microphone error: {denied}");
                self.voice.start(Err(&denied));
                self.error = Some(voice::MICROPHONE_DENIED.to_string());
                false
            }
        }
    }

    pub fn tick_recording(&mut self) {
        self.voice.tick();
    }

    /// Stop recording and transcribe `clip`. On success the transcript replaces
    /// the description.
    pub async fn finish_recording(&mut self, clip: AudioClip) -> bool {
        if !self.voice.stop() {
            return false;
        }
        self.error = None;
        let Some(token) = self.continuation_token.clone() else {
            self.voice.finish();
            self.error = Some(voice::TRANSCRIPTION_FAILED.to_string());
            return false;
        };

        let request = TranscriptionRequest {
            token,
            audio_base64: clip.base64,
            audio_mime: clip.mime,
        };
        let result = self.deps.client.transcribe(&request).await;
        self.voice.finish();

        match result {
            Ok(transcription) => {
                self.form.details = transcription.transcript_text;
                self.audio_path = Some(transcription.audio_path);
                self.persist();
                self.deps.analytics.track(Event::AudioTranscribed);
                true
            }
            Err(err) => {
                warn!("Transcription error: {err}");
                self.error = Some(voice::TRANSCRIPTION_FAILED.to_string());
                false
            }
        }
    }

    /// Drop the transcript and audio so the user can record again.
    pub fn discard_recording(&mut self) {
        if self.voice.is_busy() {
            return;
        }
        self.audio_path = None;
        self.edit(|form| form.details.clear());
    }

    fn lead(&self) -> LeadSubmission {
        LeadSubmission {
            email: self.form.email.trim().to_string(),
            call_types: self.form.selected_categories.clone(),
            avoided_call_text: non_empty(&self.form.free_text),
            company: non_empty(&self.form.company),
            description_text: non_empty(&self.form.details),
            attribution: self.attribution.clone(),
        }
    }

    fn details(&self) -> Option<DetailsSubmission> {
        let token = self.continuation_token.clone()?;
        let description = self.form.details.trim().to_string();
        Some(DetailsSubmission {
            token,
            company: self.form.company.trim().to_string(),
            transcript_text: Some(description.clone()),
            description_text: description,
            audio_path: self.audio_path.clone(),
            phone: None,
        })
    }
}

/// Continuation drafts only carry the company and description.
fn restore(variant: FlowVariant, form: DraftForm) -> DraftForm {
    match variant {
        FlowVariant::Continuation => DraftForm {
            company: form.company,
            details: form.details,
            ..DraftForm::default()
        },
        FlowVariant::Intake | FlowVariant::QuickIntake => form,
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
