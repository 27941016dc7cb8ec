//! Product analytics.
//!
//! [`Analytics`] is constructed explicitly and handed to whatever needs it; it
//! only forwards events to its sink between [`Analytics::init`] and
//! [`Analytics::shutdown`]. The shipped [`TracingSink`] records each event as a
//! structured `tracing` event on the `analytics` target.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    Step1View,
    Step1Complete,
    Step2View,
    Step2Complete,
    Step3View,
    FormSubmit,
    EmailSent,
    EmailVerified,
    IntakeView,
    IntakeSubmit,
    AudioRecordStart,
    AudioTranscribed,
}

impl Event {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Step1View => "step1_view",
            Self::Step1Complete => "step1_complete",
            Self::Step2View => "step2_view",
            Self::Step2Complete => "step2_complete",
            Self::Step3View => "step3_view",
            Self::FormSubmit => "form_submit",
            Self::EmailSent => "email_sent",
            Self::EmailVerified => "email_verified",
            Self::IntakeView => "intake_view",
            Self::IntakeSubmit => "intake_submit",
            Self::AudioRecordStart => "audio_record_start",
            Self::AudioTranscribed => "audio_transcribed",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Destination for analytics events.
pub trait Sink: Send + Sync {
    fn capture(&self, event: Event, properties: &[(&'static str, String)]);

    fn identify(&self, email: &str);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl Sink for TracingSink {
    fn capture(&self, event: Event, properties: &[(&'static str, String)]) {
        info!(
            target: "analytics",
            event = event.name(),
            properties = ?properties,
            "analytics event"
        );
    }

    fn identify(&self, email: &str) {
        info!(target: "analytics", email, "analytics identify");
    }
}

pub struct Analytics {
    sink: Arc<dyn Sink>,
    active: AtomicBool,
}

impl fmt::Debug for Analytics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analytics")
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl Default for Analytics {
    fn default() -> Self {
        Self::new(Arc::new(TracingSink))
    }
}

impl Analytics {
    #[must_use]
    pub fn new(sink: Arc<dyn Sink>) -> Self {
        Self {
            sink,
            active: AtomicBool::new(false),
        }
    }

    /// Start forwarding events. Calling it twice is a no-op.
    pub fn init(&self) {
        if !self.active.swap(true, Ordering::SeqCst) {
            debug!("analytics initialized");
        }
    }

    pub fn shutdown(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            debug!("analytics shut down");
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn track(&self, event: Event) {
        self.track_with(event, &[]);
    }

    pub fn track_with(&self, event: Event, properties: &[(&'static str, String)]) {
        if self.is_active() {
            self.sink.capture(event, properties);
        } else {
            debug!(event = event.name(), "analytics inactive, event dropped");
        }
    }

    pub fn identify(&self, email: &str) {
        if self.is_active() {
            self.sink.identify(email);
        }
    }
}

/// Sink that keeps events in memory, for assertions.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: std::sync::Mutex<Vec<Event>>,
    identified: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn identified(&self) -> Vec<String> {
        self.identified.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
impl Sink for RecordingSink {
    fn capture(&self, event: Event, _properties: &[(&'static str, String)]) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    fn identify(&self, email: &str) {
        if let Ok(mut identified) = self.identified.lock() {
            identified.push(email.to_string());
        }
    }
}
