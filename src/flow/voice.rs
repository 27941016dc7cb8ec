//! Voice capture state for the description step.

use thiserror::Error;

pub const MICROPHONE_DENIED: &str = "Unable to access microphone. Please use the Type option.";
pub const TRANSCRIPTION_FAILED: &str =
    "Transcription failed. Please try again or use the Type option.";

/// MIME type used for recordings made by the client.
pub const DEFAULT_AUDIO_MIME: &str = "audio/webm";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Speak,
    Type,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordingState {
    #[default]
    Idle,
    Recording,
    Transcribing,
}

/// The microphone could not be opened. Never fatal.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("microphone unavailable: {reason}")]
pub struct PermissionError {
    pub reason: String,
}

impl PermissionError {
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// A finished recording, ready to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub base64: String,
    pub mime: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoiceCapture {
    mode: InputMode,
    state: RecordingState,
    elapsed_seconds: u32,
}

impl VoiceCapture {
    #[must_use]
    pub const fn mode(&self) -> InputMode {
        self.mode
    }

    #[must_use]
    pub const fn state(&self) -> RecordingState {
        self.state
    }

    #[must_use]
    pub const fn is_busy(&self) -> bool {
        !matches!(self.state, RecordingState::Idle)
    }

    #[must_use]
    pub const fn elapsed_seconds(&self) -> u32 {
        self.elapsed_seconds
    }

    /// Switching modes is ignored while a recording is in progress.
    pub fn set_mode(&mut self, mode: InputMode) {
        if !self.is_busy() {
            self.mode = mode;
        }
    }

    /// Begin recording once the microphone is available.
    ///
    /// Returns `false` if capture was already busy or permission was denied; on
    /// denial the mode falls back to [`InputMode::Type`].
    pub fn start(&mut self, permission: Result<(), &PermissionError>) -> bool {
        if self.is_busy() {
            return false;
        }
        match permission {
            Ok(()) => {
                self.mode = InputMode::Speak;
                self.state = RecordingState::Recording;
                self.elapsed_seconds = 0;
                true
            }
            Err(_) => {
                self.mode = InputMode::Type;
                false
            }
        }
    }

    /// One-second timer tick; only counts while recording.
    pub fn tick(&mut self) {
        if self.state == RecordingState::Recording {
            self.elapsed_seconds = self.elapsed_seconds.saturating_add(1);
        }
    }

    /// Stop recording and wait for the transcript.
    pub fn stop(&mut self) -> bool {
        if self.state != RecordingState::Recording {
            return false;
        }
        self.state = RecordingState::Transcribing;
        true
    }

    /// The transcription round-trip finished, successfully or not.
    pub fn finish(&mut self) {
        self.state = RecordingState::Idle;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// `m:ss` label for the timer.
    #[must_use]
    pub fn elapsed_label(&self) -> String {
        format_elapsed(self.elapsed_seconds)
    }
}

#[must_use]
pub fn format_elapsed(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_ticks_and_transcribes() {
        let mut capture = VoiceCapture::default();
        assert_eq!(capture.mode(), InputMode::Speak);
        assert!(capture.start(Ok(())));
        assert!(capture.is_busy());
        assert!(!capture.start(Ok(())));

        for _ in 0..75 {
            capture.tick();
        }
        assert_eq!(capture.elapsed_label(), "1:15");

        assert!(capture.stop());
        assert_eq!(capture.state(), RecordingState::Transcribing);
        capture.tick();
        assert_eq!(capture.elapsed_seconds(), 75);

        capture.finish();
        assert_eq!(capture.state(), RecordingState::Idle);
        assert!(!capture.stop());
    }

    #[test]
    fn denial_falls_back_to_typing() {
        let mut capture = VoiceCapture::default();
        let denied = PermissionError::new("NotAllowedError");
        assert!(!capture.start(Err(&denied)));
        assert_eq!(capture.mode(), InputMode::Type);
        assert_eq!(capture.state(), RecordingState::Idle);
    }

    #[test]
    fn mode_is_locked_while_busy() {
        let mut capture = VoiceCapture::default();
        capture.start(Ok(()));
        capture.set_mode(InputMode::Type);
        assert_eq!(capture.mode(), InputMode::Speak);
        capture.stop();
        capture.finish();
        capture.set_mode(InputMode::Type);
        assert_eq!(capture.mode(), InputMode::Type);
    }

    #[test]
    fn formats_elapsed_time() {
        assert_eq!(format_elapsed(0), "0:00");
        assert_eq!(format_elapsed(9), "0:09");
        assert_eq!(format_elapsed(600), "10:00");
    }
}
