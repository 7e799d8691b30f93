//! Speech-to-text boundary.
//!
//! Consumed as an opaque one-shot transcript source. The terminal build has
//! no microphone capture, so it ships the `Unsupported` stub; the UI surfaces
//! that as a one-time notice and resets the listening indicator.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpeechError {
    #[error("speech input is not supported in this environment")]
    Unsupported,
    #[error("speech recognition failed: {0}")]
    Failed(String),
}

/// One-shot, non-continuous, single-locale capture. A successful call yields
/// exactly one final transcript.
pub trait SpeechToText {
    fn transcribe_once(&self) -> Result<String, SpeechError>;
}

pub struct UnsupportedSpeech;

impl SpeechToText for UnsupportedSpeech {
    fn transcribe_once(&self) -> Result<String, SpeechError> {
        Err(SpeechError::Unsupported)
    }
}

/// Appends a transcript to the input buffer, separated by a space when the
/// input is non-empty.
pub fn append_transcript(input: &mut String, transcript: &str) {
    if !input.is_empty() {
        input.push(' ');
    }
    input.push_str(transcript);
}
