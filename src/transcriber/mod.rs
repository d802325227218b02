use crate::utils::errors::DictationError;

pub mod stability;
pub mod streaming_transcriber;
#[cfg(feature = "whisper")]
pub mod whisper_recognizer;

pub use stability::{StabilityTracker, StabilityTrackerBuilder};
pub use streaming_transcriber::{StreamingTranscriber, StreamingTranscriberBuilder};

pub const WHISPER_SAMPLE_RATE: f64 = 16000f64;

/// The recognizer is a black box: given PCM and an optional continuation prompt it
/// returns ordered segment texts. Assumed reentrant across disjoint calls, but never
/// invoked concurrently by this crate.
pub trait Recognizer: Send {
    fn transcribe(
        &self,
        pcm: &[f32],
        initial_prompt: Option<&str>,
    ) -> Result<Vec<String>, DictationError>;
}

/// The immutable result of one transcription pass: the text the tracker will not
/// revise, the text that may still change, their concatenation, and whether this
/// was the post-stop final pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamingResult {
    pub committed: String,
    pub pending: String,
    pub full: String,
    pub is_final: bool,
}

impl StreamingResult {
    pub fn is_empty(&self) -> bool {
        self.full.is_empty()
    }
}
