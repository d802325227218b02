use parking_lot::Mutex;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::transcriber::Recognizer;
use crate::utils::errors::DictationError;

/// A [Recognizer] backed by a loaded `whisper-rs` context. The context is heavy (hundreds
/// of MB resident); callers are expected to load it once at startup and hand it to the
/// [crate::transcriber::StreamingTranscriber] for the life of the session.
pub struct WhisperRecognizer {
    // Declared before `context`: struct fields drop in declaration order, and the
    // state must be torn down before the context it was created from.
    state: Mutex<whisper_rs::WhisperState>,
    context: WhisperContext,
}

impl WhisperRecognizer {
    pub fn new_from_path(model_path: &str) -> Result<Self, DictationError> {
        let params = WhisperContextParameters::default();
        let context = WhisperContext::new_with_params(model_path, params)?;
        let state = context.create_state()?;
        Ok(Self {
            state: Mutex::new(state),
            context,
        })
    }
}

impl Recognizer for WhisperRecognizer {
    fn transcribe(
        &self,
        pcm: &[f32],
        initial_prompt: Option<&str>,
    ) -> Result<Vec<String>, DictationError> {
        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_print_progress(false);
        params.set_print_special(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_single_segment(false);
        if let Some(prompt) = initial_prompt {
            params.set_initial_prompt(prompt);
        }

        let mut state = self.state.lock();
        state
            .full(params, pcm)
            .map_err(|e| DictationError::Recognizer(e.to_string()))?;

        let num_segments = state.full_n_segments();
        let mut segments = Vec::with_capacity(num_segments as usize);
        for segment in state.as_iter() {
            segments.push(segment.to_string());
        }
        Ok(segments)
    }
}

// The context itself isn't touched again once the state is created, but keeping it
// alive is required: the state borrows the context's loaded model for its lifetime.
#[allow(dead_code)]
fn _assert_context_kept(r: &WhisperRecognizer) -> &WhisperContext {
    &r.context
}
