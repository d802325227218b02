use once_cell::sync::Lazy;
use regex::Regex;

use crate::transcriber::{Recognizer, StabilityTracker, StabilityTrackerBuilder, StreamingResult};
use crate::utils::errors::DictationError;

const NOISE_HALLUCINATIONS: &[&str] = &["okay.", "okay", "what?", "what"];

static BRACKETED_ANNOTATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[^\]]*\]").unwrap());
static TIMESTAMP_RANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\d{2}:\d{2}:\d{2}\.\d{3}\s*-->\s*\d{2}:\d{2}:\d{2}\.\d{3}\]").unwrap());
static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

const LITERAL_HALLUCINATIONS: &[&str] = &[
    "(music)",
    "(Music)",
    "[Music]",
    "(silence)",
    "(Silence)",
    "Thank you.",
    "Thanks for watching!",
    "Subscribe",
    "[BLANK_AUDIO]",
    "(BLANK_AUDIO)",
];

/// Strips bracketed/timestamp annotations and known recognizer hallucinations, then
/// collapses whitespace. Returns `None` if nothing meaningful remains.
fn clean_output(raw: &str) -> Option<String> {
    let mut text = TIMESTAMP_RANGE.replace_all(raw, "").into_owned();
    text = BRACKETED_ANNOTATION.replace_all(&text, "").into_owned();
    for pattern in LITERAL_HALLUCINATIONS {
        text = text.replace(pattern, "");
    }
    text = MULTI_SPACE.replace_all(&text, " ").trim().to_string();

    if text.is_empty() {
        return None;
    }
    if NOISE_HALLUCINATIONS.contains(&text.to_lowercase().as_str()) {
        return None;
    }
    Some(text)
}

/// Strips a leading run of `output` tokens that echoes the trailing tokens of `prompt`,
/// defending against recognizers that regurgitate their continuation prompt.
fn strip_prompt_echo(output: &str, prompt: &str) -> String {
    let output_tokens: Vec<&str> = output.split_whitespace().collect();
    let prompt_tokens: Vec<&str> = prompt.split_whitespace().collect();
    let max_i = 20.min(prompt_tokens.len()).min(output_tokens.len());

    for i in (1..=max_i).rev() {
        if output_tokens[..i] == prompt_tokens[prompt_tokens.len() - i..] {
            return output_tokens[i..].join(" ");
        }
    }
    output.to_string()
}

fn prompt_tail(committed: &str, max_words: usize) -> String {
    let words: Vec<&str> = committed.split_whitespace().collect();
    let start = words.len().saturating_sub(max_words);
    words[start..].join(" ")
}

/// Drives a [Recognizer] with a rolling continuation prompt, cleans its output, clamps
/// prompt echo, and hands the result to a [StabilityTracker] -- or, in batch mode, to a
/// simpler silence-triggered commit policy.
pub struct StreamingTranscriber {
    recognizer: Box<dyn Recognizer>,
    tracker: StabilityTracker,
    min_audio_samples: usize,
    sample_rate: usize,
    prompt_max_words: usize,
    use_initial_prompt: bool,
    silence_commit_secs: f64,
    batch_mode: bool,
    batch_silence_threshold_secs: f64,
    batch_pending: String,
    batch_committed: String,
}

pub struct StreamingTranscriberBuilder {
    min_audio_seconds: f64,
    sample_rate: usize,
    prompt_max_words: usize,
    overlap_max_words: usize,
    use_initial_prompt: bool,
    stability_count_required: u32,
    silence_commit_secs: f64,
    batch_mode: bool,
    batch_silence_threshold_secs: f64,
}

impl StreamingTranscriberBuilder {
    pub fn new() -> Self {
        Self {
            min_audio_seconds: 0.1,
            sample_rate: crate::transcriber::WHISPER_SAMPLE_RATE as usize,
            prompt_max_words: 50,
            overlap_max_words: 20,
            use_initial_prompt: true,
            stability_count_required: 2,
            silence_commit_secs: 0.6,
            batch_mode: false,
            batch_silence_threshold_secs: 0.5,
        }
    }

    pub fn with_min_audio_seconds(mut self, seconds: f64) -> Self {
        self.min_audio_seconds = seconds;
        self
    }
    pub fn with_sample_rate(mut self, sample_rate: usize) -> Self {
        self.sample_rate = sample_rate;
        self
    }
    pub fn with_prompt_max_words(mut self, words: usize) -> Self {
        self.prompt_max_words = words;
        self
    }
    pub fn with_overlap_max_words(mut self, words: usize) -> Self {
        self.overlap_max_words = words;
        self
    }
    pub fn with_use_initial_prompt(mut self, use_it: bool) -> Self {
        self.use_initial_prompt = use_it;
        self
    }
    pub fn with_stability_count_required(mut self, count: u32) -> Self {
        self.stability_count_required = count;
        self
    }
    pub fn with_silence_commit_secs(mut self, secs: f64) -> Self {
        self.silence_commit_secs = secs;
        self
    }
    pub fn with_batch_mode(mut self, enabled: bool) -> Self {
        self.batch_mode = enabled;
        self
    }
    pub fn with_batch_silence_threshold_secs(mut self, secs: f64) -> Self {
        self.batch_silence_threshold_secs = secs;
        self
    }

    pub fn build(self, recognizer: Box<dyn Recognizer>) -> StreamingTranscriber {
        let tracker = StabilityTrackerBuilder::new()
            .with_stability_count_required(self.stability_count_required)
            .with_overlap_max_words(self.overlap_max_words)
            .build();

        StreamingTranscriber {
            recognizer,
            tracker,
            min_audio_samples: (self.min_audio_seconds * self.sample_rate as f64) as usize,
            sample_rate: self.sample_rate,
            prompt_max_words: self.prompt_max_words,
            use_initial_prompt: self.use_initial_prompt,
            silence_commit_secs: self.silence_commit_secs,
            batch_mode: self.batch_mode,
            batch_silence_threshold_secs: self.batch_silence_threshold_secs,
            batch_pending: String::new(),
            batch_committed: String::new(),
        }
    }
}

impl Default for StreamingTranscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamingTranscriber {
    pub fn reset(&mut self) {
        self.tracker.reset();
        self.batch_pending.clear();
        self.batch_committed.clear();
    }

    pub fn committed_text(&self) -> &str {
        if self.batch_mode {
            &self.batch_committed
        } else {
            self.tracker.committed_text()
        }
    }

    /// Runs one transcription pass. Returns `Ok(None)` only when the audio is too short
    /// to bother invoking the recognizer; otherwise returns the tracker's result as-is,
    /// even when its `full` text is empty, leaving it to the caller to decide whether an
    /// empty result is worth forwarding.
    pub fn process_audio(
        &mut self,
        pcm: &[f32],
        silence_duration_secs: f64,
        is_final: bool,
    ) -> Result<Option<StreamingResult>, DictationError> {
        if pcm.len() < self.min_audio_samples {
            return Ok(None);
        }

        let committed_so_far = self.committed_text().to_string();
        let prompt = prompt_tail(&committed_so_far, self.prompt_max_words);
        let prompt_opt = if self.use_initial_prompt && !prompt.is_empty() {
            Some(prompt.as_str())
        } else {
            None
        };

        let segments = self.recognizer.transcribe(pcm, prompt_opt)?;
        let joined = segments.join(" ");

        let cleaned = match clean_output(&joined) {
            Some(text) => text,
            None => String::new(),
        };

        let clamped = if let Some(p) = prompt_opt {
            strip_prompt_echo(&cleaned, p)
        } else {
            cleaned
        };

        if self.batch_mode {
            return Ok(Some(self.batch_update(&clamped, silence_duration_secs, is_final)));
        }

        let result = self
            .tracker
            .update(&clamped, silence_duration_secs, self.silence_commit_secs, is_final);
        Ok(Some(result))
    }

    /// The simplified, non-stability-tracked commit policy (see module docs on batch mode):
    /// each pass's text is the pending text outright; a silence threshold, not a stability
    /// count, triggers commit.
    fn batch_update(&mut self, text: &str, silence_duration_secs: f64, is_final: bool) -> StreamingResult {
        if is_final {
            if !text.is_empty() {
                self.batch_committed = text.to_string();
            }
            self.batch_pending.clear();
            return StreamingResult {
                committed: self.batch_committed.clone(),
                pending: String::new(),
                full: self.batch_committed.clone(),
                is_final: true,
            };
        }

        self.batch_pending = text.to_string();
        let should_commit =
            !text.is_empty() && silence_duration_secs >= self.batch_silence_threshold_secs;
        if should_commit {
            self.batch_committed = text.to_string();
            self.batch_pending.clear();
        }

        let full = if self.batch_pending.is_empty() {
            self.batch_committed.clone()
        } else {
            self.batch_pending.clone()
        };

        StreamingResult {
            committed: self.batch_committed.clone(),
            pending: self.batch_pending.clone(),
            full,
            is_final: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubRecognizer {
        response: Vec<String>,
    }
    impl Recognizer for StubRecognizer {
        fn transcribe(
            &self,
            _pcm: &[f32],
            _initial_prompt: Option<&str>,
        ) -> Result<Vec<String>, DictationError> {
            Ok(self.response.clone())
        }
    }

    fn audio(seconds: f64) -> Vec<f32> {
        vec![0.02; (seconds * 16_000.0) as usize]
    }

    #[test]
    fn short_audio_is_rejected_without_invoking_recognizer() {
        let mut transcriber = StreamingTranscriberBuilder::new().build(Box::new(StubRecognizer {
            response: vec!["hello".into()],
        }));
        let result = transcriber.process_audio(&audio(0.01), 0.0, false).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn cleans_hallucination_markers() {
        let mut transcriber = StreamingTranscriberBuilder::new().build(Box::new(StubRecognizer {
            response: vec!["[00:00:00.000 --> 00:00:01.000]  (music) hello world".into()],
        }));
        let result = transcriber
            .process_audio(&audio(1.0), 0.0, false)
            .unwrap()
            .unwrap();
        assert_eq!(result.full.trim(), "hello world");
    }

    #[test]
    fn whole_utterance_hallucination_yields_empty_result() {
        let mut transcriber = StreamingTranscriberBuilder::new().build(Box::new(StubRecognizer {
            response: vec!["okay.".into()],
        }));
        // Audio long enough to invoke the recognizer still yields a result -- it's just
        // empty, since the whole utterance was a known hallucination. The caller (the
        // controller) is the one that decides whether an empty result is worth forwarding.
        let result = transcriber
            .process_audio(&audio(1.0), 0.0, false)
            .unwrap()
            .unwrap();
        assert!(result.full.is_empty());
    }

    #[test]
    fn anti_echo_clamp_strips_prompt_suffix() {
        let stripped = strip_prompt_echo("on the mat", "the cat sat on the mat");
        assert_eq!(stripped, "on the mat");
        let stripped = strip_prompt_echo("the cat sat on the mat", "the cat sat");
        assert_eq!(stripped, "on the mat");
    }

    #[test]
    fn batch_mode_commits_only_on_silence_threshold() {
        let mut transcriber = StreamingTranscriberBuilder::new()
            .with_batch_mode(true)
            .with_batch_silence_threshold_secs(0.5)
            .build(Box::new(StubRecognizer {
                response: vec!["hello".into()],
            }));
        let first = transcriber.process_audio(&audio(1.0), 0.2, false).unwrap().unwrap();
        assert_eq!(first.committed, "");
        let second = transcriber.process_audio(&audio(1.0), 0.6, false).unwrap().unwrap();
        assert_eq!(second.committed, "hello");
    }
}
