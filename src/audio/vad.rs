use std::time::{Duration, Instant};

/// Trait seam for voice-activity detection, so [crate::audio::recorder::StreamingRecorder] can be
/// driven by a different detector without touching its buffering logic.
pub trait VoiceActivityDetector: Send {
    /// Feeds one chunk through the detector, returning whether speech is considered active.
    fn process(&mut self, chunk: &[f32]) -> bool;
    /// Wallclock time since speech was last detected. Zero while speech is active.
    fn silence_duration(&self) -> Duration;
    fn is_speaking(&self) -> bool;
    fn reset(&mut self);
}

/// RMS-threshold detector with a post-speech hold ("pad") to prevent flicker on brief
/// inter-word silences. The pad affects [EnergyVad::is_speaking] only; [EnergyVad::silence_duration]
/// tracks wallclock time since the last speech chunk directly, unaffected by the pad, so
/// commit-on-silence timers aren't inflated by it.
pub struct EnergyVad {
    threshold: f32,
    pad: Duration,
    last_speech: Option<Instant>,
    is_speaking: bool,
}

impl EnergyVad {
    pub fn new(threshold: f32, pad: Duration) -> Self {
        Self {
            threshold,
            pad,
            last_speech: None,
            is_speaking: false,
        }
    }

    fn rms(chunk: &[f32]) -> f32 {
        if chunk.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = chunk.iter().map(|&s| s * s).sum();
        (sum_sq / chunk.len() as f32).sqrt()
    }
}

impl VoiceActivityDetector for EnergyVad {
    fn process(&mut self, chunk: &[f32]) -> bool {
        if chunk.is_empty() {
            return false;
        }

        let rms = Self::rms(chunk);
        if rms > self.threshold {
            self.last_speech = Some(Instant::now());
            self.is_speaking = true;
            return true;
        }

        if self.is_speaking {
            if let Some(last) = self.last_speech {
                if last.elapsed() < self.pad {
                    return true;
                }
            }
        }
        self.is_speaking = false;
        false
    }

    fn silence_duration(&self) -> Duration {
        if self.is_speaking {
            return Duration::ZERO;
        }
        match self.last_speech {
            Some(last) => last.elapsed(),
            None => Duration::MAX,
        }
    }

    fn is_speaking(&self) -> bool {
        self.is_speaking
    }

    fn reset(&mut self) {
        self.last_speech = None;
        self.is_speaking = false;
    }
}
