use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::audio::audio_ring_buffer::{RingBuffer, RingBufferBuilder};
use crate::audio::capture::AudioCapture;
use crate::audio::vad::{EnergyVad, VoiceActivityDetector};
use crate::utils::errors::DictationError;

const SAMPLE_RATE: usize = crate::transcriber::WHISPER_SAMPLE_RATE as usize;

struct Inner {
    ring: RingBuffer,
    vad: Mutex<Box<dyn VoiceActivityDetector>>,
    full_buffer: Mutex<Vec<f32>>,
    capture: Mutex<Box<dyn AudioCapture>>,
    recording: AtomicBool,
    on_audio_chunk: Mutex<Option<Box<dyn Fn(&[f32]) + Send + Sync>>>,
}

/// Composes a bounded [RingBuffer] window, a [VoiceActivityDetector], and an unbounded
/// full-session buffer retained for the post-stop final pass, driven by one audio
/// capture backend. The only thread that ever mutates ring/vad/full_buffer is the
/// capture backend's own callback thread; every other caller only reads.
#[derive(Clone)]
pub struct StreamingRecorder {
    inner: Arc<Inner>,
}

pub struct StreamingRecorderBuilder {
    buffer_seconds: f64,
    vad_threshold: f32,
    vad_speech_pad: Duration,
    capture: Option<Box<dyn AudioCapture>>,
}

impl StreamingRecorderBuilder {
    pub fn new() -> Self {
        Self {
            buffer_seconds: crate::audio::audio_ring_buffer::DEFAULT_BUFFER_SECONDS,
            vad_threshold: 0.01,
            vad_speech_pad: Duration::from_millis(300),
            capture: None,
        }
    }

    pub fn with_buffer_seconds(mut self, seconds: f64) -> Self {
        self.buffer_seconds = seconds;
        self
    }

    pub fn with_vad_threshold(mut self, threshold: f32) -> Self {
        self.vad_threshold = threshold;
        self
    }

    pub fn with_vad_speech_pad(mut self, pad: Duration) -> Self {
        self.vad_speech_pad = pad;
        self
    }

    pub fn with_capture(mut self, capture: Box<dyn AudioCapture>) -> Self {
        self.capture = Some(capture);
        self
    }

    pub fn build(self) -> Result<StreamingRecorder, DictationError> {
        let ring = RingBufferBuilder::new()
            .with_max_seconds(self.buffer_seconds)
            .with_sample_rate(SAMPLE_RATE)
            .build()?;
        let vad: Box<dyn VoiceActivityDetector> =
            Box::new(EnergyVad::new(self.vad_threshold, self.vad_speech_pad));
        let capture = self.capture.ok_or_else(|| {
            DictationError::Parameter("StreamingRecorderBuilder requires a capture backend".into())
        })?;

        Ok(StreamingRecorder {
            inner: Arc::new(Inner {
                ring,
                vad: Mutex::new(vad),
                full_buffer: Mutex::new(Vec::new()),
                capture: Mutex::new(capture),
                recording: AtomicBool::new(false),
                on_audio_chunk: Mutex::new(None),
            }),
        })
    }
}

impl Default for StreamingRecorderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamingRecorder {
    /// Registers a hook invoked with every captured chunk, after the ring/VAD/full-buffer
    /// lock has already been released. For external tap points only; never called from
    /// inside the lock-held critical section.
    pub fn set_on_audio_chunk(&self, hook: Option<Box<dyn Fn(&[f32]) + Send + Sync>>) {
        *self.inner.on_audio_chunk.lock() = hook;
    }

    /// Idempotent: clears the ring, resets the VAD, empties the full-session buffer, and
    /// opens the capture device.
    pub fn start(&self) -> Result<(), DictationError> {
        if self.inner.recording.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.inner.ring.clear();
        self.inner.vad.lock().reset();
        self.inner.full_buffer.lock().clear();

        let inner = Arc::clone(&self.inner);
        let sink: Box<dyn FnMut(&[f32]) + Send> = Box::new(move |chunk: &[f32]| {
            if !inner.recording.load(Ordering::Acquire) {
                return;
            }
            inner.ring.append(chunk);
            inner.full_buffer.lock().extend_from_slice(chunk);
            inner.vad.lock().process(chunk);

            if let Some(hook) = inner.on_audio_chunk.lock().as_ref() {
                hook(chunk);
            }
        });

        self.inner.capture.lock().start(sink)
    }

    /// Closes the capture device and atomically returns (and empties) the full-session audio.
    pub fn stop(&self) -> Result<Vec<f32>, DictationError> {
        if !self.inner.recording.swap(false, Ordering::AcqRel) {
            return Ok(Vec::new());
        }
        self.inner.capture.lock().stop()?;
        let mut full = self.inner.full_buffer.lock();
        Ok(std::mem::take(&mut full))
    }

    pub fn is_recording(&self) -> bool {
        self.inner.recording.load(Ordering::Acquire)
    }

    /// Returns up to `seconds` worth of trailing audio; `None` returns the entire window.
    pub fn get_audio_window(&self, seconds: Option<f64>) -> Vec<f32> {
        self.inner.ring.get_audio(seconds)
    }

    pub fn buffer_duration(&self) -> f64 {
        self.inner.ring.duration()
    }

    pub fn is_speech_active(&self) -> bool {
        self.inner.vad.lock().is_speaking()
    }

    pub fn silence_duration(&self) -> Duration {
        self.inner.vad.lock().silence_duration()
    }

    /// Drops already-buffered audio after a confident commit. The `seconds` argument is
    /// accepted for forward compatibility with a partial-prune policy but is currently
    /// ignored: this always fully clears the ring and resets the VAD, matching the
    /// coarse-grained behavior this was ported from.
    pub fn consume_audio(&self, _seconds: Option<f64>) {
        self.inner.ring.clear();
        self.inner.vad.lock().reset();
    }
}
