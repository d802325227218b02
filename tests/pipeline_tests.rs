//! End-to-end wiring tests for the full capture -> transcribe -> inject pipeline,
//! driven through [Controller] with fake capture/recognizer backends so no real
//! audio device or model is required.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use murmur_stream::audio::capture::AudioCapture;
use murmur_stream::audio::{StreamingRecorder, StreamingRecorderBuilder};
use murmur_stream::injector::{StreamingInjector, StreamingInjectorBuilder};
use murmur_stream::transcriber::{Recognizer, StreamingTranscriberBuilder};
use murmur_stream::utils::errors::DictationError;
use murmur_stream::{ControllerBuilder, State};

/// A capture backend whose chunks are pushed manually by the test via `push`, rather
/// than by a real device thread.
#[derive(Clone)]
struct ManualCapture {
    sink: Arc<Mutex<Option<Box<dyn FnMut(&[f32]) + Send>>>>,
}

impl ManualCapture {
    fn new() -> Self {
        Self {
            sink: Arc::new(Mutex::new(None)),
        }
    }

    fn push(&self, chunk: &[f32]) {
        if let Some(sink) = self.sink.lock().unwrap().as_mut() {
            sink(chunk);
        }
    }
}

impl AudioCapture for ManualCapture {
    fn start(&mut self, on_chunk: Box<dyn FnMut(&[f32]) + Send>) -> Result<(), DictationError> {
        *self.sink.lock().unwrap() = Some(on_chunk);
        Ok(())
    }
    fn stop(&mut self) -> Result<(), DictationError> {
        self.sink.lock().unwrap().take();
        Ok(())
    }
}

/// Returns a fixed sequence of words, one extra word per call, simulating a
/// recognizer whose hypothesis grows as more audio becomes available.
struct GrowingRecognizer {
    words: Vec<&'static str>,
    call_count: AtomicUsize,
}

impl Recognizer for GrowingRecognizer {
    fn transcribe(
        &self,
        _pcm: &[f32],
        _initial_prompt: Option<&str>,
    ) -> Result<Vec<String>, DictationError> {
        let n = self.call_count.fetch_add(1, Ordering::SeqCst) + 1;
        let take = n.min(self.words.len());
        Ok(vec![self.words[..take].join(" ")])
    }
}

fn loud_chunk(ms: usize) -> Vec<f32> {
    vec![0.5; ms * 16]
}

#[test]
fn full_session_commits_final_text_through_injector() {
    let capture = ManualCapture::new();
    let recorder: StreamingRecorder = StreamingRecorderBuilder::new()
        .with_buffer_seconds(5.0)
        .with_capture(Box::new(capture.clone()))
        .build()
        .unwrap();

    let recognizer = GrowingRecognizer {
        words: vec!["hello", "there", "friend"],
        call_count: AtomicUsize::new(0),
    };
    let transcriber = StreamingTranscriberBuilder::new()
        .with_stability_count_required(100) // force reliance on the final pass, not mid-session stability
        .build(Box::new(recognizer));

    let injector: StreamingInjector = StreamingInjectorBuilder::new()
        .with_max_updates_per_sec(1000)
        .with_keystroke_delay(Duration::ZERO)
        .with_backspace_delay(Duration::ZERO)
        .build();

    let controller = ControllerBuilder::new()
        .with_inference_interval(Duration::from_millis(20))
        .build(recorder, transcriber, injector);

    let completed = Arc::new(Mutex::new(None));
    let completed_writer = Arc::clone(&completed);
    controller.set_on_complete(move |result| {
        *completed_writer.lock().unwrap() = Some(result);
    });

    controller.start_session().unwrap();
    assert_eq!(controller.state(), State::Live);

    // Feed the capture with a couple of seconds of "speech" so the recorder's
    // full-session buffer clears the final-pass minimum-length gate.
    for _ in 0..20 {
        capture.push(&loud_chunk(100));
        thread::sleep(Duration::from_millis(10));
    }

    controller.stop_session().unwrap();
    // The controller stays in `Transcribing` until the final-pass thread it just
    // spawned actually lands -- it must not be observably `Idle` before then.
    assert_eq!(controller.state(), State::Transcribing);

    // The final pass runs on its own thread; give it a moment to land.
    let mut result = None;
    for _ in 0..50 {
        if let Some(r) = completed.lock().unwrap().clone() {
            result = Some(r);
            break;
        }
        thread::sleep(Duration::from_millis(20));
    }

    let result = result.expect("final pass should complete");
    assert!(result.is_final);
    assert_eq!(result.committed, "hello there friend");
    assert_eq!(result.pending, "");

    let mut state = controller.state();
    for _ in 0..50 {
        state = controller.state();
        if state == State::Idle {
            break;
        }
        thread::sleep(Duration::from_millis(20));
    }
    assert_eq!(state, State::Idle);
}

#[test]
fn toggle_is_debounced_within_window() {
    let capture = ManualCapture::new();
    let recorder = StreamingRecorderBuilder::new()
        .with_buffer_seconds(2.0)
        .with_capture(Box::new(capture))
        .build()
        .unwrap();
    let transcriber = StreamingTranscriberBuilder::new().build(Box::new(GrowingRecognizer {
        words: vec!["x"],
        call_count: AtomicUsize::new(0),
    }));
    let injector = StreamingInjectorBuilder::new().build();

    let controller = ControllerBuilder::new()
        .with_toggle_debounce(Duration::from_millis(500))
        .build(recorder, transcriber, injector);

    controller.toggle().unwrap();
    assert_eq!(controller.state(), State::Live);
    // Second toggle arrives inside the debounce window and should be swallowed.
    controller.toggle().unwrap();
    assert_eq!(controller.state(), State::Live);

    controller.shutdown().unwrap();
}
