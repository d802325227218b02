use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use strum::{Display, EnumString, IntoStaticStr};

use crate::audio::StreamingRecorder;
use crate::injector::StreamingInjector;
use crate::log_warn;
use crate::transcriber::{StreamingResult, StreamingTranscriber};
use crate::utils::errors::DictationError;

const INFERENCE_POLL_INTERVAL: Duration = Duration::from_millis(50);
const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(1);
const MIN_AUDIO_FOR_FINAL_PASS: usize = 1600;

/// Session lifecycle. The hotkey toggle moves Idle<->Live; stopping from Live enters
/// Transcribing until the post-stop final pass completes.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, EnumString, IntoStaticStr, Display)]
pub enum State {
    #[default]
    #[strum(serialize = "loading")]
    Loading,
    #[strum(serialize = "idle")]
    Idle,
    #[strum(serialize = "live")]
    Live,
    #[strum(serialize = "transcribing")]
    Transcribing,
}

type UpdateCallback = Arc<dyn Fn(StreamingResult) + Send + Sync>;

struct WorkerHandles {
    stop_flag: Arc<AtomicBool>,
    done_rx: mpsc::Receiver<()>,
}

/// External collaborator: the global hotkey listener. The controller does not poll
/// for key events itself -- a production listener calls `on_toggle` from its own
/// press handler, which is expected to in turn call [Controller::toggle]. This crate
/// ships no production backend (the concrete OS hotkey hook is out of scope); tests
/// and simple embeddings can call `toggle`/`start_session`/`stop_session` directly
/// instead of registering a listener at all.
pub trait HotkeyListener: Send {
    fn start(&mut self, on_toggle: Arc<dyn Fn() + Send + Sync>) -> Result<(), DictationError>;
    fn stop(&mut self) -> Result<(), DictationError>;
}

/// External collaborator: start/stop/error notification sounds, played on the
/// matching session transitions. No production backend is implemented by this
/// crate; [NullSessionSounds] is the silent default.
pub trait SessionSounds: Send + Sync {
    fn play_start(&self) {}
    fn play_stop(&self) {}
    fn play_error(&self) {}
}

/// The default, silent [SessionSounds] implementation.
pub struct NullSessionSounds;
impl SessionSounds for NullSessionSounds {}

/// Orchestrates [StreamingRecorder], [StreamingTranscriber], and [StreamingInjector]
/// through the session state machine via a single inference worker thread.
pub struct Controller {
    recorder: StreamingRecorder,
    transcriber: Arc<Mutex<Option<StreamingTranscriber>>>,
    injector: Arc<StreamingInjector>,
    // Arc'd so the final-pass thread spawned by `stop_session` can transition this back
    // to `Idle` itself, only once its `process_audio`/injector force-update has landed.
    state: Arc<Mutex<State>>,
    worker: Mutex<Option<WorkerHandles>>,
    last_toggle: Mutex<Option<Instant>>,
    toggle_debounce: Duration,
    inference_interval: Duration,
    audio_window_seconds: f64,
    consume_audio_on_commit: bool,
    on_update: Mutex<Option<UpdateCallback>>,
    on_complete: Mutex<Option<UpdateCallback>>,
    hotkey: Mutex<Option<Box<dyn HotkeyListener>>>,
    sounds: Arc<dyn SessionSounds>,
}

pub struct ControllerBuilder {
    toggle_debounce: Duration,
    inference_interval: Duration,
    audio_window_seconds: f64,
    consume_audio_on_commit: bool,
    hotkey: Option<Box<dyn HotkeyListener>>,
    sounds: Option<Arc<dyn SessionSounds>>,
}

impl ControllerBuilder {
    pub fn new() -> Self {
        Self {
            toggle_debounce: Duration::from_secs_f64(0.2),
            inference_interval: Duration::from_secs_f64(0.5),
            audio_window_seconds: 10.0,
            consume_audio_on_commit: true,
            hotkey: None,
            sounds: None,
        }
    }

    /// Registers a [HotkeyListener]; started by [Controller::listen] and stopped by
    /// [Controller::shutdown]. Optional -- callers may drive the controller purely
    /// through `toggle`/`start_session`/`stop_session` without one.
    pub fn with_hotkey_listener(mut self, listener: Box<dyn HotkeyListener>) -> Self {
        self.hotkey = Some(listener);
        self
    }

    /// Registers a [SessionSounds] backend, played on session start/stop/error.
    /// Defaults to [NullSessionSounds] (silent) if never called.
    pub fn with_sounds(mut self, sounds: Arc<dyn SessionSounds>) -> Self {
        self.sounds = Some(sounds);
        self
    }

    pub fn with_toggle_debounce(mut self, debounce: Duration) -> Self {
        self.toggle_debounce = debounce;
        self
    }

    pub fn with_inference_interval(mut self, interval: Duration) -> Self {
        self.inference_interval = interval;
        self
    }

    pub fn with_audio_window_seconds(mut self, seconds: f64) -> Self {
        self.audio_window_seconds = seconds;
        self
    }

    pub fn with_consume_audio_on_commit(mut self, enabled: bool) -> Self {
        self.consume_audio_on_commit = enabled;
        self
    }

    /// Builds a [Controller] with its recognizer already loaded, starting in `Idle`.
    /// Use this when model loading happens before the controller is constructed at all.
    pub fn build(
        self,
        recorder: StreamingRecorder,
        transcriber: StreamingTranscriber,
        injector: StreamingInjector,
    ) -> Controller {
        self.build_with_state(recorder, Some(transcriber), injector, State::Idle)
    }

    /// Builds a [Controller] starting in `Loading`, with no recognizer yet. The caller
    /// drives [Controller::load_recognizer] afterwards to transition to `Idle` once the
    /// (heavy, hundreds-of-MB) recognizer has finished loading on its own thread.
    pub fn build_loading(self, recorder: StreamingRecorder, injector: StreamingInjector) -> Controller {
        self.build_with_state(recorder, None, injector, State::Loading)
    }

    fn build_with_state(
        self,
        recorder: StreamingRecorder,
        transcriber: Option<StreamingTranscriber>,
        injector: StreamingInjector,
        state: State,
    ) -> Controller {
        Controller {
            recorder,
            transcriber: Arc::new(Mutex::new(transcriber)),
            injector: Arc::new(injector),
            state: Arc::new(Mutex::new(state)),
            worker: Mutex::new(None),
            last_toggle: Mutex::new(None),
            toggle_debounce: self.toggle_debounce,
            inference_interval: self.inference_interval,
            audio_window_seconds: self.audio_window_seconds,
            consume_audio_on_commit: self.consume_audio_on_commit,
            on_update: Mutex::new(None),
            on_complete: Mutex::new(None),
            hotkey: Mutex::new(self.hotkey),
            sounds: self.sounds.unwrap_or_else(|| Arc::new(NullSessionSounds)),
        }
    }
}

impl Default for ControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Controller {
    pub fn state(&self) -> State {
        *self.state.lock()
    }

    pub fn set_on_update<F: Fn(StreamingResult) + Send + Sync + 'static>(&self, f: F) {
        *self.on_update.lock() = Some(Arc::new(f));
    }

    pub fn set_on_complete<F: Fn(StreamingResult) + Send + Sync + 'static>(&self, f: F) {
        *self.on_complete.lock() = Some(Arc::new(f));
    }

    /// Loads the recognizer on a background thread, transitioning from `Loading` to
    /// `Idle` on success. On failure the controller stays in `Loading` and the error is
    /// logged -- per the error taxonomy, a model load failure is fatal at startup, so
    /// there is no session to fall back to. A no-op (returns immediately) if the
    /// controller was not built via [ControllerBuilder::build_loading] or has already
    /// finished loading.
    pub fn load_recognizer<F>(self: &Arc<Self>, build_transcriber: F)
    where
        F: FnOnce() -> Result<StreamingTranscriber, DictationError> + Send + 'static,
    {
        if self.state() != State::Loading {
            return;
        }
        let controller = Arc::clone(self);
        thread::spawn(move || match build_transcriber() {
            Ok(transcriber) => {
                *controller.transcriber.lock() = Some(transcriber);
                *controller.state.lock() = State::Idle;
            }
            Err(e) => {
                log_warn!("recognizer model load failed, remaining in Loading: {e}");
            }
        });
    }

    /// Debounced Idle<->Live dispatch, meant to be called directly from a hotkey
    /// listener's press handler.
    pub fn toggle(&self) -> Result<(), DictationError> {
        {
            let mut last = self.last_toggle.lock();
            if let Some(t) = *last {
                if t.elapsed() < self.toggle_debounce {
                    return Ok(());
                }
            }
            *last = Some(Instant::now());
        }

        match self.state() {
            State::Idle => self.start_session(),
            State::Live => self.stop_session(),
            _ => Ok(()),
        }
    }

    pub fn start_session(&self) -> Result<(), DictationError> {
        if self.state() != State::Idle {
            return Ok(());
        }
        // Invariant: `Idle` is only ever reached once a recognizer has been loaded, via
        // either `build` or a successful `load_recognizer`, so this is always `Some`.
        self.transcriber
            .lock()
            .as_mut()
            .expect("transcriber loaded before Idle state is reached")
            .reset();
        self.injector.reset();

        if let Err(e) = self.recorder.start() {
            log_warn!("failed to open audio device: {e}");
            self.sounds.play_error();
            return Err(e);
        }
        *self.state.lock() = State::Live;
        self.sounds.play_start();

        let stop_flag = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = mpsc::channel();

        let recorder = self.recorder.clone();
        let transcriber = Arc::clone(&self.transcriber);
        let injector = Arc::clone(&self.injector);
        let on_update = self.on_update.lock().clone();
        let stop_flag_worker = Arc::clone(&stop_flag);
        let inference_interval = self.inference_interval;
        let audio_window_seconds = self.audio_window_seconds;

        thread::spawn(move || {
            let mut last_inference = Instant::now() - inference_interval;
            while !stop_flag_worker.load(Ordering::Acquire) {
                if last_inference.elapsed() >= inference_interval {
                    last_inference = Instant::now();
                    let speech_active = recorder.is_speech_active();
                    let buffered = recorder.buffer_duration();
                    if speech_active || buffered > 1.0 {
                        let window = recorder.get_audio_window(Some(audio_window_seconds));
                        if window.len() > MIN_AUDIO_FOR_FINAL_PASS {
                            let silence = recorder.silence_duration().as_secs_f64();
                            let result = transcriber
                                .lock()
                                .as_mut()
                                .expect("transcriber loaded before Live state is reached")
                                .process_audio(&window, silence, false);
                            match result {
                                Ok(Some(r)) => {
                                    if !r.full.is_empty() {
                                        injector.update(&r.full, false);
                                        if let Some(cb) = on_update.as_ref() {
                                            cb(r);
                                        }
                                    }
                                }
                                Ok(None) => {}
                                Err(e) => log_warn!("transcription pass failed: {e}"),
                            }
                        }
                    }
                }
                thread::sleep(INFERENCE_POLL_INTERVAL);
            }
            let _ = done_tx.send(());
        });

        *self.worker.lock() = Some(WorkerHandles { stop_flag, done_rx });
        Ok(())
    }

    pub fn stop_session(&self) -> Result<(), DictationError> {
        if self.state() != State::Live {
            return Ok(());
        }
        *self.state.lock() = State::Transcribing;

        if let Some(handles) = self.worker.lock().take() {
            handles.stop_flag.store(true, Ordering::Release);
            if handles.done_rx.recv_timeout(WORKER_JOIN_TIMEOUT).is_err() {
                log_warn!("inference worker did not stop within {WORKER_JOIN_TIMEOUT:?}; detaching");
            }
        }

        let full_audio = self.recorder.stop()?;
        if self.consume_audio_on_commit {
            self.recorder.consume_audio(None);
        }

        if full_audio.len() > MIN_AUDIO_FOR_FINAL_PASS {
            let transcriber = Arc::clone(&self.transcriber);
            let injector = Arc::clone(&self.injector);
            let on_complete = self.on_complete.lock().clone();
            let state = Arc::clone(&self.state);
            let sounds = Arc::clone(&self.sounds);
            thread::spawn(move || {
                let result = transcriber
                    .lock()
                    .as_mut()
                    .expect("transcriber loaded before Transcribing state is reached")
                    .process_audio(&full_audio, 0.0, true);
                if let Ok(Some(r)) = result {
                    injector.update(&r.full, true);
                    if let Some(cb) = on_complete.as_ref() {
                        cb(r);
                    }
                }
                // Only leave `Transcribing` once the final pass has actually landed --
                // a re-toggle racing this thread would otherwise call `reset()` on the
                // transcriber/injector while this thread is still reading/writing them.
                *state.lock() = State::Idle;
                sounds.play_stop();
            });
        } else {
            *self.state.lock() = State::Idle;
            self.sounds.play_stop();
        }

        Ok(())
    }

    /// Starts the registered [HotkeyListener], if any, wiring its toggle events back to
    /// [Controller::toggle]. A no-op if no listener was registered on the builder.
    pub fn listen(self: &Arc<Self>) -> Result<(), DictationError> {
        let mut hotkey = self.hotkey.lock();
        let Some(listener) = hotkey.as_mut() else {
            return Ok(());
        };
        let controller = Arc::clone(self);
        listener.start(Arc::new(move || {
            if let Err(e) = controller.toggle() {
                log_warn!("hotkey toggle failed: {e}");
            }
        }))
    }

    pub fn shutdown(&self) -> Result<(), DictationError> {
        if self.state() == State::Live {
            self.stop_session()?;
        }
        if let Some(listener) = self.hotkey.lock().as_mut() {
            listener.stop()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::capture::AudioCapture;
    use crate::audio::StreamingRecorderBuilder;
    use crate::injector::StreamingInjectorBuilder;
    use crate::transcriber::{Recognizer, StreamingTranscriberBuilder};

    struct FakeCapture;
    impl AudioCapture for FakeCapture {
        fn start(&mut self, _on_chunk: Box<dyn FnMut(&[f32]) + Send>) -> Result<(), DictationError> {
            Ok(())
        }
        fn stop(&mut self) -> Result<(), DictationError> {
            Ok(())
        }
    }

    struct EmptyRecognizer;
    impl Recognizer for EmptyRecognizer {
        fn transcribe(
            &self,
            _pcm: &[f32],
            _initial_prompt: Option<&str>,
        ) -> Result<Vec<String>, DictationError> {
            Ok(vec![])
        }
    }

    fn controller() -> Controller {
        let recorder = StreamingRecorderBuilder::new()
            .with_buffer_seconds(2.0)
            .with_capture(Box::new(FakeCapture))
            .build()
            .unwrap();
        let transcriber = StreamingTranscriberBuilder::new().build(Box::new(EmptyRecognizer));
        let injector = StreamingInjectorBuilder::new().build();
        ControllerBuilder::new()
            .with_toggle_debounce(Duration::from_millis(0))
            .build(recorder, transcriber, injector)
    }

    #[test]
    fn starts_in_idle_state() {
        assert_eq!(controller().state(), State::Idle);
    }

    #[test]
    fn toggle_moves_idle_to_live_and_back() {
        let c = controller();
        c.toggle().unwrap();
        assert_eq!(c.state(), State::Live);
        c.toggle().unwrap();
        assert_eq!(c.state(), State::Idle);
    }

    #[test]
    fn build_loading_starts_in_loading_and_transitions_to_idle_on_success() {
        let recorder = StreamingRecorderBuilder::new()
            .with_buffer_seconds(2.0)
            .with_capture(Box::new(FakeCapture))
            .build()
            .unwrap();
        let injector = StreamingInjectorBuilder::new().build();
        let c = Arc::new(ControllerBuilder::new().build_loading(recorder, injector));
        assert_eq!(c.state(), State::Loading);

        // Toggling while still loading is a no-op; there is no recognizer to drive a
        // session with yet.
        c.toggle().unwrap();
        assert_eq!(c.state(), State::Loading);

        c.load_recognizer(|| {
            Ok(StreamingTranscriberBuilder::new().build(Box::new(EmptyRecognizer)))
        });

        let mut state = c.state();
        for _ in 0..200 {
            state = c.state();
            if state == State::Idle {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(state, State::Idle);
    }

    #[test]
    fn load_recognizer_failure_leaves_controller_in_loading() {
        let recorder = StreamingRecorderBuilder::new()
            .with_buffer_seconds(2.0)
            .with_capture(Box::new(FakeCapture))
            .build()
            .unwrap();
        let injector = StreamingInjectorBuilder::new().build();
        let c = Arc::new(ControllerBuilder::new().build_loading(recorder, injector));

        c.load_recognizer(|| Err(DictationError::ModelLoad("corrupt model file".into())));

        thread::sleep(Duration::from_millis(100));
        assert_eq!(c.state(), State::Loading);
    }

    #[test]
    fn stop_session_from_idle_is_a_no_op() {
        let c = controller();
        c.stop_session().unwrap();
        assert_eq!(c.state(), State::Idle);
    }

    #[test]
    fn shutdown_from_live_stops_session() {
        let c = controller();
        c.start_session().unwrap();
        c.shutdown().unwrap();
        assert_eq!(c.state(), State::Idle);
    }

    struct FailingCapture;
    impl AudioCapture for FailingCapture {
        fn start(&mut self, _on_chunk: Box<dyn FnMut(&[f32]) + Send>) -> Result<(), DictationError> {
            Err(DictationError::AudioDevice("no input device".into()))
        }
        fn stop(&mut self) -> Result<(), DictationError> {
            Ok(())
        }
    }

    #[test]
    fn device_open_failure_returns_to_idle() {
        let recorder = StreamingRecorderBuilder::new()
            .with_buffer_seconds(2.0)
            .with_capture(Box::new(FailingCapture))
            .build()
            .unwrap();
        let transcriber = StreamingTranscriberBuilder::new().build(Box::new(EmptyRecognizer));
        let injector = StreamingInjectorBuilder::new().build();
        let c = ControllerBuilder::new().build(recorder, transcriber, injector);

        assert!(c.start_session().is_err());
        assert_eq!(c.state(), State::Idle);
    }

    #[derive(Default)]
    struct CountingSounds {
        starts: std::sync::atomic::AtomicUsize,
        stops: std::sync::atomic::AtomicUsize,
    }
    impl SessionSounds for CountingSounds {
        fn play_start(&self) {
            self.starts.fetch_add(1, Ordering::Relaxed);
        }
        fn play_stop(&self) {
            self.stops.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn sounds_play_on_start_and_stop() {
        let recorder = StreamingRecorderBuilder::new()
            .with_buffer_seconds(2.0)
            .with_capture(Box::new(FakeCapture))
            .build()
            .unwrap();
        let transcriber = StreamingTranscriberBuilder::new().build(Box::new(EmptyRecognizer));
        let injector = StreamingInjectorBuilder::new().build();
        let sounds = Arc::new(CountingSounds::default());
        let c = ControllerBuilder::new()
            .with_sounds(sounds.clone())
            .build(recorder, transcriber, injector);

        c.start_session().unwrap();
        c.stop_session().unwrap();
        assert_eq!(sounds.starts.load(Ordering::Relaxed), 1);
        assert_eq!(sounds.stops.load(Ordering::Relaxed), 1);
    }
}
