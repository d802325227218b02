use std::thread::sleep;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::log_warn;

#[cfg(feature = "enigo")]
pub mod enigo_backend;

/// Trait seam for the synthetic keystroke device. The diff algorithm in
/// [StreamingInjector] is independent of the concrete OS HID mechanism.
pub trait KeystrokeBackend: Send {
    fn send_backspace(&mut self);
    fn send_char(&mut self, ch: char);
}

/// A no-op backend useful for tests and for embedding code that wants to observe the
/// diff without actually typing anything.
#[derive(Default)]
pub struct NullBackend;
impl KeystrokeBackend for NullBackend {
    fn send_backspace(&mut self) {}
    fn send_char(&mut self, _ch: char) {}
}

struct Inner {
    backend: Box<dyn KeystrokeBackend>,
    typed_text: String,
    last_update: Option<Instant>,
}

/// Reconciles the externally visible typed text with each new hypothesis by emitting
/// the minimum-cost sequence of backspaces and keystrokes, throttled and
/// backspace-budget bounded. State is protected by a single lock held across an
/// entire `update`, including keystroke emission, so concurrent updates cannot
/// interleave their backspace/character streams.
pub struct StreamingInjector {
    inner: Mutex<Inner>,
    max_updates_per_sec: u32,
    max_backspace_chars: usize,
    keystroke_delay: Duration,
    backspace_delay: Duration,
}

pub struct StreamingInjectorBuilder {
    max_updates_per_sec: u32,
    max_backspace_chars: usize,
    keystroke_delay: Duration,
    backspace_delay: Duration,
    backend: Option<Box<dyn KeystrokeBackend>>,
}

impl StreamingInjectorBuilder {
    pub fn new() -> Self {
        Self {
            max_updates_per_sec: 4,
            max_backspace_chars: 30,
            keystroke_delay: Duration::from_secs_f64(0.002),
            backspace_delay: Duration::from_secs_f64(0.001),
            backend: None,
        }
    }

    pub fn with_max_updates_per_sec(mut self, n: u32) -> Self {
        self.max_updates_per_sec = n.max(1);
        self
    }

    pub fn with_max_backspace_chars(mut self, n: usize) -> Self {
        self.max_backspace_chars = n;
        self
    }

    pub fn with_keystroke_delay(mut self, delay: Duration) -> Self {
        self.keystroke_delay = delay;
        self
    }

    pub fn with_backspace_delay(mut self, delay: Duration) -> Self {
        self.backspace_delay = delay;
        self
    }

    pub fn with_backend(mut self, backend: Box<dyn KeystrokeBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn build(self) -> StreamingInjector {
        StreamingInjector {
            inner: Mutex::new(Inner {
                backend: self.backend.unwrap_or_else(|| Box::new(NullBackend)),
                typed_text: String::new(),
                last_update: None,
            }),
            max_updates_per_sec: self.max_updates_per_sec,
            max_backspace_chars: self.max_backspace_chars,
            keystroke_delay: self.keystroke_delay,
            backspace_delay: self.backspace_delay,
        }
    }
}

impl Default for StreamingInjectorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamingInjector {
    pub fn typed_text(&self) -> String {
        self.inner.lock().typed_text.clone()
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.typed_text.clear();
        inner.last_update = None;
    }

    /// Reconciles `new_text` against the currently typed text. Returns `false` when the
    /// update was skipped: empty input, unchanged text, throttled (unless `force`), or
    /// refused because it would exceed the backspace budget.
    pub fn update(&self, new_text: &str, force: bool) -> bool {
        if new_text.is_empty() {
            return false;
        }

        let mut inner = self.inner.lock();

        if !force {
            if let Some(last) = inner.last_update {
                let min_interval = Duration::from_secs_f64(1.0 / self.max_updates_per_sec as f64);
                if last.elapsed() < min_interval {
                    return false;
                }
            }
        }

        if new_text == inner.typed_text {
            return false;
        }

        let typed_chars: Vec<char> = inner.typed_text.chars().collect();
        let (prefix_keep, old_tail, new_tail) = if typed_chars.len() > self.max_backspace_chars {
            let split = typed_chars.len() - self.max_backspace_chars;
            let prefix_keep: String = typed_chars[..split].iter().collect();
            if !new_text.starts_with(&prefix_keep) {
                log_warn!(
                    "injector update refused: edit exceeds backspace budget of {} chars",
                    self.max_backspace_chars
                );
                return false;
            }
            let old_tail: String = typed_chars[split..].iter().collect();
            let new_tail = new_text[prefix_keep.len()..].to_string();
            (prefix_keep, old_tail, new_tail)
        } else {
            (String::new(), inner.typed_text.clone(), new_text.to_string())
        };

        let old_chars: Vec<char> = old_tail.chars().collect();
        let new_chars: Vec<char> = new_tail.chars().collect();
        let common_len = old_chars
            .iter()
            .zip(new_chars.iter())
            .take_while(|(a, b)| a == b)
            .count();

        let backspaces = old_chars.len() - common_len;
        for _ in 0..backspaces {
            inner.backend.send_backspace();
            sleep(self.backspace_delay);
        }
        for &ch in &new_chars[common_len..] {
            inner.backend.send_char(ch);
            sleep(self.keystroke_delay);
        }

        inner.typed_text = format!("{prefix_keep}{new_tail}");
        inner.last_update = Some(Instant::now());
        true
    }
}
