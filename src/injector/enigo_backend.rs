use enigo::{Enigo, Key, Keyboard, Settings};

use crate::injector::KeystrokeBackend;
use crate::log_warn;

/// Best-effort cross-platform keystroke backend built on `enigo`. Each character is
/// sent as a single Unicode key-down/key-up pair; backspace uses the platform
/// backspace key.
pub struct EnigoBackend {
    enigo: Enigo,
}

impl EnigoBackend {
    pub fn new() -> Result<Self, enigo::NewConError> {
        let enigo = Enigo::new(&Settings::default())?;
        Ok(Self { enigo })
    }
}

impl KeystrokeBackend for EnigoBackend {
    fn send_backspace(&mut self) {
        if let Err(e) = self.enigo.key(Key::Backspace, enigo::Direction::Click) {
            log_warn!("failed to send backspace: {e}");
        }
    }

    fn send_char(&mut self, ch: char) {
        if let Err(e) = self.enigo.text(&ch.to_string()) {
            log_warn!("failed to send character '{ch}': {e}");
        }
    }
}
