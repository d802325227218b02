use thiserror::Error;

/// The unified error type for this crate's fallible operations.
#[derive(Debug, Error)]
pub enum DictationError {
    #[error("parameter error: {0}")]
    Parameter(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("model load error: {0}")]
    ModelLoad(String),
    #[error("audio device error: {0}")]
    AudioDevice(String),
    #[error("recognizer error: {0}")]
    Recognizer(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "whisper")]
    #[error("whisper error: {0}")]
    Whisper(#[from] whisper_rs::WhisperError),
}
