pub mod audio_ring_buffer;
pub mod capture;
pub mod recorder;
pub mod vad;

pub use audio_ring_buffer::{RingBuffer, RingBufferBuilder};
pub use recorder::{StreamingRecorder, StreamingRecorderBuilder};
pub use vad::{EnergyVad, VoiceActivityDetector};
