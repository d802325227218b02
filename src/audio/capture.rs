use crate::utils::errors::DictationError;

/// Trait seam for the microphone backend. The recorder pushes every captured chunk
/// through `on_chunk` as mono f32 PCM; the concrete device is otherwise opaque to it.
pub trait AudioCapture: Send {
    fn start(&mut self, on_chunk: Box<dyn FnMut(&[f32]) + Send>) -> Result<(), DictationError>;
    fn stop(&mut self) -> Result<(), DictationError>;
}

/// Default production backend, built on `cpal`'s default input device.
#[cfg(feature = "cpal")]
pub mod cpal_capture {
    use super::*;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{SampleFormat, Stream};

    pub struct CpalCapture {
        stream: Option<Stream>,
    }

    impl CpalCapture {
        pub fn new() -> Self {
            Self { stream: None }
        }

        fn build_stream(
            on_chunk: Box<dyn FnMut(&[f32]) + Send>,
        ) -> Result<Stream, DictationError> {
            let host = cpal::default_host();
            let device = host
                .default_input_device()
                .ok_or_else(|| DictationError::AudioDevice("no default input device".into()))?;
            let config = device.default_input_config().map_err(|e| {
                DictationError::AudioDevice(format!("failed to read input config: {e}"))
            })?;

            let channels = config.channels() as usize;
            let sample_format = config.sample_format();
            let err_fn = |err: cpal::StreamError| {
                crate::log_warn!("audio stream error: {err}");
            };
            let on_chunk = std::sync::Mutex::new(on_chunk);

            let stream = match sample_format {
                SampleFormat::F32 => device.build_input_stream(
                    &config.into(),
                    move |data: &[f32], _| {
                        let mono = downmix(data, channels);
                        (on_chunk.lock().unwrap())(&mono);
                    },
                    err_fn,
                    None,
                ),
                SampleFormat::I16 => device.build_input_stream(
                    &config.into(),
                    move |data: &[i16], _| {
                        let floats: Vec<f32> = data.iter().map(|&s| s as f32 / 32768.0).collect();
                        let mono = downmix(&floats, channels);
                        (on_chunk.lock().unwrap())(&mono);
                    },
                    err_fn,
                    None,
                ),
                other => {
                    return Err(DictationError::AudioDevice(format!(
                        "unsupported sample format: {other:?}"
                    )));
                }
            }
            .map_err(|e| DictationError::AudioDevice(format!("failed to build stream: {e}")))?;

            Ok(stream)
        }
    }

    impl Default for CpalCapture {
        fn default() -> Self {
            Self::new()
        }
    }

    impl AudioCapture for CpalCapture {
        fn start(
            &mut self,
            on_chunk: Box<dyn FnMut(&[f32]) + Send>,
        ) -> Result<(), DictationError> {
            let stream = Self::build_stream(on_chunk)?;
            stream
                .play()
                .map_err(|e| DictationError::AudioDevice(format!("failed to start stream: {e}")))?;
            self.stream = Some(stream);
            Ok(())
        }

        fn stop(&mut self) -> Result<(), DictationError> {
            self.stream.take();
            Ok(())
        }
    }

    fn downmix(samples: &[f32], channels: usize) -> Vec<f32> {
        if channels <= 1 {
            return samples.to_vec();
        }
        samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    }
}

#[cfg(feature = "cpal")]
pub use cpal_capture::CpalCapture;
