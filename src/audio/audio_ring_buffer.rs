use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::utils::errors::DictationError;

struct InnerRingBuffer {
    // Queue of chunks in arrival order. Evicted from the front, appended at the back.
    chunks: Mutex<VecDeque<Vec<f32>>>,
    // Total samples currently stored, kept in sync with `chunks` under its lock.
    len: AtomicUsize,
    capacity: AtomicUsize,
    sample_rate: AtomicUsize,
}

/// A bounded, thread-safe FIFO of mono f32 PCM samples, backed by a deque of
/// arrival-ordered chunks rather than a single fixed-size array. Evicting whole
/// chunks keeps `append` O(1) amortized and avoids the memcpy-heavy wraparound
/// bookkeeping a flat circular buffer needs, at the cost of only ever dropping
/// audio on whole-chunk boundaries.
#[derive(Clone)]
pub struct RingBuffer {
    inner: Arc<InnerRingBuffer>,
}

/// Builder to set the parameters of a [RingBuffer].
#[derive(Clone, Default)]
pub struct RingBufferBuilder {
    max_seconds: Option<f64>,
    sample_rate: Option<usize>,
}

impl RingBufferBuilder {
    pub fn new() -> Self {
        Self {
            max_seconds: None,
            sample_rate: None,
        }
    }

    /// Sets the requested capacity measured in seconds.
    pub fn with_max_seconds(mut self, max_seconds: f64) -> Self {
        self.max_seconds = Some(max_seconds);
        self
    }

    /// Sets the sample rate of audio that will be pushed into the buffer.
    pub fn with_sample_rate(mut self, sample_rate: usize) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }

    /// Builds a [RingBuffer]. Returns Err if capacity/sample rate are missing or zero.
    pub fn build(self) -> Result<RingBuffer, DictationError> {
        let max_seconds = self
            .max_seconds
            .filter(|&s| s > 0.0)
            .ok_or_else(|| DictationError::Parameter("RingBuffer has zero-length capacity.".to_string()))?;
        let sample_rate = self
            .sample_rate
            .filter(|&sr| sr > 0)
            .ok_or_else(|| DictationError::Parameter("RingBuffer has zero-size sample rate.".to_string()))?;

        let capacity = (max_seconds * sample_rate as f64) as usize;
        let inner = Arc::new(InnerRingBuffer {
            chunks: Mutex::new(VecDeque::new()),
            len: AtomicUsize::new(0),
            capacity: AtomicUsize::new(capacity),
            sample_rate: AtomicUsize::new(sample_rate),
        });

        Ok(RingBuffer { inner })
    }
}

impl RingBuffer {
    /// Currently stored audio length, in samples.
    pub fn len(&self) -> usize {
        self.inner.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Currently stored audio length, in seconds.
    pub fn duration(&self) -> f64 {
        let len = self.inner.len.load(Ordering::Acquire) as f64;
        let sample_rate = self.inner.sample_rate.load(Ordering::Acquire) as f64;
        len / sample_rate
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity.load(Ordering::Acquire)
    }

    /// Appends a chunk, defensively copying it, evicting the oldest whole chunks
    /// until the buffer is back within capacity. A single chunk longer than the
    /// buffer's entire capacity is still kept whole -- callers are expected to
    /// size their chunks well below capacity.
    pub fn append(&self, chunk: &[f32]) {
        if chunk.is_empty() {
            return;
        }
        let capacity = self.inner.capacity.load(Ordering::Acquire);
        let mut chunks = self.inner.chunks.lock();
        chunks.push_back(chunk.to_vec());
        let mut len = self.inner.len.load(Ordering::Acquire) + chunk.len();

        while len > capacity {
            let Some(front) = chunks.front() else { break };
            let front_len = front.len();
            if front_len > 0 && len - front_len < capacity && chunks.len() == 1 {
                // Only one chunk remains and it alone exceeds capacity; keep it whole.
                break;
            }
            chunks.pop_front();
            len -= front_len;
        }
        self.inner.len.store(len, Ordering::Release);
    }

    /// Returns a freshly allocated copy of the buffer's contents, in arrival order.
    /// `last_seconds` of `None` returns everything currently stored; otherwise returns
    /// at most the trailing `last_seconds` worth of samples.
    pub fn get_audio(&self, last_seconds: Option<f64>) -> Vec<f32> {
        let chunks = self.inner.chunks.lock();
        let total_len = self.inner.len.load(Ordering::Acquire);
        let sample_rate = self.inner.sample_rate.load(Ordering::Acquire);

        let want = match last_seconds {
            None => total_len,
            Some(secs) => ((secs * sample_rate as f64).ceil() as usize).min(total_len),
        };

        let mut out = Vec::with_capacity(want);
        let skip = total_len - want;
        let mut seen = 0usize;
        for chunk in chunks.iter() {
            if seen + chunk.len() <= skip {
                seen += chunk.len();
                continue;
            }
            let start = skip.saturating_sub(seen);
            out.extend_from_slice(&chunk[start..]);
            seen += chunk.len();
        }
        out
    }

    /// Empties the buffer completely.
    pub fn clear(&self) {
        let mut chunks = self.inner.chunks.lock();
        chunks.clear();
        self.inner.len.store(0, Ordering::Release);
    }
}

impl Default for RingBuffer {
    /// A ring buffer sized for the default streaming window, at the recognizer's sample rate.
    fn default() -> Self {
        RingBufferBuilder::new()
            .with_max_seconds(DEFAULT_BUFFER_SECONDS)
            .with_sample_rate(crate::transcriber::WHISPER_SAMPLE_RATE as usize)
            .build()
            .expect("Default RingBuffer should build without problems.")
    }
}

pub const DEFAULT_BUFFER_SECONDS: f64 = 12.0;

#[cfg(test)]
mod tests {
    use super::*;

    fn buf(max_seconds: f64, sample_rate: usize) -> RingBuffer {
        RingBufferBuilder::new()
            .with_max_seconds(max_seconds)
            .with_sample_rate(sample_rate)
            .build()
            .unwrap()
    }

    #[test]
    fn capacity_is_respected() {
        let rb = buf(1.0, 16_000);
        rb.append(&vec![1.0f32; 16_000]);
        rb.append(&vec![2.0f32; 16_000]);
        assert!(rb.duration() <= 1.0 + 1e-9);
        let audio = rb.get_audio(None);
        assert!(audio.iter().all(|&s| s == 2.0));
    }

    #[test]
    fn tail_window_returns_trailing_samples() {
        let rb = buf(2.0, 16_000);
        rb.append(&vec![1.0f32; 16_000]);
        rb.append(&vec![2.0f32; 16_000]);
        let tail = rb.get_audio(Some(1.0));
        assert_eq!(tail.len(), 16_000);
        assert!(tail.iter().all(|&s| s == 2.0));
    }

    #[test]
    fn clear_empties_buffer() {
        let rb = buf(1.0, 16_000);
        rb.append(&vec![1.0f32; 8_000]);
        rb.clear();
        assert_eq!(rb.len(), 0);
        assert!(rb.get_audio(None).is_empty());
    }

    #[test]
    fn empty_chunk_is_ignored() {
        let rb = buf(1.0, 16_000);
        rb.append(&[]);
        assert_eq!(rb.len(), 0);
    }
}
