use crate::transcriber::StreamingResult;

/// Partitions each new hypothesis into committed (immutable) and pending (revisable)
/// text, merging successive hypotheses by word-level suffix/prefix overlap against
/// the already-committed text.
///
/// `committed_text` only grows or is replaced by a superset within a session; it is
/// never shortened.
pub struct StabilityTracker {
    committed_text: String,
    pending_text: String,
    last_full_text: String,
    stability_count: u32,
    stability_count_required: u32,
    overlap_max_words: usize,
}

pub struct StabilityTrackerBuilder {
    stability_count_required: u32,
    overlap_max_words: usize,
}

impl StabilityTrackerBuilder {
    pub fn new() -> Self {
        Self {
            stability_count_required: 2,
            overlap_max_words: 20,
        }
    }

    pub fn with_stability_count_required(mut self, count: u32) -> Self {
        self.stability_count_required = count;
        self
    }

    pub fn with_overlap_max_words(mut self, words: usize) -> Self {
        self.overlap_max_words = words;
        self
    }

    pub fn build(self) -> StabilityTracker {
        StabilityTracker {
            committed_text: String::new(),
            pending_text: String::new(),
            last_full_text: String::new(),
            stability_count: 0,
            stability_count_required: self.stability_count_required,
            overlap_max_words: self.overlap_max_words,
        }
    }
}

impl Default for StabilityTrackerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StabilityTracker {
    pub fn committed_text(&self) -> &str {
        &self.committed_text
    }

    pub fn pending_text(&self) -> &str {
        &self.pending_text
    }

    pub fn reset(&mut self) {
        self.committed_text.clear();
        self.pending_text.clear();
        self.last_full_text.clear();
        self.stability_count = 0;
    }

    /// Merges `new_text` against `committed`, prompted-echo-aware: exact prefix match
    /// wins outright, otherwise the longest word-level suffix/prefix overlap (bounded
    /// by `overlap_max_words`) is spliced, falling back to a plain append when no
    /// overlap is found at all.
    fn merge(committed: &str, new_text: &str, overlap_max_words: usize) -> String {
        if committed.is_empty() {
            return new_text.to_string();
        }
        if new_text.is_empty() {
            return committed.to_string();
        }
        if new_text.starts_with(committed) {
            return new_text.to_string();
        }

        let committed_words: Vec<&str> = committed.split_whitespace().collect();
        let new_words: Vec<&str> = new_text.split_whitespace().collect();
        let max_k = overlap_max_words.min(committed_words.len()).min(new_words.len());

        for k in (1..=max_k).rev() {
            if committed_words[committed_words.len() - k..] == new_words[..k] {
                let mut merged: Vec<&str> = committed_words.clone();
                merged.extend_from_slice(&new_words[k..]);
                return merged.join(" ");
            }
        }

        format!("{committed} {new_text}")
    }

    /// Runs one pass of the commit/merge algorithm and returns the resulting
    /// [StreamingResult]. `is_final` short-circuits directly to a full commit.
    pub fn update(
        &mut self,
        new_text: &str,
        silence_duration_secs: f64,
        silence_commit_secs: f64,
        is_final: bool,
    ) -> StreamingResult {
        let merged = Self::merge(&self.committed_text, new_text, self.overlap_max_words);

        if is_final {
            self.committed_text = merged.clone();
            self.pending_text.clear();
            self.last_full_text = merged.clone();
            return StreamingResult {
                committed: self.committed_text.clone(),
                pending: String::new(),
                full: merged,
                is_final: true,
            };
        }

        if merged == self.last_full_text {
            self.stability_count += 1;
        } else {
            self.stability_count = 0;
        }
        self.last_full_text = merged.clone();

        let should_commit = !merged.is_empty()
            && (self.stability_count >= self.stability_count_required
                || silence_duration_secs >= silence_commit_secs);

        if should_commit {
            self.committed_text = merged.clone();
            self.pending_text.clear();
        } else if merged.starts_with(&self.committed_text) {
            self.pending_text = merged[self.committed_text.len()..].trim_start().to_string();
        } else {
            self.pending_text = merged.clone();
        }

        StreamingResult {
            committed: self.committed_text.clone(),
            pending: self.pending_text.clone(),
            full: merged,
            is_final: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commits_after_required_stable_passes() {
        let mut tracker = StabilityTrackerBuilder::new()
            .with_stability_count_required(2)
            .build();
        tracker.update("hello world", 0.0, 10.0, false);
        tracker.update("hello world", 0.0, 10.0, false);
        let result = tracker.update("hello world", 0.0, 10.0, false);
        assert_eq!(result.committed, "hello world");
        assert_eq!(result.pending, "");
    }

    #[test]
    fn commits_on_silence_even_without_stability() {
        let mut tracker = StabilityTrackerBuilder::new()
            .with_stability_count_required(10)
            .build();
        let result = tracker.update("hello", 0.7, 0.6, false);
        assert_eq!(result.committed, "hello");
    }

    #[test]
    fn merges_via_word_suffix_prefix_overlap() {
        let mut tracker = StabilityTrackerBuilder::new()
            .with_stability_count_required(100)
            .with_overlap_max_words(20)
            .build();
        tracker.update("the quick brown fox", 0.0, 1000.0, false);
        // force a commit of the first hypothesis via a direct merge call, then merge a
        // second hypothesis against it.
        let merged = StabilityTracker::merge(
            "the quick brown fox",
            "brown fox jumps over",
            20,
        );
        assert_eq!(merged, "the quick brown fox jumps over");
    }

    #[test]
    fn final_pass_commits_everything_and_clears_pending() {
        let mut tracker = StabilityTrackerBuilder::new().build();
        tracker.update("hello", 0.0, 10.0, false);
        let result = tracker.update("hello world again", 0.0, 10.0, true);
        assert_eq!(result.committed, "hello world again");
        assert_eq!(result.pending, "");
        assert!(result.is_final);
    }

    #[test]
    fn no_overlap_falls_back_to_plain_append() {
        let merged = StabilityTracker::merge("good morning", "totally unrelated text", 20);
        assert_eq!(merged, "good morning totally unrelated text");
    }

    #[test]
    fn pending_tracks_uncommitted_tail() {
        let mut tracker = StabilityTrackerBuilder::new()
            .with_stability_count_required(100)
            .build();
        let result = tracker.update("hello world", 0.0, 1000.0, false);
        assert_eq!(result.committed, "");
        assert_eq!(result.pending, "hello world");
    }
}
