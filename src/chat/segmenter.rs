//! Sentence segmentation for streamed answers.
//!
//! Streamed text is buffered until it contains terminal punctuation, then the
//! whole buffer is released as one line to speak. Kept separate from the
//! network client so it can be driven with synthetic token streams.

const TERMINATORS: &[char] = &['.', '!', '?', '\n'];

#[derive(Debug, Default)]
pub struct SentenceSegmenter {
    buffer: String,
}

impl SentenceSegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a delta. Returns a line to speak once the buffer holds a
    /// terminator.
    pub fn push(&mut self, delta: &str) -> Option<String> {
        self.buffer.push_str(delta);
        if self.buffer.contains(TERMINATORS) {
            self.take()
        } else {
            None
        }
    }

    /// Whatever is left when the stream ends.
    pub fn finish(&mut self) -> Option<String> {
        self.take()
    }

    fn take(&mut self) -> Option<String> {
        let line = self.buffer.trim().to_string();
        self.buffer.clear();
        (!line.is_empty()).then_some(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(deltas: &[&str]) -> Vec<String> {
        let mut segmenter = SentenceSegmenter::new();
        let mut lines: Vec<String> = deltas.iter().filter_map(|d| segmenter.push(d)).collect();
        lines.extend(segmenter.finish());
        lines
    }

    #[test]
    fn test_three_sentences_in_order() {
        let lines = segment(&["God so", " loved the world.", " He gave", " His Son!", " Believe?"]);
        assert_eq!(lines, vec!["God so loved the world.", "He gave His Son!", "Believe?"]);
    }

    #[test]
    fn test_remainder_flushed_at_end() {
        assert_eq!(segment(&["No terminal", " punctuation"]), vec!["No terminal punctuation"]);
    }

    #[test]
    fn test_newline_terminates() {
        assert_eq!(segment(&["First line\n", "second"]), vec!["First line", "second"]);
    }

    #[test]
    fn test_blank_segments_dropped() {
        assert!(segment(&["  ", "\n", " "]).is_empty());
    }

    #[test]
    fn test_delta_with_terminator_mid_token_flushes_whole_buffer() {
        // The whole buffer goes out, including text after the terminator
        assert_eq!(segment(&["John 3. 16 says"]), vec!["John 3. 16 says"]);
    }
}
