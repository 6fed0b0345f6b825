//! Token-to-sentence reframing.
//!
//! The LLM backend emits sub-word tokens; the TTS side wants whole
//! sentences. `SentenceBuffer` accumulates tokens and hands out a
//! sentence whenever one completes.

/// Forced-flush threshold in bytes, for output that never punctuates.
const SOFT_FLUSH_BYTES: usize = 100;

const TERMINATORS: [char; 6] = ['.', '?', '!', ':', ';', '\n'];

/// Accumulates tokens from one generation; scoped to a single turn.
#[derive(Debug, Default)]
pub struct SentenceBuffer {
    buf: String,
}

impl SentenceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `token`. Returns a trimmed sentence when the token ends in
    /// a sentence terminator, or when the buffer has outgrown the soft
    /// cap and the token ends at a word boundary. Emissions are never
    /// empty; the buffer resets after every emission.
    pub fn push(&mut self, token: &str) -> Option<String> {
        self.buf.push_str(token);

        if let Some(last) = token.chars().last() {
            if TERMINATORS.contains(&last) {
                return self.take();
            }
        }

        if self.buf.len() > SOFT_FLUSH_BYTES && token.ends_with(char::is_whitespace) {
            return self.take();
        }

        None
    }

    /// Hand back whatever remains once the token stream has ended.
    pub fn flush(&mut self) -> Option<String> {
        self.take()
    }

    fn take(&mut self) -> Option<String> {
        let sentence = self.buf.trim().to_string();
        self.buf.clear();
        if sentence.is_empty() {
            None
        } else {
            Some(sentence)
        }
    }
}
