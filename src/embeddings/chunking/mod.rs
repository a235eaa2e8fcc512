
use serde::{Deserialize, Serialize};
use std::iter;
use tracing::debug;

use crate::{RagError, Result};

/// A window of text cut from a larger document.
///
/// Offsets are counted in `char`s, never bytes, so multi-byte text is never
/// split inside a code point and boundaries are reproducible across platforms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextWindow {
    /// Position of this window in left-to-right order
    pub sequence_index: usize,
    /// Character offset of the window start in the parent text
    pub char_start: usize,
    /// The window text
    pub text: String,
}

/// Configuration for fixed-size sliding window chunking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Window size in characters
    pub window_size: usize,
    /// Characters shared by adjacent windows
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            window_size: 512,
            overlap: 50,
        }
    }
}

impl ChunkingConfig {
    #[inline]
    pub fn new(window_size: usize, overlap: usize) -> Result<Self> {
        let config = Self {
            window_size,
            overlap,
        };
        config.validate()?;
        Ok(config)
    }

    #[inline]
    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(RagError::InvalidArgument(
                "window size must be greater than zero".to_string(),
            ));
        }
        if self.overlap >= self.window_size {
            return Err(RagError::InvalidArgument(format!(
                "overlap ({}) must be smaller than window size ({})",
                self.overlap, self.window_size
            )));
        }
        Ok(())
    }

    /// Distance between the starts of adjacent windows
    #[inline]
    pub fn stride(&self) -> usize {
        self.window_size - self.overlap
    }

    /// Number of windows a text of `char_len` characters produces
    #[inline]
    pub fn window_count(&self, char_len: usize) -> usize {
        char_len.div_ceil(self.stride())
    }
}

/// Split text into overlapping fixed-size windows.
///
/// Window `k` covers characters `[k * stride, k * stride + window_size)`,
/// clipped to the end of the text, where `stride = window_size - overlap`.
/// Empty text produces no windows.
#[inline]
pub fn chunk_text(text: &str, window_size: usize, overlap: usize) -> Result<Vec<TextWindow>> {
    let config = ChunkingConfig::new(window_size, overlap)?;
    Ok(chunk_with_config(text, &config))
}

/// Split text using an already validated configuration
#[inline]
pub fn chunk_with_config(text: &str, config: &ChunkingConfig) -> Vec<TextWindow> {
    // Byte offset of every char start, plus the end of the string
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(iter::once(text.len()))
        .collect();
    let char_len = boundaries.len() - 1;

    let windows: Vec<TextWindow> = (0..char_len)
        .step_by(config.stride())
        .enumerate()
        .map(|(sequence_index, char_start)| {
            let char_end = (char_start + config.window_size).min(char_len);
            TextWindow {
                sequence_index,
                char_start,
                text: slice_chars(text, &boundaries, char_start, char_end).to_string(),
            }
        })
        .collect();

    debug!(
        "Chunked {} characters into {} windows (window {}, overlap {})",
        char_len,
        windows.len(),
        config.window_size,
        config.overlap
    );

    windows
}

#[expect(
    clippy::string_slice,
    reason = "boundaries are collected from char_indices"
)]
fn slice_chars<'a>(text: &'a str, boundaries: &[usize], start: usize, end: usize) -> &'a str {
    &text[boundaries[start]..boundaries[end]]
}
