//! Text cleaning and overlap-aware chunking.
//!
//! Documents are split into fixed-size character windows that prefer to end
//! on a sentence boundary and share a trailing/leading overlap with their
//! neighbor, so context survives the cut for downstream similarity matching.
//! Windows are measured in Unicode scalar values, never bytes, so a chunk
//! edge cannot split a multi-byte character.

use serde::Serialize;

/// How far past the window edge the sentence-boundary search may extend.
///
/// The extension is capped at one additional chunk length so a pathological
/// input (a single terminator-free sentence spanning the whole document)
/// cannot produce an unbounded chunk.
const LOOKAHEAD_FACTOR: usize = 1;

/// A heuristic token count. Advisory only: the estimate averages two crude
/// ratios and must never be used to truncate provider payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct TokenEstimate(u32);

impl TokenEstimate {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for TokenEstimate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "~{}", self.0)
    }
}

/// Collapse every whitespace run (spaces, tabs, newlines) to a single space
/// and trim the ends.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split `text` into overlapping windows of roughly `chunk_size` characters.
///
/// Starting at offset 0, each window spans `chunk_size` characters; when its
/// right edge falls inside the text, the window extends through the nearest
/// following sentence terminator (`.`, `?`, `!`) within the capped lookahead.
/// The next window starts `overlap` characters before the previous end, so
/// consecutive chunks share roughly `overlap` characters.
///
/// Empty input yields no chunks; input shorter than `chunk_size` yields one
/// chunk equal to the (trimmed) input.
pub fn chunk_with_overlap(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    if text.is_empty() || chunk_size == 0 {
        return Vec::new();
    }

    // Forward progress requires the overlap to be smaller than the window.
    let overlap = overlap.min(chunk_size - 1);

    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < len {
        // Window end, deliberately not clamped: the unclamped value drives
        // the next start so the tail window still advances past the text.
        let mut end = start + chunk_size;

        if end < len {
            let cap = (end + chunk_size * LOOKAHEAD_FACTOR).min(len);
            if let Some(pos) = (end..cap).find(|&i| is_sentence_end(chars[i])) {
                end = pos + 1;
            }
        }

        let piece: String = chars[start..end.min(len)].iter().collect();
        let trimmed = piece.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }

        // A window that reached the end has consumed the whole tail; stepping
        // back by the overlap here would re-emit it.
        if end >= len {
            break;
        }
        start = end - overlap;
    }

    chunks
}

fn is_sentence_end(c: char) -> bool {
    matches!(c, '.' | '?' | '!')
}

/// Estimate the token count of `text` as the rounded average of a word-based
/// and a character-based heuristic.
pub fn estimate_tokens(text: &str) -> TokenEstimate {
    let words = text.split_whitespace().count();
    let chars = text.chars().count();

    let by_words = (words as f64 / 0.75).ceil();
    let by_chars = (chars as f64 / 4.0).ceil();

    TokenEstimate(((by_words + by_chars) / 2.0).round() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds `len` chars of distinct numbered sentences (so every chunk is a
    /// unique substring and positions can be recovered with `find`).
    fn sentence_text(len: usize) -> String {
        let mut out = String::new();
        let mut i = 0;
        while out.len() < len {
            out.push_str(&format!(
                "Sentence number {:05} of this synthetic corpus ends here. ",
                i
            ));
            i += 1;
        }
        out.truncate(len);
        out
    }

    #[test]
    fn clean_collapses_whitespace_runs() {
        let cleaned = clean_text("A  \t lot\n\nof \n spacing  ");
        assert_eq!(cleaned, "A lot of spacing");
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(chunk_with_overlap("", 2000, 200).is_empty());
    }

    #[test]
    fn whitespace_only_input_yields_no_chunks() {
        assert!(chunk_with_overlap("   ", 2000, 200).is_empty());
    }

    #[test]
    fn short_input_yields_single_chunk_equal_to_input() {
        let text = "One small note.";
        let chunks = chunk_with_overlap(text, 2000, 200);
        assert_eq!(chunks, vec![text.to_string()]);
    }

    #[test]
    fn input_just_under_chunk_size_is_still_one_chunk() {
        // Longer than chunk_size - overlap, shorter than chunk_size: the
        // overlap step must not re-emit the tail.
        let text: String = std::iter::repeat('a').take(1900).collect();
        let chunks = chunk_with_overlap(&text, 2000, 200);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chars().count(), 1900);
    }

    #[test]
    fn five_thousand_chars_yield_three_chunks() {
        let text = clean_text(&sentence_text(5000));
        let chunks = chunk_with_overlap(&text, 2000, 200);
        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            // window plus at most one chunk of sentence-boundary extension
            assert!(chunk.chars().count() <= 4000);
        }
    }

    #[test]
    fn consecutive_chunks_share_an_overlap() {
        let text = clean_text(&sentence_text(5000));
        let chunks = chunk_with_overlap(&text, 2000, 200);
        assert!(chunks.len() > 1);

        let mut search_from = 0;
        let mut spans = Vec::new();
        for chunk in &chunks {
            let at = text[search_from..]
                .find(chunk.as_str())
                .map(|p| p + search_from)
                .expect("every chunk is a substring of the cleaned text");
            spans.push((at, at + chunk.len()));
            search_from = at;
        }

        for pair in spans.windows(2) {
            let (_, prev_end) = pair[0];
            let (next_start, _) = pair[1];
            assert!(
                next_start < prev_end,
                "chunks {:?} and {:?} do not overlap",
                pair[0],
                pair[1]
            );
        }

        // Coverage: first chunk starts the text, last chunk ends it.
        assert_eq!(spans.first().unwrap().0, 0);
        assert_eq!(spans.last().unwrap().1, text.len());
    }

    #[test]
    fn chunks_end_on_sentence_boundaries_when_available() {
        let text = clean_text(&sentence_text(5000));
        let chunks = chunk_with_overlap(&text, 2000, 200);
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(
                chunk.ends_with('.'),
                "interior chunk should end at a sentence terminator: {:?}",
                &chunk[chunk.len().saturating_sub(20)..]
            );
        }
    }

    #[test]
    fn window_ends_at_chunk_size_without_terminator() {
        let text: String = std::iter::repeat('a').take(250).collect();
        let chunks = chunk_with_overlap(&text, 100, 10);
        assert_eq!(chunks[0].chars().count(), 100);
        // next window starts at 90
        assert!(chunks[1].starts_with(&text[90..100]));
    }

    #[test]
    fn lookahead_is_capped_at_one_chunk_length() {
        // 300 terminator-free chars, then a period far past the cap.
        let mut text: String = std::iter::repeat('x').take(300).collect();
        text.push('.');
        let chunks = chunk_with_overlap(&text, 100, 10);
        // The first window must give up at the cap, not run out to the far
        // terminator at offset 300.
        assert_eq!(chunks[0].chars().count(), 100);
    }

    #[test]
    fn multibyte_text_never_splits_a_character() {
        let text: String = "héllo wörld détails. ".repeat(40);
        let cleaned = clean_text(&text);
        let chunks = chunk_with_overlap(&cleaned, 50, 10);
        assert!(!chunks.is_empty());
        // Reconstructible as valid UTF-8 substrings
        for chunk in &chunks {
            assert!(cleaned.contains(chunk.as_str()));
        }
    }

    #[test]
    fn token_estimate_averages_both_heuristics() {
        // 4 words, 20 chars: ceil(4/0.75)=6, ceil(20/4)=5, round(5.5)=6
        let estimate = estimate_tokens("aaaa bbbb cccc dddd ");
        assert_eq!(estimate.get(), 6);
    }

    #[test]
    fn token_estimate_of_empty_text_is_zero() {
        assert_eq!(estimate_tokens("").get(), 0);
    }
}
