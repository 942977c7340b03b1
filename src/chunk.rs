//! Sentence-aware text chunker.
//!
//! Splits document text into fragments that respect a configurable
//! `max_tokens` limit, cutting on sentence boundaries and carrying a
//! configurable sentence-granular overlap into the next fragment.
//!
//! Blank input yields no fragments; the ingestion pipeline treats an empty
//! result as a failed job rather than storing empty nodes.

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Split text into fragments on sentence boundaries, respecting `max_tokens`
/// with `overlap_tokens` of trailing context repeated at each cut.
pub fn split_text(text: &str, max_tokens: usize, overlap_tokens: usize) -> Vec<String> {
    let max_chars = max_tokens * CHARS_PER_TOKEN;
    let overlap_chars = overlap_tokens * CHARS_PER_TOKEN;

    let sentences = split_sentences(text);
    let mut chunks: Vec<String> = Vec::new();
    let mut buf: Vec<String> = Vec::new();
    let mut buf_len = 0usize;

    for sentence in sentences {
        // A single sentence beyond the limit gets hard-split on its own.
        if sentence.len() > max_chars {
            if !buf.is_empty() {
                chunks.push(buf.join(" "));
                buf.clear();
                buf_len = 0;
            }
            hard_split(&sentence, max_chars, &mut chunks);
            continue;
        }

        let would_be = if buf.is_empty() {
            sentence.len()
        } else {
            buf_len + 1 + sentence.len()
        };

        if would_be > max_chars && !buf.is_empty() {
            chunks.push(buf.join(" "));

            // Carry trailing sentences forward as overlap.
            let mut carried: Vec<String> = Vec::new();
            let mut carried_len = 0usize;
            for s in buf.iter().rev() {
                if carried_len + s.len() > overlap_chars {
                    break;
                }
                carried_len += s.len() + 1;
                carried.push(s.clone());
            }
            carried.reverse();
            buf = carried;
            buf_len = buf.iter().map(|s| s.len()).sum::<usize>() + buf.len().saturating_sub(1);
        }

        buf_len = if buf.is_empty() {
            sentence.len()
        } else {
            buf_len + 1 + sentence.len()
        };
        buf.push(sentence);
    }

    if !buf.is_empty() {
        chunks.push(buf.join(" "));
    }

    chunks
}

/// Hard-split an oversized sentence at `max_chars`, preferring whitespace cuts.
fn hard_split(sentence: &str, max_chars: usize, chunks: &mut Vec<String>) {
    let mut remaining = sentence;
    while !remaining.is_empty() {
        let mut split_at = max_chars.min(remaining.len());
        while !remaining.is_char_boundary(split_at) {
            split_at -= 1;
        }
        let actual = if split_at < remaining.len() {
            remaining[..split_at]
                .rfind(' ')
                .map(|pos| pos + 1)
                .unwrap_or(split_at)
        } else {
            split_at
        };
        let piece = remaining[..actual].trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }
        remaining = &remaining[actual..];
    }
}

/// Split text into trimmed sentences. Line breaks always terminate a
/// sentence; within a line, a `.`/`!`/`?` followed by whitespace does.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut start = 0;
        let mut after_terminator = false;
        for (i, c) in line.char_indices() {
            if after_terminator && c.is_whitespace() {
                let s = line[start..i].trim();
                if !s.is_empty() {
                    sentences.push(s.to_string());
                }
                start = i;
                after_terminator = false;
            } else {
                after_terminator = matches!(c, '.' | '!' | '?');
            }
        }
        let tail = line[start..].trim();
        if !tail.is_empty() {
            sentences.push(tail.to_string());
        }
    }
    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_single_chunk() {
        let chunks = split_text("Hello, world!", 256, 32);
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn blank_text_yields_no_chunks() {
        assert!(split_text("", 256, 32).is_empty());
        assert!(split_text("   \n\n  ", 256, 32).is_empty());
    }

    #[test]
    fn sentences_are_packed_until_limit() {
        let text = "First sentence. Second sentence. Third sentence.";
        let chunks = split_text(text, 256, 0);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].contains("First sentence."));
        assert!(chunks[0].contains("Third sentence."));
    }

    #[test]
    fn long_text_splits_into_multiple_chunks() {
        let text = (1..=20)
            .map(|i| format!("This is sentence number {}.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = split_text(&text, 16, 0);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= 16 * 4, "chunk too long: {}", chunk);
        }
    }

    #[test]
    fn overlap_repeats_trailing_sentence() {
        // Each sentence is 18 chars; max 40 chars fits two, overlap 20 chars
        // carries exactly one sentence forward.
        let text = "Sentence number 1. Sentence number 2. Sentence number 3. Sentence number 4.";
        let chunks = split_text(text, 10, 5);
        assert!(chunks.len() >= 2);
        assert!(chunks[0].ends_with("Sentence number 2."));
        assert!(chunks[1].starts_with("Sentence number 2."));
    }

    #[test]
    fn oversized_sentence_is_hard_split() {
        let text = "word ".repeat(60); // one 300-char "sentence", no terminator
        let chunks = split_text(text.trim(), 10, 0);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= 40);
        }
    }

    #[test]
    fn deterministic() {
        let text = "Alpha one. Beta two. Gamma three. Delta four.";
        assert_eq!(split_text(text, 8, 2), split_text(text, 8, 2));
    }
}
