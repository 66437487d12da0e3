//! Text chunking strategies: sentence, fixed, and recursive.
//!
//! All three produce ordered [`Chunk`]s whose `start_char`/`end_char` index
//! into the input text. Token counts fall back to `len/4` when no tokenizer
//! is wired in — `ragd-core` never links one, to stay dependency-light.

use sha2::{Digest, Sha256};

use crate::models::Chunk;

/// Approximate characters-per-token ratio used by the deterministic
/// token-count fallback and by the fixed chunker's char budget.
const CHARS_PER_TOKEN: usize = 4;

/// Named chunking strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStrategy {
    Sentence,
    Fixed,
    Recursive,
}

impl ChunkStrategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sentence" => Some(Self::Sentence),
            "fixed" => Some(Self::Fixed),
            "recursive" => Some(Self::Recursive),
            _ => None,
        }
    }
}

/// Tunables shared by all three strategies (the fixed chunker ignores
/// `min_chunk_size`, matching the reference implementation's behavior).
#[derive(Debug, Clone, Copy)]
pub struct ChunkParams {
    pub chunk_size: usize,
    pub overlap: usize,
    pub min_chunk_size: usize,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            overlap: 50,
            min_chunk_size: 100,
        }
    }
}

/// Deterministic token-count estimate: `len(text)/4`, floored at 1 for any
/// non-empty text.
pub fn count_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    (text.len() / CHARS_PER_TOKEN).max(1)
}

/// Split `text` into chunks using `strategy`, stamping each with
/// `document_id` and a contiguous `chunk_index`.
pub fn chunk_text(
    document_id: &str,
    text: &str,
    strategy: ChunkStrategy,
    params: ChunkParams,
) -> Vec<Chunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let raw = match strategy {
        ChunkStrategy::Sentence => sentence_chunks(text, params),
        ChunkStrategy::Fixed => fixed_chunks(text, params),
        ChunkStrategy::Recursive => recursive_chunks(text, params),
    };
    raw.into_iter()
        .enumerate()
        .map(|(index, (content, start_char, end_char))| {
            make_chunk(document_id, index, content, start_char, end_char)
        })
        .collect()
}

fn make_chunk(
    document_id: &str,
    index: usize,
    content: String,
    start_char: usize,
    end_char: usize,
) -> Chunk {
    let token_count = count_tokens(&content);
    let chunk_id = Chunk::make_id(document_id, index);
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let content_hash = format!("{:x}", hasher.finalize());
    let mut metadata = std::collections::HashMap::new();
    metadata.insert(
        "content_hash".to_string(),
        serde_json::Value::String(content_hash),
    );
    Chunk {
        chunk_id,
        document_id: document_id.to_string(),
        chunk_index: index,
        content,
        start_char,
        end_char,
        token_count,
        metadata,
    }
}

// ---------------------------------------------------------------------
// Sentence chunker
// ---------------------------------------------------------------------

/// Split `text` into sentences at: punctuation followed by whitespace and
/// an uppercase letter; runs of two-or-more newlines (paragraph breaks);
/// or a colon followed by optional spaces then a newline.
///
/// `regex` can't express this directly — the boundaries rely on
/// lookbehind/lookahead the crate doesn't support — so they're scanned
/// by hand instead.
fn split_sentences(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        current.push(c);

        if matches!(c, '.' | '!' | '?') {
            let ws_start = i + 1;
            let mut j = ws_start;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if j > ws_start && j < chars.len() && chars[j].is_uppercase() {
                sentences.push(current.trim().to_string());
                current.clear();
                i = j;
                continue;
            }
        } else if c == '\n' {
            let mut j = i + 1;
            while j < chars.len() && chars[j] == '\n' {
                j += 1;
            }
            if j > i + 1 {
                sentences.push(current.trim_end_matches('\n').trim().to_string());
                current.clear();
                i = j;
                continue;
            }
        } else if c == ':' {
            let mut j = i + 1;
            while j < chars.len() && chars[j] == ' ' {
                j += 1;
            }
            if j < chars.len() && chars[j] == '\n' {
                sentences.push(current.trim().to_string());
                current.clear();
                i = j + 1;
                continue;
            }
        }
        i += 1;
    }
    if !current.trim().is_empty() {
        sentences.push(current.trim().to_string());
    }
    sentences.retain(|s| !s.is_empty());
    sentences
}

fn sentence_chunks(text: &str, params: ChunkParams) -> Vec<(String, usize, usize)> {
    let sentences = split_sentences(text);
    if sentences.is_empty() {
        return Vec::new();
    }

    let mut chunks: Vec<(String, usize, usize)> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_tokens = 0usize;
    let mut char_offset = 0usize;

    for sentence in sentences {
        let sentence_tokens = count_tokens(&sentence);

        if current_tokens + sentence_tokens > params.chunk_size && !current.is_empty() {
            let content = current.join(" ");
            let start = char_offset;
            let end = start + content.chars().count();
            chunks.push((content, start, end));

            let mut overlap_tokens = 0usize;
            let mut overlap_sentences: Vec<String> = Vec::new();
            for s in current.iter().rev() {
                let st = count_tokens(s);
                if overlap_tokens + st <= params.overlap {
                    overlap_sentences.insert(0, s.clone());
                    overlap_tokens += st;
                } else {
                    break;
                }
            }
            let consumed: usize = overlap_sentences
                .iter()
                .map(|s| s.chars().count() + 1)
                .sum();
            char_offset = end.saturating_sub(consumed);
            current = overlap_sentences;
            current_tokens = overlap_tokens;
        }

        current.push(sentence);
        current_tokens += sentence_tokens;
    }

    if !current.is_empty() && current_tokens >= params.min_chunk_size {
        let content = current.join(" ");
        let end = char_offset + content.chars().count();
        chunks.push((content, char_offset, end));
    } else if !current.is_empty() && !chunks.is_empty() {
        let (last_content, last_start, _) = chunks.pop().unwrap();
        let merged = format!("{} {}", last_content, current.join(" "));
        let end = last_start + merged.chars().count();
        chunks.push((merged, last_start, end));
    } else if !current.is_empty() {
        let content = current.join(" ");
        let len = content.chars().count();
        chunks.push((content, 0, len));
    }

    chunks
}

// ---------------------------------------------------------------------
// Fixed chunker
// ---------------------------------------------------------------------

fn fixed_chunks(text: &str, params: ChunkParams) -> Vec<(String, usize, usize)> {
    let chunk_chars = params.chunk_size * CHARS_PER_TOKEN;
    let overlap_chars = params.overlap * CHARS_PER_TOKEN;
    let bytes_len = text.len();

    let mut chunks = Vec::new();
    let mut start = 0usize;

    loop {
        if start >= bytes_len {
            break;
        }
        let mut end = (start + chunk_chars).min(bytes_len);
        end = snap_to_char_boundary(text, end);

        if end < bytes_len {
            if let Some(space_pos) = text[start..end].rfind(' ') {
                let candidate = start + space_pos;
                if candidate > start {
                    end = candidate;
                }
            }
        }

        let piece = text[start..end].trim();
        if !piece.is_empty() {
            chunks.push((piece.to_string(), start, end));
        }

        if start >= bytes_len.saturating_sub(overlap_chars) {
            break;
        }
        let next_start = end.saturating_sub(overlap_chars);
        if next_start <= start {
            break;
        }
        start = snap_to_char_boundary(text, next_start);
    }

    chunks
}

fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

// ---------------------------------------------------------------------
// Recursive chunker
// ---------------------------------------------------------------------

const SEPARATORS: &[&str] = &["\n## ", "\n# ", "\n\n\n", "\n\n", "\n", ". ", " "];

fn recursive_chunks(text: &str, params: ChunkParams) -> Vec<(String, usize, usize)> {
    let pieces = recursive_split(text, SEPARATORS, params);
    let mut chunks = Vec::new();
    let mut char_offset = 0usize;

    for piece in pieces {
        if piece.trim().is_empty() {
            continue;
        }
        let start = text
            .get(char_offset..)
            .and_then(|rest| rest.find(piece.as_str()))
            .map(|pos| char_offset + pos)
            .unwrap_or(char_offset);
        let end = start + piece.len();
        chunks.push((piece, start, end));
        char_offset = end;
    }

    chunks
}

fn recursive_split(text: &str, separators: &[&str], params: ChunkParams) -> Vec<String> {
    let Some((separator, rest)) = separators.split_first() else {
        return if text.trim().is_empty() {
            Vec::new()
        } else {
            vec![text.to_string()]
        };
    };

    if !text.contains(separator) {
        return recursive_split(text, rest, params);
    }

    let parts: Vec<&str> = text.split(separator).collect();
    let mut result: Vec<String> = Vec::new();
    let mut current = String::new();

    for part in parts {
        if part.trim().is_empty() {
            continue;
        }
        let test_chunk = if current.is_empty() {
            part.to_string()
        } else {
            format!("{current}{separator}{part}")
        };

        if count_tokens(&test_chunk) <= params.chunk_size {
            current = test_chunk;
        } else {
            if !current.is_empty() {
                if count_tokens(&current) >= params.min_chunk_size {
                    result.push(current.clone());
                } else if let Some(last) = result.last_mut() {
                    *last = format!("{last}{separator}{current}");
                }
            }

            if count_tokens(part) > params.chunk_size {
                result.extend(recursive_split(part, rest, params));
                current = String::new();
            } else {
                current = part.to_string();
            }
        }
    }

    if !current.is_empty() {
        if count_tokens(&current) >= params.min_chunk_size {
            result.push(current);
        } else if let Some(last) = result.last_mut() {
            *last = format!("{last}{separator}{current}");
        } else {
            result.push(current);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_text("doc1", "", ChunkStrategy::Sentence, ChunkParams::default()).is_empty());
        assert!(chunk_text("doc1", "   ", ChunkStrategy::Fixed, ChunkParams::default()).is_empty());
    }

    #[test]
    fn sentence_chunker_single_small_chunk() {
        let chunks = chunk_text(
            "doc1",
            "Hello world. This is a test.",
            ChunkStrategy::Sentence,
            ChunkParams {
                chunk_size: 512,
                overlap: 50,
                min_chunk_size: 1,
            },
        );
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
    }

    #[test]
    fn sentence_chunker_splits_on_overflow() {
        let text = "A. ".repeat(500);
        let params = ChunkParams {
            chunk_size: 50,
            overlap: 10,
            min_chunk_size: 5,
        };
        let chunks = chunk_text("doc1", &text, ChunkStrategy::Sentence, params);
        assert!(chunks.len() >= 2);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i);
        }
    }

    #[test]
    fn fixed_chunker_respects_word_boundaries() {
        let text = "word ".repeat(200);
        let params = ChunkParams {
            chunk_size: 10,
            overlap: 2,
            min_chunk_size: 0,
        };
        let chunks = chunk_text("doc1", &text, ChunkStrategy::Fixed, params);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(!c.content.ends_with(|ch: char| ch.is_whitespace()));
        }
    }

    #[test]
    fn fixed_chunker_multibyte_safe() {
        let text = "héllo wörld ".repeat(100);
        let params = ChunkParams {
            chunk_size: 5,
            overlap: 1,
            min_chunk_size: 0,
        };
        let chunks = chunk_text("doc1", &text, ChunkStrategy::Fixed, params);
        assert!(!chunks.is_empty());
    }

    #[test]
    fn recursive_chunker_prefers_markdown_headings() {
        let text = "\n## Intro\nSome intro text.\n## Body\nSome body text that is long enough.";
        let params = ChunkParams {
            chunk_size: 6,
            overlap: 0,
            min_chunk_size: 1,
        };
        let chunks = chunk_text("doc1", text, ChunkStrategy::Recursive, params);
        assert!(!chunks.is_empty());
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i);
        }
    }

    #[test]
    fn chunk_index_always_contiguous() {
        let text = (0..50)
            .map(|i| format!("Paragraph number {i}."))
            .collect::<Vec<_>>()
            .join("\n\n");
        for strategy in [
            ChunkStrategy::Sentence,
            ChunkStrategy::Fixed,
            ChunkStrategy::Recursive,
        ] {
            let chunks = chunk_text(
                "doc1",
                &text,
                strategy,
                ChunkParams {
                    chunk_size: 10,
                    overlap: 2,
                    min_chunk_size: 1,
                },
            );
            for (i, c) in chunks.iter().enumerate() {
                assert_eq!(c.chunk_index, i);
            }
        }
    }
}
