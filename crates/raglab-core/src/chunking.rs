//! Text-to-span splitting.
//!
//! Five interchangeable strategies share one size/overlap contract. Lengths
//! are counted in chars and slices always land on char boundaries.

use regex::Regex;
use std::sync::OnceLock;

use crate::types::{Chunk, ChunkParams, ChunkStats, ChunkingMethod, SourceDocument};

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;
pub const DEFAULT_TOKEN_COUNT: usize = 256;
pub const DEFAULT_TOKEN_OVERLAP: usize = 50;
pub const DEFAULT_SENTENCE_COUNT: usize = 5;
pub const DEFAULT_SENTENCE_OVERLAP: usize = 1;

/// Fixed heuristic, not a tokenizer.
pub const CHARS_PER_TOKEN: usize = 4;

const SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

#[derive(Debug, Clone, PartialEq)]
pub struct ChunkOutput {
    pub chunks: Vec<String>,
    pub stats: ChunkStats,
}

#[derive(Debug, Clone, Default)]
pub struct ChunkingEngine {
    params: ChunkParams,
}

impl ChunkingEngine {
    pub fn new(params: ChunkParams) -> Self { Self { params } }

    pub fn params(&self) -> &ChunkParams { &self.params }

    pub fn chunk(&self, text: &str, method: ChunkingMethod) -> ChunkOutput { chunk_text(text, method, &self.params) }

    /// Chunk a document and wrap each span as a [`Chunk`] owned by
    /// `collection_id`. Ids are `<collection_id>:<index>`.
    pub fn chunk_document(&self, doc: &SourceDocument, method: ChunkingMethod, collection_id: &str) -> (Vec<Chunk>, ChunkStats) {
        let output = self.chunk(&doc.text, method);
        let chunks = output
            .chunks
            .into_iter()
            .enumerate()
            .map(|(index, text)| Chunk {
                id: format!("{}:{}", collection_id, index),
                index,
                text,
                source_file_name: doc.file_name.clone(),
                chunk_method: method,
            })
            .collect();
        (chunks, output.stats)
    }
}

/// Split `text` with `method`, reading only the options that method uses.
pub fn chunk_text(text: &str, method: ChunkingMethod, params: &ChunkParams) -> ChunkOutput {
    let chunks = match method {
        ChunkingMethod::Fixed => fixed_size(
            text,
            size_or(params.chunk_size, DEFAULT_CHUNK_SIZE),
            params.overlap.unwrap_or(DEFAULT_CHUNK_OVERLAP),
        ),
        ChunkingMethod::Recursive => recursive_character(text, size_or(params.chunk_size, DEFAULT_CHUNK_SIZE)),
        ChunkingMethod::Token => token_based(
            text,
            size_or(params.token_count, DEFAULT_TOKEN_COUNT),
            params.overlap.unwrap_or(DEFAULT_TOKEN_OVERLAP),
        ),
        ChunkingMethod::Sentence => sentence_based(
            text,
            size_or(params.sentence_count, DEFAULT_SENTENCE_COUNT),
            params.overlap.unwrap_or(DEFAULT_SENTENCE_OVERLAP),
        ),
        ChunkingMethod::Semantic => paragraph_blocks(text),
    };
    let stats = stats_for(&chunks);
    ChunkOutput { chunks, stats }
}

pub fn stats_for(chunks: &[String]) -> ChunkStats {
    if chunks.is_empty() {
        return ChunkStats::default();
    }
    let total: usize = chunks.iter().map(|c| c.chars().count()).sum();
    let avg_size = total as f64 / chunks.len() as f64;
    ChunkStats { count: chunks.len(), avg_size, avg_tokens: avg_size / CHARS_PER_TOKEN as f64 }
}

// Zero sizes would make no progress; treat them as unset.
fn size_or(value: Option<usize>, default: usize) -> usize { value.filter(|v| *v > 0).unwrap_or(default) }

/// Byte offset of every char start, plus `text.len()` as the final entry.
fn char_bounds(text: &str) -> Vec<usize> {
    text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect()
}

/// Slide a `size`-char window over the text, stepping `size - overlap`.
/// With `overlap >= size` only the first window is produced.
pub fn fixed_size(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let bounds = char_bounds(text);
    let n = bounds.len() - 1;
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < n {
        let end = start.saturating_add(size).min(n);
        chunks.push(text[bounds[start]..bounds[end]].to_string());
        if overlap >= size {
            break;
        }
        start += size - overlap;
    }
    chunks
}

pub fn token_based(text: &str, token_count: usize, overlap: usize) -> Vec<String> {
    fixed_size(text, token_count.saturating_mul(CHARS_PER_TOKEN), overlap.saturating_mul(CHARS_PER_TOKEN))
}

pub fn recursive_character(text: &str, size: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    split_with(text, size, 0)
}

fn split_with(content: &str, size: usize, depth: usize) -> Vec<String> {
    if content.chars().count() <= size || depth >= SEPARATORS.len() {
        return vec![content.to_string()];
    }
    let sep = SEPARATORS[depth];
    let sep_len = sep.chars().count();
    let parts: Vec<&str> = if sep.is_empty() {
        content.char_indices().map(|(i, c)| &content[i..i + c.len_utf8()]).collect()
    } else {
        content.split(sep).collect()
    };

    let mut packed = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;
    for part in parts {
        let part_len = part.chars().count();
        let joined_len = if current.is_empty() { part_len } else { current_len + sep_len + part_len };
        if joined_len <= size {
            if !current.is_empty() {
                current.push_str(sep);
            }
            current.push_str(part);
            current_len = joined_len;
        } else {
            if !current.is_empty() {
                packed.push(std::mem::take(&mut current));
            }
            current.push_str(part);
            current_len = part_len;
        }
    }
    if !current.is_empty() {
        packed.push(current);
    }

    packed
        .into_iter()
        .flat_map(|piece| {
            if piece.chars().count() > size { split_with(&piece, size, depth + 1) } else { vec![piece] }
        })
        .collect()
}

fn sentence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^.!?]*[.!?]+").expect("static sentence pattern"))
}

fn blank_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n\s*\n").expect("static paragraph pattern"))
}

/// Sentences ending in `.`, `!` or `?` (punctuation kept), trimmed.
/// A trailing fragment without terminal punctuation is its own sentence.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut last_end = 0;
    for m in sentence_regex().find_iter(text) {
        sentences.push(m.as_str().trim());
        last_end = m.end();
    }
    sentences.push(text[last_end..].trim());
    sentences.retain(|s| !s.is_empty());
    sentences
}

pub fn sentence_based(text: &str, count: usize, overlap: usize) -> Vec<String> {
    let sentences = split_sentences(text);
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < sentences.len() {
        let end = start.saturating_add(count).min(sentences.len());
        chunks.push(sentences[start..end].join(" "));
        if end >= sentences.len() || overlap >= count {
            break;
        }
        start += count - overlap;
    }
    chunks
}

/// Structural stand-in for semantic segmentation: paragraphs separated by
/// blank lines. No embeddings are consulted.
pub fn paragraph_blocks(text: &str) -> Vec<String> {
    blank_line_regex()
        .split(text)
        .filter(|p| !p.trim().is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(chunk_size: usize, overlap: usize) -> ChunkParams {
        ChunkParams { chunk_size: Some(chunk_size), overlap: Some(overlap), ..Default::default() }
    }

    #[test]
    fn huge_sizes_yield_one_whole_chunk() {
        assert_eq!(fixed_size("abc", usize::MAX, 1), vec!["abc"]);
        assert_eq!(token_based("abc", usize::MAX, 0), vec!["abc"]);
        assert_eq!(token_based("abcdef", 1, usize::MAX), vec!["abcd"]);
        assert_eq!(sentence_based("A. B. C.", usize::MAX, 0), vec!["A. B. C."]);
        let out = chunk_text("Some words here.", ChunkingMethod::Token, &ChunkParams { token_count: Some(usize::MAX), ..Default::default() });
        assert_eq!(out.chunks, vec!["Some words here."]);
    }

    #[test]
    fn empty_text_yields_no_chunks_for_every_method() {
        for method in ChunkingMethod::ALL {
            let out = chunk_text("", method, &ChunkParams::default());
            assert!(out.chunks.is_empty(), "{method} produced chunks for empty text");
            assert_eq!(out.stats.count, 0);
            assert_eq!(out.stats.avg_size, 0.0);
        }
    }

    #[test]
    fn fixed_without_overlap_reassembles_input() {
        let text = "abcdefghijklmnopqrstuvwxyz0123456789";
        let out = chunk_text(text, ChunkingMethod::Fixed, &params(10, 0));
        assert_eq!(out.chunks.len(), 4);
        assert_eq!(out.chunks.concat(), text);
        assert!(out.chunks.iter().all(|c| c.chars().count() <= 10));
    }

    #[test]
    fn fixed_overlap_repeats_tail_of_previous_window() {
        let out = fixed_size("abcdefghij", 4, 2);
        assert_eq!(out, vec!["abcd", "cdef", "efgh", "ghij", "ij"]);
    }

    #[test]
    fn fixed_overlap_not_smaller_than_size_emits_single_chunk() {
        let text = "x".repeat(50);
        assert_eq!(fixed_size(&text, 10, 10), vec!["x".repeat(10)]);
        assert_eq!(fixed_size(&text, 10, 25), vec!["x".repeat(10)]);
    }

    #[test]
    fn fixed_never_splits_multibyte_chars() {
        let text = "héllo wörld ünïcode";
        let out = fixed_size(text, 3, 0);
        assert_eq!(out.concat(), text);
        assert!(out.iter().all(|c| c.chars().count() <= 3));
    }

    #[test]
    fn explicit_zero_overlap_is_honoured_but_zero_size_falls_back() {
        let text = "a".repeat(2500);
        let out = chunk_text(&text, ChunkingMethod::Fixed, &params(0, 0));
        assert_eq!(out.chunks.len(), 3, "default size 1000 with no overlap");
        let out = chunk_text(&text, ChunkingMethod::Fixed, &ChunkParams::default());
        // windows start at 0, 800, 1600, 2400
        assert_eq!(out.chunks.len(), 4);
    }

    #[test]
    fn token_method_scales_by_four_chars_per_token() {
        let text = "t".repeat(100);
        let p = ChunkParams { token_count: Some(5), overlap: Some(0), ..Default::default() };
        let out = chunk_text(&text, ChunkingMethod::Token, &p);
        assert_eq!(out.chunks.len(), 5);
        assert!(out.chunks.iter().all(|c| c.len() == 20));
        assert_eq!(out.stats.avg_tokens, 5.0);
    }

    #[test]
    fn recursive_prefers_paragraph_boundaries() {
        let text = "First paragraph here.\n\nSecond paragraph here.\n\nThird one.";
        let out = recursive_character(text, 30);
        assert_eq!(out, vec!["First paragraph here.", "Second paragraph here.", "Third one."]);
    }

    #[test]
    fn recursive_packs_small_parts_together() {
        let text = "aa bb cc dd ee";
        assert_eq!(recursive_character(text, 5), vec!["aa bb", "cc dd", "ee"]);
    }

    #[test]
    fn recursive_falls_back_to_char_split_for_long_runs() {
        let text = format!("short\n{}", "z".repeat(23));
        let out = recursive_character(&text, 10);
        assert!(out.iter().all(|c| c.chars().count() <= 10), "{out:?}");
        assert_eq!(out[0], "short");
        assert_eq!(out[1..].concat(), "z".repeat(23));
    }

    #[test]
    fn recursive_keeps_all_words_when_splitting_on_whitespace() {
        let text = "lorem ipsum dolor sit amet\nconsectetur adipiscing elit\n\nsed do eiusmod tempor";
        let out = recursive_character(text, 12);
        let original: Vec<&str> = text.split_whitespace().collect();
        let rebuilt: Vec<String> = out.iter().flat_map(|c| c.split_whitespace().map(str::to_string)).collect();
        assert_eq!(rebuilt, original);
        assert!(out.iter().all(|c| c.chars().count() <= 12));
    }

    #[test]
    fn sentence_grouping_matches_documented_example() {
        let out = sentence_based("A. B. C. D.", 2, 0);
        assert_eq!(out, vec!["A. B.", "C. D."]);
    }

    #[test]
    fn sentence_overlap_reuses_last_sentence() {
        let out = sentence_based("One. Two! Three? Four.", 2, 1);
        assert_eq!(out, vec!["One. Two!", "Two! Three?", "Three? Four."]);
    }

    #[test]
    fn sentence_without_punctuation_is_one_chunk() {
        assert_eq!(sentence_based("no terminal punctuation here", 5, 1), vec!["no terminal punctuation here"]);
    }

    #[test]
    fn sentence_keeps_trailing_fragment() {
        assert_eq!(split_sentences("Done. Not quite"), vec!["Done.", "Not quite"]);
        assert_eq!(split_sentences("Wait... what?! ok"), vec!["Wait...", "what?!", "ok"]);
    }

    #[test]
    fn sentence_overlap_not_smaller_than_count_stops_after_first_group() {
        let out = sentence_based("A. B. C. D.", 2, 2);
        assert_eq!(out, vec!["A. B."]);
    }

    #[test]
    fn semantic_splits_on_blank_lines_and_drops_empty_segments() {
        let text = "alpha line\nstill alpha\n\n  \n\nbeta\n\n\n\n";
        assert_eq!(paragraph_blocks(text), vec!["alpha line\nstill alpha", "beta"]);
    }

    #[test]
    fn stats_average_size_and_tokens() {
        let chunks = vec!["abcd".to_string(), "abcdefgh".to_string()];
        let stats = stats_for(&chunks);
        assert_eq!(stats.count, 2);
        assert_eq!(stats.avg_size, 6.0);
        assert_eq!(stats.avg_tokens, 1.5);
    }

    #[test]
    fn chunk_document_assigns_contiguous_indices_and_ids() {
        let engine = ChunkingEngine::new(ChunkParams { sentence_count: Some(1), overlap: Some(0), ..Default::default() });
        let doc = SourceDocument { file_name: "notes.txt".into(), text: "One. Two. Three.".into() };
        let (chunks, stats) = engine.chunk_document(&doc, ChunkingMethod::Sentence, "col1");
        assert_eq!(stats.count, 3);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i);
            assert_eq!(c.id, format!("col1:{i}"));
            assert_eq!(c.source_file_name, "notes.txt");
            assert_eq!(c.chunk_method, ChunkingMethod::Sentence);
        }
    }
}
