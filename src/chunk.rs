//! Overlapping bounded-size text chunker.
//!
//! Splits text on paragraph, line, and word boundaries (in that order of
//! preference) into fragments no longer than the chunk size, then merges
//! consecutive fragments greedily into chunks, carrying a configurable
//! character overlap between neighbours. Separators stay attached to the
//! fragment that precedes them, so the fragment sequence concatenates back
//! to the original text and every character is covered by at least one
//! chunk.
//!
//! A single word longer than the chunk size becomes its own oversized
//! chunk rather than being cut mid-word.

use std::collections::VecDeque;

/// Boundary preference order: paragraph, line, word.
const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

/// A chunk together with the character offset of its first fragment
/// (including carried overlap) in the source text.
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub start: usize,
    pub text: String,
}

/// Split `text` into overlapping chunks of at most `chunk_size` characters.
///
/// `chunk_overlap` must be smaller than `chunk_size`; the config loader
/// enforces this. Identical input and parameters always produce the same
/// chunk sequence.
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    split_with_offsets(text, chunk_size, chunk_overlap)
        .into_iter()
        .map(|chunk| chunk.text)
        .collect()
}

/// Like [`split_text`], but each chunk carries its starting character
/// offset so the index builder can attribute it to a source document.
pub fn split_with_offsets(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<TextChunk> {
    debug_assert!(chunk_overlap < chunk_size);

    if text.is_empty() {
        return Vec::new();
    }

    let mut fragments = Vec::new();
    collect_fragments(text, chunk_size, &SEPARATORS, &mut fragments);
    merge_fragments(&fragments, chunk_size, chunk_overlap)
}

pub(crate) fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Recursively split `text` at the coarsest boundary that brings every
/// piece within `chunk_size` characters. Separators are retained at the
/// end of the piece they terminate. A piece that no separator can shrink
/// (a single oversized word) is kept whole.
fn collect_fragments<'a>(
    text: &'a str,
    chunk_size: usize,
    separators: &[&str],
    out: &mut Vec<&'a str>,
) {
    if text.is_empty() {
        return;
    }
    if char_len(text) <= chunk_size {
        out.push(text);
        return;
    }

    match separators.split_first() {
        Some((separator, rest)) => {
            if text.contains(separator) {
                for piece in text.split_inclusive(separator) {
                    collect_fragments(piece, chunk_size, rest, out);
                }
            } else {
                collect_fragments(text, chunk_size, rest, out);
            }
        }
        // Indivisible token longer than chunk_size: emit whole.
        None => out.push(text),
    }
}

/// Greedily pack fragments into chunks of at most `chunk_size` characters,
/// retaining up to `chunk_overlap` trailing characters (whole fragments)
/// as the head of the next chunk.
fn merge_fragments(fragments: &[&str], chunk_size: usize, chunk_overlap: usize) -> Vec<TextChunk> {
    let mut chunks = Vec::new();
    let mut window: VecDeque<(usize, &str, usize)> = VecDeque::new();
    let mut window_len = 0usize;
    let mut offset = 0usize;

    for fragment in fragments {
        let fragment_len = char_len(fragment);

        if window_len + fragment_len > chunk_size && !window.is_empty() {
            chunks.push(emit(&window));

            // Shrink to the overlap tail, and further if the incoming
            // fragment still would not fit beside it.
            while window_len > chunk_overlap
                || (window_len + fragment_len > chunk_size && window_len > 0)
            {
                match window.pop_front() {
                    Some((_, _, len)) => window_len -= len,
                    None => break,
                }
            }
        }

        window.push_back((offset, fragment, fragment_len));
        window_len += fragment_len;
        offset += fragment_len;
    }

    if !window.is_empty() {
        chunks.push(emit(&window));
    }

    chunks
}

fn emit(window: &VecDeque<(usize, &str, usize)>) -> TextChunk {
    let start = window.front().map(|(o, _, _)| *o).unwrap_or(0);
    let mut text = String::new();
    for (_, fragment, _) in window {
        text.push_str(fragment);
    }
    TextChunk { start, text }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Undo the overlap between consecutive chunks and rebuild the input.
    fn reconstruct(chunks: &[String]) -> String {
        let mut out = match chunks.first() {
            Some(first) => first.clone(),
            None => return String::new(),
        };
        for next in &chunks[1..] {
            let mut consumed = 0;
            // Longest prefix of `next` that is a suffix of what we have.
            for end in (1..=next.len()).rev() {
                if !next.is_char_boundary(end) {
                    continue;
                }
                if out.ends_with(&next[..end]) {
                    consumed = end;
                    break;
                }
            }
            out.push_str(&next[consumed..]);
        }
        out
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = split_text("Il Metro-Centro.", 100, 20);
        assert_eq!(chunks, vec!["Il Metro-Centro.".to_string()]);
    }

    #[test]
    fn test_empty_input() {
        assert!(split_text("", 100, 20).is_empty());
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let text = "Primo paragrafo breve.\n\nSecondo paragrafo breve.\n\nTerzo paragrafo breve.";
        let chunks = split_text(text, 30, 0);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(char_len(chunk) <= 30, "chunk exceeds size: {chunk:?}");
        }
    }

    #[test]
    fn test_size_bound() {
        let words: Vec<String> = (0..200).map(|i| format!("parola{i}")).collect();
        let text = words.join(" ");
        for chunk in split_text(&text, 50, 10) {
            assert!(char_len(&chunk) <= 50, "chunk too long: {chunk:?}");
        }
    }

    #[test]
    fn test_oversized_token_kept_whole() {
        let long_word = "x".repeat(80);
        let text = format!("breve {long_word} coda");
        let chunks = split_text(&text, 40, 8);
        assert!(
            chunks.iter().any(|c| c.contains(&long_word)),
            "oversized token must survive uncut"
        );
    }

    #[test]
    fn test_coverage_reconstructs_input() {
        let text = "Il Metro-Centro fu costruito nel 2347.\n\nLe gallerie inferiori ospitano i Custodi, \
                    che mantengono attivi i generatori a fusione.\nOgni ciclo di dieci anni il consiglio \
                    si riunisce nella Sala delle Turbine per rinnovare i patti di superficie.";
        let chunks = split_text(text, 60, 15);
        assert!(chunks.len() > 1);
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn test_deterministic() {
        let text = "Alfa beta gamma.\n\nDelta epsilon zeta.\nEta theta iota kappa lambda.";
        let first = split_with_offsets(text, 25, 5);
        let second = split_with_offsets(text, 25, 5);
        assert_eq!(first, second);
    }

    #[test]
    fn test_offsets_point_into_source() {
        let text = "uno due tre quattro cinque sei sette otto nove dieci";
        let chunks = split_with_offsets(text, 20, 5);
        let source_chars: Vec<char> = text.chars().collect();
        for chunk in &chunks {
            let tail: String = source_chars[chunk.start..].iter().collect();
            assert!(
                tail.starts_with(&chunk.text),
                "offset {} does not line up for {:?}",
                chunk.start,
                chunk.text
            );
        }
    }

    #[test]
    fn test_multibyte_text() {
        let text = "perché città più così già però lassù virtù qualità è ovunque nella città sommersa";
        let chunks = split_text(text, 25, 6);
        assert!(chunks.len() > 1);
        assert_eq!(reconstruct(&chunks), text);
    }
}
