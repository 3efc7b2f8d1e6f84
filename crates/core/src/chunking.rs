use crate::error::IngestError;
use crate::models::{Chunk, SourceDocument};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use tracing::info;

/// Separator preference, coarsest first. The empty separator splits per character.
pub const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1_000,
            chunk_overlap: 200,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "chunk_overlap {} must be smaller than chunk_size {}",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// A window of source text. `start_offset` counts characters, not bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextWindow {
    pub start_offset: usize,
    pub text: String,
}

#[derive(Debug, Clone, Copy)]
struct Piece {
    start: usize,
    end: usize,
    chars: usize,
}

/// Splits `text` into overlapping windows of at most `chunk_size` characters.
///
/// Windows are exact slices of the input. Each window starts at or before the
/// end of the previous one, so removing the overlap and concatenating them
/// gives back the input.
pub fn split_text(text: &str, config: &ChunkingConfig) -> Vec<TextWindow> {
    if text.is_empty() || config.chunk_size == 0 {
        return Vec::new();
    }

    let mut pieces = Vec::new();
    collect_pieces(text, 0, text.len(), &SEPARATORS, config.chunk_size, &mut pieces);

    // Window starts never decrease, so character offsets are counted forward
    // from the previous start.
    let mut byte_cursor = 0;
    let mut char_cursor = 0;
    merge_pieces(&pieces, config)
        .into_iter()
        .map(|(start, end)| {
            char_cursor += text[byte_cursor..start].chars().count();
            byte_cursor = start;
            TextWindow {
                start_offset: char_cursor,
                text: text[start..end].to_string(),
            }
        })
        .collect()
}

fn collect_pieces(
    text: &str,
    start: usize,
    end: usize,
    separators: &[&str],
    chunk_size: usize,
    out: &mut Vec<Piece>,
) {
    let segment = &text[start..end];
    let chars = segment.chars().count();
    if chars <= chunk_size {
        out.push(Piece { start, end, chars });
        return;
    }

    let position = separators
        .iter()
        .position(|separator| separator.is_empty() || segment.contains(separator))
        .unwrap_or(separators.len().saturating_sub(1));
    let separator = separators.get(position).copied().unwrap_or("");
    let remaining = &separators[(position + 1).min(separators.len())..];

    if separator.is_empty() {
        for (offset, ch) in segment.char_indices() {
            let piece_start = start + offset;
            out.push(Piece {
                start: piece_start,
                end: piece_start + ch.len_utf8(),
                chars: 1,
            });
        }
        return;
    }

    // The separator stays attached to the part before it.
    let mut cursor = start;
    while let Some(found) = text[cursor..end].find(separator) {
        let part_end = cursor + found + separator.len();
        collect_pieces(text, cursor, part_end, remaining, chunk_size, out);
        cursor = part_end;
    }
    if cursor < end {
        collect_pieces(text, cursor, end, remaining, chunk_size, out);
    }
}

fn merge_pieces(pieces: &[Piece], config: &ChunkingConfig) -> Vec<(usize, usize)> {
    let mut windows = Vec::new();
    let mut current: VecDeque<Piece> = VecDeque::new();
    let mut total = 0usize;

    for piece in pieces {
        if total + piece.chars > config.chunk_size {
            if let (Some(first), Some(last)) = (current.front(), current.back()) {
                windows.push((first.start, last.end));
            }

            while total > config.chunk_overlap
                || (total + piece.chars > config.chunk_size && total > 0)
            {
                match current.pop_front() {
                    Some(dropped) => total -= dropped.chars,
                    None => break,
                }
            }
        }

        current.push_back(*piece);
        total += piece.chars;
    }

    if let (Some(first), Some(last)) = (current.front(), current.back()) {
        windows.push((first.start, last.end));
    }

    windows
}

pub fn chunk_document(document: &SourceDocument, config: &ChunkingConfig) -> Vec<Chunk> {
    split_text(&document.text, config)
        .into_iter()
        .enumerate()
        .map(|(index, window)| Chunk {
            chunk_id: make_chunk_id(&document.source_name, index as u64, &window.text),
            chunk_index: index as u64,
            text: window.text,
            source_name: document.source_name.clone(),
            start_offset: Some(window.start_offset),
        })
        .collect()
}

pub fn chunk_documents(
    documents: &[SourceDocument],
    config: &ChunkingConfig,
) -> Result<Vec<Chunk>, IngestError> {
    config.validate()?;

    let chunks: Vec<Chunk> = documents
        .iter()
        .flat_map(|document| chunk_document(document, config))
        .collect();

    info!(
        documents = documents.len(),
        chunks = chunks.len(),
        chunk_size = config.chunk_size,
        chunk_overlap = config.chunk_overlap,
        "chunked documents"
    );
    Ok(chunks)
}

fn make_chunk_id(source_name: &str, index: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_name.as_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
