//! Character-window chunking.
//!
//! Windows are measured in Unicode scalar values, so multi-byte text never
//! splits inside a code point. A window starts at 0, takes `size` characters,
//! and advances by `size - overlap` until the remaining slice is empty.

use tracing::trace;

use crate::config::ChunkConfig;
use crate::errors::RagError;
use crate::record::{Chunk, ChunkMetadata};

/// Splits `text` into overlapping windows, each carrying a copy of `metadata`.
///
/// Empty text yields an empty vector; callers decide whether that is an error.
///
/// # Errors
/// `RagError::Chunking` when `overlap >= size` or `size == 0`.
pub fn chunk(
    text: &str,
    cfg: ChunkConfig,
    metadata: &ChunkMetadata,
) -> Result<Vec<Chunk>, RagError> {
    cfg.validate()
        .map_err(|e| RagError::Chunking(e.to_string()))?;

    let chars: Vec<char> = text.chars().collect();
    let step = cfg.size - cfg.overlap;
    let mut out = Vec::with_capacity(chars.len() / step + 1);

    let mut start = 0usize;
    while start < chars.len() {
        let end = (start + cfg.size).min(chars.len());
        out.push(Chunk {
            text: chars[start..end].iter().collect(),
            index: out.len(),
            metadata: metadata.clone(),
        });
        start += step;
    }

    trace!(
        file_id = %metadata.file_id,
        chars = chars.len(),
        chunks = out.len(),
        "chunked text"
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> ChunkMetadata {
        ChunkMetadata {
            file_id: "f1".into(),
            file_name: "report.pdf".into(),
            file_type: "pdf".into(),
            uploaded_by: Some("alice".into()),
            uploaded_at: None,
        }
    }

    fn text_of(len: usize) -> String {
        (0..len)
            .map(|i| char::from(b'a' + (i % 26) as u8))
            .collect()
    }

    #[test]
    fn thousand_chars_make_four_windows() {
        let text = text_of(1000);
        let chunks = chunk(&text, ChunkConfig::default(), &meta()).unwrap();
        assert_eq!(chunks.len(), 4);
        assert_eq!(
            chunks.iter().map(|c| c.index).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
        assert_eq!(chunks[0].text, text[0..400]);
        assert_eq!(chunks[1].text, text[300..700]);
        assert_eq!(chunks[3].text, text[900..1000]);
        assert!(chunks[3].text.len() < 400);
    }

    #[test]
    fn adjacent_windows_share_exactly_overlap() {
        let text = text_of(2345);
        let cfg = ChunkConfig { size: 400, overlap: 100 };
        let chunks = chunk(&text, cfg, &meta()).unwrap();
        for pair in chunks.windows(2) {
            let (a, b) = (&pair[0].text, &pair[1].text);
            assert!(a.chars().count() <= cfg.size);
            if b.chars().count() >= cfg.overlap {
                let tail: String = a.chars().skip(cfg.size - cfg.overlap).collect();
                let head: String = b.chars().take(cfg.overlap).collect();
                assert_eq!(tail, head);
            }
        }
    }

    #[test]
    fn empty_text_yields_nothing() {
        assert!(chunk("", ChunkConfig::default(), &meta()).unwrap().is_empty());
    }

    #[test]
    fn degenerate_overlap_is_rejected_before_windowing() {
        let cfg = ChunkConfig { size: 10, overlap: 10 };
        assert!(matches!(
            chunk("abcdefghijklmnop", cfg, &meta()),
            Err(RagError::Chunking(_))
        ));
        let cfg = ChunkConfig { size: 10, overlap: 50 };
        assert!(chunk("abc", cfg, &meta()).is_err());
    }

    #[test]
    fn chunks_inherit_metadata_and_respect_char_boundaries() {
        let text = "ёжик".repeat(200);
        let chunks = chunk(&text, ChunkConfig::default(), &meta()).unwrap();
        assert!(chunks.iter().all(|c| c.metadata == meta()));
        assert_eq!(chunks[0].text.chars().count(), 400);
    }

    #[test]
    fn same_text_gives_same_chunk_count() {
        let text = text_of(1777);
        let a = chunk(&text, ChunkConfig::default(), &meta()).unwrap();
        let b = chunk(&text, ChunkConfig::default(), &meta()).unwrap();
        assert_eq!(a.len(), b.len());
    }
}
