use super::varint::{read_uvarint, read_varint};
use crate::error::SourceError;

/// Where one TSDB chunk's encoded bytes live: segment file index plus byte
/// offset within it.
#[derive(Debug, Clone, Copy)]
pub struct ChunkMeta {
    pub min_time: i64,
    pub max_time: i64,
    pub segment: u32,
    pub offset: u32,
}

/// One series entry as stored in the index's series section: its label
/// set (already resolved through the symbol table) and its chunk
/// references.
#[derive(Debug, Clone)]
pub struct SeriesEntry {
    pub labels: Vec<(String, String)>,
    pub chunks: Vec<ChunkMeta>,
}

fn malformed(detail: impl Into<String>) -> SourceError {
    SourceError::Malformed {
        context: "series section".to_string(),
        detail: detail.into(),
    }
}

/// Linearly scans the series section in `[start, end)`. Each entry is
/// `uvarint(len) | content | crc32(4)`; `len` covers `content` only.
///
/// This reader deliberately does not consult the postings or label-index
/// tables described by the TOC: a full scan visits every series exactly
/// once, which is all an export pass needs.
pub fn parse_series_section(
    data: &[u8],
    start: usize,
    end: usize,
    symbols: &[String],
) -> Result<Vec<SeriesEntry>, SourceError> {
    let mut out = Vec::new();
    let mut pos = start;

    while pos < end {
        let entry_len = read_uvarint(data, &mut pos)? as usize;
        let content_start = pos;
        let content_end = content_start + entry_len;
        if content_end > data.len() {
            return Err(malformed("series entry length exceeds file size"));
        }

        let mut cpos = content_start;
        let label_count = read_uvarint(data, &mut cpos)?;
        let mut labels = Vec::with_capacity(label_count as usize);
        for _ in 0..label_count {
            let name_idx = read_uvarint(data, &mut cpos)? as usize;
            let value_idx = read_uvarint(data, &mut cpos)? as usize;
            let name = symbols
                .get(name_idx)
                .ok_or_else(|| malformed("label name symbol ref out of range"))?;
            let value = symbols
                .get(value_idx)
                .ok_or_else(|| malformed("label value symbol ref out of range"))?;
            labels.push((name.clone(), value.clone()));
        }

        let chunk_count = read_uvarint(data, &mut cpos)?;
        let mut chunks = Vec::with_capacity(chunk_count as usize);
        for _ in 0..chunk_count {
            let min_time = read_varint(data, &mut cpos)?;
            let max_time = read_varint(data, &mut cpos)?;
            let chunk_ref = read_uvarint(data, &mut cpos)?;
            chunks.push(ChunkMeta {
                min_time,
                max_time,
                segment: (chunk_ref >> 32) as u32,
                offset: chunk_ref as u32,
            });
        }

        out.push(SeriesEntry { labels, chunks });

        pos = content_end;
        pos += 4; // trailing crc32, unchecked -- see module docs.
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::varint::write_uvarint;
    use super::super::varint::write_varint;

    fn encode_entry(labels: &[(usize, usize)], chunks: &[ChunkMeta]) -> Vec<u8> {
        let mut content = Vec::new();
        write_uvarint(labels.len() as u64, &mut content);
        for (n, v) in labels {
            write_uvarint(*n as u64, &mut content);
            write_uvarint(*v as u64, &mut content);
        }
        write_uvarint(chunks.len() as u64, &mut content);
        for c in chunks {
            write_varint(c.min_time, &mut content);
            write_varint(c.max_time, &mut content);
            let chunk_ref = ((c.segment as u64) << 32) | c.offset as u64;
            write_uvarint(chunk_ref, &mut content);
        }

        let mut out = Vec::new();
        write_uvarint(content.len() as u64, &mut out);
        out.extend_from_slice(&content);
        out.extend_from_slice(&0u32.to_be_bytes());
        out
    }

    #[test]
    fn parses_single_series_entry() {
        let symbols = vec!["__name__".to_string(), "up".to_string()];
        let chunk = ChunkMeta {
            min_time: 1000,
            max_time: 2000,
            segment: 1,
            offset: 42,
        };
        let data = encode_entry(&[(0, 1)], &[chunk]);

        let entries = parse_series_section(&data, 0, data.len(), &symbols).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].labels, vec![("__name__".to_string(), "up".to_string())]);
        assert_eq!(entries[0].chunks[0].segment, 1);
        assert_eq!(entries[0].chunks[0].offset, 42);
    }

    #[test]
    fn parses_multiple_series_entries() {
        let symbols = vec!["__name__".to_string(), "up".to_string(), "down".to_string()];
        let mut data = Vec::new();
        data.extend(encode_entry(&[(0, 1)], &[ChunkMeta { min_time: 0, max_time: 1, segment: 0, offset: 0 }]));
        data.extend(encode_entry(&[(0, 2)], &[ChunkMeta { min_time: 0, max_time: 1, segment: 0, offset: 10 }]));

        let entries = parse_series_section(&data, 0, data.len(), &symbols).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].labels[0].1, "down");
    }
}
