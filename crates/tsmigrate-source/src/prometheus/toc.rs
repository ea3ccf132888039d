use byteorder::{BigEndian, ByteOrder};

use crate::error::SourceError;

/// The index file's table of contents: six big-endian u64 section offsets
/// followed by a CRC32 of the preceding 48 bytes, 52 bytes total, at the
/// very end of the file.
///
/// CRC validation is intentionally skipped: this reader is a best-effort,
/// scoped-down decoder (see crate-level docs) rather than a full
/// reimplementation of the on-disk format, and the series section is read
/// by linear scan rather than through the postings/label-index tables this
/// TOC also describes.
#[derive(Debug, Clone, Copy)]
pub struct Toc {
    pub symbol_table: u64,
    pub series: u64,
    pub label_indices: u64,
    pub label_indices_table: u64,
    pub postings: u64,
    pub postings_table: u64,
}

const TOC_LEN: usize = 6 * 8 + 4;

pub fn parse_toc(data: &[u8]) -> Result<Toc, SourceError> {
    if data.len() < TOC_LEN {
        return Err(SourceError::Malformed {
            context: "index toc".to_string(),
            detail: "file too short for toc".to_string(),
        });
    }
    let toc_bytes = &data[data.len() - TOC_LEN..data.len() - 4];
    let read = |i: usize| BigEndian::read_u64(&toc_bytes[i * 8..i * 8 + 8]);
    Ok(Toc {
        symbol_table: read(0),
        series: read(1),
        label_indices: read(2),
        label_indices_table: read(3),
        postings: read(4),
        postings_table: read(5),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_trailing_toc() {
        let mut data = vec![0u8; 100];
        let offsets: [u64; 6] = [4, 50, 60, 70, 80, 90];
        let mut toc_bytes = Vec::new();
        for o in offsets {
            toc_bytes.extend_from_slice(&o.to_be_bytes());
        }
        toc_bytes.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(&toc_bytes);

        let toc = parse_toc(&data).unwrap();
        assert_eq!(toc.symbol_table, 4);
        assert_eq!(toc.postings_table, 90);
    }
}
