use byteorder::{BigEndian, ByteOrder};

use super::varint::read_uvarint;
use crate::error::SourceError;

/// Parses the symbol table at `offset`: a length-prefixed section holding
/// `num_symbols`, then that many length-prefixed UTF-8 strings, in the
/// order the series section's label refs index into.
pub fn parse_symbol_table(data: &[u8], offset: usize) -> Result<Vec<String>, SourceError> {
    let malformed = |detail: &str| SourceError::Malformed {
        context: "symbol table".to_string(),
        detail: detail.to_string(),
    };

    if data.len() < offset + 8 {
        return Err(malformed("offset out of range"));
    }
    let section_len = BigEndian::read_u32(&data[offset..offset + 4]) as usize;
    let content_start = offset + 4;
    let content_end = content_start + section_len;
    if data.len() < content_end {
        return Err(malformed("section length exceeds file size"));
    }
    let content = &data[content_start..content_end];

    let mut pos = 0usize;
    if content.len() < 4 {
        return Err(malformed("missing symbol count"));
    }
    let num_symbols = BigEndian::read_u32(&content[0..4]) as usize;
    pos += 4;

    let mut symbols = Vec::with_capacity(num_symbols);
    for _ in 0..num_symbols {
        let len = read_uvarint(content, &mut pos)? as usize;
        let end = pos + len;
        let bytes = content
            .get(pos..end)
            .ok_or_else(|| malformed("symbol string out of range"))?;
        symbols.push(
            std::str::from_utf8(bytes)
                .map_err(|_| malformed("symbol is not valid utf-8"))?
                .to_string(),
        );
        pos = end;
    }
    Ok(symbols)
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::varint::write_uvarint;

    fn build_symbol_table(symbols: &[&str]) -> Vec<u8> {
        let mut content = Vec::new();
        content.extend_from_slice(&(symbols.len() as u32).to_be_bytes());
        for s in symbols {
            write_uvarint(s.len() as u64, &mut content);
            content.extend_from_slice(s.as_bytes());
        }
        let mut out = Vec::new();
        out.extend_from_slice(&(content.len() as u32).to_be_bytes());
        out.extend_from_slice(&content);
        out
    }

    #[test]
    fn parses_symbols_in_order() {
        let data = build_symbol_table(&["__name__", "http_requests_total", "host"]);
        let symbols = parse_symbol_table(&data, 0).unwrap();
        assert_eq!(symbols, vec!["__name__", "http_requests_total", "host"]);
    }
}
