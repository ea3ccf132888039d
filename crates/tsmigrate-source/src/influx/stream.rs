//! InfluxDB's chunked query responses are a sequence of complete JSON
//! objects concatenated on the wire (not a JSON array, no separators).
//! This scans the byte stream for object boundaries by tracking brace
//! depth and string-escape state, so each chunk can be parsed and handed
//! to the caller as soon as it is complete, without buffering the whole
//! response.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::SourceError;

pub struct JsonObjectStream<R> {
    reader: R,
    buf: BytesMut,
    eof: bool,
}

impl<R: AsyncRead + Unpin> JsonObjectStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: BytesMut::with_capacity(64 * 1024),
            eof: false,
        }
    }

    /// Returns the next complete top-level JSON object's bytes, or `None`
    /// once the stream is exhausted.
    pub async fn next_object(&mut self) -> Result<Option<BytesMut>, SourceError> {
        loop {
            if let Some(end) = find_object_end(&self.buf) {
                let object = self.buf.split_to(end);
                return Ok(Some(object));
            }
            if self.eof {
                if self.buf.iter().all(|b| b.is_ascii_whitespace()) {
                    return Ok(None);
                }
                return Err(SourceError::Malformed {
                    context: "influx chunked response".to_string(),
                    detail: "stream ended mid-object".to_string(),
                });
            }
            let mut tmp = [0u8; 64 * 1024];
            let n = self.reader.read(&mut tmp).await?;
            if n == 0 {
                self.eof = true;
            } else {
                self.buf.extend_from_slice(&tmp[..n]);
            }
        }
    }
}

/// Finds the exclusive end offset of the first complete `{...}` object in
/// `buf`, skipping leading whitespace. Returns `None` if no complete
/// object is buffered yet.
fn find_object_end(buf: &BytesMut) -> Option<usize> {
    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut started = false;

    for (i, &byte) in buf.iter().enumerate() {
        if !started {
            if byte.is_ascii_whitespace() {
                continue;
            }
            if byte != b'{' {
                return None;
            }
            started = true;
        }

        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_two_concatenated_objects() {
        let data = b"{\"a\":1}{\"b\":[1,2,{\"c\":3}]}".to_vec();
        let mut stream = JsonObjectStream::new(&data[..]);
        let first = stream.next_object().await.unwrap().unwrap();
        assert_eq!(&first[..], b"{\"a\":1}");
        let second = stream.next_object().await.unwrap().unwrap();
        assert_eq!(&second[..], b"{\"b\":[1,2,{\"c\":3}]}");
        assert!(stream.next_object().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn string_braces_do_not_confuse_depth() {
        let data = b"{\"a\":\"}{\"}".to_vec();
        let mut stream = JsonObjectStream::new(&data[..]);
        let obj = stream.next_object().await.unwrap().unwrap();
        assert_eq!(&obj[..], b"{\"a\":\"}{\"}");
    }

    #[tokio::test]
    async fn trailing_whitespace_is_not_an_error() {
        let data = b"{\"a\":1}   \n".to_vec();
        let mut stream = JsonObjectStream::new(&data[..]);
        stream.next_object().await.unwrap().unwrap();
        assert!(stream.next_object().await.unwrap().is_none());
    }
}
