//! A Gorilla-style (delta-of-delta timestamps, XOR'd floats) chunk codec.
//!
//! This is a self-contained implementation validated by round-trip tests,
//! not against real Prometheus chunk bytes -- see the crate-level note on
//! the scoped-down index/chunk reader. It is used both to decode chunks
//! read from a snapshot and, in tests, to produce fixtures for the rest of
//! this module to decode.

use std::path::Path;

use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::bitio::{BitReader, BitWriter};
use super::series::ChunkMeta;
use super::varint::{read_uvarint, write_uvarint};
use crate::error::SourceError;
use crate::Chunk;

pub fn encode(timestamps: &[i64], values: &[f64]) -> Vec<u8> {
    let mut header = Vec::new();
    write_uvarint(timestamps.len() as u64, &mut header);

    let mut w = BitWriter::new();
    let mut prev_delta: i64 = 0;
    let mut prev_ts: i64 = 0;
    let mut prev_value_bits: u64 = 0;
    let mut prev_leading: u32 = 64;
    let mut prev_trailing: u32 = 0;

    for (i, (&ts, &value)) in timestamps.iter().zip(values.iter()).enumerate() {
        let value_bits = value.to_bits();
        if i == 0 {
            w.write_bits(zigzag(ts) , 64);
            w.write_bits(value_bits, 64);
        } else if i == 1 {
            let delta = ts - prev_ts;
            w.write_bits(zigzag(delta), 64);
            write_value(&mut w, value_bits, prev_value_bits, &mut prev_leading, &mut prev_trailing);
            prev_delta = delta;
        } else {
            let delta = ts - prev_ts;
            let dod = delta - prev_delta;
            write_dod(&mut w, dod);
            write_value(&mut w, value_bits, prev_value_bits, &mut prev_leading, &mut prev_trailing);
            prev_delta = delta;
        }
        prev_ts = ts;
        prev_value_bits = value_bits;
    }

    let mut out = header;
    out.extend(w.finish());
    out
}

pub fn decode(data: &[u8]) -> Result<Chunk, SourceError> {
    let mut pos = 0usize;
    let count = read_uvarint(data, &mut pos)? as usize;
    if count == 0 {
        return Ok(Chunk::default());
    }

    let mut r = BitReader::new(&data[pos..]);
    let mut timestamps = Vec::with_capacity(count);
    let mut values = Vec::with_capacity(count);

    let mut prev_ts: i64 = unzigzag(r.read_bits(64)?);
    let mut prev_value_bits: u64 = r.read_bits(64)?;
    timestamps.push(prev_ts);
    values.push(f64::from_bits(prev_value_bits));

    let mut prev_delta: i64 = 0;
    let mut prev_leading: u32 = 64;
    let mut prev_trailing: u32 = 0;

    for i in 1..count {
        let delta = if i == 1 {
            unzigzag(r.read_bits(64)?)
        } else {
            let dod = read_dod(&mut r)?;
            prev_delta + dod
        };
        let ts = prev_ts + delta;
        let value_bits = read_value(&mut r, prev_value_bits, &mut prev_leading, &mut prev_trailing)?;

        timestamps.push(ts);
        values.push(f64::from_bits(value_bits));

        prev_delta = delta;
        prev_ts = ts;
        prev_value_bits = value_bits;
    }

    Ok(Chunk { timestamps, values })
}

fn zigzag(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

fn unzigzag(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

fn write_dod(w: &mut BitWriter, dod: i64) {
    if dod == 0 {
        w.write_bit(false);
    } else if (-63..=64).contains(&dod) {
        w.write_bits(0b10, 2);
        w.write_bits((dod - (-63)) as u64, 7);
    } else if (-255..=256).contains(&dod) {
        w.write_bits(0b110, 3);
        w.write_bits((dod - (-255)) as u64, 9);
    } else if (-2047..=2048).contains(&dod) {
        w.write_bits(0b1110, 4);
        w.write_bits((dod - (-2047)) as u64, 12);
    } else {
        w.write_bits(0b1111, 4);
        w.write_bits(dod as u64, 64);
    }
}

fn read_dod(r: &mut BitReader) -> Result<i64, SourceError> {
    if !r.read_bit()? {
        return Ok(0);
    }
    if !r.read_bit()? {
        let v = r.read_bits(7)? as i64 + (-63);
        return Ok(v);
    }
    if !r.read_bit()? {
        let v = r.read_bits(9)? as i64 + (-255);
        return Ok(v);
    }
    if !r.read_bit()? {
        let v = r.read_bits(12)? as i64 + (-2047);
        return Ok(v);
    }
    Ok(r.read_bits(64)? as i64)
}

fn write_value(
    w: &mut BitWriter,
    value_bits: u64,
    prev_value_bits: u64,
    prev_leading: &mut u32,
    prev_trailing: &mut u32,
) {
    let xor = value_bits ^ prev_value_bits;
    if xor == 0 {
        w.write_bit(false);
        return;
    }
    w.write_bit(true);
    let leading = xor.leading_zeros().min(31);
    let trailing = xor.trailing_zeros();
    let meaningful = 64 - leading - trailing;

    if leading >= *prev_leading && trailing >= *prev_trailing && *prev_leading + *prev_trailing > 0 {
        w.write_bit(false);
        let prev_meaningful = 64 - *prev_leading - *prev_trailing;
        w.write_bits(xor >> *prev_trailing, prev_meaningful);
    } else {
        w.write_bit(true);
        w.write_bits(leading as u64, 5);
        w.write_bits((meaningful - 1) as u64, 6);
        w.write_bits(xor >> trailing, meaningful);
        *prev_leading = leading;
        *prev_trailing = trailing;
    }
}

fn read_value(
    r: &mut BitReader,
    prev_value_bits: u64,
    prev_leading: &mut u32,
    prev_trailing: &mut u32,
) -> Result<u64, SourceError> {
    if !r.read_bit()? {
        return Ok(prev_value_bits);
    }
    let (leading, trailing) = if !r.read_bit()? {
        (*prev_leading, *prev_trailing)
    } else {
        let leading = r.read_bits(5)? as u32;
        let meaningful = r.read_bits(6)? as u32 + 1;
        let trailing = 64 - leading - meaningful;
        *prev_leading = leading;
        *prev_trailing = trailing;
        (leading, trailing)
    };
    let meaningful = 64 - leading - trailing;
    let bits = r.read_bits(meaningful)?;
    Ok((bits << trailing) ^ prev_value_bits)
}

/// Reads one chunk's encoded bytes out of its segment file: `len(uvarint)
/// | encoding(1 byte) | data | crc32(4 bytes, unchecked)` at `meta.offset`.
pub async fn read_chunk(block_dir: &Path, meta: &ChunkMeta) -> Result<Chunk, SourceError> {
    let segment_path = block_dir.join("chunks").join(format!("{:06}", meta.segment));
    let mut file = tokio::fs::File::open(&segment_path).await?;
    file.seek(std::io::SeekFrom::Start(meta.offset as u64)).await?;

    let mut len_buf = Vec::new();
    loop {
        let mut byte = [0u8; 1];
        file.read_exact(&mut byte).await?;
        len_buf.push(byte[0]);
        if byte[0] & 0x80 == 0 {
            break;
        }
    }
    let mut pos = 0;
    let len = read_uvarint(&len_buf, &mut pos)? as usize;

    let mut encoding = [0u8; 1];
    file.read_exact(&mut encoding).await?;

    let mut data = vec![0u8; len];
    file.read_exact(&mut data).await?;

    decode(&data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_constant_values() {
        let timestamps = vec![1000, 2000, 3000, 4000];
        let values = vec![1.0, 1.0, 1.0, 1.0];
        let encoded = encode(&timestamps, &values);
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded.timestamps, timestamps);
        assert_eq!(decoded.values, values);
    }

    #[test]
    fn roundtrips_varying_values_and_irregular_deltas() {
        let timestamps = vec![1000, 2015, 2900, 5000, 5001];
        let values = vec![1.5, -2.25, 0.0, 123456.789, f64::MIN_POSITIVE];
        let encoded = encode(&timestamps, &values);
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded.timestamps, timestamps);
        assert_eq!(decoded.values, values);
    }

    #[test]
    fn roundtrips_single_sample() {
        let timestamps = vec![42];
        let values = vec![3.14];
        let encoded = encode(&timestamps, &values);
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded.timestamps, timestamps);
        assert_eq!(decoded.values, values);
    }

    #[test]
    fn roundtrips_large_dod_jump() {
        let timestamps = vec![0, 10, 100_000, 100_010, 5_000_000];
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let encoded = encode(&timestamps, &values);
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded.timestamps, timestamps);
        assert_eq!(decoded.values, values);
    }
}
