//! Length-prefixed little-endian encodings for index tables.
//!
//! Every table is a `u64` element count followed by the elements. Nested
//! tables repeat the scheme per row.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use roaring::RoaringBitmap;
use ung_core::error::IoResultExt;
use ung_core::{Result, UngError};

/// Upper bound on speculative allocation from an untrusted length prefix.
const MAX_PREALLOC: usize = 1 << 20;

fn create(path: &Path) -> Result<BufWriter<File>> {
    Ok(BufWriter::new(File::create(path).with_path(path)?))
}

fn open(path: &Path) -> Result<BufReader<File>> {
    Ok(BufReader::new(File::open(path).with_path(path)?))
}

fn read_len<R: Read>(r: &mut R, path: &Path) -> Result<usize> {
    let len = r.read_u64::<LittleEndian>().with_path(path)?;
    usize::try_from(len).map_err(|_| UngError::corrupt(path, format!("length {len} overflows")))
}

fn expect_eof<R: Read>(r: &mut R, path: &Path) -> Result<()> {
    let mut trailing = [0u8; 1];
    match r.read(&mut trailing).with_path(path)? {
        0 => Ok(()),
        _ => Err(UngError::corrupt(path, "trailing bytes")),
    }
}

fn write_u32_slice<W: Write>(w: &mut W, values: &[u32]) -> std::io::Result<()> {
    w.write_u64::<LittleEndian>(values.len() as u64)?;
    for &v in values {
        w.write_u32::<LittleEndian>(v)?;
    }
    Ok(())
}

fn read_u32_row<R: Read>(r: &mut R, path: &Path) -> Result<Vec<u32>> {
    let len = read_len(r, path)?;
    let mut row = Vec::with_capacity(len.min(MAX_PREALLOC));
    for _ in 0..len {
        row.push(r.read_u32::<LittleEndian>().with_path(path)?);
    }
    Ok(row)
}

pub fn write_u32_vec(path: &Path, values: &[u32]) -> Result<()> {
    let mut w = create(path)?;
    write_u32_slice(&mut w, values).with_path(path)?;
    w.flush().with_path(path)
}

pub fn read_u32_vec(path: &Path) -> Result<Vec<u32>> {
    let mut r = open(path)?;
    let row = read_u32_row(&mut r, path)?;
    expect_eof(&mut r, path)?;
    Ok(row)
}

pub fn write_f64_vec(path: &Path, values: &[f64]) -> Result<()> {
    let mut w = create(path)?;
    w.write_u64::<LittleEndian>(values.len() as u64)
        .with_path(path)?;
    for &v in values {
        w.write_f64::<LittleEndian>(v).with_path(path)?;
    }
    w.flush().with_path(path)
}

pub fn read_f64_vec(path: &Path) -> Result<Vec<f64>> {
    let mut r = open(path)?;
    let len = read_len(&mut r, path)?;
    let mut out = Vec::with_capacity(len.min(MAX_PREALLOC));
    for _ in 0..len {
        out.push(r.read_f64::<LittleEndian>().with_path(path)?);
    }
    expect_eof(&mut r, path)?;
    Ok(out)
}

pub fn write_u32_table<T: AsRef<[u32]>>(path: &Path, rows: &[T]) -> Result<()> {
    let mut w = create(path)?;
    w.write_u64::<LittleEndian>(rows.len() as u64)
        .with_path(path)?;
    for row in rows {
        write_u32_slice(&mut w, row.as_ref()).with_path(path)?;
    }
    w.flush().with_path(path)
}

pub fn read_u32_table(path: &Path) -> Result<Vec<Vec<u32>>> {
    let mut r = open(path)?;
    let len = read_len(&mut r, path)?;
    let mut out = Vec::with_capacity(len.min(MAX_PREALLOC));
    for _ in 0..len {
        out.push(read_u32_row(&mut r, path)?);
    }
    expect_eof(&mut r, path)?;
    Ok(out)
}

pub fn write_pairs(path: &Path, pairs: &[(u32, u32)]) -> Result<()> {
    let mut w = create(path)?;
    w.write_u64::<LittleEndian>(pairs.len() as u64)
        .with_path(path)?;
    for &(a, b) in pairs {
        w.write_u32::<LittleEndian>(a).with_path(path)?;
        w.write_u32::<LittleEndian>(b).with_path(path)?;
    }
    w.flush().with_path(path)
}

pub fn read_pairs(path: &Path) -> Result<Vec<(u32, u32)>> {
    let mut r = open(path)?;
    let len = read_len(&mut r, path)?;
    let mut out = Vec::with_capacity(len.min(MAX_PREALLOC));
    for _ in 0..len {
        let a = r.read_u32::<LittleEndian>().with_path(path)?;
        let b = r.read_u32::<LittleEndian>().with_path(path)?;
        out.push((a, b));
    }
    expect_eof(&mut r, path)?;
    Ok(out)
}

/// Single signed value, used for optional ids (`-1` means none).
pub fn write_one_i64(path: &Path, value: i64) -> Result<()> {
    let mut w = create(path)?;
    w.write_i64::<LittleEndian>(value).with_path(path)?;
    w.flush().with_path(path)
}

pub fn read_one_i64(path: &Path) -> Result<i64> {
    let mut r = open(path)?;
    let v = r.read_i64::<LittleEndian>().with_path(path)?;
    expect_eof(&mut r, path)?;
    Ok(v)
}

/// Text `key=value` lines, sorted by key.
pub fn write_kv_file(path: &Path, entries: &BTreeMap<String, String>) -> Result<()> {
    let mut w = create(path)?;
    for (k, v) in entries {
        writeln!(w, "{k}={v}").with_path(path)?;
    }
    w.flush().with_path(path)
}

pub fn read_kv_file(path: &Path) -> Result<BTreeMap<String, String>> {
    let r = open(path)?;
    let mut out = BTreeMap::new();
    for line in r.lines() {
        let line = line.with_path(path)?;
        if line.trim().is_empty() {
            continue;
        }
        let (k, v) = line
            .split_once('=')
            .ok_or_else(|| UngError::corrupt(path, format!("bad meta line '{line}'")))?;
        out.insert(k.to_string(), v.to_string());
    }
    Ok(out)
}

/// `u64` count, then per bitmap a `u64` byte length and the portable roaring encoding.
pub fn write_roaring_vec(path: &Path, bitmaps: &[RoaringBitmap]) -> Result<()> {
    let mut w = create(path)?;
    w.write_u64::<LittleEndian>(bitmaps.len() as u64)
        .with_path(path)?;
    let mut buf = Vec::new();
    for bitmap in bitmaps {
        buf.clear();
        bitmap.serialize_into(&mut buf).with_path(path)?;
        w.write_u64::<LittleEndian>(buf.len() as u64)
            .with_path(path)?;
        w.write_all(&buf).with_path(path)?;
    }
    w.flush().with_path(path)
}

pub fn read_roaring_vec(path: &Path) -> Result<Vec<RoaringBitmap>> {
    let mut r = open(path)?;
    let len = read_len(&mut r, path)?;
    let mut out = Vec::with_capacity(len.min(MAX_PREALLOC));
    let mut buf = Vec::new();
    for i in 0..len {
        let n = read_len(&mut r, path)?;
        buf.clear();
        (&mut r).take(n as u64).read_to_end(&mut buf).with_path(path)?;
        if buf.len() != n {
            return Err(UngError::corrupt(path, "truncated file"));
        }
        let bitmap = RoaringBitmap::deserialize_from(&buf[..])
            .map_err(|e| UngError::corrupt(path, format!("bitmap {i}: {e}")))?;
        out.push(bitmap);
    }
    expect_eof(&mut r, path)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_tables_round_trip() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("t");

        write_u32_table(&p, &[vec![], vec![3, 1], vec![7]]).unwrap();
        assert_eq!(read_u32_table(&p).unwrap(), vec![vec![], vec![3, 1], vec![7]]);

        write_pairs(&p, &[(0, 4), (4, 9)]).unwrap();
        assert_eq!(read_pairs(&p).unwrap(), vec![(0, 4), (4, 9)]);

        write_one_i64(&p, -1).unwrap();
        assert_eq!(read_one_i64(&p).unwrap(), -1);

        write_f64_vec(&p, &[0.0, 0.5, 1.0]).unwrap();
        assert_eq!(read_f64_vec(&p).unwrap(), vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_truncated_table_is_corrupt() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("ids");
        write_u32_vec(&p, &[1, 2, 3, 4]).unwrap();
        let bytes = std::fs::read(&p).unwrap();
        std::fs::write(&p, &bytes[..bytes.len() - 2]).unwrap();
        assert!(matches!(read_u32_vec(&p), Err(UngError::Corrupt { .. })));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("absent");
        match read_u32_vec(&p) {
            Err(UngError::Io { path, .. }) => assert_eq!(path, p),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_kv_and_roaring() {
        let dir = tempdir().unwrap();
        let meta = dir.path().join("meta");
        let mut kv = BTreeMap::new();
        kv.insert("num_points".to_string(), "6".to_string());
        kv.insert("alpha".to_string(), "1.2".to_string());
        write_kv_file(&meta, &kv).unwrap();
        assert_eq!(read_kv_file(&meta).unwrap(), kv);

        let rb = dir.path().join("rb.bin");
        let bitmaps: Vec<RoaringBitmap> = vec![
            RoaringBitmap::new(),
            (0..10).collect(),
            [3u32, 70_000].into_iter().collect(),
        ];
        write_roaring_vec(&rb, &bitmaps).unwrap();
        assert_eq!(read_roaring_vec(&rb).unwrap(), bitmaps);
    }
}
