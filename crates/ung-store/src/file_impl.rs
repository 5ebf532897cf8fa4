//! `vecs.bin` and `labels.txt`.
//!
//! `vecs.bin`: `u32 num_points`, `u32 dim`, then `num_points * dim` f32,
//! all little-endian. `labels.txt`: one comma separated line per vector.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use ung_core::error::IoResultExt;
use ung_core::label::{parse_label_line, LabelSet};
use ung_core::{Result, UngError};

const HEADER_LEN: usize = 8;

pub(crate) fn write_vecs(path: &Path, num_points: usize, dim: usize, data: &[f32]) -> Result<()> {
    let file = File::create(path).with_path(path)?;
    let mut w = BufWriter::new(file);
    let header = |v: usize| {
        u32::try_from(v).map_err(|_| UngError::InvalidConfig(format!("{v} does not fit vecs.bin")))
    };
    w.write_u32::<LittleEndian>(header(num_points)?)
        .with_path(path)?;
    w.write_u32::<LittleEndian>(header(dim)?).with_path(path)?;
    let mut buf = vec![0u8; data.len() * 4];
    LittleEndian::write_f32_into(data, &mut buf);
    w.write_all(&buf).with_path(path)?;
    w.flush().with_path(path)
}

pub(crate) fn read_vecs(path: &Path) -> Result<(usize, usize, Vec<f32>)> {
    let file = File::open(path).with_path(path)?;

    #[cfg(feature = "mmap")]
    // SAFETY: the index directory is not modified while it is being loaded.
    let bytes = unsafe { memmap2::Mmap::map(&file) }.with_path(path)?;
    #[cfg(not(feature = "mmap"))]
    let bytes = {
        use std::io::Read;
        let mut buf = Vec::new();
        let mut file = file;
        file.read_to_end(&mut buf).with_path(path)?;
        buf
    };

    if bytes.len() < HEADER_LEN {
        return Err(UngError::corrupt(path, "missing header"));
    }
    let num_points = LittleEndian::read_u32(&bytes[0..4]) as usize;
    let dim = LittleEndian::read_u32(&bytes[4..8]) as usize;
    if dim == 0 {
        return Err(UngError::corrupt(path, "zero dimension"));
    }
    let expected = num_points
        .checked_mul(dim)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| UngError::corrupt(path, "header overflows"))?;
    let body = &bytes[HEADER_LEN..];
    if body.len() != expected {
        return Err(UngError::corrupt(
            path,
            format!("expected {expected} payload bytes, found {}", body.len()),
        ));
    }
    let mut data = vec![0f32; num_points * dim];
    LittleEndian::read_f32_into(body, &mut data);
    Ok((num_points, dim, data))
}

pub(crate) fn write_labels(path: &Path, labels: &[LabelSet]) -> Result<()> {
    let file = File::create(path).with_path(path)?;
    let mut w = BufWriter::new(file);
    for set in labels {
        let mut first = true;
        for label in set {
            if !first {
                w.write_all(b",").with_path(path)?;
            }
            write!(w, "{label}").with_path(path)?;
            first = false;
        }
        w.write_all(b"\n").with_path(path)?;
    }
    w.flush().with_path(path)
}

pub(crate) fn read_labels(path: &Path) -> Result<Vec<LabelSet>> {
    let file = File::open(path).with_path(path)?;
    let reader = BufReader::new(file);
    let mut out = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_path(path)?;
        let set = parse_label_line(&line).ok_or_else(|| {
            UngError::corrupt(path, format!("bad label line {}: '{line}'", line_no + 1))
        })?;
        out.push(set);
    }
    Ok(out)
}
