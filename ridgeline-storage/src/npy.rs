//! # NumPy `.npy` Matrix Files
//!
//! The feature extraction step saves its N×D matrix with `numpy.save`, so the
//! rebuild input is read in that format.
//!
//! ## Layout
//!
//! ```text
//! magic: [u8; 6] = "\x93NUMPY"
//! major: u8 | minor: u8
//! header_len: u16 (v1) or u32 (v2, v3), little endian
//! header: Python dict literal, space padded, newline terminated
//!         {'descr': '<f8', 'fortran_order': False, 'shape': (N, D), }
//! data: N * D values, C order
//! ```
//!
//! Supported: little-endian `f8` and `f4`, C order, 2-D (plus the 1-D empty
//! array `(0,)`, read as an empty matrix).

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use ridgeline_core::error::{Error, Result};
use ridgeline_core::Matrix;

const NPY_MAGIC: &[u8; 6] = b"\x93NUMPY";
const HEADER_ALIGN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dtype {
    F8,
    F4,
}

#[derive(Debug, PartialEq)]
struct Header {
    dtype: Dtype,
    rows: usize,
    dim: usize,
}

fn malformed(message: impl Into<String>) -> Error {
    Error::MalformedDataset { message: message.into() }
}

/// Read a 2-D float matrix, widening `f4` to `f64`
pub fn read_npy<R: Read>(mut input: R) -> Result<Matrix<f64>> {
    let truncated = |e: std::io::Error| malformed(format!("truncated npy file: {}", e));

    let mut magic = [0u8; 6];
    input.read_exact(&mut magic).map_err(truncated)?;
    if &magic != NPY_MAGIC {
        return Err(malformed("not an npy file (bad magic)"));
    }

    let major = input.read_u8().map_err(truncated)?;
    let _minor = input.read_u8().map_err(truncated)?;
    let header_len = match major {
        1 => input.read_u16::<LittleEndian>().map_err(truncated)? as usize,
        2 | 3 => input.read_u32::<LittleEndian>().map_err(truncated)? as usize,
        v => return Err(malformed(format!("unsupported npy format version {}", v))),
    };

    let mut raw_header = vec![0u8; header_len];
    input.read_exact(&mut raw_header).map_err(truncated)?;
    let text = std::str::from_utf8(&raw_header)
        .map_err(|_| malformed("npy header is not valid text"))?;
    let header = parse_header(text)?;

    let total = header
        .rows
        .checked_mul(header.dim)
        .ok_or_else(|| malformed("npy shape overflows"))?;
    let mut data = vec![0f64; total];
    match header.dtype {
        Dtype::F8 => input
            .read_f64_into::<LittleEndian>(&mut data)
            .map_err(truncated)?,
        Dtype::F4 => {
            let mut narrow = vec![0f32; total];
            input
                .read_f32_into::<LittleEndian>(&mut narrow)
                .map_err(truncated)?;
            for (dst, src) in data.iter_mut().zip(narrow) {
                *dst = src as f64;
            }
        }
    }

    Matrix::from_flat(data, header.rows, header.dim)
}

/// Write `matrix` as a version 1.0 `<f8` C-order array
pub fn write_npy<W: Write>(mut out: W, matrix: &Matrix<f64>) -> Result<()> {
    let dict = format!(
        "{{'descr': '<f8', 'fortran_order': False, 'shape': ({}, {}), }}",
        matrix.rows(),
        matrix.dim()
    );
    // magic + version + u16 length + dict + '\n', padded to the alignment
    let unpadded = NPY_MAGIC.len() + 2 + 2 + dict.len() + 1;
    let padding = (HEADER_ALIGN - unpadded % HEADER_ALIGN) % HEADER_ALIGN;
    let header_len = dict.len() + padding + 1;
    let header_len = u16::try_from(header_len).map_err(|_| malformed("npy header too long"))?;

    out.write_all(NPY_MAGIC)?;
    out.write_u8(1)?;
    out.write_u8(0)?;
    out.write_u16::<LittleEndian>(header_len)?;
    out.write_all(dict.as_bytes())?;
    out.write_all(&vec![b' '; padding])?;
    out.write_all(b"\n")?;

    for &v in matrix.as_slice() {
        out.write_f64::<LittleEndian>(v)?;
    }
    out.flush()?;
    Ok(())
}

pub fn read_npy_file(path: &Path) -> Result<Matrix<f64>> {
    let file = File::open(path)?;
    read_npy(BufReader::new(file))
}

pub fn write_npy_file(path: &Path, matrix: &Matrix<f64>) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_npy(&mut writer, matrix)?;
    writer.get_ref().sync_all()?;
    Ok(())
}

fn parse_header(text: &str) -> Result<Header> {
    let descr = dict_value(text, "descr")?
        .split(',')
        .next()
        .unwrap_or("")
        .trim()
        .trim_matches(|c| c == '\'' || c == '"');
    let dtype = match descr {
        "<f8" => Dtype::F8,
        "<f4" => Dtype::F4,
        other => return Err(malformed(format!("unsupported npy dtype {}", other))),
    };

    if dict_value(text, "fortran_order")?.starts_with("True") {
        return Err(malformed("Fortran-order npy arrays are not supported"));
    }

    let shape = dict_value(text, "shape")?;
    let inner = shape
        .strip_prefix('(')
        .and_then(|s| s.split_once(')'))
        .map(|(inner, _)| inner)
        .ok_or_else(|| malformed(format!("bad npy shape {}", shape)))?;
    let dims = inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>().map_err(|_| malformed(format!("bad npy shape {}", shape))))
        .collect::<Result<Vec<_>>>()?;

    let (rows, dim) = match dims.as_slice() {
        [rows, dim] => (*rows, *dim),
        [0] => (0, 0),
        _ => {
            return Err(malformed(format!(
                "expected a 2-D matrix, got shape with {} dimensions",
                dims.len()
            )))
        }
    };

    Ok(Header { dtype, rows, dim })
}

/// Text following `'key':` in the header dict, up to the end of the dict
fn dict_value<'a>(text: &'a str, key: &str) -> Result<&'a str> {
    let quoted = format!("'{}'", key);
    let start = text
        .find(&quoted)
        .ok_or_else(|| malformed(format!("npy header has no '{}' entry", key)))?;
    let rest = &text[start + quoted.len()..];
    let rest = rest
        .trim_start()
        .strip_prefix(':')
        .ok_or_else(|| malformed(format!("npy header entry '{}' has no value", key)))?;
    Ok(rest.trim_start())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_npy(version: u8, dict: &str, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(NPY_MAGIC);
        buf.push(version);
        buf.push(0);
        let header = format!("{}\n", dict);
        if version == 1 {
            buf.extend_from_slice(&(header.len() as u16).to_le_bytes());
        } else {
            buf.extend_from_slice(&(header.len() as u32).to_le_bytes());
        }
        buf.extend_from_slice(header.as_bytes());
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn test_header_is_aligned() {
        let m = Matrix::from_rows(&[vec![1.0, 2.0, 3.0]]).unwrap();
        let mut buf = Vec::new();
        write_npy(&mut buf, &m).unwrap();
        assert_eq!((buf.len() - 3 * 8) % HEADER_ALIGN, 0);
        assert_eq!(read_npy(&buf[..]).unwrap(), m);
    }

    #[test]
    fn test_read_f4_v2() {
        let payload: Vec<u8> = [0.5f32, 1.5, -2.0, 4.0]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let bytes = raw_npy(
            2,
            "{'descr': '<f4', 'fortran_order': False, 'shape': (2, 2), }",
            &payload,
        );
        let m = read_npy(&bytes[..]).unwrap();
        assert_eq!(m.rows(), 2);
        assert_eq!(m.row(1), &[-2.0, 4.0]);
    }

    #[test]
    fn test_rejects_unsupported() {
        let big_endian = raw_npy(1, "{'descr': '>f8', 'fortran_order': False, 'shape': (1, 1), }", &[0; 8]);
        assert!(read_npy(&big_endian[..]).is_err());

        let fortran = raw_npy(1, "{'descr': '<f8', 'fortran_order': True, 'shape': (1, 1), }", &[0; 8]);
        assert!(read_npy(&fortran[..]).is_err());

        let three_d = raw_npy(1, "{'descr': '<f8', 'fortran_order': False, 'shape': (1, 1, 1), }", &[0; 8]);
        assert!(matches!(read_npy(&three_d[..]), Err(Error::MalformedDataset { .. })));

        assert!(read_npy(&b"PK\x03\x04 not numpy"[..]).is_err());
    }

    #[test]
    fn test_empty_arrays() {
        let one_d = raw_npy(1, "{'descr': '<f8', 'fortran_order': False, 'shape': (0,), }", &[]);
        assert!(read_npy(&one_d[..]).unwrap().is_empty());

        let zero_rows = raw_npy(1, "{'descr': '<f8', 'fortran_order': False, 'shape': (0, 5), }", &[]);
        let m = read_npy(&zero_rows[..]).unwrap();
        assert!(m.is_empty());
        assert_eq!(m.dim(), 5);
    }

    #[test]
    fn test_truncated_payload() {
        let bytes = raw_npy(1, "{'descr': '<f8', 'fortran_order': False, 'shape': (2, 2), }", &[0; 20]);
        assert!(matches!(read_npy(&bytes[..]), Err(Error::MalformedDataset { .. })));
    }
}
