//! NumPy `.npy` files
//!
//! Only the subset the result directories use: format version 1.0,
//! little-endian `f64`, C order, one or two dimensions. Files written here
//! load with `numpy.load`, and feature files produced by earlier runs can be
//! read back for regression comparisons.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use log::debug;

use crate::analysis::mfcc::MfccMatrix;
use crate::error::{CompareError, Result};

const MAGIC: &[u8] = b"\x93NUMPY";
const HEADER_ALIGNMENT: usize = 64;

/// Dense `f64` array read from a `.npy` file
#[derive(Debug, Clone, PartialEq)]
pub struct NpyArray {
    pub shape: Vec<usize>,
    /// Values in C order
    pub data: Vec<f64>,
}

impl NpyArray {
    /// Interpret a 2-D array as an MFCC matrix `[n_coefficients x n_frames]`
    pub fn into_mfcc(self) -> Option<MfccMatrix> {
        match self.shape.as_slice() {
            &[n_coefficients, n_frames] => {
                let rows: Vec<Vec<f64>> = if n_frames == 0 {
                    vec![Vec::new(); n_coefficients]
                } else {
                    self.data.chunks(n_frames).map(|r| r.to_vec()).collect()
                };
                Some(MfccMatrix::from_rows(&rows))
            }
            _ => None,
        }
    }
}

/// Write a 1-D array
pub fn write_vector(path: &Path, values: &[f64]) -> Result<()> {
    write_array(path, &[values.len()], values)
}

/// Write an MFCC matrix as a `[n_coefficients x n_frames]` array
pub fn write_mfcc(path: &Path, mfcc: &MfccMatrix) -> Result<()> {
    write_array(path, &[mfcc.n_coefficients(), mfcc.n_frames()], &mfcc.to_row_major())
}

/// Write `data` (C order) with the given shape
pub fn write_array(path: &Path, shape: &[usize], data: &[f64]) -> Result<()> {
    let expected: usize = shape.iter().product();
    if expected != data.len() {
        return Err(CompareError::MalformedFeatureFile {
            path: path.display().to_string(),
            reason: format!("shape {:?} needs {} values, got {}", shape, expected, data.len()),
        });
    }

    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(MAGIC)?;
    writer.write_all(&[1, 0])?;
    let header = header_for(shape);
    writer.write_all(&(header.len() as u16).to_le_bytes())?;
    writer.write_all(header.as_bytes())?;
    for value in data {
        writer.write_all(&value.to_le_bytes())?;
    }
    writer.flush()?;
    debug!("wrote {:?} array to {}", shape, path.display());
    Ok(())
}

/// Read a little-endian `f64` array
///
/// # Errors
/// * `FileNotFound` - If the file does not exist
/// * `MalformedFeatureFile` - If the file is not a supported `.npy` array
pub fn read_array(path: &Path) -> Result<NpyArray> {
    if !path.exists() {
        return Err(CompareError::FileNotFound {
            path: path.display().to_string(),
        });
    }
    let malformed = |reason: String| CompareError::MalformedFeatureFile {
        path: path.display().to_string(),
        reason,
    };

    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;
    if bytes.len() < 10 || &bytes[..6] != MAGIC {
        return Err(malformed("missing NUMPY magic".to_string()));
    }
    let (header_len_size, header_start) = match bytes[6] {
        1 => (2, 10),
        2 | 3 => (4, 12),
        v => return Err(malformed(format!("unsupported format version {}", v))),
    };
    if bytes.len() < header_start {
        return Err(malformed("truncated header".to_string()));
    }
    let header_len = if header_len_size == 2 {
        u16::from_le_bytes([bytes[8], bytes[9]]) as usize
    } else {
        u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize
    };
    let data_start = header_start + header_len;
    let header = bytes
        .get(header_start..data_start)
        .and_then(|h| std::str::from_utf8(h).ok())
        .ok_or_else(|| malformed("unreadable header".to_string()))?;

    let descr = dict_value(header, "descr").ok_or_else(|| malformed("no descr".to_string()))?;
    if descr.trim_matches(|c| c == '\'' || c == '"') != "<f8" {
        return Err(malformed(format!("unsupported dtype {}", descr)));
    }
    let fortran = dict_value(header, "fortran_order")
        .ok_or_else(|| malformed("no fortran_order".to_string()))?;
    if fortran != "False" {
        return Err(malformed("Fortran-ordered arrays are not supported".to_string()));
    }
    let shape = parse_shape(header).ok_or_else(|| malformed("unreadable shape".to_string()))?;

    let count = shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| malformed(format!("shape {:?} overflows", shape)))?;
    let byte_count = count
        .checked_mul(8)
        .ok_or_else(|| malformed(format!("shape {:?} overflows", shape)))?;
    let payload = &bytes[data_start..];
    if payload.len() != byte_count {
        return Err(malformed(format!(
            "expected {} values, found {} bytes",
            count,
            payload.len()
        )));
    }
    let data = payload
        .chunks_exact(8)
        .map(|chunk| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            f64::from_le_bytes(raw)
        })
        .collect();

    Ok(NpyArray { shape, data })
}

/// Read an MFCC matrix written by `write_mfcc`
pub fn read_mfcc(path: &Path) -> Result<MfccMatrix> {
    let array = read_array(path)?;
    let shape = array.shape.clone();
    array
        .into_mfcc()
        .ok_or_else(|| CompareError::MalformedFeatureFile {
            path: path.display().to_string(),
            reason: format!("expected a 2-D array, got shape {:?}", shape),
        })
}

fn header_for(shape: &[usize]) -> String {
    let dims = match shape {
        [n] => format!("({},)", n),
        _ => format!(
            "({})",
            shape.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", ")
        ),
    };
    let mut header = format!(
        "{{'descr': '<f8', 'fortran_order': False, 'shape': {}, }}",
        dims
    );
    // magic + version + length field + header + newline
    let unpadded = MAGIC.len() + 2 + 2 + header.len() + 1;
    let padding = (HEADER_ALIGNMENT - unpadded % HEADER_ALIGNMENT) % HEADER_ALIGNMENT;
    header.extend(std::iter::repeat(' ').take(padding));
    header.push('\n');
    header
}

/// Raw value of `key` in the header dictionary, up to the next top-level comma
fn dict_value<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    let quoted = format!("'{}'", key);
    let after_key = &header[header.find(&quoted)? + quoted.len()..];
    let value = after_key.trim_start().strip_prefix(':')?.trim_start();
    let end = value.find([',', '}'])?;
    Some(value[..end].trim())
}

fn parse_shape(header: &str) -> Option<Vec<usize>> {
    let after_key = &header[header.find("'shape'")? + "'shape'".len()..];
    let open = after_key.find('(')?;
    let close = after_key[open..].find(')')? + open;
    after_key[open + 1..close]
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(|d| d.parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_header_is_aligned() {
        for shape in [vec![0], vec![7], vec![20, 32], vec![123456, 2]] {
            let header = header_for(&shape);
            assert_eq!((10 + header.len()) % 64, 0);
            assert!(header.ends_with('\n'));
        }
        assert!(header_for(&[5]).contains("'shape': (5,)"));
        assert!(header_for(&[20, 32]).contains("'shape': (20, 32)"));
    }

    #[test]
    fn test_vector_file_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("diff.npy");
        write_vector(&path, &[1.0, -2.5]).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..8], b"\x93NUMPY\x01\x00");
        assert_eq!(bytes.len(), 64 + 16);
        assert_eq!(&bytes[64..72], &1.0f64.to_le_bytes());

        let array = read_array(&path).unwrap();
        assert_eq!(array.shape, vec![2]);
        assert_eq!(array.data, vec![1.0, -2.5]);
    }

    #[test]
    fn test_mfcc_matrix_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mfcc.npy");
        let mfcc = MfccMatrix::from_rows(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
        write_mfcc(&path, &mfcc).unwrap();

        let array = read_array(&path).unwrap();
        assert_eq!(array.shape, vec![2, 3]);
        assert_eq!(array.data, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(read_mfcc(&path).unwrap(), mfcc);
    }

    #[test]
    fn test_reads_header_without_trailing_comma() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("np.npy");
        let mut header = String::from("{'descr': '<f8', 'fortran_order': False, 'shape': (3,)}");
        while (10 + header.len() + 1) % 64 != 0 {
            header.push(' ');
        }
        header.push('\n');
        let mut bytes = b"\x93NUMPY\x01\x00".to_vec();
        bytes.extend((header.len() as u16).to_le_bytes());
        bytes.extend(header.as_bytes());
        for v in [0.5f64, 1.5, 2.5] {
            bytes.extend(v.to_le_bytes());
        }
        std::fs::write(&path, bytes).unwrap();

        let array = read_array(&path).unwrap();
        assert_eq!(array.shape, vec![3]);
        assert_eq!(array.data, vec![0.5, 1.5, 2.5]);
    }

    #[test]
    fn test_rejects_other_dtypes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f4.npy");
        let mut header = String::from("{'descr': '<f4', 'fortran_order': False, 'shape': (1,), }");
        while (10 + header.len() + 1) % 64 != 0 {
            header.push(' ');
        }
        header.push('\n');
        let mut bytes = b"\x93NUMPY\x01\x00".to_vec();
        bytes.extend((header.len() as u16).to_le_bytes());
        bytes.extend(header.as_bytes());
        bytes.extend(1.0f32.to_le_bytes());
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(
            read_array(&path),
            Err(CompareError::MalformedFeatureFile { .. })
        ));
    }

    #[test]
    fn test_rejects_overflowing_shape() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("huge.npy");
        let mut header = String::from(
            "{'descr': '<f8', 'fortran_order': False, 'shape': (4294967296, 4294967296), }",
        );
        while (10 + header.len() + 1) % 64 != 0 {
            header.push(' ');
        }
        header.push('\n');
        let mut bytes = b"\x93NUMPY\x01\x00".to_vec();
        bytes.extend((header.len() as u16).to_le_bytes());
        bytes.extend(header.as_bytes());
        bytes.extend(1.0f64.to_le_bytes());
        std::fs::write(&path, bytes).unwrap();

        match read_array(&path) {
            Err(CompareError::MalformedFeatureFile { reason, .. }) => {
                assert!(reason.contains("overflows"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_shape_mismatch_on_write() {
        let dir = tempdir().unwrap();
        let result = write_array(&dir.path().join("bad.npy"), &[2, 2], &[1.0]);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            read_array(Path::new("/nonexistent/file.npy")),
            Err(CompareError::FileNotFound { .. })
        ));
    }
}
