//! Compression format detection and codec dispatch (§4.4), shared by every
//! format's metadata-file handling. Grounded on
//! `original_source/plugins/rpm/parsers.py::_decompress_metadata` (extension
//! then magic-byte detection) and the teacher's `flate2`/`xz2`/`zstd`/`bzip2`
//! dependency set.

use std::io::Read;

use crate::error::{ChantalError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Gzip,
    Xz,
    Zstd,
    Bzip2,
    None,
}

impl Codec {
    /// Detects by filename extension first, falling back to magic bytes.
    pub fn detect(filename: &str, content: &[u8]) -> Result<Self> {
        if filename.ends_with(".gz") {
            return Ok(Codec::Gzip);
        }
        if filename.ends_with(".xz") {
            return Ok(Codec::Xz);
        }
        if filename.ends_with(".zst") {
            return Ok(Codec::Zstd);
        }
        if filename.ends_with(".bz2") {
            return Ok(Codec::Bzip2);
        }
        Self::detect_magic(content).ok_or_else(|| ChantalError::Parse {
            what: filename.to_string(),
            reason: "unknown compression format".to_string(),
        })
    }

    fn detect_magic(content: &[u8]) -> Option<Self> {
        if content.starts_with(&[0x1f, 0x8b]) {
            return Some(Codec::Gzip);
        }
        if content.starts_with(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00]) {
            return Some(Codec::Xz);
        }
        if content.starts_with(&[0x28, 0xb5, 0x2f, 0xfd]) {
            return Some(Codec::Zstd);
        }
        if content.starts_with(b"BZh") {
            return Some(Codec::Bzip2);
        }
        Some(Codec::None)
    }

    pub fn extension(self) -> &'static str {
        match self {
            Codec::Gzip => "gz",
            Codec::Xz => "xz",
            Codec::Zstd => "zst",
            Codec::Bzip2 => "bz2",
            Codec::None => "",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "gzip" | "gz" => Some(Codec::Gzip),
            "xz" => Some(Codec::Xz),
            "zstandard" | "zstd" => Some(Codec::Zstd),
            "bzip2" | "bz2" => Some(Codec::Bzip2),
            "none" => Some(Codec::None),
            _ => None,
        }
    }
}

/// Decompresses `content`, whose format is given by `filename`'s extension
/// or, failing that, its magic bytes.
pub fn decompress(filename: &str, content: &[u8]) -> Result<Vec<u8>> {
    let codec = Codec::detect(filename, content)?;
    decompress_with(codec, content)
}

pub fn decompress_with(codec: Codec, content: &[u8]) -> Result<Vec<u8>> {
    let err = |e: std::io::Error| ChantalError::Parse {
        what: "compressed metadata".to_string(),
        reason: e.to_string(),
    };
    match codec {
        Codec::Gzip => {
            let mut out = Vec::new();
            flate2::read::GzDecoder::new(content)
                .read_to_end(&mut out)
                .map_err(err)?;
            Ok(out)
        }
        Codec::Xz => {
            let mut out = Vec::new();
            xz2::read::XzDecoder::new(content).read_to_end(&mut out).map_err(err)?;
            Ok(out)
        }
        Codec::Zstd => zstd::stream::decode_all(content).map_err(err),
        Codec::Bzip2 => {
            let mut out = Vec::new();
            bzip2::read::BzDecoder::new(content)
                .read_to_end(&mut out)
                .map_err(err)?;
            Ok(out)
        }
        Codec::None => Ok(content.to_vec()),
    }
}

/// Compresses `content` with `codec`, used by the publisher when
/// regenerating metadata (§4.8.1 `Compression for regenerated files`).
pub fn compress_with(codec: Codec, content: &[u8]) -> Result<Vec<u8>> {
    use std::io::Write;
    let err = |e: std::io::Error| ChantalError::Integrity(e.to_string());
    match codec {
        Codec::Gzip => {
            let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(content).map_err(err)?;
            encoder.finish().map_err(err)
        }
        Codec::Xz => {
            let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
            encoder.write_all(content).map_err(err)?;
            encoder.finish().map_err(err)
        }
        Codec::Zstd => zstd::stream::encode_all(content, 3).map_err(err),
        Codec::Bzip2 => {
            let mut encoder =
                bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
            encoder.write_all(content).map_err(err)?;
            encoder.finish().map_err(err)
        }
        Codec::None => Ok(content.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_gzip_by_extension() {
        assert_eq!(Codec::detect("primary.xml.gz", &[]).unwrap(), Codec::Gzip);
    }

    #[test]
    fn detects_xz_by_magic_when_extension_unknown() {
        let magic = [0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00, 0x00];
        assert_eq!(Codec::detect("blob", &magic).unwrap(), Codec::Xz);
    }

    #[test]
    fn round_trips_gzip() {
        let content = b"hello metadata";
        let compressed = compress_with(Codec::Gzip, content).unwrap();
        let decompressed = decompress_with(Codec::Gzip, &compressed).unwrap();
        assert_eq!(decompressed, content);
    }

    #[test]
    fn round_trips_zstd() {
        let content = b"hello metadata";
        let compressed = compress_with(Codec::Zstd, content).unwrap();
        let decompressed = decompress_with(Codec::Zstd, &compressed).unwrap();
        assert_eq!(decompressed, content);
    }
}
