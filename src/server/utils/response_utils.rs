use std::io::{Read, Write};

use flate2::{Compression, read::GzDecoder, write::GzEncoder};

use super::content_type_utils::ResourceKind;

pub const NO_CACHE: &str = "no-cache, no-store, must-revalidate";
pub const CORS_ALLOW_METHODS: &str = "GET, OPTIONS";
pub const CORS_ALLOW_HEADERS: &str = "*";
pub const CORS_MAX_AGE: &str = "86400";

/// Supported compression encodings
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContentEncoding {
    Zstd,
    Gzip,
    None,
}

impl ContentEncoding {
    /// pick what to send the player based on its Accept-Encoding. zstd wins over gzip, and a
    /// coding listed with `q=0` is a refusal, not a preference
    pub fn from_accept_encoding(accept_encoding: Option<&str>) -> Self {
        let Some(accept_encoding) = accept_encoding else {
            return Self::None;
        };

        let accepts = |coding: &str| {
            accept_encoding
                .split(',')
                .filter_map(parse_coding)
                .any(|(name, quality)| name.eq_ignore_ascii_case(coding) && quality > 0.0)
        };

        if accepts("zstd") {
            Self::Zstd
        } else if accepts("gzip") {
            Self::Gzip
        } else {
            Self::None
        }
    }

    /// the upstream's Content-Encoding, anything we can't undo is treated as plain bytes
    pub fn from_content_encoding(content_encoding: Option<&str>) -> Self {
        match content_encoding.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("zstd") => Self::Zstd,
            Some("gzip") | Some("x-gzip") => Self::Gzip,
            _ => Self::None,
        }
    }

    pub fn as_header_value(&self) -> Option<&'static str> {
        match self {
            Self::Zstd => Some("zstd"),
            Self::Gzip => Some("gzip"),
            Self::None => None,
        }
    }

    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
        match self {
            Self::Zstd => zstd::encode_all(data, 3),
            Self::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(data)?;
                encoder.finish()
            }
            Self::None => Ok(data.to_vec()),
        }
    }

    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
        match self {
            Self::Zstd => zstd::decode_all(data),
            Self::Gzip => {
                let mut decoder = GzDecoder::new(data);
                let mut decompressed = Vec::new();
                decoder.read_to_end(&mut decompressed)?;
                Ok(decompressed)
            }
            Self::None => Ok(data.to_vec()),
        }
    }
}

/// Cache-Control for a relayed resource. `None` means whatever the upstream said (if anything)
/// one `coding;q=x` item of an Accept-Encoding list. a missing q means 1, an unparsable one 0
fn parse_coding(item: &str) -> Option<(&str, f32)> {
    let mut parts = item.split(';');
    let name = parts.next()?.trim();
    if name.is_empty() {
        return None;
    }

    let quality = parts
        .filter_map(|param| param.trim().split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("q"))
        .map(|(_, value)| value.trim().parse::<f32>().unwrap_or(0.0))
        .unwrap_or(1.0);

    Some((name, quality))
}

pub fn cache_control_for(kind: ResourceKind, segment_max_age_secs: u64) -> Option<String> {
    match kind {
        ResourceKind::Playlist | ResourceKind::Key => Some(NO_CACHE.to_string()),
        ResourceKind::Segment => Some(format!("public, max-age={}", segment_max_age_secs)),
        ResourceKind::Other => None,
    }
}

/// a satisfiable `bytes=start-end` range over a body of `total_len` bytes, inclusive bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: usize,
    pub end: usize,
}

impl ByteRange {
    /// single ranges only, suffix ranges (`bytes=-500`) included. anything else is ignored and
    /// the full body goes out
    pub fn parse(header: &str, total_len: usize) -> Option<Self> {
        if total_len == 0 {
            return None;
        }
        let last = total_len - 1;

        let ranges = header.trim().strip_prefix("bytes=")?;
        if ranges.contains(',') {
            return None;
        }
        let (start, end) = ranges.split_once('-')?;
        let (start, end) = (start.trim(), end.trim());

        let (start, end) = if start.is_empty() {
            let suffix: usize = end.parse().ok()?;
            if suffix == 0 {
                return None;
            }
            (total_len.saturating_sub(suffix), last)
        } else {
            let start: usize = start.parse().ok()?;
            let end = if end.is_empty() {
                last
            } else {
                end.parse::<usize>().ok()?.min(last)
            };
            (start, end)
        };

        (start <= end && start < total_len).then_some(Self { start, end })
    }

    pub fn content_range(&self, total_len: usize) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total_len)
    }
}
