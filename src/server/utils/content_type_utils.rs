use url::Url;

pub const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
pub const SEGMENT_CONTENT_TYPE: &str = "video/mp2t";
pub const BINARY_CONTENT_TYPE: &str = "application/octet-stream";

/// suffix -> content type, used only when the upstream didn't send one
const SUFFIX_TABLE: &[(&str, &str)] = &[
    (".m3u8", PLAYLIST_CONTENT_TYPE),
    (".ts", SEGMENT_CONTENT_TYPE),
    (".key", BINARY_CONTENT_TYPE),
];

const KEY_SUFFIXES: &[&str] = &[".key", ".bin"];
const AES_128_KEY_LEN: usize = 16;

/// what kind of hls resource a response is, decides rewriting and cache policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Playlist,
    Segment,
    Key,
    Other,
}

impl ResourceKind {
    pub fn classify(content_type: &str, url: &Url, body: &[u8]) -> Self {
        let content_type = content_type.to_ascii_lowercase();

        if content_type.contains("mpegurl")
            || has_suffix(url, ".m3u8")
            || has_suffix(url, ".m3u")
            || body.starts_with(b"#EXTM3U")
        {
            ResourceKind::Playlist
        } else if has_suffix(url, ".ts") || content_type.contains(SEGMENT_CONTENT_TYPE) {
            ResourceKind::Segment
        } else if is_key(&content_type, url, body) {
            ResourceKind::Key
        } else {
            ResourceKind::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Playlist => "playlist",
            ResourceKind::Segment => "segment",
            ResourceKind::Key => "key",
            ResourceKind::Other => "other",
        }
    }
}

/// AES-128 keys are exactly 16 raw bytes and get served under all sorts of names, so a
/// binary body of that size counts too
fn is_key(content_type: &str, url: &Url, body: &[u8]) -> bool {
    if KEY_SUFFIXES.iter().any(|suffix| has_suffix(url, suffix)) {
        return true;
    }

    let binary = content_type.is_empty()
        || content_type.contains("octet-stream")
        || content_type.contains("pgp-keys");
    binary && body.len() == AES_128_KEY_LEN
}

/// upstream Content-Type wins, otherwise infer from the path suffix
pub fn resolve_content_type(upstream: Option<&str>, url: &Url) -> String {
    if let Some(content_type) = upstream.map(str::trim).filter(|v| !v.is_empty()) {
        return content_type.to_string();
    }

    SUFFIX_TABLE
        .iter()
        .find(|(suffix, _)| has_suffix(url, suffix))
        .map(|(_, content_type)| *content_type)
        .unwrap_or(BINARY_CONTENT_TYPE)
        .to_string()
}

/// case-insensitive suffix check on the path only, so query strings never get in the way
pub fn has_suffix(url: &Url, suffix: &str) -> bool {
    url.path().to_ascii_lowercase().ends_with(suffix)
}
