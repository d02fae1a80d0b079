/// CDN families that need special handling on the way out and in the rewritten playlist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderProfile {
    Generic,
    GoogleDai,
    Akamai,
}

/// ordered (needle, profile) pairs, first substring hit wins. new CDNs go here and nowhere else
const PROVIDER_TABLE: &[(&str, ProviderProfile)] = &[
    ("dai.google.com", ProviderProfile::GoogleDai),
    ("akamaized.net", ProviderProfile::Akamai),
    ("akamaicdn", ProviderProfile::Akamai),
];

/// literal substrings that mark a query string as carrying auth every child request needs
const AUTH_QUERY_MARKERS: &[&str] = &["token=", "auth="];

impl ProviderProfile {
    /// plain string match on the whole url, no dns or tls involved
    pub fn detect(target_url: &str) -> Self {
        PROVIDER_TABLE
            .iter()
            .find(|(needle, _)| target_url.contains(needle))
            .map(|(_, profile)| *profile)
            .unwrap_or(ProviderProfile::Generic)
    }

    /// dai and akamai rotate manifests fast enough that a cached nested playlist breaks playback
    pub fn requires_cache_bust(&self) -> bool {
        matches!(self, ProviderProfile::GoogleDai | ProviderProfile::Akamai)
    }

    /// whether relative references inherit the playlist's query string. the token/auth check is a
    /// substring test on purpose, upstreams put these in odd places
    pub fn preserves_query(&self, target_url: &str) -> bool {
        matches!(self, ProviderProfile::GoogleDai | ProviderProfile::Akamai)
            || AUTH_QUERY_MARKERS
                .iter()
                .any(|marker| target_url.contains(marker))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderProfile::Generic => "generic",
            ProviderProfile::GoogleDai => "google-dai",
            ProviderProfile::Akamai => "akamai",
        }
    }
}
