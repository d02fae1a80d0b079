use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error as ThisError;
use tracing::debug;
use url::Url;

use super::{content_type_utils::has_suffix, provider_utils::ProviderProfile, url_utils};

/// directives whose URI="..." attribute the player fetches on its own
const URI_TAGS: &[&str] = &[
    "#EXT-X-KEY",
    "#EXT-X-SESSION-KEY",
    "#EXT-X-MAP",
    "#EXT-X-MEDIA",
    "#EXT-X-I-FRAME-STREAM-INF",
];

// a playlist fed back through us twice is the common case, anything deeper is garbage
const MAX_UNWRAP_DEPTH: usize = 4;

static URI_ATTRIBUTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"URI="([^"]*)""#).expect("Static regex should compile"));

/// a single line that couldn't be rewritten, the line goes out untouched
#[derive(Debug, ThisError)]
pub enum RewriteFailure {
    #[error("could not resolve '{reference}': {source}")]
    Unresolvable {
        reference: String,
        #[source]
        source: url::ParseError,
    },

    #[error("'{0}' is not an http(s) url")]
    UnsupportedScheme(String),
}

/// per-playlist rewrite settings, built once per fetch and thrown away after
#[derive(Debug, Clone)]
pub struct RewriteContext {
    /// playlist url with the last path segment dropped. the query survives only when
    /// `preserve_query` is set
    pub base_url: Url,
    pub preserve_query: bool,
    /// one timestamp for the whole response, only set for providers that need busting
    pub cache_bust: Option<i64>,
}

impl RewriteContext {
    /// `playlist_url` is the url actually served (after redirects), `target_url` the one the
    /// player asked for, which is what the token/auth heuristic looks at
    pub fn new(
        playlist_url: &Url,
        target_url: &str,
        profile: ProviderProfile,
        timestamp_millis: i64,
    ) -> Self {
        let preserve_query = profile.preserves_query(target_url);

        let mut base_url = playlist_url.clone();
        base_url.set_fragment(None);
        if !preserve_query {
            base_url.set_query(None);
        }

        let directory = match base_url.path().rfind('/') {
            Some(idx) => base_url.path()[..=idx].to_string(),
            None => "/".to_string(),
        };
        base_url.set_path(&directory);

        Self {
            base_url,
            preserve_query,
            cache_bust: profile
                .requires_cache_bust()
                .then_some(timestamp_millis),
        }
    }

    /// query string children inherit, only when preservation is on
    fn inherited_query(&self) -> Option<&str> {
        if self.preserve_query {
            self.base_url.query().filter(|q| !q.is_empty())
        } else {
            None
        }
    }
}

/// rewrites every url a playlist references so the player comes back through the proxy
pub struct PlaylistRewriter {
    proxy_path: String,
}

impl PlaylistRewriter {
    pub fn new(proxy_path: impl Into<String>) -> Self {
        Self {
            proxy_path: proxy_path.into(),
        }
    }

    pub fn rewrite(&self, playlist: &str, ctx: &RewriteContext) -> String {
        playlist
            .split('\n')
            .map(|line| match line.strip_suffix('\r') {
                // crlf playlists keep their terminator on every line, rewritten or not
                Some(content) => format!("{}\r", self.rewrite_line(content, ctx)),
                None => self.rewrite_line(line, ctx),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn rewrite_line(&self, line: &str, ctx: &RewriteContext) -> String {
        let trimmed = line.trim();

        if trimmed.is_empty() {
            return line.to_string();
        }

        if trimmed.starts_with('#') {
            if URI_TAGS.iter().any(|tag| trimmed.starts_with(tag)) {
                return self.rewrite_uri_attribute(line, ctx);
            }
            return line.to_string();
        }

        match self.proxy_reference(trimmed, ctx) {
            Ok(proxied) => proxied,
            Err(e) => {
                debug!("Leaving playlist line as-is: {}", e);
                line.to_string()
            }
        }
    }

    /// swap only the quoted URI value, the rest of the directive stays byte for byte
    fn rewrite_uri_attribute(&self, line: &str, ctx: &RewriteContext) -> String {
        let Some(uri) = URI_ATTRIBUTE.captures(line).and_then(|caps| caps.get(1)) else {
            return line.to_string();
        };

        let reference = uri.as_str().trim();
        if reference.is_empty() {
            return line.to_string();
        }

        match self.proxy_reference(reference, ctx) {
            Ok(proxied) => format!("{}{}{}", &line[..uri.start()], proxied, &line[uri.end()..]),
            Err(e) => {
                debug!("Leaving URI attribute as-is: {}", e);
                line.to_string()
            }
        }
    }

    fn proxy_reference(
        &self,
        reference: &str,
        ctx: &RewriteContext,
    ) -> Result<String, RewriteFailure> {
        let resolved = self.resolve(reference, ctx)?;

        let mut proxied = format!(
            "{}?url={}",
            self.proxy_path,
            urlencoding::encode(resolved.as_str())
        );

        // segments stay cacheable, only nested playlists get busted
        if let Some(timestamp) = ctx.cache_bust {
            if has_suffix(&resolved, ".m3u8") {
                proxied.push_str(&format!("&t={}", timestamp));
            }
        }

        Ok(proxied)
    }

    pub fn resolve(&self, reference: &str, ctx: &RewriteContext) -> Result<Url, RewriteFailure> {
        if let Some(inner) = self.unwrap_proxied(reference, ctx) {
            return Ok(inner);
        }

        let lower = reference.to_ascii_lowercase();
        let resolved = if lower.starts_with("http://") || lower.starts_with("https://") {
            Url::parse(reference).map_err(|source| RewriteFailure::Unresolvable {
                reference: reference.to_string(),
                source,
            })?
        } else {
            let mut joined =
                ctx.base_url
                    .join(reference)
                    .map_err(|source| RewriteFailure::Unresolvable {
                        reference: reference.to_string(),
                        source,
                    })?;

            if joined.query().is_none() {
                if let Some(query) = ctx.inherited_query() {
                    joined.set_query(Some(query));
                }
            }
            joined
        };

        if !matches!(resolved.scheme(), "http" | "https") {
            return Err(RewriteFailure::UnsupportedScheme(reference.to_string()));
        }

        Ok(resolved)
    }

    /// a reference that already points at us (relative or absolute) gets its inner url back, so
    /// feeding our own output through again never double wraps
    fn unwrap_proxied(&self, reference: &str, ctx: &RewriteContext) -> Option<Url> {
        let mut current = reference.to_string();
        let mut unwrapped = None;

        for _ in 0..MAX_UNWRAP_DEPTH {
            let Ok(candidate) = ctx.base_url.join(&current) else {
                break;
            };

            if !self.is_proxy_path(candidate.path()) {
                break;
            }

            let Some(inner) = candidate
                .query_pairs()
                .find(|(key, _)| key == "url")
                .map(|(_, value)| url_utils::decode_target_url(&value))
            else {
                break;
            };

            match Url::parse(&inner) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {
                    current = inner;
                    unwrapped = Some(url);
                }
                _ => break,
            }
        }

        unwrapped
    }

    fn is_proxy_path(&self, path: &str) -> bool {
        path == self.proxy_path
            || path
                .strip_prefix(self.proxy_path.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    }
}
