use tracing::debug;
use url::Url;

use crate::server::error::{AppResult, Error};

// players and intermediate proxies sometimes encode twice, never more than this
const MAX_DECODE_PASSES: usize = 3;

fn is_http_like(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// percent-decode until the value looks like an http url (or stops changing)
pub fn decode_target_url(raw: &str) -> String {
    let mut current = raw.trim().to_string();

    for _ in 0..MAX_DECODE_PASSES {
        if is_http_like(&current) || !current.contains('%') {
            break;
        }
        match urlencoding::decode(&current) {
            Ok(decoded) if decoded != current => current = decoded.into_owned(),
            _ => break,
        }
    }

    current
}

/// decode and validate, only absolute http(s) urls with a host get through
pub fn parse_target_url(raw: &str) -> AppResult<Url> {
    let decoded = decode_target_url(raw);

    if decoded.is_empty() {
        return Err(Error::InvalidUrl("Missing url parameter".to_string()));
    }

    let url = Url::parse(&decoded).map_err(|e| {
        debug!("Rejecting target url {}: {}", decoded, e);
        Error::InvalidUrl(format!("Invalid URL: {}", e))
    })?;

    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(Error::InvalidUrl(
            "URL must be an absolute http or https URL".to_string(),
        ));
    }

    Ok(url)
}

/// raw (still encoded) value of the first `name=` pair in a query string
pub fn raw_query_param<'a>(query: &'a str, name: &str) -> Option<&'a str> {
    query
        .trim_start_matches('?')
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

/// rebuild a target from a captured path like `https://cdn/x/seg.ts` or `https%3A%2F%2Fcdn...`.
/// routers and cdns love collapsing `//` so `https:/cdn` is accepted too
pub fn target_from_path(path: &str, raw_query: Option<&str>) -> Option<String> {
    let decoded = decode_target_url(path.trim_start_matches('/'));

    let repaired = ["https:/", "http:/"]
        .iter()
        .find_map(|scheme| {
            let rest = decoded.strip_prefix(scheme)?;
            if rest.starts_with('/') {
                None
            } else {
                Some(format!("{}/{}", scheme, rest))
            }
        })
        .unwrap_or(decoded);

    if !is_http_like(&repaired) {
        return None;
    }

    match raw_query.filter(|q| !q.is_empty()) {
        Some(query) if !repaired.contains('?') => Some(format!("{}?{}", repaired, query)),
        _ => Some(repaired),
    }
}
