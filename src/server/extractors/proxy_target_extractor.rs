use axum::Extension;
use axum::extract::FromRequestParts;
use axum::http::header::COOKIE;
use axum::http::request::Parts;
use tracing::debug;
use url::Url;

use crate::server::dtos::proxy_dto::ProxyRequest;
use crate::server::error::{AppResult, Error};
use crate::server::services::ProxyServices;
use crate::server::utils::url_utils::{parse_target_url, target_from_path};

/// normalizes both entry shapes (`?url=` and captured path) into one ProxyRequest, so the
/// handlers behind it never care which one the player used
pub struct ProxyTarget(pub ProxyRequest, pub ProxyServices);

impl<S> FromRequestParts<S> for ProxyTarget
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Extension(services): Extension<ProxyServices> =
            Extension::from_request_parts(parts, state)
                .await
                .map_err(|err| Error::InternalServerErrorWithContext(err.to_string()))?;

        let proxy_path = services.config.normalized_proxy_path();
        let raw_query = parts.uri.query().map(|q| q.to_string());

        let path_hint = parts
            .uri
            .path()
            .strip_prefix(proxy_path.as_str())
            .map(|rest| rest.trim_start_matches('/').to_string())
            .filter(|rest| !rest.is_empty());

        let target_url = resolve_target(raw_query.as_deref(), path_hint.as_deref())?;

        // multiple Cookie headers are legal over http/2, fold them like a browser would
        let cookies = parts
            .headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect::<Vec<_>>()
            .join("; ");

        debug!(
            "Normalized proxy target: {} (path hint: {:?})",
            target_url, path_hint
        );

        let request = ProxyRequest::new(target_url)
            .with_cookies(Some(cookies))
            .with_inbound_query(raw_query)
            .with_path_hint(path_hint);

        Ok(ProxyTarget(request, services))
    }
}

/// `url` param first, then the whole raw query as an encoded url, then the captured path
pub fn resolve_target(raw_query: Option<&str>, path_hint: Option<&str>) -> AppResult<Url> {
    let query = raw_query.filter(|q| !q.is_empty());

    let url_param = query.and_then(|q| {
        url::form_urlencoded::parse(q.as_bytes())
            .find(|(key, _)| key == "url")
            .map(|(_, value)| value.into_owned())
    });

    if let Some(raw) = url_param {
        return parse_target_url(&raw);
    }

    if let Some(target) = query.and_then(|q| parse_target_url(q).ok()) {
        return Ok(target);
    }

    match path_hint.and_then(|path| target_from_path(path, query)) {
        Some(rebuilt) => parse_target_url(&rebuilt),
        None => Err(Error::InvalidUrl("Missing url parameter".to_string())),
    }
}
