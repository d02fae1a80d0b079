// both entry shapes land here through the ProxyTarget extractor, so header and cache decisions
// only exist once
use axum::{
    Router,
    body::Bytes,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Utc;
use metrics::counter;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{debug, error, warn};

use crate::server::{
    dtos::proxy_dto::{FetchedResource, ProxyRequest},
    error::{AppResult, Error},
    extractors::ProxyTarget,
    services::ProxyServices,
    utils::{
        content_type_utils::{BINARY_CONTENT_TYPE, PLAYLIST_CONTENT_TYPE, ResourceKind},
        playlist_utils::RewriteContext,
        provider_utils::ProviderProfile,
        response_utils::{
            ByteRange, CORS_ALLOW_HEADERS, CORS_ALLOW_METHODS, CORS_MAX_AGE, ContentEncoding,
            NO_CACHE, cache_control_for,
        },
    },
};

pub struct ProxyController;

impl ProxyController {
    pub fn app(proxy_path: &str) -> Router {
        Router::new()
            .route(proxy_path, get(Self::proxy_get).options(Self::proxy_options))
            .route(
                &format!("{}/{{*path}}", proxy_path),
                get(Self::proxy_get).options(Self::proxy_options),
            )
            // the <video>/MSE pipeline refuses cross-origin responses without these, errors
            // included
            .layer(SetResponseHeaderLayer::overriding(
                header::ACCESS_CONTROL_ALLOW_ORIGIN,
                HeaderValue::from_static("*"),
            ))
            .layer(SetResponseHeaderLayer::overriding(
                header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static(CORS_ALLOW_METHODS),
            ))
            .layer(SetResponseHeaderLayer::overriding(
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static(CORS_ALLOW_HEADERS),
            ))
            .layer(SetResponseHeaderLayer::overriding(
                HeaderName::from_static("cross-origin-resource-policy"),
                HeaderValue::from_static("cross-origin"),
            ))
    }

    async fn proxy_get(
        ProxyTarget(request, services): ProxyTarget,
        headers: HeaderMap,
    ) -> AppResult<Response> {
        let resource = services
            .fetcher
            .fetch(&request)
            .await
            .inspect_err(Self::record_failure)?;

        let kind = ResourceKind::classify(
            &resource.content_type,
            &request.target_url,
            &resource.body,
        );
        counter!("proxy_requests_total", "kind" => kind.as_str()).increment(1);
        debug!("Relaying {} as {}", request.target_url, kind.as_str());

        match kind {
            ResourceKind::Playlist => {
                Self::playlist_response(&request, resource, &services, &headers)
            }
            _ => Self::media_response(kind, resource, &services, &headers),
        }
    }

    async fn proxy_options() -> impl IntoResponse {
        // preflight never touches the upstream, the cors layer adds the rest
        (
            StatusCode::NO_CONTENT,
            [(header::ACCESS_CONTROL_MAX_AGE, CORS_MAX_AGE)],
        )
    }

    fn record_failure(err: &Error) {
        let reason = match err {
            Error::UpstreamUnreachable { .. } => "unreachable",
            Error::UpstreamError { .. } => "status",
            _ => return,
        };
        counter!("proxy_upstream_failures_total", "reason" => reason).increment(1);
    }

    fn playlist_response(
        request: &ProxyRequest,
        resource: FetchedResource,
        services: &ProxyServices,
        headers: &HeaderMap,
    ) -> AppResult<Response> {
        let body = match std::str::from_utf8(&resource.body) {
            Ok(text) => {
                let target = request.target_url.as_str();
                let ctx = RewriteContext::new(
                    &resource.final_url,
                    target,
                    ProviderProfile::detect(target),
                    Utc::now().timestamp_millis(),
                );
                debug!(
                    "Rewriting playlist against {} (preserve query: {}, cache bust: {:?})",
                    ctx.base_url, ctx.preserve_query, ctx.cache_bust
                );
                Bytes::from(services.rewriter.rewrite(text, &ctx))
            }
            Err(e) => {
                // a playlist we can't read is still better relayed than dropped
                warn!(
                    "Playlist from {} is not valid UTF-8 ({}), relaying unmodified",
                    request.target_url, e
                );
                resource.body.clone()
            }
        };

        Self::build_m3u8_response(resource.status, &body, headers)
    }

    /// playlist headers plus optional compression for whatever the player accepts
    fn build_m3u8_response(
        status: StatusCode,
        processed_body: &[u8],
        headers: &HeaderMap,
    ) -> AppResult<Response> {
        let encoding = ContentEncoding::from_accept_encoding(
            headers
                .get(header::ACCEPT_ENCODING)
                .and_then(|v| v.to_str().ok()),
        );

        let mut response_headers = HeaderMap::new();
        response_headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(PLAYLIST_CONTENT_TYPE),
        );
        response_headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(NO_CACHE));
        response_headers.insert(header::VARY, HeaderValue::from_static("Accept-Encoding"));

        let response_body = match encoding.as_header_value() {
            Some(enc_header) => {
                let compressed = encoding.compress(processed_body).map_err(|e| {
                    error!("Failed to compress response with {:?}: {}", encoding, e);
                    Error::InternalServerErrorWithContext("Failed to compress response".to_string())
                })?;
                debug!(
                    "Compressed M3U8 with {:?} from {} to {} bytes",
                    encoding,
                    processed_body.len(),
                    compressed.len()
                );
                response_headers.insert(
                    header::CONTENT_ENCODING,
                    HeaderValue::from_static(enc_header),
                );
                compressed
            }
            None => processed_body.to_vec(),
        };

        response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(response_body.len()));

        Ok((status, response_headers, response_body).into_response())
    }

    fn media_response(
        kind: ResourceKind,
        resource: FetchedResource,
        services: &ProxyServices,
        headers: &HeaderMap,
    ) -> AppResult<Response> {
        let total_len = resource.body.len();
        let range = headers
            .get(header::RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| ByteRange::parse(v, total_len));

        let mut response_headers = HeaderMap::new();

        response_headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_str(&resource.content_type)
                .unwrap_or_else(|_| HeaderValue::from_static(BINARY_CONTENT_TYPE)),
        );

        let cache_control = cache_control_for(kind, services.config.segment_max_age_secs)
            .and_then(|v| HeaderValue::from_str(&v).ok())
            .or_else(|| resource.headers.get(header::CACHE_CONTROL).cloned());
        if let Some(cache_control) = cache_control {
            response_headers.insert(header::CACHE_CONTROL, cache_control);
        }

        // upstream validators are worth passing along, everything else is ours
        for name in [header::ETAG, header::LAST_MODIFIED] {
            if let Some(value) = resource.headers.get(&name) {
                response_headers.insert(name.clone(), value.clone());
            }
        }

        response_headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));

        let (status, body) = match range {
            Some(range) => {
                debug!(
                    "Serving range {}-{} of {} bytes",
                    range.start, range.end, total_len
                );
                if let Ok(content_range) = HeaderValue::from_str(&range.content_range(total_len)) {
                    response_headers.insert(header::CONTENT_RANGE, content_range);
                }
                (
                    StatusCode::PARTIAL_CONTENT,
                    resource.body.slice(range.start..=range.end),
                )
            }
            None => (resource.status, resource.body),
        };

        response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));

        Ok((status, response_headers, body).into_response())
    }
}
