use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderName, HeaderValue, header};
use mockall::automock;
use tracing::{debug, error, warn};

use crate::{
    config::AppConfig,
    server::{
        dtos::proxy_dto::{FetchedResource, ProxyRequest},
        error::{AppResult, Error},
        utils::{
            content_type_utils::resolve_content_type,
            provider_utils::ProviderProfile,
            response_utils::ContentEncoding,
            url_utils::raw_query_param,
        },
    },
};

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

// only what ContentEncoding can undo, the body has to be readable text for the rewriter
const UPSTREAM_ACCEPT_ENCODING: &str = "gzip, zstd";

const AKAMAI_TOKEN: &str = "hdntl";

pub type DynFetchService = Arc<dyn FetchServiceTrait + Send + Sync>;

#[automock]
#[async_trait]
pub trait FetchServiceTrait {
    /// one bounded GET against the target, no retries. non-2xx comes back as `UpstreamError`
    async fn fetch(&self, request: &ProxyRequest) -> AppResult<FetchedResource>;
}

pub struct FetchService {
    http: reqwest::Client,
    public_origin: String,
}

impl FetchService {
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        // one pooled client for every in-flight request, connections get reused per host
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.upstream_timeout_secs))
            .build()
            .context("Failed to build upstream http client")?;

        Ok(Self {
            http,
            public_origin: config.public_origin.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl FetchServiceTrait for FetchService {
    async fn fetch(&self, request: &ProxyRequest) -> AppResult<FetchedResource> {
        let target = request.target_url.to_string();
        let profile = ProviderProfile::detect(&target);
        debug!("Fetching ({}): {}", profile.as_str(), target);

        let started = Instant::now();
        let headers = build_outbound_headers(request, profile, &self.public_origin);

        let response = self
            .http
            .get(request.target_url.clone())
            .headers(headers)
            .send()
            .await
            .map_err(|e| {
                let details = transport_details(&e);
                error!("Request to {} failed: {}", target, details);
                Error::UpstreamUnreachable {
                    url: target.clone(),
                    details,
                }
            })?;

        let status = response.status();
        let final_url = response.url().clone();
        let upstream_headers = response.headers().clone();

        debug!(
            "Upstream responded {} in {}ms",
            status,
            started.elapsed().as_millis()
        );

        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            // most of these are cloudflare html pages, the first bit is plenty
            debug!(
                "Upstream error body ({} bytes): {}",
                body.len(),
                String::from_utf8_lossy(&body[..body.len().min(256)])
            );
            error!("Response from {} not successful: {}", target, status);

            return Err(Error::UpstreamError {
                url: target,
                status,
                details: status.canonical_reason().unwrap_or("Unknown").to_string(),
                body,
            });
        }

        let encoding = ContentEncoding::from_content_encoding(
            upstream_headers
                .get(header::CONTENT_ENCODING)
                .and_then(|v| v.to_str().ok()),
        );

        let raw = response.bytes().await.map_err(|e| {
            let details = transport_details(&e);
            error!("Failed to read response from {}: {}", target, details);
            Error::UpstreamUnreachable {
                url: target.clone(),
                details,
            }
        })?;

        let body = match encoding {
            ContentEncoding::None => raw,
            encoding => {
                debug!("Decompressing {:?}-encoded response", encoding);
                let decoded = encoding.decompress(&raw).map_err(|e| {
                    error!("Failed to decompress {:?} response: {}", encoding, e);
                    Error::InternalServerErrorWithContext(
                        "Failed to decompress upstream response".to_string(),
                    )
                })?;
                Bytes::from(decoded)
            }
        };

        let content_type = resolve_content_type(
            upstream_headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
            &request.target_url,
        );

        debug!("Read {} bytes, content type {}", body.len(), content_type);

        Ok(FetchedResource {
            body,
            content_type,
            status,
            headers: upstream_headers,
            final_url,
        })
    }
}

/// reqwest's own message stops at "error sending request", the timeout or connect cause
/// lives further down the source chain
fn transport_details(err: &reqwest::Error) -> String {
    let mut details = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        details.push_str(": ");
        details.push_str(&cause.to_string());
        source = cause.source();
    }
    details
}

/// browser-looking headers with our own origin, never the upstream's
pub fn build_outbound_headers(
    request: &ProxyRequest,
    profile: ProviderProfile,
    public_origin: &str,
) -> HeaderMap {
    let mut headers = HeaderMap::new();

    headers.insert(header::USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(
        header::ACCEPT_ENCODING,
        HeaderValue::from_static(UPSTREAM_ACCEPT_ENCODING),
    );

    insert_dynamic(&mut headers, header::ORIGIN, public_origin);
    insert_dynamic(&mut headers, header::REFERER, &format!("{}/", public_origin));

    if let Some(cookie) = outbound_cookie(request, profile) {
        insert_dynamic(&mut headers, header::COOKIE, &cookie);
    }

    // google's edge acts differently without these
    if profile == ProviderProfile::GoogleDai {
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.9"),
        );
        headers.insert("sec-fetch-dest", HeaderValue::from_static("empty"));
        headers.insert("sec-fetch-mode", HeaderValue::from_static("cors"));
        headers.insert("sec-fetch-site", HeaderValue::from_static("cross-site"));
    }

    headers
}

fn insert_dynamic(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(v) => {
            headers.insert(name, v);
        }
        Err(_) => warn!("Dropping outbound {} header with invalid value", name),
    }
}

/// forwarded cookies, plus akamai's hdntl token folded in as a cookie since the edge only checks
/// it there even when the player got it as a query param
fn outbound_cookie(request: &ProxyRequest, profile: ProviderProfile) -> Option<String> {
    let mut cookies: Vec<String> = request
        .forwarded_cookies
        .iter()
        .map(|c| c.trim().trim_end_matches(';').to_string())
        .filter(|c| !c.is_empty())
        .collect();

    if profile == ProviderProfile::Akamai {
        if let Some(token) = akamai_token(request) {
            let prefix = format!("{}=", AKAMAI_TOKEN);
            let present = cookies
                .iter()
                .flat_map(|c| c.split(';'))
                .any(|pair| pair.trim().starts_with(&prefix));

            if !present {
                cookies.push(format!("{}{}", prefix, token));
            }
        }
    }

    (!cookies.is_empty()).then(|| cookies.join("; "))
}

fn akamai_token(request: &ProxyRequest) -> Option<&str> {
    request
        .inbound_query
        .as_deref()
        .and_then(|q| raw_query_param(q, AKAMAI_TOKEN))
        .or_else(|| {
            request
                .target_url
                .query()
                .and_then(|q| raw_query_param(q, AKAMAI_TOKEN))
        })
}
