use std::io::Write;
use std::time::{Duration, Instant};

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use flate2::{Compression, write::GzEncoder};
use hls_proxy::AppConfig;
use hls_proxy::server::dtos::proxy_dto::ProxyRequest;
use hls_proxy::server::error::Error;
use hls_proxy::server::services::fetch_services::{
    FetchService, FetchServiceTrait, build_outbound_headers,
};
use hls_proxy::server::utils::provider_utils::ProviderProfile;
use url::Url;

const ORIGIN: &str = "https://watch.example.org";

fn request(target: &str) -> ProxyRequest {
    ProxyRequest::new(Url::parse(target).unwrap())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// tiny upstream on a random local port, returns its base url
async fn spawn_upstream() -> String {
    async fn segment() -> Response {
        // no content type on purpose, the fetcher has to infer it
        Response::new(Body::from(vec![0x47u8; 188]))
    }

    async fn missing() -> impl IntoResponse {
        (StatusCode::NOT_FOUND, "segment expired")
    }

    async fn gzipped_playlist() -> impl IntoResponse {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(b"#EXTM3U\n#EXTINF:6.0,\nseg.ts\n")
            .unwrap();
        let body = encoder.finish().unwrap();
        (
            [
                (header::CONTENT_TYPE, "application/vnd.apple.mpegurl"),
                (header::CONTENT_ENCODING, "gzip"),
            ],
            body,
        )
    }

    async fn stalled() -> &'static str {
        tokio::time::sleep(Duration::from_secs(10)).await;
        "too late"
    }

    async fn echo(headers: HeaderMap) -> String {
        format!(
            "{}|{}",
            header_str(&headers, "origin").unwrap_or(""),
            header_str(&headers, "cookie").unwrap_or("")
        )
    }

    let app = Router::new()
        .route("/vod/seg001.ts", get(segment))
        .route("/vod/gone.ts", get(missing))
        .route("/vod/index.m3u8", get(gzipped_playlist))
        .route("/vod/stalled.m3u8", get(stalled))
        .route("/echo", get(echo));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

fn fetcher() -> FetchService {
    fetcher_with_timeout(5)
}

fn fetcher_with_timeout(upstream_timeout_secs: u64) -> FetchService {
    let config = AppConfig {
        public_origin: ORIGIN.to_string(),
        upstream_timeout_secs,
        ..AppConfig::default()
    };
    FetchService::new(&config).unwrap()
}

#[test]
fn test_outbound_headers_use_our_origin() {
    let req = request("https://cdn.example.com/vod/index.m3u8");
    let headers = build_outbound_headers(&req, ProviderProfile::Generic, ORIGIN);

    assert_eq!(header_str(&headers, "origin"), Some(ORIGIN));
    assert_eq!(
        header_str(&headers, "referer"),
        Some("https://watch.example.org/")
    );
    assert_eq!(header_str(&headers, "accept"), Some("*/*"));
    assert!(header_str(&headers, "user-agent").unwrap().starts_with("Mozilla/5.0"));
    assert!(headers.get("cookie").is_none());
    assert!(headers.get("sec-fetch-mode").is_none());
}

#[test]
fn test_forwarded_cookies_are_attached() {
    let req = request("https://cdn.example.com/vod/index.m3u8")
        .with_cookies(Some("session=abc".to_string()));
    let headers = build_outbound_headers(&req, ProviderProfile::Generic, ORIGIN);

    assert_eq!(header_str(&headers, "cookie"), Some("session=abc"));
}

#[test]
fn test_akamai_token_from_target_query_becomes_cookie() {
    let req = request("https://live.akamaized.net/hls/master.m3u8?hdntl=exp=1~acl=%2f*~hmac=ab")
        .with_cookies(Some("session=abc".to_string()));
    let headers = build_outbound_headers(&req, ProviderProfile::Akamai, ORIGIN);

    assert_eq!(
        header_str(&headers, "cookie"),
        Some("session=abc; hdntl=exp=1~acl=%2f*~hmac=ab")
    );
}

#[test]
fn test_akamai_token_from_inbound_query_wins() {
    let req = request("https://live.akamaized.net/hls/master.m3u8?hdntl=old")
        .with_inbound_query(Some("url=abc&hdntl=fresh".to_string()));
    let headers = build_outbound_headers(&req, ProviderProfile::Akamai, ORIGIN);

    assert_eq!(header_str(&headers, "cookie"), Some("hdntl=fresh"));
}

#[test]
fn test_akamai_token_not_duplicated() {
    let req = request("https://live.akamaized.net/hls/master.m3u8?hdntl=fromquery")
        .with_cookies(Some("hdntl=fromcookie".to_string()));
    let headers = build_outbound_headers(&req, ProviderProfile::Akamai, ORIGIN);

    assert_eq!(header_str(&headers, "cookie"), Some("hdntl=fromcookie"));
}

#[test]
fn test_hdntl_ignored_for_generic_hosts() {
    let req = request("https://cdn.example.com/master.m3u8?hdntl=abc");
    let headers = build_outbound_headers(&req, ProviderProfile::Generic, ORIGIN);

    assert!(headers.get("cookie").is_none());
}

#[test]
fn test_dai_gets_browser_fetch_metadata() {
    let req = request("https://dai.google.com/linear/hls/event/x/master.m3u8");
    let headers = build_outbound_headers(&req, ProviderProfile::GoogleDai, ORIGIN);

    assert_eq!(header_str(&headers, "sec-fetch-dest"), Some("empty"));
    assert_eq!(header_str(&headers, "sec-fetch-mode"), Some("cors"));
    assert_eq!(header_str(&headers, "sec-fetch-site"), Some("cross-site"));
    assert!(header_str(&headers, "accept-language").is_some());
}

#[tokio::test]
async fn test_segment_content_type_is_inferred() {
    let base = spawn_upstream().await;
    let resource = fetcher()
        .fetch(&request(&format!("{}/vod/seg001.ts", base)))
        .await
        .unwrap();

    assert_eq!(resource.status, StatusCode::OK);
    assert_eq!(resource.content_type, "video/mp2t");
    assert_eq!(resource.body.len(), 188);
}

#[tokio::test]
async fn test_upstream_status_is_reported_unchanged() {
    let base = spawn_upstream().await;
    let target = format!("{}/vod/gone.ts", base);
    let err = fetcher().fetch(&request(&target)).await.unwrap_err();

    match err {
        Error::UpstreamError {
            url, status, body, ..
        } => {
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(url, target);
            assert_eq!(&body[..], b"segment expired");
        }
        other => panic!("expected UpstreamError, got {:?}", other),
    }
}

#[tokio::test]
async fn test_gzipped_playlist_is_decoded() {
    let base = spawn_upstream().await;
    let resource = fetcher()
        .fetch(&request(&format!("{}/vod/index.m3u8", base)))
        .await
        .unwrap();

    assert_eq!(resource.content_type, "application/vnd.apple.mpegurl");
    assert_eq!(&resource.body[..], b"#EXTM3U\n#EXTINF:6.0,\nseg.ts\n");
}

#[tokio::test]
async fn test_outbound_headers_reach_the_upstream() {
    let base = spawn_upstream().await;
    let req = request(&format!("{}/echo", base)).with_cookies(Some("session=abc".to_string()));
    let resource = fetcher().fetch(&req).await.unwrap();

    assert_eq!(&resource.body[..], b"https://watch.example.org|session=abc");
}

#[tokio::test]
async fn test_unreachable_upstream_is_a_transport_error() {
    // grab a free port and close it again so nothing is listening
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = fetcher()
        .fetch(&request(&format!("http://{}/vod/seg.ts", addr)))
        .await
        .unwrap_err();

    match err {
        Error::UpstreamUnreachable { details, .. } => {
            assert!(details.starts_with("error sending request"));
            // the connect failure itself, not just reqwest's summary line
            assert!(details.to_lowercase().contains("connect"), "{}", details);
        }
        other => panic!("expected UpstreamUnreachable, got {:?}", other),
    }
}

#[tokio::test]
async fn test_slow_upstream_is_cut_off_at_the_timeout() {
    let base = spawn_upstream().await;
    let started = Instant::now();

    let err = fetcher_with_timeout(1)
        .fetch(&request(&format!("{}/vod/stalled.m3u8", base)))
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(900), "{:?}", elapsed);
    assert!(elapsed < Duration::from_secs(5), "{:?}", elapsed);
    match err {
        Error::UpstreamUnreachable { details, .. } => {
            assert!(details.contains("timed out"), "{}", details);
        }
        other => panic!("expected UpstreamUnreachable, got {:?}", other),
    }
}
