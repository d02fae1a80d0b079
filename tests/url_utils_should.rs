use hls_proxy::server::error::Error;
use hls_proxy::server::extractors::resolve_target;
use hls_proxy::server::utils::url_utils::{
    decode_target_url, parse_target_url, raw_query_param, target_from_path,
};

#[test]
fn test_decodes_single_and_double_encoded_urls() {
    assert_eq!(
        decode_target_url("https%3A%2F%2Fcdn.example.com%2Fa.m3u8"),
        "https://cdn.example.com/a.m3u8"
    );
    assert_eq!(
        decode_target_url("https%253A%252F%252Fcdn.example.com%252Fa.m3u8"),
        "https://cdn.example.com/a.m3u8"
    );
    // already usable, inner encoding stays put
    assert_eq!(
        decode_target_url("https://cdn.example.com/a.m3u8?sig=a%2Fb"),
        "https://cdn.example.com/a.m3u8?sig=a%2Fb"
    );
}

#[test]
fn test_only_absolute_http_urls_are_accepted() {
    assert!(parse_target_url("https://cdn.example.com/a.m3u8").is_ok());
    assert!(parse_target_url("http://10.0.0.1:8080/a.ts").is_ok());

    for bad in ["", "not-a-url", "/relative/path.m3u8", "ftp://cdn/a.ts", "file:///etc/passwd"] {
        assert!(
            matches!(parse_target_url(bad), Err(Error::InvalidUrl(_))),
            "{} should be rejected",
            bad
        );
    }
}

#[test]
fn test_raw_query_param_keeps_encoding() {
    let query = "url=abc&hdntl=exp=123~acl=%2f*~hmac=ff&x=1";

    assert_eq!(
        raw_query_param(query, "hdntl"),
        Some("exp=123~acl=%2f*~hmac=ff")
    );
    assert_eq!(raw_query_param(query, "missing"), None);
    assert_eq!(raw_query_param("hdntl=", "hdntl"), None);
}

#[test]
fn test_target_rebuilt_from_captured_path() {
    assert_eq!(
        target_from_path("https://cdn.example.com/vod/seg.ts", None).as_deref(),
        Some("https://cdn.example.com/vod/seg.ts")
    );
    assert_eq!(
        target_from_path("https:/cdn.example.com/vod/seg.ts", Some("sig=1")).as_deref(),
        Some("https://cdn.example.com/vod/seg.ts?sig=1")
    );
    assert_eq!(
        target_from_path("https%3A%2F%2Fcdn.example.com%2Fvod%2Fseg.ts", None).as_deref(),
        Some("https://cdn.example.com/vod/seg.ts")
    );
    assert_eq!(target_from_path("vod/seg.ts", None), None);
}

#[test]
fn test_url_parameter_takes_priority() {
    let target = resolve_target(
        Some("url=https%3A%2F%2Fcdn.example.com%2Fa.m3u8&t=1"),
        Some("https://other.example.com/b.m3u8"),
    )
    .unwrap();

    assert_eq!(target.as_str(), "https://cdn.example.com/a.m3u8");
}

#[test]
fn test_raw_query_is_used_when_url_parameter_is_absent() {
    let target = resolve_target(
        Some("https%3A%2F%2Fcdn.example.com%2Fvod%2Fseg.ts"),
        Some("vod/seg.ts"),
    )
    .unwrap();

    assert_eq!(target.as_str(), "https://cdn.example.com/vod/seg.ts");
}

#[test]
fn test_path_is_used_when_query_is_not_a_url() {
    let target = resolve_target(
        Some("sig=abc&exp=10"),
        Some("https://cdn.example.com/vod/seg.ts"),
    )
    .unwrap();

    assert_eq!(
        target.as_str(),
        "https://cdn.example.com/vod/seg.ts?sig=abc&exp=10"
    );
}

#[test]
fn test_missing_target_is_invalid() {
    assert!(matches!(resolve_target(None, None), Err(Error::InvalidUrl(_))));
    assert!(matches!(
        resolve_target(Some("foo=bar"), Some("not/a/url")),
        Err(Error::InvalidUrl(_))
    ));
    assert!(matches!(
        resolve_target(Some("url=javascript%3Aalert(1)"), None),
        Err(Error::InvalidUrl(_))
    ));
}
