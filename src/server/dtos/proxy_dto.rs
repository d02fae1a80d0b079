use axum::{
    body::Bytes,
    http::{HeaderMap, StatusCode},
};
use url::Url;

/// one inbound proxy call after both entry shapes have been normalized
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyRequest {
    /// absolute http(s) url, already decoded and validated
    pub target_url: Url,
    /// raw Cookie header from the player, if any
    pub forwarded_cookies: Option<String>,
    /// raw inbound query string, akamai tokens sometimes only live here
    pub inbound_query: Option<String>,
    /// captured trailing path of the path form, only used when there was no url param
    pub path_hint: Option<String>,
}

impl ProxyRequest {
    pub fn new(target_url: Url) -> Self {
        Self {
            target_url,
            forwarded_cookies: None,
            inbound_query: None,
            path_hint: None,
        }
    }

    pub fn with_cookies(mut self, cookies: Option<String>) -> Self {
        self.forwarded_cookies = cookies.filter(|c| !c.trim().is_empty());
        self
    }

    pub fn with_inbound_query(mut self, query: Option<String>) -> Self {
        self.inbound_query = query.filter(|q| !q.is_empty());
        self
    }

    pub fn with_path_hint(mut self, path: Option<String>) -> Self {
        self.path_hint = path.filter(|p| !p.is_empty());
        self
    }
}

/// a fully buffered upstream response, lives for one request
#[derive(Debug, Clone)]
pub struct FetchedResource {
    pub body: Bytes,
    /// upstream Content-Type, or inferred from the url suffix
    pub content_type: String,
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// where the body actually came from after redirects, relative references resolve against it
    pub final_url: Url,
}
