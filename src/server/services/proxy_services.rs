use std::sync::Arc;

use tracing::info;

use crate::{config::AppConfig, server::utils::playlist_utils::PlaylistRewriter};

use super::fetch_services::{DynFetchService, FetchService};

/// everything a proxy handler needs, cloned into each request through an Extension. nothing in
/// here is mutable, the http client's pool is the only shared thing
#[derive(Clone)]
pub struct ProxyServices {
    pub fetcher: DynFetchService,
    pub rewriter: Arc<PlaylistRewriter>,
    pub config: Arc<AppConfig>,
}

impl ProxyServices {
    pub fn new(config: Arc<AppConfig>) -> anyhow::Result<Self> {
        info!("starting proxy services...");

        let fetcher = Arc::new(FetchService::new(&config)?) as DynFetchService;

        info!(
            "upstream client ok (timeout {}s), public origin {}",
            config.upstream_timeout_secs, config.public_origin
        );

        Ok(Self::with_fetcher(config, fetcher))
    }

    /// swap the fetcher, this is how the router tests get a mock in
    pub fn with_fetcher(config: Arc<AppConfig>, fetcher: DynFetchService) -> Self {
        let rewriter = Arc::new(PlaylistRewriter::new(config.normalized_proxy_path()));

        Self {
            fetcher,
            rewriter,
            config,
        }
    }
}
