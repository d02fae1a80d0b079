#[derive(clap::ValueEnum, Clone, Debug, Copy)]
pub enum CargoEnv {
    Development,
    Production,
}

#[derive(clap::Parser, Debug)]
pub struct AppConfig {
    // production or development
    #[clap(long, env, value_enum)]
    pub cargo_env: CargoEnv,

    // port that the app will bind to
    #[clap(long, env, default_value = "5000")]
    pub port: u16,

    // the origin the player loads us from. upstreams see this as Origin and Referer instead of
    // their own host, which is what gets past most hotlink checks
    #[clap(long, env, default_value = "http://localhost:5000")]
    pub public_origin: String,

    // both entry shapes hang off this path and every rewritten playlist line points back at it
    #[clap(long, env, default_value = "/stream-proxy")]
    pub proxy_path: String,

    // upstream fetches are cut off after this many seconds
    #[clap(long, env, default_value = "15")]
    pub upstream_timeout_secs: u64,

    // max-age handed out for .ts segments, playlists and keys are never cached
    #[clap(long, env, default_value = "60")]
    pub segment_max_age_secs: u64,

    // where the daily rolling log goes in production
    #[clap(long, env, default_value = "logs")]
    pub log_dir: String,

    // optional sentry integration
    #[clap(long, env)]
    pub sentry_dsn: Option<String>,
}

impl AppConfig {
    /// proxy path with exactly one leading slash and no trailing one
    pub fn normalized_proxy_path(&self) -> String {
        let trimmed = self.proxy_path.trim_matches('/');
        format!("/{}", trimmed)
    }
}

impl Default for AppConfig {
    // mostly for tests, the real values come from clap
    fn default() -> Self {
        Self {
            cargo_env: CargoEnv::Development,
            port: 5000,
            public_origin: "http://localhost:5000".to_string(),
            proxy_path: "/stream-proxy".to_string(),
            upstream_timeout_secs: 15,
            segment_max_age_secs: 60,
            log_dir: "logs".to_string(),
            sentry_dsn: None,
        }
    }
}
