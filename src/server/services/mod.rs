pub mod fetch_services;
pub mod proxy_services;

pub use fetch_services::DynFetchService;
pub use proxy_services::ProxyServices;
