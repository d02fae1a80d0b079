mod proxy_target_extractor;

pub use proxy_target_extractor::*;
