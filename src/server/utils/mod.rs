pub mod content_type_utils;
pub mod playlist_utils;
pub mod provider_utils;
pub mod response_utils;
pub mod url_utils;
