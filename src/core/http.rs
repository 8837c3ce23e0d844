use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING};
use reqwest::Client;

use crate::core::config::DownloadSettings;

pub const APP_USER_AGENT: &str = "InterfaceOficial/0.1.0";

/// Shared HTTP client. Per-request timeouts come from `DownloadSettings`;
/// nothing above this layer adds a global deadline.
pub fn build_http_client(settings: &DownloadSettings) -> Result<Client, reqwest::Error> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

    Client::builder()
        .user_agent(APP_USER_AGENT)
        .default_headers(default_headers)
        .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
        .timeout(Duration::from_secs(settings.request_timeout_secs))
        .build()
}
