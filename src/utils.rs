use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use url::Url;

pub static RUNTIME: Lazy<tokio::runtime::Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build Tokio runtime")
});

pub fn block_on<F: std::future::Future>(fut: F) -> F::Output {
    RUNTIME.block_on(fut)
}

pub const TEMP_ID_PREFIX: &str = "temp-";

/// Locally unique id for an optimistic message, replaced once the server echoes it.
pub fn new_temp_id() -> String {
    format!("{}{}", TEMP_ID_PREFIX, uuid::Uuid::new_v4().simple())
}

pub fn is_temp_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

pub fn normalize_url(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

/// True for absolute http(s) URLs with a host. No scheme guessing here:
/// crawl targets are taken exactly as typed.
pub fn is_valid_http_url(input: &str) -> bool {
    match Url::parse(input.trim()) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some_and(|h| !h.is_empty()),
        Err(_) => false,
    }
}

/// Maps an http(s) base URL onto the push channel endpoint.
pub fn ws_url_for(base_url: &str) -> Result<Url, crate::error::Error> {
    let mut url = Url::parse(&normalize_url(base_url))
        .map_err(|e| crate::error::Error::InvalidUrl(e.to_string()))?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme)
        .map_err(|_| crate::error::Error::InvalidUrl(base_url.to_string()))?;
    let path = format!("{}/ws", url.path().trim_end_matches('/'));
    url.set_path(&path);
    Ok(url)
}
