pub mod launchpad;
pub mod mirrorlist;

use crate::error::Result;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

// 设置全局请求超时，防止慢源阻塞整个流程太久
const REQUEST_TIMEOUT: u64 = 15;

pub fn http_client() -> Result<Client> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT))
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// GET a page and return its body; non-2xx responses are errors.
pub async fn fetch_text(client: &Client, url: &str) -> Result<String> {
    debug!(url, "fetching");
    let body = client.get(url).send().await?.error_for_status()?.text().await?;
    Ok(body)
}
