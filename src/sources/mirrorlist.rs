use crate::error::Result;
use crate::sources::fetch_text;
use crate::traits::UrlFeed;
use async_trait::async_trait;
use reqwest::Client;

/// Plain-text mirror list, one URL per line (mirrors.ubuntu.com)
pub struct MirrorListFeed {
    client: Client,
    url: String,
}

impl MirrorListFeed {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

pub fn split_lines(body: &str) -> Vec<String> {
    body.lines().map(str::to_string).collect()
}

#[async_trait]
impl UrlFeed for MirrorListFeed {
    fn name(&self) -> &str {
        &self.url
    }

    async fn mirror_lines(&self) -> Result<Vec<String>> {
        let body = fetch_text(&self.client, &self.url).await?;
        Ok(split_lines(&body))
    }
}
