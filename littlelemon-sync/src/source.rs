//! Remote menu source.
//!
//! One GET against the configured URL, then normalization. The endpoint is
//! a static file host, so the body is parsed as JSON regardless of the
//! content type it is served with.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::normalize::parse_menu_document;
use async_trait::async_trait;
use littlelemon_storage::NewMenuItem;
use reqwest::Client;
use tracing::debug;

/// Where the authoritative menu comes from.
#[async_trait]
pub trait MenuSource: Send + Sync {
    /// Fetches the full menu, already normalized.
    async fn fetch_menu(&self) -> SyncResult<Vec<NewMenuItem>>;
}

/// HTTP client for the remote menu document.
pub struct HttpMenuSource {
    client: Client,
    url: String,
}

impl HttpMenuSource {
    pub fn new(config: &SyncConfig) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            url: config.menu_url.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl MenuSource for HttpMenuSource {
    async fn fetch_menu(&self) -> SyncResult<Vec<NewMenuItem>> {
        debug!("fetching menu from {}", self.url);
        let resp = self.client.get(&self.url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SyncError::Fetch(format!("GET {} returned {status}", self.url)));
        }

        let body = resp.bytes().await?;
        let items = parse_menu_document(&body)?;
        debug!("fetched {} menu items", items.len());
        Ok(items)
    }
}
