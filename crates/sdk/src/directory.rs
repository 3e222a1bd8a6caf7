//! Holder directory backed by an external token indexer

use async_trait::async_trait;
use reflector_types::Holder;
use solana_sdk::pubkey::Pubkey;
use tracing::{debug, info};

use crate::{SdkError, SdkResult};

/// Source of the current token holder snapshot
#[async_trait]
pub trait HolderDirectory: Send + Sync {
    async fn holders(&self, mint: &Pubkey) -> SdkResult<Vec<Holder>>;
}

/// Paged HTTP holder API: `GET {base}/tokens/{mint}/holders?page=N&limit=L`.
///
/// Pages are requested one at a time until an empty page comes back.
pub struct HttpHolderDirectory {
    client: reqwest::Client,
    base_url: String,
    page_size: usize,
}

impl HttpHolderDirectory {
    pub fn new(base_url: impl Into<String>, page_size: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            page_size,
        }
    }

    fn page_url(&self, mint: &Pubkey, page: usize) -> String {
        format!(
            "{}/tokens/{}/holders?page={}&limit={}",
            self.base_url, mint, page, self.page_size
        )
    }

    async fn fetch_page(&self, mint: &Pubkey, page: usize) -> SdkResult<Vec<Holder>> {
        let url = self.page_url(mint, page);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(SdkError::Http(format!(
                "holder API returned {} for page {}",
                response.status(),
                page
            )));
        }

        response
            .json::<Vec<Holder>>()
            .await
            .map_err(|e| SdkError::Deserialization(format!("holder page {}: {}", page, e)))
    }
}

#[async_trait]
impl HolderDirectory for HttpHolderDirectory {
    async fn holders(&self, mint: &Pubkey) -> SdkResult<Vec<Holder>> {
        let mut holders = Vec::new();
        let mut page = 0;

        loop {
            let batch = self.fetch_page(mint, page).await?;
            if batch.is_empty() {
                break;
            }
            debug!("Holder page {}: {} entries", page, batch.len());
            holders.extend(batch);
            page += 1;
        }

        info!("Fetched {} holders of {} over {} pages", holders.len(), mint, page);
        Ok(holders)
    }
}

/// Fixed holder list, for dry runs and tests
#[derive(Debug, Clone, Default)]
pub struct StaticHolderDirectory {
    holders: Vec<Holder>,
}

impl StaticHolderDirectory {
    pub fn new(holders: Vec<Holder>) -> Self {
        Self { holders }
    }
}

#[async_trait]
impl HolderDirectory for StaticHolderDirectory {
    async fn holders(&self, _mint: &Pubkey) -> SdkResult<Vec<Holder>> {
        Ok(self.holders.clone())
    }
}
