use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use stock_model::StockSnapshot;
use tracing::{debug, warn};

use crate::{FetchError, FetchOutcome, StockSource};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One GET per fetch; `since` is ignored.
pub struct HttpStockSource {
    url: String,
    client: reqwest::Client,
}

impl HttpStockSource {
    pub fn new(url: impl Into<String>) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self::with_client(url, client))
    }

    pub fn with_client(url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn fetch_current(&self) -> Result<StockSnapshot, FetchError> {
        debug!(url = %self.url, "requesting stock");
        let response = self.client.get(&self.url).send().await.map_err(|err| {
            warn!(url = %self.url, error = %err, "stock request failed");
            FetchError::Transport(err)
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %self.url, status = status.as_u16(), "stock endpoint returned error status");
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        let snapshot = StockSnapshot::from_json(&body, Utc::now()).map_err(|err| {
            warn!(url = %self.url, error = %err, "stock payload rejected");
            FetchError::Upstream(err)
        })?;
        debug!(updated_at = %snapshot.updated_at, categories = snapshot.categories.len(), "stock received");
        Ok(snapshot)
    }
}

#[async_trait]
impl StockSource for HttpStockSource {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch(&self, _since: Option<DateTime<Utc>>) -> Result<FetchOutcome, FetchError> {
        let snapshot = self.fetch_current().await?;
        Ok(FetchOutcome::Snapshot(Arc::new(snapshot)))
    }
}
