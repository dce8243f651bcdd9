//! Upstream stock sources.
//!
//! Every transport is a [`StockSource`]: the scheduler only ever asks for
//! "anything newer than `since`" and gets back a normalised snapshot or
//! [`FetchOutcome::NoNewData`].

mod http;
mod push;
mod retry;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use stock_model::{NormalizeError, StockSnapshot};
use thiserror::Error;

pub use http::HttpStockSource;
pub use push::{PushStockSource, DEFAULT_RECONNECT_BACKOFF};
pub use retry::RetryUntilNewer;

pub const DEFAULT_STOCK_URL: &str = "https://gagstock.gleeze.com/grow-a-garden";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("upstream returned http status {0}")]
    Status(u16),
    #[error(transparent)]
    Upstream(#[from] NormalizeError),
    #[error("push subscription unavailable: {0}")]
    Connect(String),
}

#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Snapshot(Arc<StockSnapshot>),
    NoNewData,
}

impl FetchOutcome {
    pub fn snapshot(&self) -> Option<&Arc<StockSnapshot>> {
        match self {
            FetchOutcome::Snapshot(snapshot) => Some(snapshot),
            FetchOutcome::NoNewData => None,
        }
    }
}

/// `true` when `snapshot` is strictly newer than `since` (or `since` is unset).
pub fn is_newer(snapshot: &StockSnapshot, since: Option<DateTime<Utc>>) -> bool {
    since.map_or(true, |since| snapshot.updated_at > since)
}

#[async_trait]
pub trait StockSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(&self, since: Option<DateTime<Utc>>) -> Result<FetchOutcome, FetchError>;
}

#[async_trait]
impl<S: StockSource + ?Sized> StockSource for Arc<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn fetch(&self, since: Option<DateTime<Utc>>) -> Result<FetchOutcome, FetchError> {
        (**self).fetch(since).await
    }
}
