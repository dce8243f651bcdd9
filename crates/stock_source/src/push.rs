use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use stock_model::{NormalizeError, StockSnapshot};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMsg;
use tracing::{debug, info, warn};

use crate::{is_newer, FetchError, FetchOutcome, StockSource};

pub const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

type Latest = Option<Arc<StockSnapshot>>;

/// Long-lived WebSocket subscription. Frames carry the same JSON as the HTTP
/// endpoint; only strictly newer snapshots are kept.
pub struct PushStockSource {
    latest: watch::Receiver<Latest>,
    task: JoinHandle<()>,
}

impl PushStockSource {
    /// Spawns the subscription task. Must be called inside a tokio runtime.
    pub fn connect(url: impl Into<String>, backoff: Duration) -> Self {
        let (tx, rx) = watch::channel(None);
        let task = tokio::spawn(run_subscription(url.into(), backoff, tx));
        Self { latest: rx, task }
    }

    /// Receiver that changes every time a newer snapshot is accepted.
    pub fn subscribe(&self) -> watch::Receiver<Latest> {
        self.latest.clone()
    }
}

impl Drop for PushStockSource {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[async_trait]
impl StockSource for PushStockSource {
    fn name(&self) -> &'static str {
        "push"
    }

    async fn fetch(&self, since: Option<DateTime<Utc>>) -> Result<FetchOutcome, FetchError> {
        if self.task.is_finished() {
            return Err(FetchError::Connect("subscription task stopped".into()));
        }
        let latest = self.latest.borrow().clone();
        Ok(match latest {
            Some(snapshot) if is_newer(&snapshot, since) => FetchOutcome::Snapshot(snapshot),
            _ => FetchOutcome::NoNewData,
        })
    }
}

async fn run_subscription(url: String, backoff: Duration, tx: watch::Sender<Latest>) {
    let mut last_accepted: Option<DateTime<Utc>> = None;

    loop {
        info!(%url, "push subscription connecting");
        match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((mut ws, _)) => {
                info!(%url, "push subscription connected");
                while let Some(frame) = ws.next().await {
                    match frame {
                        Ok(WsMsg::Text(text)) => match accept_frame(&text, &mut last_accepted) {
                            Ok(Some(snapshot)) => {
                                info!(updated_at = %snapshot.updated_at, "push snapshot accepted");
                                tx.send_replace(Some(Arc::new(snapshot)));
                            }
                            Ok(None) => debug!("push snapshot not newer, ignored"),
                            Err(err) => warn!(error = %err, "push frame rejected"),
                        },
                        Ok(WsMsg::Close(_)) => break,
                        Ok(_) => {}
                        Err(err) => {
                            warn!(error = %err, "push subscription read failed");
                            break;
                        }
                    }
                }
                warn!(%url, backoff_secs = backoff.as_secs(), "push subscription closed, reconnecting");
            }
            Err(err) => {
                warn!(%url, error = %err, backoff_secs = backoff.as_secs(), "push connect failed, retrying");
            }
        }

        if tx.is_closed() {
            return;
        }
        tokio::time::sleep(backoff).await;
    }
}

/// Normalises one frame; returns it only if strictly newer than the last
/// accepted `updated_at`, which it then advances.
fn accept_frame(
    text: &str,
    last_accepted: &mut Option<DateTime<Utc>>,
) -> Result<Option<StockSnapshot>, NormalizeError> {
    let snapshot = StockSnapshot::from_json(text, Utc::now())?;
    if !is_newer(&snapshot, *last_accepted) {
        return Ok(None);
    }
    *last_accepted = Some(snapshot.updated_at);
    Ok(Some(snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(updated_at: &str) -> String {
        format!(r#"{{"status":"success","updated_at":"{updated_at}","data":{{"seed":{{"items":[]}}}}}}"#)
    }

    #[test]
    fn accepts_only_strictly_newer_frames() {
        let mut last = None;
        assert!(accept_frame(&frame("2025-07-20T10:00:00Z"), &mut last).unwrap().is_some());
        assert!(accept_frame(&frame("2025-07-20T10:00:00Z"), &mut last).unwrap().is_none());
        assert!(accept_frame(&frame("2025-07-20T09:55:00Z"), &mut last).unwrap().is_none());
        assert!(accept_frame(&frame("2025-07-20T10:05:00Z"), &mut last).unwrap().is_some());
        assert_eq!(last.map(|t| t.to_rfc3339()), Some("2025-07-20T10:05:00+00:00".to_string()));
    }

    #[test]
    fn malformed_frames_leave_cursor_untouched() {
        let mut last = None;
        assert!(accept_frame("not json", &mut last).is_err());
        assert!(last.is_none());
    }
}
