use std::sync::Arc;

use admin_ipc::{AdminRequest, AdminResponse, LaneStatus, MonitorStatus};
use chrono::FixedOffset;
use preferences::{parse_interest_list, InterestToken, SubscriberBook};
use scheduler::Monitor;
use stock_model::{render_stock_report, StockSnapshot};
use stock_source::{FetchOutcome, StockSource};
use tracing::warn;

pub const STOCK_UNAVAILABLE: &str = "❌ Gagal mengambil data stock.";

/// Answers admin requests against the running monitor.
#[derive(Clone)]
pub struct AdminContext {
    pub run_id: String,
    pub monitor: Monitor,
    pub book: SubscriberBook,
    pub source: Arc<dyn StockSource>,
    pub offset: FixedOffset,
}

impl AdminContext {
    pub async fn handle(self, req: AdminRequest) -> anyhow::Result<AdminResponse> {
        match req {
            AdminRequest::Status => Ok(AdminResponse::Status(self.status())),
            AdminRequest::Reload => {
                let count = self.book.reload().await?;
                Ok(AdminResponse::Text(format!("reloaded {count} subscribers")))
            }
            AdminRequest::Stock => Ok(match self.current_stock().await {
                Some(snapshot) => AdminResponse::Text(render_stock_report(&snapshot, self.offset)),
                None => AdminResponse::Error(STOCK_UNAVAILABLE.to_string()),
            }),
            AdminRequest::SetItems { address, items } => {
                let tokens = parse_interest_list(&items);
                if tokens.is_empty() {
                    return Ok(AdminResponse::Error("no items given".to_string()));
                }
                let stored = self.book.set_interests(&address, tokens).await?;
                Ok(AdminResponse::Items(token_strings(&stored)))
            }
            AdminRequest::MyItems { address } => {
                Ok(AdminResponse::Items(token_strings(&self.book.interests(&address))))
            }
            AdminRequest::ClearItems { address } => {
                self.book.clear(&address).await?;
                Ok(AdminResponse::Ack)
            }
        }
    }

    fn status(&self) -> MonitorStatus {
        let lanes = self
            .monitor
            .status()
            .into_iter()
            .map(|view| LaneStatus {
                lane: view.lane.to_string(),
                state: view.state.to_string(),
                next_fire_in_secs: view.next_fire_in.map(|d| d.as_secs()),
            })
            .collect();
        MonitorStatus {
            run_id: self.run_id.clone(),
            source: self.monitor.source_name().to_string(),
            policy: self.monitor.config().policy.to_string(),
            subscribers: self.book.snapshot().len(),
            last_updated_at: self
                .monitor
                .latest_snapshot()
                .map(|snapshot| snapshot.updated_at.to_rfc3339()),
            lanes,
        }
    }

    /// Fresh upstream data when reachable, otherwise the newest snapshot the
    /// monitor has seen.
    async fn current_stock(&self) -> Option<Arc<StockSnapshot>> {
        match self.source.fetch(None).await {
            Ok(FetchOutcome::Snapshot(snapshot)) => Some(snapshot),
            Ok(FetchOutcome::NoNewData) => self.monitor.latest_snapshot(),
            Err(err) => {
                warn!(error = %err, "on-demand stock fetch failed");
                self.monitor.latest_snapshot()
            }
        }
    }
}

fn token_strings(tokens: &[InterestToken]) -> Vec<String> {
    tokens.iter().map(ToString::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use metrics::MetricsHandle;
    use notifier::DryRunSender;
    use preferences::{JsonFilePreferenceStore, PreferenceStore};
    use scheduler::MonitorConfig;
    use stock_model::{CategoryId, CategoryState, Item};
    use stock_source::FetchError;

    struct Fixed(Option<Arc<StockSnapshot>>);

    #[async_trait]
    impl StockSource for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn fetch(&self, _since: Option<DateTime<Utc>>) -> Result<FetchOutcome, FetchError> {
            match &self.0 {
                Some(snapshot) => Ok(FetchOutcome::Snapshot(Arc::clone(snapshot))),
                None => Err(FetchError::Status(502)),
            }
        }
    }

    async fn context(dir: &tempfile::TempDir, snapshot: Option<StockSnapshot>) -> AdminContext {
        let store: Arc<dyn PreferenceStore> =
            Arc::new(JsonFilePreferenceStore::new(dir.path().join("prefs.json")));
        let book = SubscriberBook::open(store).await.expect("open book");
        let source: Arc<dyn StockSource> = Arc::new(Fixed(snapshot.map(Arc::new)));
        let config = MonitorConfig::default();
        let offset = config.utc_offset;
        let monitor = Monitor::new(
            Arc::clone(&source),
            Arc::new(DryRunSender),
            book.clone(),
            MetricsHandle::new().expect("metrics"),
            config,
        );
        AdminContext {
            run_id: "run-1".into(),
            monitor,
            book,
            source,
            offset,
        }
    }

    #[tokio::test]
    async fn set_my_and_clear_items_round_trip_through_the_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = context(&dir, None).await;

        let set = ctx
            .clone()
            .handle(AdminRequest::SetItems {
                address: "a@g.us".into(),
                items: "Carrot, SEED:all, rareitems".into(),
            })
            .await
            .expect("set");
        assert_eq!(
            set,
            AdminResponse::Items(vec!["carrot".into(), "seed:all".into(), "rareitems".into()])
        );

        let status = ctx.clone().handle(AdminRequest::Status).await.expect("status");
        match status {
            AdminResponse::Status(status) => {
                assert_eq!(status.subscribers, 1);
                assert_eq!(status.source, "fixed");
                assert_eq!(status.lanes.len(), 6);
            }
            other => panic!("unexpected {other:?}"),
        }

        ctx.clone()
            .handle(AdminRequest::ClearItems {
                address: "a@g.us".into(),
            })
            .await
            .expect("clear");
        let mine = ctx
            .handle(AdminRequest::MyItems {
                address: "a@g.us".into(),
            })
            .await
            .expect("mine");
        assert_eq!(mine, AdminResponse::Items(Vec::new()));
    }

    #[tokio::test]
    async fn empty_item_lists_are_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = context(&dir, None).await;
        let resp = ctx
            .handle(AdminRequest::SetItems {
                address: "a@g.us".into(),
                items: " , ,".into(),
            })
            .await
            .expect("handled");
        assert!(matches!(resp, AdminResponse::Error(_)));
    }

    #[tokio::test]
    async fn stock_report_uses_fresh_data_or_reports_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let snapshot = StockSnapshot::new(Utc.with_ymd_and_hms(2025, 7, 20, 3, 5, 12).unwrap())
            .with_category(
                CategoryId::Seed,
                CategoryState::with_items(vec![Item::new("Carrot", 5)]),
            );

        let ctx = context(&dir, Some(snapshot)).await;
        match ctx.handle(AdminRequest::Stock).await.expect("stock") {
            AdminResponse::Text(text) => {
                assert!(text.starts_with("📊 *STOK TERKINI*"));
                assert!(text.contains("Carrot (5x)"));
            }
            other => panic!("unexpected {other:?}"),
        }

        let ctx = context(&dir, None).await;
        assert_eq!(
            ctx.handle(AdminRequest::Stock).await.expect("stock"),
            AdminResponse::Error(STOCK_UNAVAILABLE.to_string())
        );
    }
}
