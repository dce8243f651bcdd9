use std::sync::{Arc, RwLock};

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{InterestToken, PreferenceError, PreferenceStore, Preferences};

/// Shared, atomically replaced view of all subscriber preferences.
///
/// Readers take an `Arc<Preferences>` snapshot and keep it for a whole
/// notification cycle. Writers are serialised, persist first, then swap.
#[derive(Clone)]
pub struct SubscriberBook {
    store: Arc<dyn PreferenceStore>,
    current: Arc<RwLock<Arc<Preferences>>>,
    writer: Arc<Mutex<()>>,
}

impl SubscriberBook {
    pub async fn open(store: Arc<dyn PreferenceStore>) -> Result<Self, PreferenceError> {
        let prefs = store.load_all().await?;
        Ok(Self::with_preferences(store, prefs))
    }

    pub fn with_preferences(store: Arc<dyn PreferenceStore>, prefs: Preferences) -> Self {
        Self {
            store,
            current: Arc::new(RwLock::new(Arc::new(prefs))),
            writer: Arc::new(Mutex::new(())),
        }
    }

    pub fn snapshot(&self) -> Arc<Preferences> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    fn replace(&self, prefs: Preferences) {
        let next = Arc::new(prefs);
        match self.current.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// Re-reads the store. On failure the previous snapshot stays in place.
    pub async fn reload(&self) -> Result<usize, PreferenceError> {
        let _writer = self.writer.lock().await;
        match self.store.load_all().await {
            Ok(prefs) => {
                let count = prefs.len();
                self.replace(prefs);
                info!(subscribers = count, "preferences reloaded");
                Ok(count)
            }
            Err(err) => {
                warn!(error = %err, "preference reload failed, keeping previous snapshot");
                Err(err)
            }
        }
    }

    pub fn interests(&self, address: &str) -> Vec<InterestToken> {
        self.snapshot()
            .get(address)
            .map(|tokens| tokens.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Replaces a subscriber's interests and persists. Returns the stored
    /// (normalised, de-duplicated) tokens.
    pub async fn set_interests(
        &self,
        address: &str,
        tokens: Vec<InterestToken>,
    ) -> Result<Vec<InterestToken>, PreferenceError> {
        let _writer = self.writer.lock().await;
        let mut next = (*self.snapshot()).clone();
        next.set(address, tokens);
        self.store.save_all(&next).await?;
        let stored = next
            .get(address)
            .map(|t| t.iter().cloned().collect())
            .unwrap_or_default();
        self.replace(next);
        info!(%address, "subscriber interests updated");
        Ok(stored)
    }

    /// Removes a subscriber. Returns whether anything was removed.
    pub async fn clear(&self, address: &str) -> Result<bool, PreferenceError> {
        let _writer = self.writer.lock().await;
        let mut next = (*self.snapshot()).clone();
        if !next.remove(address) {
            return Ok(false);
        }
        self.store.save_all(&next).await?;
        self.replace(next);
        info!(%address, "subscriber interests cleared");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parse_interest_list, JsonFilePreferenceStore, MemoryPreferenceStore};

    #[tokio::test]
    async fn snapshots_are_not_affected_by_later_writes() {
        let store = Arc::new(MemoryPreferenceStore::default());
        let book = SubscriberBook::open(store.clone()).await.expect("open");

        let before = book.snapshot();
        book.set_interests("a@s.whatsapp.net", parse_interest_list("carrot"))
            .await
            .expect("set");

        assert!(before.is_empty());
        assert_eq!(book.snapshot().len(), 1);
        assert_eq!(store.load_all().await.expect("load").len(), 1);
    }

    #[tokio::test]
    async fn reload_picks_up_external_writes() {
        let store = Arc::new(MemoryPreferenceStore::default());
        let book = SubscriberBook::open(store.clone()).await.expect("open");

        let mut external = Preferences::default();
        external.set("b@g.us", parse_interest_list("gear:all"));
        store.replace(external.clone());

        assert!(book.snapshot().is_empty());
        assert_eq!(book.reload().await.expect("reload"), 1);
        assert_eq!(*book.snapshot(), external);
    }

    #[tokio::test]
    async fn failed_reload_keeps_previous_snapshot() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("userdata.json");
        let store = Arc::new(JsonFilePreferenceStore::new(&path));
        let book = SubscriberBook::open(store).await.expect("open");
        book.set_interests("a@g.us", parse_interest_list("carrot"))
            .await
            .expect("set");

        std::fs::write(&path, "{broken").expect("corrupt file");
        assert!(book.reload().await.is_err());
        assert_eq!(book.interests("a@g.us"), parse_interest_list("carrot"));
    }

    #[tokio::test]
    async fn clear_removes_and_persists() {
        let store = Arc::new(MemoryPreferenceStore::default());
        let book = SubscriberBook::open(store.clone()).await.expect("open");
        book.set_interests("a@g.us", parse_interest_list("carrot, rareitems"))
            .await
            .expect("set");

        assert!(book.clear("a@g.us").await.expect("clear"));
        assert!(!book.clear("a@g.us").await.expect("second clear"));
        assert!(book.interests("a@g.us").is_empty());
        assert!(store.load_all().await.expect("load").is_empty());
    }

    #[tokio::test]
    async fn set_interests_deduplicates() {
        let book = SubscriberBook::open(Arc::new(MemoryPreferenceStore::default()))
            .await
            .expect("open");
        let stored = book
            .set_interests("a@g.us", parse_interest_list("Carrot, carrot, seed:all"))
            .await
            .expect("set");
        assert_eq!(stored.len(), 2);
    }
}
