//! Per-category change detection: decides whether a category's items differ
//! from what was last notified, throttled by a per-category cool-down.

use std::collections::BTreeMap;
use std::time::Duration;

use sha2::{Digest, Sha256};
use stock_model::{CategoryId, CategoryState, Item};
use tokio::time::Instant;
use tracing::debug;

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryFingerprint {
    pub last_content_hash: Option<String>,
    pub last_checked_at: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Changed,
    Unchanged,
    CoolingDown,
    Departed,
}

impl Verdict {
    pub fn should_notify(self) -> bool {
        self == Verdict::Changed
    }
}

impl CategoryFingerprint {
    pub fn evaluate(&mut self, state: &CategoryState, cooldown: Duration, now: Instant) -> Verdict {
        if state.is_departed() {
            *self = Self::default();
            return Verdict::Departed;
        }

        if let Some(checked) = self.last_checked_at {
            if now.saturating_duration_since(checked) < cooldown {
                return Verdict::CoolingDown;
            }
        }

        let hash = content_hash(&state.items);
        self.last_checked_at = Some(now);
        if self.last_content_hash.as_deref() == Some(hash.as_str()) {
            return Verdict::Unchanged;
        }
        self.last_content_hash = Some(hash);
        Verdict::Changed
    }
}

/// SHA-256 over `(lower-cased name, quantity)` pairs in sorted order, so the
/// same multiset always hashes the same regardless of upstream ordering.
pub fn content_hash(items: &[Item]) -> String {
    let mut entries: Vec<(String, u64)> = items.iter().map(|i| (i.key(), i.quantity)).collect();
    entries.sort();

    let mut hasher = Sha256::new();
    for (key, quantity) in &entries {
        hasher.update(key.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(quantity.to_le_bytes());
        hasher.update(b"\x1e");
    }
    format!("{:x}", hasher.finalize())
}

/// Fingerprints for the categories one scheduling lane owns.
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    default_cooldown: Duration,
    cooldowns: BTreeMap<CategoryId, Duration>,
    fingerprints: BTreeMap<CategoryId, CategoryFingerprint>,
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

impl ChangeDetector {
    pub fn new(default_cooldown: Duration) -> Self {
        Self {
            default_cooldown,
            cooldowns: BTreeMap::new(),
            fingerprints: BTreeMap::new(),
        }
    }

    pub fn with_cooldowns(mut self, cooldowns: &BTreeMap<CategoryId, Duration>) -> Self {
        self.cooldowns.extend(cooldowns.iter().map(|(k, v)| (*k, *v)));
        self
    }

    pub fn cooldown(&self, category: CategoryId) -> Duration {
        self.cooldowns
            .get(&category)
            .copied()
            .unwrap_or(self.default_cooldown)
    }

    pub fn fingerprint(&self, category: CategoryId) -> Option<&CategoryFingerprint> {
        self.fingerprints.get(&category)
    }

    pub fn should_notify(&mut self, category: CategoryId, state: &CategoryState) -> bool {
        self.should_notify_at(category, state, Instant::now())
    }

    pub fn should_notify_at(&mut self, category: CategoryId, state: &CategoryState, now: Instant) -> bool {
        self.evaluate_at(category, state, now).should_notify()
    }

    pub fn evaluate_at(&mut self, category: CategoryId, state: &CategoryState, now: Instant) -> Verdict {
        let cooldown = self.cooldown(category);
        let verdict = self
            .fingerprints
            .entry(category)
            .or_default()
            .evaluate(state, cooldown, now);
        debug!(%category, ?verdict, items = state.items.len(), "change check");
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stock_model::Presence;

    fn seeds(items: &[(&str, u64)]) -> CategoryState {
        CategoryState::with_items(items.iter().map(|(n, q)| Item::new(*n, *q)).collect())
    }

    #[test]
    fn identical_content_notifies_once() {
        let mut detector = ChangeDetector::new(Duration::ZERO);
        let now = Instant::now();
        let state = seeds(&[("Carrot", 5)]);

        assert!(detector.should_notify_at(CategoryId::Seed, &state, now));
        assert!(!detector.should_notify_at(CategoryId::Seed, &state, now + Duration::from_secs(1)));
    }

    #[test]
    fn cooldown_skips_without_touching_fingerprint() {
        let mut detector = ChangeDetector::new(Duration::from_secs(30));
        let start = Instant::now();
        assert!(detector.should_notify_at(CategoryId::Seed, &seeds(&[("Carrot", 5)]), start));
        let before = detector.fingerprint(CategoryId::Seed).cloned();

        let changed = seeds(&[("Carrot", 6)]);
        let verdict = detector.evaluate_at(CategoryId::Seed, &changed, start + Duration::from_secs(10));
        assert_eq!(verdict, Verdict::CoolingDown);
        assert_eq!(detector.fingerprint(CategoryId::Seed).cloned(), before);

        assert!(detector.should_notify_at(CategoryId::Seed, &changed, start + Duration::from_secs(31)));
    }

    #[test]
    fn unchanged_after_cooldown_refreshes_last_checked() {
        let mut detector = ChangeDetector::new(Duration::from_secs(30));
        let start = Instant::now();
        let state = seeds(&[("Carrot", 5)]);
        assert!(detector.should_notify_at(CategoryId::Seed, &state, start));

        let later = start + Duration::from_secs(45);
        assert_eq!(detector.evaluate_at(CategoryId::Seed, &state, later), Verdict::Unchanged);
        assert_eq!(
            detector.fingerprint(CategoryId::Seed).and_then(|f| f.last_checked_at),
            Some(later)
        );

        // Cool-down window restarted from `later`.
        let verdict = detector.evaluate_at(CategoryId::Seed, &seeds(&[("Carrot", 1)]), later + Duration::from_secs(5));
        assert_eq!(verdict, Verdict::CoolingDown);
    }

    #[test]
    fn departed_merchant_clears_fingerprint_and_never_notifies() {
        let mut detector = ChangeDetector::new(Duration::ZERO);
        let now = Instant::now();
        let present = seeds(&[("Night Staff", 1)]);
        assert!(detector.should_notify_at(CategoryId::TravelingMerchant, &present, now));

        let departed = CategoryState {
            presence: Presence::Departed,
            ..present.clone()
        };
        assert_eq!(
            detector.evaluate_at(CategoryId::TravelingMerchant, &departed, now),
            Verdict::Departed
        );
        assert_eq!(
            detector.fingerprint(CategoryId::TravelingMerchant),
            Some(&CategoryFingerprint::default())
        );

        // The same stock on the merchant's return counts as new.
        assert!(detector.should_notify_at(CategoryId::TravelingMerchant, &present, now));
    }

    #[test]
    fn hash_ignores_order_and_name_case() {
        let a = content_hash(&[Item::new("Carrot", 5), Item::new("Tomato", 2)]);
        let b = content_hash(&[Item::new("tomato", 2), Item::new("CARROT", 5)]);
        let c = content_hash(&[Item::new("Carrot", 4), Item::new("Tomato", 2)]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn per_category_cooldown_overrides_default() {
        let overrides = BTreeMap::from([(CategoryId::Cosmetics, Duration::from_secs(600))]);
        let detector = ChangeDetector::new(Duration::from_secs(30)).with_cooldowns(&overrides);
        assert_eq!(detector.cooldown(CategoryId::Cosmetics), Duration::from_secs(600));
        assert_eq!(detector.cooldown(CategoryId::Seed), Duration::from_secs(30));
    }
}
