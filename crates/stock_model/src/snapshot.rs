use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::CategoryId;

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("upstream reported status `{0}`")]
    NotSuccess(String),
    #[error("invalid upstream json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid `{key}` category: {source}")]
    Category {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Raw body of the stock endpoint (and of each push frame).
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamPayload {
    pub status: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamCategory {
    #[serde(default)]
    pub items: Vec<UpstreamItem>,
    pub countdown: Option<String>,
    pub appear_in: Option<String>,
    pub status: Option<String>,
    pub merchant_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamItem {
    pub name: String,
    #[serde(default)]
    pub quantity: u64,
    pub emoji: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    pub quantity: u64,
    pub display_symbol: Option<String>,
}

impl Item {
    pub fn new(name: impl Into<String>, quantity: u64) -> Self {
        Self {
            name: name.into(),
            quantity,
            display_symbol: None,
        }
    }

    /// Lower-cased name; the identity used for matching.
    pub fn key(&self) -> String {
        self.name.to_lowercase()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    #[default]
    Present,
    Departed,
}

impl Presence {
    fn from_status(status: Option<&str>) -> Self {
        match status.map(|s| s.trim().to_ascii_lowercase()) {
            Some(s) if matches!(s.as_str(), "leaved" | "departed" | "left") => Presence::Departed,
            _ => Presence::Present,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryState {
    pub items: Vec<Item>,
    pub countdown: Option<String>,
    pub appear_in: Option<String>,
    pub presence: Presence,
    pub merchant_name: Option<String>,
}

impl CategoryState {
    pub fn with_items(items: Vec<Item>) -> Self {
        Self {
            items,
            ..Self::default()
        }
    }

    pub fn is_departed(&self) -> bool {
        self.presence == Presence::Departed
    }
}

impl From<UpstreamCategory> for CategoryState {
    fn from(raw: UpstreamCategory) -> Self {
        Self {
            items: raw
                .items
                .into_iter()
                .map(|item| Item {
                    name: item.name,
                    quantity: item.quantity,
                    display_symbol: item.emoji,
                })
                .collect(),
            countdown: raw.countdown,
            appear_in: raw.appear_in,
            presence: Presence::from_status(raw.status.as_deref()),
            merchant_name: raw.merchant_name,
        }
    }
}

/// Immutable view of the whole inventory at one upstream update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub fetched_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub categories: BTreeMap<CategoryId, CategoryState>,
}

impl StockSnapshot {
    pub fn new(updated_at: DateTime<Utc>) -> Self {
        Self {
            fetched_at: Utc::now(),
            updated_at,
            categories: BTreeMap::new(),
        }
    }

    pub fn with_category(mut self, id: CategoryId, state: CategoryState) -> Self {
        self.categories.insert(id, state);
        self
    }

    pub fn category(&self, id: CategoryId) -> Option<&CategoryState> {
        self.categories.get(&id)
    }

    pub fn from_json(body: &str, fetched_at: DateTime<Utc>) -> Result<Self, NormalizeError> {
        let payload: UpstreamPayload = serde_json::from_str(body)?;
        Self::from_payload(payload, fetched_at)
    }

    /// Normalises an upstream payload. Unknown category keys are skipped.
    pub fn from_payload(
        payload: UpstreamPayload,
        fetched_at: DateTime<Utc>,
    ) -> Result<Self, NormalizeError> {
        if payload.status != "success" {
            return Err(NormalizeError::NotSuccess(payload.status));
        }

        let mut categories = BTreeMap::new();
        for (key, value) in payload.data {
            let Some(id) = CategoryId::from_key(&key) else {
                continue;
            };
            let raw: UpstreamCategory = serde_json::from_value(value)
                .map_err(|source| NormalizeError::Category { key, source })?;
            categories.insert(id, CategoryState::from(raw));
        }

        Ok(Self {
            fetched_at,
            updated_at: payload.updated_at,
            categories,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{
        "status": "success",
        "updated_at": "2025-07-20T10:05:12.000Z",
        "data": {
            "seed": { "items": [{ "name": "Carrot", "quantity": 5, "emoji": "🥕" }], "countdown": "4m 48s" },
            "travelingmerchant": {
                "items": [],
                "status": "leaved",
                "appearIn": "1h 2m",
                "merchantName": "Gnome Merchant"
            },
            "weather": { "current": "rain" }
        }
    }"#;

    #[test]
    fn normalises_known_categories_and_skips_the_rest() {
        let snapshot = StockSnapshot::from_json(BODY, Utc::now()).expect("valid payload");
        assert_eq!(snapshot.categories.len(), 2);

        let seed = snapshot.category(CategoryId::Seed).expect("seed present");
        assert_eq!(seed.items, vec![Item {
            name: "Carrot".into(),
            quantity: 5,
            display_symbol: Some("🥕".into()),
        }]);
        assert_eq!(seed.countdown.as_deref(), Some("4m 48s"));
        assert_eq!(seed.presence, Presence::Present);

        let merchant = snapshot
            .category(CategoryId::TravelingMerchant)
            .expect("merchant present");
        assert!(merchant.is_departed());
        assert_eq!(merchant.appear_in.as_deref(), Some("1h 2m"));
        assert_eq!(merchant.merchant_name.as_deref(), Some("Gnome Merchant"));
    }

    #[test]
    fn rejects_non_success_status() {
        let body = r#"{"status":"error","updated_at":"2025-07-20T10:05:12Z","data":{}}"#;
        let err = StockSnapshot::from_json(body, Utc::now()).expect_err("should reject");
        assert!(matches!(err, NormalizeError::NotSuccess(status) if status == "error"));
    }

    #[test]
    fn reports_malformed_known_category() {
        let body = r#"{"status":"success","updated_at":"2025-07-20T10:05:12Z","data":{"gear":{"items":"nope"}}}"#;
        let err = StockSnapshot::from_json(body, Utc::now()).expect_err("should reject");
        assert!(err.to_string().contains("`gear`"));
    }

    #[test]
    fn item_key_is_lower_cased() {
        assert_eq!(Item::new("Ember Lily", 1).key(), "ember lily");
    }
}
