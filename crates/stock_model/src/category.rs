use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Partitions of the upstream inventory. Declaration order is the order in
/// which categories appear in notifications and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryId {
    Seed,
    Gear,
    Egg,
    Honey,
    Cosmetics,
    #[serde(rename = "travelingmerchant")]
    TravelingMerchant,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown category `{0}`")]
pub struct UnknownCategory(pub String);

/// Static facts about a category.
#[derive(Debug, Clone, Copy)]
pub struct CategoryDescriptor {
    pub id: CategoryId,
    pub key: &'static str,
    pub title: &'static str,
    pub refresh_interval: Duration,
    /// Category comes and goes; its next change is announced by a countdown.
    pub presence_aware: bool,
}

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;

pub const CATEGORIES: [CategoryDescriptor; 6] = [
    CategoryDescriptor {
        id: CategoryId::Seed,
        key: "seed",
        title: "🌱 Seeds Stock",
        refresh_interval: Duration::from_secs(5 * MINUTE),
        presence_aware: false,
    },
    CategoryDescriptor {
        id: CategoryId::Gear,
        key: "gear",
        title: "⚙️ Gear Stock",
        refresh_interval: Duration::from_secs(5 * MINUTE),
        presence_aware: false,
    },
    CategoryDescriptor {
        id: CategoryId::Egg,
        key: "egg",
        title: "🥚 Egg Stock",
        refresh_interval: Duration::from_secs(15 * MINUTE),
        presence_aware: false,
    },
    CategoryDescriptor {
        id: CategoryId::Honey,
        key: "honey",
        title: "🍯 Honey Stock",
        refresh_interval: Duration::from_secs(15 * MINUTE),
        presence_aware: false,
    },
    CategoryDescriptor {
        id: CategoryId::Cosmetics,
        key: "cosmetics",
        title: "🎨 Cosmetic Items",
        refresh_interval: Duration::from_secs(3 * HOUR),
        presence_aware: false,
    },
    CategoryDescriptor {
        id: CategoryId::TravelingMerchant,
        key: "travelingmerchant",
        title: "🧳 Traveling Merchant",
        refresh_interval: Duration::from_secs(4 * HOUR),
        presence_aware: true,
    },
];

impl CategoryId {
    pub const ALL: [CategoryId; 6] = [
        CategoryId::Seed,
        CategoryId::Gear,
        CategoryId::Egg,
        CategoryId::Honey,
        CategoryId::Cosmetics,
        CategoryId::TravelingMerchant,
    ];

    pub fn descriptor(self) -> &'static CategoryDescriptor {
        // CATEGORIES is indexed by declaration order.
        &CATEGORIES[self as usize]
    }

    pub fn key(self) -> &'static str {
        self.descriptor().key
    }

    pub fn title(self) -> &'static str {
        self.descriptor().title
    }

    pub fn from_key(key: &str) -> Option<Self> {
        CATEGORIES
            .iter()
            .find(|d| d.key.eq_ignore_ascii_case(key))
            .map(|d| d.id)
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for CategoryId {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CategoryId::from_key(s.trim()).ok_or_else(|| UnknownCategory(s.to_string()))
    }
}
