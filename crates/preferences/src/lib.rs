//! Subscriber interest preferences and their persistence.

mod book;
mod file_store;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Mutex;

use async_trait::async_trait;
use stock_model::CategoryId;
use thiserror::Error;

pub use book::SubscriberBook;
pub use file_store::JsonFilePreferenceStore;

pub const RARE_ITEMS_TOKEN: &str = "rareitems";
const CATEGORY_ALL_SUFFIX: &str = ":all";

#[derive(Debug, Error)]
pub enum PreferenceError {
    #[error("preference file io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("preference file is not valid json: {0}")]
    Json(#[from] serde_json::Error),
}

/// One unit of a subscriber's declared interest.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InterestToken {
    /// Lower-cased item name.
    Item(String),
    /// `<category>:all`
    CategoryAll(CategoryId),
    /// The fixed rare-item bundle.
    RareItems,
}

impl InterestToken {
    /// Trims and lower-cases; `None` for blank input.
    pub fn parse(raw: &str) -> Option<Self> {
        let token = raw.trim().to_lowercase();
        if token.is_empty() {
            return None;
        }
        if token == RARE_ITEMS_TOKEN {
            return Some(InterestToken::RareItems);
        }
        if let Some(category) = token
            .strip_suffix(CATEGORY_ALL_SUFFIX)
            .and_then(CategoryId::from_key)
        {
            return Some(InterestToken::CategoryAll(category));
        }
        Some(InterestToken::Item(token))
    }
}

impl fmt::Display for InterestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterestToken::Item(name) => f.write_str(name),
            InterestToken::CategoryAll(category) => write!(f, "{category}{CATEGORY_ALL_SUFFIX}"),
            InterestToken::RareItems => f.write_str(RARE_ITEMS_TOKEN),
        }
    }
}

/// Splits a comma separated list such as `"blueberry, seed:all, Rareitems"`.
pub fn parse_interest_list(raw: &str) -> Vec<InterestToken> {
    raw.split(',').filter_map(InterestToken::parse).collect()
}

/// Subscriber address → interest tokens. Immutable once shared; mutations go
/// through [`SubscriberBook`], which swaps in a new value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preferences {
    subscribers: BTreeMap<String, BTreeSet<InterestToken>>,
}

impl Preferences {
    pub fn from_raw(raw: BTreeMap<String, Vec<String>>) -> Self {
        let mut prefs = Self::default();
        for (address, tokens) in raw {
            prefs.set(address, tokens.iter().filter_map(|t| InterestToken::parse(t)));
        }
        prefs
    }

    pub fn to_raw(&self) -> BTreeMap<String, Vec<String>> {
        self.subscribers
            .iter()
            .map(|(address, tokens)| {
                (address.clone(), tokens.iter().map(ToString::to_string).collect())
            })
            .collect()
    }

    /// Replaces a subscriber's tokens; an empty set removes the subscriber.
    pub fn set(&mut self, address: impl Into<String>, tokens: impl IntoIterator<Item = InterestToken>) {
        let address = address.into();
        let tokens: BTreeSet<_> = tokens.into_iter().collect();
        if tokens.is_empty() {
            self.subscribers.remove(&address);
        } else {
            self.subscribers.insert(address, tokens);
        }
    }

    pub fn remove(&mut self, address: &str) -> bool {
        self.subscribers.remove(address).is_some()
    }

    pub fn get(&self, address: &str) -> Option<&BTreeSet<InterestToken>> {
        self.subscribers.get(address)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<InterestToken>)> {
        self.subscribers.iter().map(|(a, t)| (a.as_str(), t))
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn load_all(&self) -> Result<Preferences, PreferenceError>;

    async fn save_all(&self, prefs: &Preferences) -> Result<(), PreferenceError>;
}

/// Store that lives only in memory.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    prefs: Mutex<Preferences>,
}

impl MemoryPreferenceStore {
    pub fn new(prefs: Preferences) -> Self {
        Self {
            prefs: Mutex::new(prefs),
        }
    }

    /// Overwrites the stored value without going through a book, as an
    /// external writer would.
    pub fn replace(&self, prefs: Preferences) {
        if let Ok(mut guard) = self.prefs.lock() {
            *guard = prefs;
        }
    }
}

#[async_trait]
impl PreferenceStore for MemoryPreferenceStore {
    async fn load_all(&self) -> Result<Preferences, PreferenceError> {
        Ok(self.prefs.lock().map(|g| g.clone()).unwrap_or_default())
    }

    async fn save_all(&self, prefs: &Preferences) -> Result<(), PreferenceError> {
        self.replace(prefs.clone());
        Ok(())
    }
}
