use chrono::{DateTime, FixedOffset, Utc};

use crate::CategoryId;

pub const GENERIC_SYMBOL: &str = "📦";

/// Items that are emphasised in notifications and bundled by the
/// `rareitems` interest token.
pub const RARE_ITEMS: &[&str] = &[
    "grandmaster sprinkler",
    "levelup lollipop",
    "master sprinkler",
    "godly sprinkler",
    "bug egg",
    "paradise egg",
    "romanesco",
    "cacao",
    "elder strawberry",
    "giant pinecone",
    "burning bud",
    "sugar apple",
    "ember lily",
    "beanstalk",
    "grape",
    "mushroom",
    "pepper",
];

const COSMETIC_SYMBOLS: &[(&str, &str)] = &[
    ("beach crate", "🏖️"),
    ("sign crate", "📋"),
    ("red tractor", "🚜"),
    ("green tractor", "🚜"),
    ("compost bin", "♻️"),
    ("torch", "🔥"),
    ("light on ground", "💡"),
    ("mini tv", "📺"),
    ("small stone table", "🪨"),
    ("medium stone table", "🪨"),
    ("rock pile", "🪨"),
    ("log bench", "🪑"),
    ("brown bench", "🪑"),
    ("medium wood flooring", "🧱"),
    ("large wood flooring", "🧱"),
    ("frog fountain", "⛲"),
    ("wood pile", "🪵"),
    ("night staff", "🌙"),
    ("summer fun crate", "🏝️"),
    ("rake", "🍂"),
    ("bird bath", "🐦"),
    ("stone lantern", "🏮"),
    ("mutation spray wet", "💧"),
    ("mutation spray windstruck", "🌪️"),
    ("crate", "📦"),
    ("sign", "📝"),
    ("compost", "🗑️"),
    ("light", "💡"),
    ("tv", "📺"),
    ("table", "🪑"),
    ("stone", "🪨"),
    ("bench", "🪑"),
    ("flooring", "🧱"),
    ("fountain", "⛲"),
    ("log", "🪵"),
    ("staff", "🌙"),
];

pub fn is_rare(key: &str) -> bool {
    RARE_ITEMS.contains(&key)
}

/// Lower-cased name with its first character upper-cased: `"ember lily"` →
/// `"Ember lily"`.
pub fn display_name(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Cosmetics table first (cosmetics only), then the upstream glyph, then the
/// generic box.
pub fn display_symbol<'a>(category: CategoryId, key: &str, upstream: Option<&'a str>) -> &'a str {
    if category == CategoryId::Cosmetics {
        if let Some((_, symbol)) = COSMETIC_SYMBOLS.iter().find(|(name, _)| *name == key) {
            return *symbol;
        }
    }
    match upstream {
        Some(symbol) if !symbol.trim().is_empty() => symbol,
        _ => GENERIC_SYMBOL,
    }
}

/// 24-hour wall clock in the given offset, dot separated (`14.05.09`).
pub fn format_clock(at: DateTime<Utc>, offset: FixedOffset) -> String {
    at.with_timezone(&offset).format("%H.%M.%S").to_string()
}
