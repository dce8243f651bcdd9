use std::collections::BTreeSet;

use chrono::{DateTime, FixedOffset, Utc};
use preferences::{InterestToken, Preferences};
use stock_model::{display_name, display_symbol, format_clock, is_rare, CategoryId, CategoryState, Item};

pub const BANNER: &str = "🔔 *STOCK UPDATE!*";
pub const FOOTER_PREFIX: &str = "Pesan otomatis";

/// One composed message, ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    pub address: String,
    pub text: String,
    pub item_count: usize,
}

pub fn is_interested(tokens: &BTreeSet<InterestToken>, category: CategoryId, key: &str) -> bool {
    tokens.contains(&InterestToken::CategoryAll(category))
        || (tokens.contains(&InterestToken::RareItems) && is_rare(key))
        || tokens.contains(&InterestToken::Item(key.to_owned()))
}

/// Rare items get the quoted, monospaced treatment; everything else is a
/// plain bullet.
pub fn render_line(category: CategoryId, item: &Item) -> String {
    let key = item.key();
    let symbol = display_symbol(category, &key, item.display_symbol.as_deref());
    let name = display_name(&key);
    if is_rare(&key) {
        format!("> {symbol} ```*{name} x{}*```", item.quantity)
    } else {
        format!("- {symbol} *{name} x{}*", item.quantity)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Composer {
    offset: FixedOffset,
}

impl Composer {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// One message per subscriber with at least one matching item. Output
    /// depends only on the arguments.
    pub fn compose(
        &self,
        changed: &[(CategoryId, &CategoryState)],
        prefs: &Preferences,
        at: DateTime<Utc>,
    ) -> Vec<Outgoing> {
        let mut ordered: Vec<_> = changed
            .iter()
            .filter(|(_, state)| !state.is_departed())
            .copied()
            .collect();
        ordered.sort_by_key(|(id, _)| *id);

        prefs
            .iter()
            .filter(|(_, tokens)| !tokens.is_empty())
            .filter_map(|(address, tokens)| {
                let (text, item_count) = self.compose_for(&ordered, tokens, at)?;
                Some(Outgoing {
                    address: address.to_string(),
                    text,
                    item_count,
                })
            })
            .collect()
    }

    fn compose_for(
        &self,
        ordered: &[(CategoryId, &CategoryState)],
        tokens: &BTreeSet<InterestToken>,
        at: DateTime<Utc>,
    ) -> Option<(String, usize)> {
        let mut sections = Vec::new();
        let mut item_count = 0;

        for (category, state) in ordered {
            let lines: Vec<String> = state
                .items
                .iter()
                .filter(|item| is_interested(tokens, *category, &item.key()))
                .map(|item| render_line(*category, item))
                .collect();
            if lines.is_empty() {
                continue;
            }
            item_count += lines.len();
            sections.push(format!("*{}*\n{}", category.title(), lines.join("\n")));
        }

        if sections.is_empty() {
            return None;
        }

        let text = format!(
            "{BANNER}\n\n{}\n\n_{FOOTER_PREFIX} • {}_",
            sections.join("\n\n"),
            format_clock(at, self.offset)
        );
        Some((text, item_count))
    }
}
