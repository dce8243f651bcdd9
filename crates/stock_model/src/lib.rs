//! Shared shop-stock model: categories, snapshots, display tables and the
//! countdown parser.

mod category;
mod countdown;
mod display;
mod report;
mod snapshot;

pub use category::{CategoryDescriptor, CategoryId, UnknownCategory, CATEGORIES};
pub use countdown::{countdown_duration, parse_countdown};
pub use display::{display_name, display_symbol, format_clock, is_rare, GENERIC_SYMBOL, RARE_ITEMS};
pub use report::render_stock_report;
pub use snapshot::{
    CategoryState, Item, NormalizeError, Presence, StockSnapshot, UpstreamCategory,
    UpstreamItem, UpstreamPayload,
};
