use std::fmt::Write;

use chrono::FixedOffset;

use crate::{format_clock, CategoryId, StockSnapshot, GENERIC_SYMBOL};

/// Human-readable overview of everything currently in stock.
pub fn render_stock_report(snapshot: &StockSnapshot, offset: FixedOffset) -> String {
    let mut out = String::from("📊 *STOK TERKINI*\n");
    let _ = writeln!(out, "_Update: {}_\n", format_clock(snapshot.updated_at, offset));

    for id in CategoryId::ALL {
        let Some(state) = snapshot.category(id) else {
            continue;
        };
        if state.items.is_empty() {
            continue;
        }

        let _ = writeln!(out, "*{}*", id.key().to_uppercase());
        let timer = state
            .countdown
            .as_deref()
            .or(state.appear_in.as_deref())
            .unwrap_or("N/A");
        let _ = writeln!(out, "⏱️ {timer}");
        for item in &state.items {
            let symbol = item.display_symbol.as_deref().unwrap_or(GENERIC_SYMBOL);
            let _ = writeln!(out, "▸ {symbol} {} ({}x)", item.name, item.quantity);
        }
        out.push('\n');
    }

    if let Some(merchant) = snapshot.category(CategoryId::TravelingMerchant) {
        let name = merchant
            .merchant_name
            .as_deref()
            .unwrap_or("Traveling Merchant");
        let status = if merchant.is_departed() {
            "❌ Telah pergi"
        } else {
            "✅ Tersedia"
        };
        let _ = writeln!(out, "*MERCHANT*: {name}");
        let _ = writeln!(out, "Status: {status}");
        let _ = writeln!(out, "Akan muncul: {}", merchant.appear_in.as_deref().unwrap_or("N/A"));
    }

    out
}
