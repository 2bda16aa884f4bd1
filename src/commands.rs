//! Inbound operator/game command shapes.
//!
//! Three fixed text patterns arrive over the messaging side: the owner asks
//! for the price list, the owner re-prices an item, and the game bot
//! confirms a completed purchase. Parsing lives here; transport dispatch is
//! the messenger's problem.

use std::sync::OnceLock;

use regex::Regex;

use crate::types::TrackedItem;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `скупка кажи`
    ListPrices,
    /// `скупка <name> <ceiling>`
    SetPrice { name: String, ceiling: i64 },
    /// `⚖…Вы успешно приобрели с аукциона предмет <count>*<name> -`
    PurchaseConfirmed { count: i64, name: String },
}

fn list_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^скупка кажи").expect("list regex is valid"))
}

fn set_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)^скупка (.+?) (\d+)").expect("set regex is valid"))
}

fn accept_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)^⚖.+Вы успешно приобрели с аукциона предмет (\d+)\*(.+) -")
            .expect("accept regex is valid")
    })
}

/// Match one inbound message against the three fixed shapes. Order matters:
/// `скупка кажи` must not be swallowed by the re-price pattern.
pub fn parse(text: &str) -> Option<Command> {
    if list_re().is_match(text) {
        return Some(Command::ListPrices);
    }
    if let Some(cap) = set_re().captures(text) {
        return Some(Command::SetPrice {
            name: cap[1].to_string(),
            ceiling: cap[2].parse().ok()?,
        });
    }
    if let Some(cap) = accept_re().captures(text) {
        return Some(Command::PurchaseConfirmed {
            count: cap[1].parse().ok()?,
            name: cap[2].trim().to_lowercase(),
        });
    }
    None
}

/// Owner-facing price list: one `name: ceiling` line per item with an
/// active ceiling. Tracking-only items stay out of the reply.
pub fn format_price_list(items: &[TrackedItem]) -> String {
    let mut out = String::new();
    for item in items {
        if item.ceiling > 0 {
            out.push_str(&format!("{}: {}\n", item.name, item.ceiling));
        }
    }
    out
}

pub fn reply_saved(name: &str) -> String {
    format!("👍🏻{name} сохранено")
}

pub fn reply_unknown(name: &str) -> String {
    format!("😨{name} нет в базе")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, ceiling: i64) -> TrackedItem {
        TrackedItem { name: name.to_string(), ceiling, alias: String::new(), code: 1 }
    }

    #[test]
    fn list_command() {
        assert_eq!(parse("скупка кажи"), Some(Command::ListPrices));
        assert_eq!(parse("Скупка кажи список"), Some(Command::ListPrices));
    }

    #[test]
    fn set_price_command() {
        assert_eq!(
            parse("скупка меч 55"),
            Some(Command::SetPrice { name: "меч".to_string(), ceiling: 55 })
        );
        // Multi-word names bind everything before the trailing number.
        assert_eq!(
            parse("скупка малое зелье 120"),
            Some(Command::SetPrice { name: "малое зелье".to_string(), ceiling: 120 })
        );
    }

    #[test]
    fn purchase_confirmation() {
        let msg = "⚖Аукцион: Вы успешно приобрели с аукциона предмет 3*Меч - 120 золота";
        assert_eq!(
            parse(msg),
            Some(Command::PurchaseConfirmed { count: 3, name: "меч".to_string() })
        );
    }

    #[test]
    fn unrelated_text_is_ignored() {
        assert_eq!(parse("привет"), None);
        assert_eq!(parse("скупка"), None);
        assert_eq!(parse(""), None);
    }

    #[test]
    fn price_list_skips_tracking_only_items() {
        let items = vec![item("Меч", 50), item("Щит", 0), item("Зелье", 9)];
        assert_eq!(format_price_list(&items), "Меч: 50\nЗелье: 9\n");
    }
}
