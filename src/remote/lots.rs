//! Lot text grammar.
//!
//! The rendered auction listing embeds every offer as
//! `<count>*<name> - <price> золота (<lot_id>)`. The grammar is a stable
//! contract with the remote renderer; anything that does not match is
//! ignored, because "no offers right now" is a common, valid state.

use std::sync::OnceLock;

use regex::Regex;

use crate::types::Lot;

fn lot_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // (?s) so an offer name split across an embedded newline still matches.
        Regex::new(r"(?is)(\d+)\*(.+?) - (\d+) золота \((\d+)\)")
            .expect("lot grammar regex is valid")
    })
}

/// Extract every lot from a response body, in the remote's own order.
/// Malformed or unrelated text yields an empty vec, never an error.
pub fn parse_lots(text: &str) -> Vec<Lot> {
    lot_re()
        .captures_iter(text)
        .filter_map(|cap| {
            let count: i64 = cap[1].parse().ok()?;
            let total: i64 = cap[3].parse().ok()?;
            let lot_id: i64 = cap[4].parse().ok()?;
            // A zero-count lot would divide by zero; the remote never emits
            // one, so treat it as garbage.
            if count < 1 {
                return None;
            }
            Some(Lot::new(count, total, lot_id))
        })
        .collect()
}
