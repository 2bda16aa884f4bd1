use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

/// Watch: poll and export prices only. Trade: poll fast and submit purchase
/// commands for bargains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Watch,
    Trade,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Watch => write!(f, "watch"),
            Mode::Trade => write!(f, "trade"),
        }
    }
}

// ---------------------------------------------------------------------------
// TrackedItem
// ---------------------------------------------------------------------------

/// A configured item of interest. Lives for the whole process; only the
/// ceiling is ever mutated (operator reprice command).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ItemTuple", into = "ItemTuple")]
pub struct TrackedItem {
    pub name: String,
    /// Max acceptable unit price. 0 = tracked but never bought.
    pub ceiling: i64,
    /// Optional secondary match key for operator commands.
    pub alias: String,
    /// Item identifier on the remote marketplace. <= 0 = inactive.
    pub code: i64,
}

/// On-disk shape: `[name, ceiling, alias, code]`.
type ItemTuple = (String, i64, String, i64);

impl From<ItemTuple> for TrackedItem {
    fn from((name, ceiling, alias, code): ItemTuple) -> Self {
        Self { name, ceiling, alias, code }
    }
}

impl From<TrackedItem> for ItemTuple {
    fn from(item: TrackedItem) -> Self {
        (item.name, item.ceiling, item.alias, item.code)
    }
}

// ---------------------------------------------------------------------------
// Lot
// ---------------------------------------------------------------------------

/// One observed marketplace offer: `count` pieces sold together for
/// `total_price`. Ephemeral — produced fresh by every poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lot {
    pub count: i64,
    pub total_price: i64,
    pub lot_id: i64,
    /// total_price / count with truncation, matching the remote's own
    /// floor rounding. Always computed, never parsed.
    pub unit_price: i64,
}

impl Lot {
    /// `count` must be >= 1 — the parser drops zero-count matches.
    pub fn new(count: i64, total_price: i64, lot_id: i64) -> Self {
        Self { count, total_price, lot_id, unit_price: total_price / count }
    }
}

// ---------------------------------------------------------------------------
// Observation
// ---------------------------------------------------------------------------

/// Latest poll result for one tracked item. An empty `lots` vec means "no
/// current offers" and is recorded, not omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ObservationTuple", into = "ObservationTuple")]
pub struct Observation {
    /// Unix seconds of the poll.
    pub ts: i64,
    /// Lots in the remote's own order — never re-sorted.
    pub lots: Vec<Lot>,
    /// Item name at observation time, kept for export stability across
    /// renames.
    pub name: String,
}

/// On-disk shape: `[epoch_secs, lots, name]`.
type ObservationTuple = (i64, Vec<Lot>, String);

impl From<ObservationTuple> for Observation {
    fn from((ts, lots, name): ObservationTuple) -> Self {
        Self { ts, lots, name }
    }
}

impl From<Observation> for ObservationTuple {
    fn from(obs: Observation) -> Self {
        (obs.ts, obs.lots, obs.name)
    }
}

impl Observation {
    pub fn new(lots: Vec<Lot>, name: String) -> Self {
        Self { ts: chrono::Local::now().timestamp(), lots, name }
    }

    /// Local wall-clock `HH:MM:SS` for the public export.
    pub fn formatted_time(&self) -> String {
        use chrono::TimeZone;
        match chrono::Local.timestamp_opt(self.ts, 0) {
            chrono::LocalResult::Single(dt) => dt.format("%H:%M:%S").to_string(),
            _ => "00:00:00".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// One authenticated marketplace session ("bag"). The credential is opaque;
/// session upkeep belongs to the messaging side, not to us.
#[derive(Debug, Clone)]
pub struct Account {
    pub auth_key: String,
}

impl Account {
    pub fn new(auth_key: impl Into<String>) -> Self {
        Self { auth_key: auth_key.into() }
    }

    /// Short prefix safe for log lines — never log the full credential.
    /// Clamped to a char boundary so multibyte keys cannot fall back to the
    /// whole string.
    pub fn tag(&self) -> &str {
        let mut end = self.auth_key.len().min(6);
        while !self.auth_key.is_char_boundary(end) {
            end -= 1;
        }
        &self.auth_key[..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_price_truncates_toward_zero() {
        assert_eq!(Lot::new(3, 120, 7).unit_price, 40);
        assert_eq!(Lot::new(3, 121, 7).unit_price, 40);
        assert_eq!(Lot::new(3, 122, 7).unit_price, 40);
        assert_eq!(Lot::new(3, 123, 7).unit_price, 41);
    }

    #[test]
    fn account_tag_is_a_short_prefix_even_for_multibyte_keys() {
        assert_eq!(Account::new("abcdefgh123").tag(), "abcdef");
        assert_eq!(Account::new("abc").tag(), "abc");
        // Byte 6 lands mid-char here; the tag backs up instead of leaking
        // the whole credential.
        assert_eq!(Account::new("aключ9876").tag(), "aкл");
        assert_eq!(Account::new("").tag(), "");
    }

    #[test]
    fn tracked_item_round_trips_as_tuple() {
        let json = r#"["Меч",50,"меч",42]"#;
        let item: TrackedItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.name, "Меч");
        assert_eq!(item.ceiling, 50);
        assert_eq!(item.alias, "меч");
        assert_eq!(item.code, 42);
        assert_eq!(serde_json::to_string(&item).unwrap(), json);
    }

    #[test]
    fn observation_serializes_as_tuple() {
        let obs = Observation { ts: 1000, lots: vec![Lot::new(2, 10, 1)], name: "Щит".into() };
        let json = serde_json::to_string(&obs).unwrap();
        assert_eq!(
            json,
            r#"[1000,[{"count":2,"total_price":10,"lot_id":1,"unit_price":5}],"Щит"]"#
        );
        let back: Observation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, obs);
    }
}
