use std::path::PathBuf;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::Result;
use crate::types::Observation;

// ---------------------------------------------------------------------------
// PriceTable
// ---------------------------------------------------------------------------

/// Latest observation per tracked item, keyed by the remote item code
/// (stringified for serialization stability), in insertion order.
///
/// One coarse lock covers the map *and* the snapshot/export writes: a
/// `record` is atomic as seen by every other poller, so the on-disk files
/// can never interleave partial updates. Contention is irrelevant — polls
/// are seconds to minutes apart.
pub struct PriceTable {
    inner: Mutex<Vec<(String, Observation)>>,
    table_path: PathBuf,
    export_path: PathBuf,
    gdata_path: PathBuf,
}

impl PriceTable {
    /// Open the table, seeding from the snapshot file if one exists.
    /// The snapshot doubles as the cold-start source across restarts.
    pub async fn open(
        table_path: impl Into<PathBuf>,
        export_path: impl Into<PathBuf>,
        gdata_path: impl Into<PathBuf>,
    ) -> Result<Self> {
        let table_path = table_path.into();
        let entries = match tokio::fs::read_to_string(&table_path).await {
            Ok(raw) => parse_snapshot(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            inner: Mutex::new(entries),
            table_path,
            export_path: export_path.into(),
            gdata_path: gdata_path.into(),
        })
    }

    pub async fn get(&self, code: i64) -> Option<Observation> {
        let key = code.to_string();
        let inner = self.inner.lock().await;
        inner.iter().find(|(k, _)| *k == key).map(|(_, obs)| obs.clone())
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Store the latest observation for an item and rewrite the snapshot and
    /// both export files inside the same critical section.
    pub async fn record(&self, code: i64, obs: Observation) -> Result<()> {
        let key = code.to_string();
        let mut inner = self.inner.lock().await;
        match inner.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = obs,
            None => inner.push((key, obs)),
        }
        self.write_files(&inner).await
    }

    /// Rewrite the snapshot and exports from the current state. Used once
    /// more at shutdown, after the pollers have drained.
    pub async fn persist(&self) -> Result<()> {
        let inner = self.inner.lock().await;
        self.write_files(&inner).await
    }

    async fn write_files(&self, entries: &[(String, Observation)]) -> Result<()> {
        tokio::fs::write(&self.table_path, render_snapshot(entries)?).await?;
        tokio::fs::write(&self.export_path, render_export(entries)?).await?;
        tokio::fs::write(&self.gdata_path, render_gdata(entries)?).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// File formats
// ---------------------------------------------------------------------------

fn parse_snapshot(raw: &str) -> Result<Vec<(String, Observation)>> {
    let map: serde_json::Map<String, Value> = serde_json::from_str(raw)?;
    let mut entries = Vec::with_capacity(map.len());
    for (code, value) in map {
        match serde_json::from_value::<Observation>(value) {
            Ok(obs) => entries.push((code, obs)),
            // One corrupt entry should not cost us the whole table.
            Err(e) => warn!(code = %code, "dropping unreadable snapshot entry: {e}"),
        }
    }
    Ok(entries)
}

/// Full table as `{code: [epoch_secs, lots, name]}`, empty lots included.
fn render_snapshot(entries: &[(String, Observation)]) -> Result<String> {
    let mut map = serde_json::Map::new();
    for (code, obs) in entries {
        map.insert(code.clone(), serde_json::to_value(obs)?);
    }
    Ok(serde_json::to_string(&Value::Object(map))?)
}

/// Public export: same shape but with local `HH:MM:SS` time, and only
/// entries that currently have offers. Consumed by an external static page —
/// the byte shape is a compatibility contract.
fn render_export(entries: &[(String, Observation)]) -> Result<String> {
    let mut map = serde_json::Map::new();
    for (code, obs) in entries {
        if obs.lots.is_empty() {
            continue;
        }
        map.insert(
            code.clone(),
            serde_json::to_value((obs.formatted_time(), &obs.lots, &obs.name))?,
        );
    }
    Ok(serde_json::to_string(&Value::Object(map))?)
}

/// Script-embeddable companion so the display page can load prices without
/// an XHR: `var GData = {...};`.
fn render_gdata(entries: &[(String, Observation)]) -> Result<String> {
    Ok(format!("var GData = {};\n", render_export(entries)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Lot;

    fn obs(ts: i64, lots: Vec<Lot>, name: &str) -> Observation {
        Observation { ts, lots, name: name.to_string() }
    }

    async fn table_in(dir: &std::path::Path) -> PriceTable {
        PriceTable::open(
            dir.join("prices.json"),
            dir.join("public.json"),
            dir.join("gdata.js"),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn empty_table_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let table = table_in(dir.path()).await;
        table.persist().await.unwrap();

        let reopened = table_in(dir.path()).await;
        assert_eq!(reopened.len().await, 0);
    }

    #[tokio::test]
    async fn record_then_reopen_reproduces_entries() {
        let dir = tempfile::tempdir().unwrap();
        let table = table_in(dir.path()).await;
        table.record(42, obs(1000, vec![Lot::new(3, 120, 7)], "Меч")).await.unwrap();
        table.record(55, obs(1001, vec![], "Щит")).await.unwrap();

        let reopened = table_in(dir.path()).await;
        assert_eq!(reopened.len().await, 2);
        let sword = reopened.get(42).await.unwrap();
        assert_eq!(sword.ts, 1000);
        assert_eq!(sword.lots, vec![Lot::new(3, 120, 7)]);
        assert_eq!(sword.name, "Меч");
        // Empty lot sequence is a recorded state, not an omission.
        assert_eq!(reopened.get(55).await.unwrap().lots, vec![]);
    }

    #[tokio::test]
    async fn record_overwrites_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let table = table_in(dir.path()).await;
        table.record(42, obs(1000, vec![Lot::new(1, 10, 1)], "Меч")).await.unwrap();
        table.record(42, obs(2000, vec![], "Меч")).await.unwrap();

        assert_eq!(table.len().await, 1);
        assert_eq!(table.get(42).await.unwrap().ts, 2000);
    }

    #[test]
    fn export_skips_empty_lots_and_keeps_insertion_order() {
        let entries = vec![
            ("42".to_string(), obs(0, vec![Lot::new(3, 120, 7)], "Меч")),
            ("55".to_string(), obs(0, vec![], "Щит")),
            ("13".to_string(), obs(0, vec![Lot::new(1, 9, 2)], "Зелье")),
        ];
        let json = render_export(&entries).unwrap();
        let parsed: serde_json::Map<String, Value> = serde_json::from_str(&json).unwrap();
        let keys: Vec<&String> = parsed.keys().collect();
        assert_eq!(keys, ["42", "13"]);

        let entry = parsed["42"].as_array().unwrap();
        // [formatted_time, lots, name]
        assert_eq!(entry.len(), 3);
        assert_eq!(entry[0].as_str().unwrap().len(), 8);
        assert_eq!(entry[2], "Меч");
    }

    #[test]
    fn gdata_wraps_export_as_script_assignment() {
        let entries = vec![("42".to_string(), obs(0, vec![Lot::new(2, 10, 3)], "Меч"))];
        let script = render_gdata(&entries).unwrap();
        assert!(script.starts_with("var GData = {"));
        assert!(script.ends_with("};\n"));
    }
}
