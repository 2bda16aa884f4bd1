use std::path::PathBuf;

use tokio::sync::RwLock;

use crate::error::Result;
use crate::types::TrackedItem;

/// The configured tracked-item list.
///
/// Loaded once at startup and held for the process lifetime; items are never
/// added or removed at runtime, only re-priced by an operator command. Every
/// mutation rewrites the snapshot file before the lock is released, same
/// discipline as the price table.
pub struct ItemList {
    inner: RwLock<Vec<TrackedItem>>,
    path: PathBuf,
}

impl ItemList {
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let raw = tokio::fs::read_to_string(&path).await?;
        let items: Vec<TrackedItem> = serde_json::from_str(&raw)?;
        Ok(Self { inner: RwLock::new(items), path })
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn get(&self, index: usize) -> Option<TrackedItem> {
        self.inner.read().await.get(index).cloned()
    }

    pub async fn all(&self) -> Vec<TrackedItem> {
        self.inner.read().await.clone()
    }

    /// Re-price the item matching `name` (alias first, then display name).
    /// Persists the snapshot on a hit and returns the canonical display name.
    pub async fn set_ceiling(&self, name: &str, ceiling: i64) -> Result<Option<String>> {
        let mut items = self.inner.write().await;
        let Some(item) = items.iter_mut().find(|i| i.alias == name || i.name == name) else {
            return Ok(None);
        };
        item.ceiling = ceiling;
        let found = item.name.clone();
        let rendered = render(&items);
        tokio::fs::write(&self.path, rendered).await?;
        Ok(Some(found))
    }
}

/// One 4-tuple per line, comma separated, bracketed — the snapshot stays
/// hand-editable between runs.
fn render(items: &[TrackedItem]) -> String {
    let mut out = String::from("[\n");
    for (i, item) in items.iter().enumerate() {
        // A malformed item cannot happen here: tuples of strings/ints always
        // serialize.
        out.push_str(&serde_json::to_string(item).unwrap_or_default());
        if i < items.len() - 1 {
            out.push(',');
        }
        out.push('\n');
    }
    out.push(']');
    out
}
