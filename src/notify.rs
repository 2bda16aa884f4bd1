use async_trait::async_trait;
use tracing::info;

/// Outbound message sink — the boundary to whatever messenger carries owner
/// replies and purchase commands. Best effort by contract: implementations
/// log failures and never propagate them, because a dropped notification
/// must not abort a polling cycle.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, channel: i64, text: &str);
}

/// Default sink: writes every outbound message to the log. Used in watch
/// mode and whenever no real transport is wired in.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, channel: i64, text: &str) {
        info!(channel, "outbound: {text}");
    }
}

/// Captures outbound messages for assertions.
#[cfg(test)]
pub struct RecordingNotifier {
    pub sent: std::sync::Mutex<Vec<(i64, String)>>,
}

#[cfg(test)]
impl RecordingNotifier {
    pub fn new() -> Self {
        Self { sent: std::sync::Mutex::new(Vec::new()) }
    }
}

#[cfg(test)]
#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, channel: i64, text: &str) {
        self.sent.lock().unwrap().push((channel, text.to_string()));
    }
}
