use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::{
    Config, ADVANCE_PAUSE_SECS, BLOCK_COOLDOWN_SECS, FULL_CYCLE_SECS, POLL_JITTER_MAX_SECS,
    RETRY_BACKOFF_SECS, STAGGER_MAX_SECS,
};
use crate::error::AppError;
use crate::items::ItemList;
use crate::notify::Notifier;
use crate::remote::MarketClient;
use crate::state::PriceTable;
use crate::types::{Account, Lot, Mode, Observation, TrackedItem};

// ---------------------------------------------------------------------------
// Decision logic — pure, so the engine rules are testable without a network
// ---------------------------------------------------------------------------

/// Wrap-around cursor advance. L is fixed for the process lifetime (items
/// are re-priced, never added or removed at runtime).
fn advance(cursor: usize, len: usize) -> usize {
    (cursor + 1) % len
}

/// First lot in the remote's own order whose unit price clears the ceiling.
/// Deliberately *not* the cheapest: the remote sells out front to back, so
/// the first acceptable lot is the one worth racing for. Items with no
/// ceiling are never purchase targets.
fn pick_bargain(lots: &[Lot], ceiling: i64) -> Option<&Lot> {
    if ceiling <= 0 {
        return None;
    }
    lots.iter().find(|lot| lot.unit_price <= ceiling)
}

/// How long to wait before retrying the same slot after a failed poll.
fn failure_backoff(err: &AppError) -> Duration {
    match err {
        AppError::RateLimited => Duration::from_secs(BLOCK_COOLDOWN_SECS),
        _ => Duration::from_secs(RETRY_BACKOFF_SECS),
    }
}

/// Watch-mode sleep between successful polls: spread one full pass over
/// roughly an hour, plus jitter so parallel accounts drift apart.
fn watch_interval(item_count: usize) -> Duration {
    let base = FULL_CYCLE_SECS / item_count.max(1) as u64;
    let jitter = rand::thread_rng().gen_range(0..=POLL_JITTER_MAX_SECS);
    Duration::from_secs(base + jitter)
}

// ---------------------------------------------------------------------------
// Poller
// ---------------------------------------------------------------------------

/// One polling loop per account. Strictly sequential within the account;
/// accounts only meet each other inside the shared price table and item
/// list. Nothing a single poll does is ever fatal to the loop.
pub struct Poller {
    account: Account,
    client: Arc<MarketClient>,
    items: Arc<ItemList>,
    table: Arc<PriceTable>,
    notifier: Arc<dyn Notifier>,
    mode: Mode,
    game_bot_id: i64,
    cursor: usize,
    /// Consecutive slots skipped without a request, to catch a list where
    /// nothing is pollable.
    skipped: usize,
    shutdown: watch::Receiver<bool>,
}

impl Poller {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        account: Account,
        cfg: &Config,
        client: Arc<MarketClient>,
        items: Arc<ItemList>,
        table: Arc<PriceTable>,
        notifier: Arc<dyn Notifier>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            account,
            client,
            items,
            table,
            notifier,
            mode: cfg.mode,
            game_bot_id: cfg.game_bot_id,
            cursor: 0,
            skipped: 0,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        if self.mode == Mode::Watch {
            // Several accounts starting together must not burst in lockstep.
            let stagger = rand::thread_rng().gen_range(0..=STAGGER_MAX_SECS);
            info!(account = self.account.tag(), stagger, "poller starting");
            if !self.pause(Duration::from_secs(stagger)).await {
                return;
            }
        } else {
            info!(account = self.account.tag(), mode = %self.mode, "poller starting");
        }

        loop {
            if *self.shutdown.borrow() {
                break;
            }
            let wait = match self.mode {
                Mode::Watch => self.watch_step().await,
                Mode::Trade => self.trade_step().await,
            };
            if !self.pause(wait).await {
                break;
            }
        }
        info!(account = self.account.tag(), "poller stopped");
    }

    /// Sleep `wait`, waking early on shutdown. Returns false when the loop
    /// should end.
    async fn pause(&mut self, wait: Duration) -> bool {
        if wait.is_zero() {
            return !*self.shutdown.borrow();
        }
        tokio::select! {
            _ = tokio::time::sleep(wait) => !*self.shutdown.borrow(),
            _ = self.shutdown.changed() => false,
        }
    }

    /// Advance past a slot without issuing a request. If a whole wrap of the
    /// list produced nothing pollable, idle a minute instead of spinning.
    fn skip(&mut self, len: usize) -> Duration {
        self.cursor = advance(self.cursor, len);
        self.skipped += 1;
        if self.skipped >= len {
            self.skipped = 0;
            warn!(account = self.account.tag(), "no pollable items in the tracked list");
            Duration::from_secs(60)
        } else {
            Duration::ZERO
        }
    }

    /// A never-polled empty list would divide by zero in the interval math;
    /// it also means the config is wrong, so say so and idle.
    async fn guard_empty(&self) -> Option<usize> {
        let len = self.items.len().await;
        if len == 0 {
            warn!(account = self.account.tag(), "tracked item list is empty, nothing to poll");
            None
        } else {
            Some(len)
        }
    }

    // -----------------------------------------------------------------------
    // Watch mode: record everything, roughly one pass per hour
    // -----------------------------------------------------------------------

    async fn watch_step(&mut self) -> Duration {
        let Some(len) = self.guard_empty().await else {
            return Duration::from_secs(60);
        };
        let Some(item) = self.items.get(self.cursor).await else {
            self.cursor = 0;
            return Duration::ZERO;
        };

        // Inactive on the remote side — advance without issuing a request.
        if item.code <= 0 {
            return self.skip(len);
        }
        self.skipped = 0;

        match self.client.fetch_lots(&self.account, item.code).await {
            Ok(lots) => {
                info!(
                    account = self.account.tag(),
                    item = %item.name,
                    lots = lots.len(),
                    "poll ok"
                );
                self.record(&item, lots).await;
                self.cursor = advance(self.cursor, len);
                watch_interval(len)
            }
            Err(e) => self.log_failure(&item, e),
        }
    }

    // -----------------------------------------------------------------------
    // Trade mode: tight loop, buy the first acceptable lot
    // -----------------------------------------------------------------------

    async fn trade_step(&mut self) -> Duration {
        let Some(len) = self.guard_empty().await else {
            return Duration::from_secs(60);
        };
        let Some(item) = self.items.get(self.cursor).await else {
            self.cursor = 0;
            return Duration::ZERO;
        };

        // Tracking-only or remote-inactive items are never polled here.
        if item.code <= 0 || item.ceiling <= 0 {
            return self.skip(len);
        }
        self.skipped = 0;

        let lots = match self.client.fetch_lots(&self.account, item.code).await {
            Ok(lots) => lots,
            // Cursor stays put: transient faults retry the same slot.
            Err(e) => return self.log_failure(&item, e),
        };

        self.record(&item, lots.clone()).await;

        if lots.is_empty() {
            self.cursor = advance(self.cursor, len);
            return Duration::from_secs(ADVANCE_PAUSE_SECS);
        }

        if let Some(lot) = pick_bargain(&lots, item.ceiling) {
            info!(
                account = self.account.tag(),
                item = %item.name,
                lot_id = lot.lot_id,
                count = lot.count,
                unit_price = lot.unit_price,
                ceiling = item.ceiling,
                "bargain found, submitting purchase"
            );
            self.notifier
                .send(self.game_bot_id, &format!("Купить лот {}", lot.lot_id))
                .await;
            // Hold the cursor and throttle: the remote needs time to settle
            // the purchase, and we must not double-submit the same lot.
            return Duration::from_secs(ADVANCE_PAUSE_SECS);
        }

        self.cursor = advance(self.cursor, len);
        Duration::from_secs(ADVANCE_PAUSE_SECS)
    }

    // -----------------------------------------------------------------------

    async fn record(&self, item: &TrackedItem, lots: Vec<Lot>) {
        let obs = Observation::new(lots, item.name.clone());
        if let Err(e) = self.table.record(item.code, obs).await {
            // Persisting is best effort mid-run; the next poll rewrites it.
            error!(account = self.account.tag(), item = %item.name, "price table write failed: {e}");
        }
    }

    fn log_failure(&self, item: &TrackedItem, err: AppError) -> Duration {
        let wait = failure_backoff(&err);
        match err {
            AppError::RateLimited => warn!(
                account = self.account.tag(),
                item = %item.name,
                cooldown_secs = wait.as_secs(),
                "remote blocked this account, cooling down"
            ),
            e => warn!(
                account = self.account.tag(),
                item = %item.name,
                retry_secs = wait.as_secs(),
                "poll failed: {e}"
            ),
        }
        wait
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GAME_BOT_ID;
    use crate::notify::RecordingNotifier;
    use crate::remote::lots::parse_lots;

    #[test]
    fn cursor_wraps_modulo_len() {
        let len = 3;
        let mut cursor = 0;
        for n in 1..=10 {
            cursor = advance(cursor, len);
            assert_eq!(cursor, n % len);
        }
    }

    #[test]
    fn bargain_is_first_acceptable_not_cheapest() {
        let lots = vec![Lot::new(1, 120, 1), Lot::new(1, 95, 2), Lot::new(1, 80, 3)];
        let picked = pick_bargain(&lots, 100).unwrap();
        assert_eq!(picked.lot_id, 2);
        assert_eq!(picked.unit_price, 95);
    }

    #[test]
    fn no_ceiling_means_no_purchase() {
        let lots = vec![Lot::new(1, 1, 1)];
        assert!(pick_bargain(&lots, 0).is_none());
        assert!(pick_bargain(&lots, -5).is_none());
    }

    #[test]
    fn nothing_under_ceiling_yields_none() {
        let lots = vec![Lot::new(1, 120, 1), Lot::new(2, 250, 2)];
        assert!(pick_bargain(&lots, 100).is_none());
    }

    #[test]
    fn rate_limit_backs_off_exactly_thirty_minutes() {
        assert_eq!(failure_backoff(&AppError::RateLimited), Duration::from_secs(1800));
        assert_eq!(
            failure_backoff(&AppError::TokenExtraction),
            Duration::from_secs(RETRY_BACKOFF_SECS)
        );
        assert_eq!(
            failure_backoff(&AppError::RemoteUnavailable(502)),
            Duration::from_secs(RETRY_BACKOFF_SECS)
        );
    }

    #[test]
    fn watch_interval_spreads_a_full_cycle() {
        let wait = watch_interval(60);
        assert!(wait >= Duration::from_secs(60));
        assert!(wait <= Duration::from_secs(60 + POLL_JITTER_MAX_SECS));
    }

    /// The Sword walkthrough: `3*Sword - 120 золота (7)` under a ceiling of
    /// 50 must produce exactly `Купить лот 7` on the game-bot channel.
    #[tokio::test]
    async fn sword_listing_triggers_purchase_command() {
        let lots = parse_lots("3*Sword - 120 золота (7)");
        assert_eq!(lots, vec![Lot::new(3, 120, 7)]);
        assert_eq!(lots[0].unit_price, 40);

        let picked = pick_bargain(&lots, 50).unwrap();
        let notifier = RecordingNotifier::new();
        notifier
            .send(GAME_BOT_ID, &format!("Купить лот {}", picked.lot_id))
            .await;

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.as_slice(), &[(GAME_BOT_ID, "Купить лот 7".to_string())]);
    }
}
