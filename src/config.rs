use crate::error::{AppError, Result};
use crate::types::Mode;

pub const API_URL: &str = "https://vip3.activeusers.ru/app.php";

/// Query-string identity baked into every marketplace URL.
pub const GROUP_ID: u64 = 182_985_865;
pub const API_ID: u64 = 7_055_214;

/// Peer that accepts "Купить лот N" commands.
pub const GAME_BOT_ID: i64 = -182_985_865;

/// One full pass over the tracked list per account targets this duration;
/// the per-item sleep in watch mode is FULL_CYCLE_SECS / item_count.
pub const FULL_CYCLE_SECS: u64 = 3600;

/// Upper bound of the random jitter added to every watch-mode sleep.
pub const POLL_JITTER_MAX_SECS: u64 = 45;

/// Upper bound of the random delay before an account's first poll, so
/// several accounts never hit the endpoint in lockstep.
pub const STAGGER_MAX_SECS: u64 = 20;

/// Backoff after a failed poll before retrying the same slot.
pub const RETRY_BACKOFF_SECS: u64 = 3;

/// Pause between slots in trade mode, and after a purchase submission.
pub const ADVANCE_PAUSE_SECS: u64 = 6;

/// Cooldown after the remote flags an account as blocked.
pub const BLOCK_COOLDOWN_SECS: u64 = 1800;

#[derive(Debug, Clone)]
pub struct Config {
    /// One marketplace session credential per account ("bag").
    pub auth_keys: Vec<String>,
    pub mode: Mode,
    pub owner_id: i64,
    pub game_bot_id: i64,
    pub log_level: String,
    /// Tracked-item snapshot (JSON array of 4-tuples).
    pub items_path: String,
    /// Price table snapshot — persisted after every poll, cold-start source.
    pub table_path: String,
    /// Public JSON export consumed by the display page.
    pub export_path: String,
    /// Companion `var GData = {...};` script fragment.
    pub gdata_path: String,
    pub api_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let auth_keys: Vec<String> = std::env::var("AUTH_KEYS")
            .map_err(|_| AppError::Config("AUTH_KEYS must be set (comma-separated)".to_string()))?
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if auth_keys.is_empty() {
            return Err(AppError::Config("AUTH_KEYS contained no keys".to_string()));
        }

        let mode = match std::env::var("MODE") {
            Ok(s) if s == "trade" => Mode::Trade,
            Ok(s) if s == "watch" => Mode::Watch,
            Ok(other) => {
                return Err(AppError::Config(format!(
                    "MODE must be \"watch\" or \"trade\", got {other:?}"
                )))
            }
            Err(_) => Mode::Watch,
        };

        // Trade mode needs the owner for command replies; watch mode does not.
        let owner_id = match mode {
            Mode::Trade => std::env::var("OWNER_ID")
                .map_err(|_| AppError::Config("OWNER_ID must be set in trade mode".to_string()))?
                .parse::<i64>()
                .map_err(|_| AppError::Config("OWNER_ID must be an integer".to_string()))?,
            Mode::Watch => std::env::var("OWNER_ID")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
        };

        Ok(Self {
            auth_keys,
            mode,
            owner_id,
            game_bot_id: std::env::var("GAME_BOT_ID")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(GAME_BOT_ID),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            items_path: std::env::var("ITEMS_PATH").unwrap_or_else(|_| "data.txt".to_string()),
            table_path: std::env::var("TABLE_PATH").unwrap_or_else(|_| "prices.json".to_string()),
            export_path: std::env::var("EXPORT_PATH")
                .unwrap_or_else(|_| "public.json".to_string()),
            gdata_path: std::env::var("GDATA_PATH").unwrap_or_else(|_| "gdata.js".to_string()),
            api_url: std::env::var("API_URL").unwrap_or_else(|_| API_URL.to_string()),
        })
    }
}
