mod commands;
mod config;
mod error;
mod items;
mod notify;
mod poller;
mod remote;
mod state;
mod types;

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::commands::Command;
use crate::config::Config;
use crate::error::Result;
use crate::items::ItemList;
use crate::notify::{LogNotifier, Notifier};
use crate::poller::Poller;
use crate::remote::MarketClient;
use crate::state::PriceTable;
use crate::types::{Account, Mode};

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    let items = Arc::new(ItemList::load(&cfg.items_path).await?);
    info!(
        "Loaded {} tracked items from {} (mode: {})",
        items.len().await,
        cfg.items_path,
        cfg.mode,
    );

    let table = Arc::new(
        PriceTable::open(&cfg.table_path, &cfg.export_path, &cfg.gdata_path).await?,
    );
    info!("Price table ready: {} entries seeded from {}", table.len().await, cfg.table_path);

    let client = Arc::new(MarketClient::new(cfg.api_url.clone())?);
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // One independent polling loop per account.
    let mut handles = Vec::new();
    for auth_key in &cfg.auth_keys {
        let poller = Poller::new(
            Account::new(auth_key.clone()),
            &cfg,
            Arc::clone(&client),
            Arc::clone(&items),
            Arc::clone(&table),
            Arc::clone(&notifier),
            shutdown_rx.clone(),
        );
        handles.push(tokio::spawn(poller.run()));
    }
    info!("Spawned {} account poller(s)", handles.len());

    // Operator commands arrive on stdin while the real messenger transport
    // stays external; the grammar is identical either way.
    if cfg.mode == Mode::Trade {
        let owner_items = Arc::clone(&items);
        let owner_notifier = Arc::clone(&notifier);
        let owner_id = cfg.owner_id;
        let owner_rx = shutdown_rx.clone();
        handles.push(tokio::spawn(async move {
            owner_loop(owner_items, owner_notifier, owner_id, owner_rx).await;
        }));
    }

    // Ctrl-c → stop pollers after their in-flight step, persist, exit.
    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested, draining pollers");
    let _ = shutdown_tx.send(true);
    for handle in handles {
        let _ = handle.await;
    }
    table.persist().await?;
    info!("Price table persisted, bye");

    Ok(())
}

/// Reads operator commands line by line and answers through the notifier.
async fn owner_loop(
    items: Arc<ItemList>,
    notifier: Arc<dyn Notifier>,
    owner_id: i64,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = shutdown.changed() => break,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("stdin read failed: {e}");
                break;
            }
        };

        match commands::parse(&line) {
            Some(Command::ListPrices) => {
                let listing = commands::format_price_list(&items.all().await);
                notifier.send(owner_id, &listing).await;
            }
            Some(Command::SetPrice { name, ceiling }) => {
                match items.set_ceiling(&name, ceiling).await {
                    Ok(Some(found)) => {
                        notifier.send(owner_id, &commands::reply_saved(&found)).await;
                    }
                    Ok(None) => {
                        notifier.send(owner_id, &commands::reply_unknown(&name)).await;
                    }
                    Err(e) => error!("reprice failed for {name}: {e}"),
                }
            }
            Some(Command::PurchaseConfirmed { count, name }) => {
                info!(count, item = %name, "purchase confirmed by game bot");
            }
            None => {}
        }
    }
}
