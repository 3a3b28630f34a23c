//! Prints the enriched feed of one category and reprints it on every change,
//! until Ctrl-C or SIGTERM.

use std::sync::Arc;

use anyhow::Result;
use lib_feedsync::backend::RealtimeChannel;
use lib_feedsync::configs::{load_config, ResolvedConfig};
use lib_feedsync::loggers::setup_logging;
use lib_feedsync::{FeedSession, StoreSnapshot};
use tokio::signal;

mod common;

fn realtime_channel(config: &ResolvedConfig) -> Result<Arc<RealtimeChannel>> {
    Ok(Arc::new(RealtimeChannel::new(config.realtime_config())?))
}

/// Resolves on Ctrl-C or, on unix, SIGTERM.
async fn shutdown_signal() {
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = async {
            #[cfg(unix)]
            {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut term_signal) => {
                        term_signal.recv().await;
                        log::info!("SIGTERM received, initiating shutdown.");
                    }
                    Err(e) => {
                        log::warn!("Cannot listen for SIGTERM: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                // On non-unix platforms, just wait forever.
                std::future::pending::<()>().await;
            }
        } => {}
    }
}

fn print_snapshot(snapshot: &StoreSnapshot) {
    if snapshot.loading {
        return;
    }
    println!("--- {} ({} items) ---", snapshot.category, snapshot.items.len());
    for item in &snapshot.items {
        println!("{}", common::item_line(item));
    }
    if let Some(err) = &snapshot.error {
        println!("! {}", err);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = load_config().resolve()?;
    setup_logging(&config.log_dir, &config.log_level, "feed-watch")?;

    let backend = common::rest_backend(&config)?;
    let channel = realtime_channel(&config)?;
    let session = FeedSession::open(config.category, config.viewer.clone(), backend, channel).await?;

    let mut state = session.subscribe_state();
    print_snapshot(&state.borrow_and_update());

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                print_snapshot(&state.borrow_and_update());
            }
        }
    }

    session.close().await;
    log::info!("Shutdown complete.");
    Ok(())
}
