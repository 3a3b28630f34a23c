//! Toggles a like or a follow for the configured viewer and prints the result.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use lib_feedsync::configs::{load_from, FeedSyncConfig};
use lib_feedsync::loggers::setup_logging;
use lib_feedsync::{ContentStore, MutationCoordinator, MutationError};

mod common;

#[derive(Parser, Debug)]
#[command(about = "Like/unlike an item or follow/unfollow a creator", version)]
struct Args {
    #[command(flatten)]
    config: FeedSyncConfig,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Toggle the viewer's like on an item of the configured category.
    Like { item_id: String },
    /// Toggle the viewer's follow of a creator, by display name.
    Follow { creator_name: String },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let config = load_from(args.config).resolve()?;
    setup_logging(&config.log_dir, &config.log_level, "feed-toggle")?;

    let backend = common::rest_backend(&config)?;
    let store = Arc::new(ContentStore::new(config.category, backend.clone()));
    store.fetch(config.viewer.as_ref()).await?;
    let coordinator = MutationCoordinator::new(store.clone(), backend);

    let result = match &args.action {
        Action::Like { item_id } => coordinator.toggle_like(config.viewer.as_ref(), item_id).await,
        Action::Follow { creator_name } => {
            coordinator
                .toggle_follow(config.viewer.as_ref(), creator_name)
                .await
        }
    };

    match result {
        Ok(outcome) => {
            let state = if outcome.now_active { "on" } else { "off" };
            match outcome.like_count {
                Some(count) => println!("{}: {} ({} likes)", outcome.target, state, count),
                None => println!("{}: {} ({} items)", outcome.target, state, outcome.items_patched),
            }
            for item in store.items() {
                println!("{}", common::item_line(&item));
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(MutationError::Unauthenticated) => {
            eprintln!("Not signed in: set FEEDSYNC_VIEWER_ID and FEEDSYNC_ACCESS_TOKEN (or --viewer-id/--access-token).");
            Ok(ExitCode::from(2))
        }
        Err(e) => Err(e.into()),
    }
}
