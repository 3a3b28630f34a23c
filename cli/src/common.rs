use std::sync::Arc;

use lib_feedsync::backend::RestBackend;
use lib_feedsync::configs::ResolvedConfig;
use lib_feedsync::EnrichedContentItem;

pub fn rest_backend(config: &ResolvedConfig) -> anyhow::Result<Arc<RestBackend>> {
    Ok(Arc::new(RestBackend::new(config.rest_config())?))
}

pub fn item_line(item: &EnrichedContentItem) -> String {
    format!(
        "{:<24} {:<20} {:>5} likes{}{}  {}",
        item.id(),
        item.creator_name(),
        item.like_count,
        if item.liked_by_viewer { " (liked)" } else { "" },
        if item.followed_by_viewer { " (following)" } else { "" },
        item.item.title
    )
}
