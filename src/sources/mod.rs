mod rss;
mod submissions;

pub use rss::FeedFetcher;
pub use submissions::submission_references;

use crate::models::Reference;
use crate::traits::DedupCache;

/// Drops references whose link is already in the dedup cache.
pub async fn drop_known(cache: &dyn DedupCache, references: Vec<Reference>) -> Vec<Reference> {
    let total = references.len();
    let mut fresh = Vec::with_capacity(total);

    for reference in references {
        match cache.is_member(&reference.link).await {
            Ok(false) => fresh.push(reference),
            Ok(true) => {}
            Err(e) => tracing::warn!(link = %reference.link, error = %e, "Dedup lookup failed, skipping"),
        }
    }

    tracing::info!(total, fresh = fresh.len(), "Filtered known links");
    fresh
}
