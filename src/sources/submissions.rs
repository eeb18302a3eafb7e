use url::Url;

use crate::db::{Repository, SubmissionLink};
use crate::error::Result;
use crate::models::{Origin, Reference};

fn is_web_link(link: &str) -> bool {
    link.len() > 2
        && Url::parse(link)
            .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
            .unwrap_or(false)
}

fn to_reference(link: SubmissionLink) -> Option<Reference> {
    if !is_web_link(&link.url) {
        tracing::debug!(url = %link.url, "Skipping submission without a web link");
        return None;
    }
    Some(Reference::new(
        link.title,
        link.url,
        Origin::RedditSubmission,
        link.created_at,
    ))
}

/// External links of stored submissions, oldest submission first.
pub async fn submission_references(repo: &Repository) -> Result<Vec<Reference>> {
    let links = repo.get_submission_links().await?;
    Ok(links.into_iter().filter_map(to_reference).collect())
}
