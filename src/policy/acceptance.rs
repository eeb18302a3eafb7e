use std::fmt;

use crate::db::parse_datetime;
use crate::models::{host_of, Article, ExtractedDocument, Reference};

use super::Blacklist;

const MIN_BODY_CHARS: usize = 3;
const SHORT_BODY_CHARS: usize = 30;
const MIN_TITLE_CHARS: usize = 3;
// Longer than a tweet means we probably extracted something that is not a title.
const MAX_TITLE_CHARS: usize = 280;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    AlreadySeen,
    EmptyBody,
    InvalidTitle,
    Blacklisted,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectReason::AlreadySeen => "already seen",
            RejectReason::EmptyBody => "empty body",
            RejectReason::InvalidTitle => "invalid title",
            RejectReason::Blacklisted => "blacklisted",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Store `article` and mark every one of `keys` as seen.
    Accept { article: Article, keys: Vec<String> },
    Reject(RejectReason),
}

/// Decides whether an extracted document becomes an article.
///
/// `is_seen` answers dedup-cache membership from a snapshot taken by the
/// caller, so the decision depends on its inputs alone. Rules are checked in
/// order and the first failure is the reason reported.
pub fn accept<F>(
    reference: &Reference,
    document: &ExtractedDocument,
    blacklist: &Blacklist,
    is_seen: F,
) -> Decision
where
    F: Fn(&str) -> bool,
{
    let canonical = clean_canonical(document.canonical.as_deref());

    if is_seen(&reference.link) || canonical.as_deref().is_some_and(|c| is_seen(c)) {
        return Decision::Reject(RejectReason::AlreadySeen);
    }

    let body = document.text.trim();
    let body_chars = body.chars().count();
    if body_chars < MIN_BODY_CHARS {
        return Decision::Reject(RejectReason::EmptyBody);
    }
    if body_chars < SHORT_BODY_CHARS {
        tracing::warn!(link = %reference.link, length = body_chars, "Suspiciously short article");
    }

    let title = valid_title(&document.title);
    let source_title = valid_title(&reference.title);
    if title.is_none() && source_title.is_none() {
        return Decision::Reject(RejectReason::InvalidTitle);
    }

    let host = resolve_host(reference, canonical.as_deref());
    if blacklist.contains(&reference.host) || blacklist.contains(&host) {
        return Decision::Reject(RejectReason::Blacklisted);
    }

    let article = Article {
        source: reference.origin.to_string(),
        host,
        link: reference.link.clone(),
        source_published_at: reference.published_at,
        published_at: published_at(reference, document.published.as_deref()),
        source_title,
        title,
        canonical_link: canonical,
        body: body.to_string(),
        authors: document.authors.clone(),
    };
    let keys = article.dedup_keys();

    Decision::Accept { article, keys }
}

fn valid_title(s: &str) -> Option<String> {
    let clean = s.trim();
    let len = clean.chars().count();
    if !(MIN_TITLE_CHARS..=MAX_TITLE_CHARS).contains(&len) {
        return None;
    }
    Some(clean.to_string())
}

/// Canonical links share the title bounds; anything outside them is noise.
fn clean_canonical(s: Option<&str>) -> Option<String> {
    valid_title(s?)
}

/// Canonical host when the canonical link parses, else the reference host.
fn resolve_host(reference: &Reference, canonical: Option<&str>) -> String {
    if let Some(link) = canonical {
        match host_of(link) {
            Some(host) => return host,
            None => {
                tracing::warn!(link = %reference.link, canonical = %link, "Could not parse canonical host")
            }
        }
    }
    reference.host.clone()
}

fn published_at(reference: &Reference, raw: Option<&str>) -> Option<chrono::DateTime<chrono::Utc>> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    let parsed = parse_datetime(raw);
    if parsed.is_none() {
        tracing::warn!(link = %reference.link, published = %raw, "Unparseable publish date");
    }
    parsed
}
