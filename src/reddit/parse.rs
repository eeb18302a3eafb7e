use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::models::{Comment, DiscussionThread, MoreStub, RootPost};

use super::{NewPost, PlatformError};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PostData {
    id: String,
    name: String,
    title: String,
    url: String,
    permalink: String,
    author: String,
    subreddit: String,
    subreddit_id: String,
    selftext: String,
    num_comments: i64,
    score: i64,
    ups: i64,
    downs: i64,
    over_18: bool,
    is_self: bool,
    is_reddit_media_domain: bool,
    removed_by_category: Option<String>,
    created_utc: f64,
}

/// Comment fields without `replies`, which is detached and walked separately.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CommentData {
    id: String,
    name: String,
    parent_id: String,
    author: String,
    body: String,
    score: i64,
    ups: i64,
    downs: i64,
    created_utc: f64,
    depth: i32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MoreData {
    id: String,
    parent_id: String,
    depth: i32,
    count: i64,
    children: Vec<String>,
}

/// One `{kind, data}` listing entry.
struct Entry {
    kind: String,
    data: Value,
}

/// Parses a response body with no nesting limit. Reply chains can be nested
/// far deeper than serde_json allows by default, so the stack grows on demand.
fn decode(body: &str) -> Result<Value, PlatformError> {
    let mut de = serde_json::Deserializer::from_str(body);
    de.disable_recursion_limit();
    let value = Value::deserialize(serde_stacker::Deserializer::new(&mut de))?;
    de.end()?;
    Ok(value)
}

fn take(value: &mut Value, key: &str) -> Value {
    value.get_mut(key).map(Value::take).unwrap_or(Value::Null)
}

fn entries(items: Value) -> Vec<Entry> {
    let Value::Array(items) = items else {
        return Vec::new();
    };
    items
        .into_iter()
        .filter_map(|mut item| {
            let kind = item.get("kind")?.as_str()?.to_string();
            let data = take(&mut item, "data");
            Some(Entry { kind, data })
        })
        .collect()
}

/// Entries of a `Listing`; anything else (reddit sends `""` for no replies)
/// has none.
fn listing_entries(mut listing: Value) -> Vec<Entry> {
    let mut data = take(&mut listing, "data");
    entries(take(&mut data, "children"))
}

/// Decodes shallow wire data, falling back to defaults when a field has an
/// unexpected type.
fn lenient<T: DeserializeOwned + Default>(kind: &str, data: Value) -> T {
    serde_json::from_value(data).unwrap_or_else(|e| {
        tracing::warn!(kind, error = %e, "Malformed listing entry, using defaults");
        T::default()
    })
}

fn timestamp(created_utc: f64) -> Option<DateTime<Utc>> {
    if created_utc <= 0.0 {
        return None;
    }
    DateTime::from_timestamp(created_utc as i64, 0)
}

fn is_deleted_text(s: &str) -> bool {
    s == "[deleted]" || s == "[removed]"
}

fn to_post(data: PostData) -> RootPost {
    let deleted = data.removed_by_category.is_some() || is_deleted_text(&data.selftext);
    RootPost {
        id: data.id,
        fullname: data.name,
        title: data.title,
        url: data.url,
        permalink: data.permalink,
        author: data.author,
        subreddit: data.subreddit,
        subreddit_id: data.subreddit_id,
        selftext: data.selftext,
        num_comments: data.num_comments,
        score: data.score,
        ups: data.ups,
        downs: data.downs,
        nsfw: data.over_18,
        is_self: data.is_self,
        is_media_domain: data.is_reddit_media_domain,
        deleted,
        created_at: timestamp(data.created_utc),
    }
}

fn to_stub(data: MoreData) -> MoreStub {
    MoreStub {
        id: data.id,
        parent_id: data.parent_id,
        depth: data.depth,
        count: data.count,
        children: data.children,
    }
}

fn to_comment(data: CommentData) -> Comment {
    Comment {
        deleted: is_deleted_text(&data.body) || is_deleted_text(&data.author),
        id: data.id,
        fullname: data.name,
        parent_id: data.parent_id,
        author: data.author,
        body: data.body,
        score: data.score,
        ups: data.ups,
        downs: data.downs,
        created_at: timestamp(data.created_utc),
        depth: data.depth,
        children: Vec::new(),
        more: None,
    }
}

struct Node {
    comment: Comment,
    children: Vec<usize>,
    stubs: Vec<MoreStub>,
}

/// Splits listing entries into comments (with nested replies) and the stubs
/// found at the top level.
///
/// Replies are walked with an explicit stack into a flat arena, then nested
/// bottom-up. Every child lands in the arena after its parent, so a reverse
/// pass always finds a node's children finished.
fn build_forest(top: Vec<Entry>) -> (Vec<Comment>, Vec<MoreStub>) {
    let mut arena: Vec<Node> = Vec::new();
    let mut roots = Vec::new();
    let mut root_stubs = Vec::new();
    let mut pending: Vec<(Option<usize>, Vec<Entry>)> = vec![(None, top)];

    while let Some((parent, batch)) = pending.pop() {
        for entry in batch {
            match entry.kind.as_str() {
                "t1" => {
                    let mut data = entry.data;
                    let replies = take(&mut data, "replies");
                    let index = arena.len();
                    arena.push(Node {
                        comment: to_comment(lenient("t1", data)),
                        children: Vec::new(),
                        stubs: Vec::new(),
                    });
                    match parent {
                        Some(p) => arena[p].children.push(index),
                        None => roots.push(index),
                    }
                    let replies = listing_entries(replies);
                    if !replies.is_empty() {
                        pending.push((Some(index), replies));
                    }
                }
                "more" => {
                    let stub = to_stub(lenient("more", entry.data));
                    match parent {
                        Some(p) => arena[p].stubs.push(stub),
                        None => root_stubs.push(stub),
                    }
                }
                other => tracing::debug!(kind = other, "Skipping unexpected listing entry"),
            }
        }
    }

    let mut done: Vec<Option<Comment>> = (0..arena.len()).map(|_| None).collect();
    for (index, node) in arena.into_iter().enumerate().rev() {
        let mut comment = node.comment;
        comment.children = node.children.iter().filter_map(|&c| done[c].take()).collect();
        // A listing carries at most one "more" entry per parent.
        comment.more = node.stubs.into_iter().last();
        done[index] = Some(comment);
    }
    let comments = roots.into_iter().filter_map(|r| done[r].take()).collect();

    (comments, root_stubs)
}

/// Parses the `[post listing, comment listing]` pair returned for a permalink.
pub fn parse_thread(body: &str) -> Result<DiscussionThread, PlatformError> {
    let Value::Array(listings) = decode(body)? else {
        return Err(PlatformError::Other("thread response is not a pair of listings".into()));
    };
    let mut listings = listings.into_iter();

    let post = listings
        .next()
        .map(listing_entries)
        .unwrap_or_default()
        .into_iter()
        .find(|e| e.kind == "t3")
        .ok_or(PlatformError::NotFound)?;
    let post = to_post(serde_json::from_value(post.data)?);

    let (comments, more) = match listings.next() {
        Some(listing) => build_forest(listing_entries(listing)),
        None => (Vec::new(), Vec::new()),
    };

    Ok(DiscussionThread {
        post,
        comments,
        more,
    })
}

/// Parses an `/api/morechildren` response.
pub fn parse_more_children(body: &str) -> Result<(Vec<Comment>, Vec<MoreStub>), PlatformError> {
    let mut response = decode(body)?;
    let Some(mut json) = response.get_mut("json").map(Value::take) else {
        return Err(PlatformError::Other("morechildren response without json".into()));
    };

    if let Some(error) = json.get("errors").and_then(Value::as_array).and_then(|e| e.first()) {
        let text = error.to_string();
        if text.contains("RATELIMIT") {
            return Err(PlatformError::RateLimited);
        }
        return Err(PlatformError::Other(format!("morechildren error: {text}")));
    }

    let mut data = take(&mut json, "data");
    Ok(build_forest(entries(take(&mut data, "things"))))
}

/// Parses a subreddit listing into the posts the listener queues.
pub fn parse_new_posts(body: &str) -> Result<Vec<NewPost>, PlatformError> {
    let mut posts = Vec::new();

    for entry in listing_entries(decode(body)?) {
        if entry.kind != "t3" {
            continue;
        }
        let data: PostData = serde_json::from_value(entry.data)?;
        let Some(created_at) = timestamp(data.created_utc) else {
            tracing::warn!(permalink = %data.permalink, "Submission without creation time");
            continue;
        };
        posts.push(NewPost {
            fullname: data.name,
            permalink: data.permalink,
            created_at,
        });
    }

    Ok(posts)
}
