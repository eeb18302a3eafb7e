use chrono::{DateTime, Utc};

/// Top-level post of a discussion thread.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RootPost {
    pub id: String,
    /// Type-prefixed id (`t3_...`), used as `link_id` when expanding stubs.
    pub fullname: String,
    pub title: String,
    pub url: String,
    pub permalink: String,
    pub author: String,
    pub subreddit: String,
    pub subreddit_id: String,
    pub selftext: String,
    pub num_comments: i64,
    pub score: i64,
    pub ups: i64,
    pub downs: i64,
    pub nsfw: bool,
    pub is_self: bool,
    pub is_media_domain: bool,
    pub deleted: bool,
    pub created_at: Option<DateTime<Utc>>,
}

impl RootPost {
    /// Link pointing away from the platform, if the post carries one.
    pub fn external_link(&self) -> Option<&str> {
        let url = self.url.trim();
        if self.is_self || self.is_media_domain || url.len() <= 2 {
            return None;
        }
        Some(url)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Comment {
    pub id: String,
    pub fullname: String,
    pub parent_id: String,
    pub author: String,
    pub body: String,
    pub score: i64,
    pub ups: i64,
    pub downs: i64,
    pub deleted: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub depth: i32,
    pub children: Vec<Comment>,
    /// Truncation marker for replies the API did not return.
    pub more: Option<MoreStub>,
}

impl Comment {
    fn detached(&self) -> Comment {
        Comment {
            id: self.id.clone(),
            fullname: self.fullname.clone(),
            parent_id: self.parent_id.clone(),
            author: self.author.clone(),
            body: self.body.clone(),
            score: self.score,
            ups: self.ups,
            downs: self.downs,
            deleted: self.deleted,
            created_at: self.created_at,
            depth: self.depth,
            children: Vec::new(),
            more: None,
        }
    }
}

/// Marker for a branch the API truncated; `children` are the ids still to fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MoreStub {
    pub id: String,
    pub parent_id: String,
    pub depth: i32,
    pub count: i64,
    pub children: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscussionThread {
    pub post: RootPost,
    pub comments: Vec<Comment>,
    /// Stubs hanging directly off the root post.
    pub more: Vec<MoreStub>,
}

impl DiscussionThread {
    /// Every stub in the thread: the root's own, then those attached to comments.
    pub fn stubs(&self) -> Vec<MoreStub> {
        let mut out = self.more.clone();
        out.extend(attached_stubs(&self.comments));
        out
    }
}

/// Stubs attached to any comment in the forest, in pre-order.
pub fn attached_stubs(comments: &[Comment]) -> Vec<MoreStub> {
    let mut out = Vec::new();
    let mut stack: Vec<&Comment> = comments.iter().rev().collect();
    while let Some(comment) = stack.pop() {
        if let Some(more) = &comment.more {
            out.push(more.clone());
        }
        stack.extend(comment.children.iter().rev());
    }
    out
}

/// Pre-order list of every comment in the forest, with children detached.
/// Walks with an explicit stack so very deep threads cannot overflow.
pub fn flatten(comments: &[Comment]) -> Vec<Comment> {
    let mut out = Vec::new();
    let mut stack: Vec<&Comment> = comments.iter().rev().collect();
    while let Some(comment) = stack.pop() {
        out.push(comment.detached());
        stack.extend(comment.children.iter().rev());
    }
    out
}
