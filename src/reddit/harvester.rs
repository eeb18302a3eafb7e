use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::config::HarvestConfig;
use crate::models::{attached_stubs, flatten, Comment, DiscussionThread, MoreStub};
use crate::traits::Platform;

/// Most child ids `/api/morechildren` resolves per call.
pub const MORE_CHILDREN_LIMIT: usize = 100;

const ROOT_STUB_CHILDREN: usize = 10;
const MIN_REPORTED_COMMENTS: i64 = 20;
const KNOWN_FRACTION: f64 = 0.667;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarvestLimits {
    pub max_depth: i32,
    /// Stubs with fewer children than this are not worth a call.
    pub min_children: usize,
    pub max_calls: usize,
}

impl From<HarvestConfig> for HarvestLimits {
    fn from(config: HarvestConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            min_children: config.min_children,
            max_calls: config.max_calls,
        }
    }
}

/// Whether a thread is incomplete enough to spend expansion calls on.
pub fn should_harvest(thread: &DiscussionThread, known_comments: usize) -> bool {
    let big_root_stub = thread
        .more
        .iter()
        .any(|m| m.children.len() >= ROOT_STUB_CHILDREN);

    let reported = thread.post.num_comments;
    let mostly_missing =
        reported > MIN_REPORTED_COMMENTS && (known_comments as f64) < KNOWN_FRACTION * reported as f64;

    big_root_stub || mostly_missing
}

/// Heap entry: more children first, then first come first served.
struct Queued {
    size: usize,
    seq: u64,
    stub: MoreStub,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        self.size
            .cmp(&other.size)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Default)]
pub struct Harvested {
    /// Comments recovered by expansion calls; excludes the initial tree.
    pub comments: Vec<Comment>,
    pub calls_used: usize,
}

/// Expands truncated branches of one thread, largest stub first, within a
/// fixed call budget. Best effort: whatever the budget does not reach stays
/// missing.
pub struct MoreQueue {
    heap: BinaryHeap<Queued>,
    next_seq: u64,
    limits: HarvestLimits,
    calls_used: usize,
    link_id: String,
    comments: Vec<Comment>,
}

impl MoreQueue {
    pub fn new(thread: &DiscussionThread, limits: HarvestLimits) -> Self {
        let stubs = thread.stubs();
        let link_id = if thread.post.fullname.is_empty() {
            stubs
                .first()
                .map(|s| s.parent_id.clone())
                .unwrap_or_default()
        } else {
            thread.post.fullname.clone()
        };

        let mut queue = Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
            limits,
            calls_used: 0,
            link_id,
            comments: Vec::new(),
        };
        for stub in stubs {
            queue.push(stub);
        }
        queue
    }

    pub fn push(&mut self, stub: MoreStub) {
        self.heap.push(Queued {
            size: stub.children.len(),
            seq: self.next_seq,
            stub,
        });
        self.next_seq += 1;
    }

    fn pop(&mut self) -> Option<MoreStub> {
        self.heap.pop().map(|q| q.stub)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    fn budget_left(&self) -> bool {
        self.calls_used <= self.limits.max_calls
    }

    pub fn admits(&self, stub: &MoreStub) -> bool {
        stub.depth <= self.limits.max_depth
            && stub.children.len() >= self.limits.min_children
            && self.budget_left()
    }

    fn absorb(&mut self, comments: Vec<Comment>, stubs: Vec<MoreStub>) {
        for stub in attached_stubs(&comments) {
            self.push(stub);
        }
        for stub in stubs {
            self.push(stub);
        }
        self.comments.extend(flatten(&comments));
    }

    pub async fn harvest(mut self, platform: &dyn Platform) -> Harvested {
        while let Some(stub) = self.pop() {
            if !self.budget_left() {
                break;
            }
            if !self.admits(&stub) {
                tracing::trace!(
                    stub = %stub.id,
                    depth = stub.depth,
                    children = stub.children.len(),
                    "Discarding more stub"
                );
                continue;
            }

            for chunk in stub.children.chunks(MORE_CHILDREN_LIMIT) {
                if !self.budget_left() {
                    break;
                }
                self.calls_used += 1;

                match platform.expand_more(&self.link_id, chunk).await {
                    Ok((comments, stubs)) => self.absorb(comments, stubs),
                    Err(e) => tracing::warn!(
                        link = %self.link_id,
                        stub = %stub.id,
                        error = %e,
                        "Failed to expand more stub"
                    ),
                }
            }
        }

        tracing::info!(
            link = %self.link_id,
            calls = self.calls_used,
            comments = self.comments.len(),
            "Harvested more comments"
        );

        Harvested {
            comments: self.comments,
            calls_used: self.calls_used,
        }
    }
}
