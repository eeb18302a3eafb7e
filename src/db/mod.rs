mod dedup;
mod queue;
mod repository;
mod schema;

pub use dedup::SqliteDedupCache;
pub use queue::SubmissionQueue;
pub use repository::{parse_datetime, Repository, SubmissionLink};
