mod article;
mod reference;
mod submission;
mod thread;

pub use article::{Article, ExtractedDocument};
pub use reference::{host_of, Origin, Reference};
pub use submission::QueuedSubmission;
pub use thread::{attached_stubs, flatten, Comment, DiscussionThread, MoreStub, RootPost};
