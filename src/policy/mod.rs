mod acceptance;
mod blacklist;

pub use acceptance::{accept, Decision, RejectReason};
pub use blacklist::Blacklist;
