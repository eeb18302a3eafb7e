mod driver;

pub use driver::{IngestionDriver, Politeness, TaskOutcome};
