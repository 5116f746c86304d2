pub mod matcher;
pub mod scanner;
pub mod tracker;

pub use matcher::match_policy;
pub use scanner::{BreachScanner, ScanOutcome};
pub use tracker::SlaTracker;
