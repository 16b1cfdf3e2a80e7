//! Message ingestion and alert matching.

mod alert;
mod service;

pub use alert::{AlertMatcher, AlertSelector};
pub use service::{DEFAULT_ALERT_QUEUE_CAPACITY, IngestOutcome, IngestService};
