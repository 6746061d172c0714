pub mod core;
pub mod models;
pub mod platform;

pub use crate::core::aggregator::ViolationAggregator;
pub use crate::core::config::Config;
pub use crate::core::database::Database;
pub use crate::core::evidence_store::EvidenceStore;
pub use crate::core::report::{Report, ReportAssembler, ReportSummary, REPORT_MIME};
pub use crate::core::service::{ProctorError, ProctorResult, ProctoringService};
pub use crate::models::policy::{Policy, ViolationKind};
pub use crate::models::verdict::Verdict;
pub use crate::platform::landmarks::{DefaultLandmarkProvider, LandmarkProvider};

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// The filter comes from `RUST_LOG`, defaulting to `info`. Calling it again
/// after a subscriber is installed has no effect.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
