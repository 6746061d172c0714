// Evidence report assembly
// Snapshots are downloaded concurrently (bounded), then laid out on a
// blocking thread into a single PDF.

pub mod fetch;
pub mod layout;

use crate::core::evidence_store::EvidenceStore;
use crate::models::session::{SessionInfo, SnapshotRecord, SnapshotStats};
use chrono::Utc;
use layout::{ReportContent, SnapshotBlock};
use std::sync::Arc;
use thiserror::Error;

pub const REPORT_MIME: &str = "application/pdf";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("PDF rendering failed: {0}")]
    Render(String),

    #[error("Report task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type ReportResult<T> = Result<T, ReportError>;

/// Counters describing a rendered report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSummary {
    pub pages: usize,
    /// Snapshot blocks drawn, one per listed snapshot
    pub blocks: usize,
    pub images: usize,
    pub failed_fetches: usize,
    /// Snapshot ids in the order they appear in the report
    pub snapshot_order: Vec<String>,
}

/// A finished report, held in memory only
#[derive(Debug, Clone)]
pub struct Report {
    pub bytes: Vec<u8>,
    pub summary: ReportSummary,
}

impl Report {
    pub fn mime_type(&self) -> &'static str {
        REPORT_MIME
    }
}

/// Identity photo first, the rest by capture time.
/// Ties on capture time fall back to the snapshot id so the order is stable.
pub fn order_snapshots(session: &SessionInfo, records: &[SnapshotRecord]) -> Vec<SnapshotRecord> {
    let identity = session.identity_snapshot_id.as_deref();
    let mut ordered = records.to_vec();
    ordered.sort_by(|a, b| {
        let a_identity = Some(a.id.as_str()) == identity;
        let b_identity = Some(b.id.as_str()) == identity;
        b_identity
            .cmp(&a_identity)
            .then(a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
    ordered
}

pub struct ReportAssembler {
    store: Arc<dyn EvidenceStore>,
    max_concurrent_fetches: usize,
}

impl ReportAssembler {
    pub fn new(store: Arc<dyn EvidenceStore>, max_concurrent_fetches: usize) -> Self {
        Self {
            store,
            max_concurrent_fetches: max_concurrent_fetches.max(1),
        }
    }

    /// Build the PDF for `session`.
    ///
    /// `records` may arrive in any order; they are re-ordered with
    /// [`order_snapshots`]. `stats` come from stored metadata, not from the
    /// fetch outcome, so a failed download still counts as a snapshot.
    pub async fn assemble(
        &self,
        session: &SessionInfo,
        records: &[SnapshotRecord],
        stats: SnapshotStats,
    ) -> ReportResult<Report> {
        let ordered = order_snapshots(session, records);
        let keys: Vec<String> = ordered.iter().map(|r| r.storage_key.clone()).collect();

        let images =
            fetch::fetch_all(self.store.clone(), &keys, self.max_concurrent_fetches).await;

        let identity = session.identity_snapshot_id.as_deref();
        let blocks = ordered
            .iter()
            .zip(images)
            .enumerate()
            .map(|(i, (record, image))| SnapshotBlock {
                number: i + 1,
                taken_at: record.created_at_utc(),
                violation: record.violation,
                is_identity: Some(record.id.as_str()) == identity,
                image,
            })
            .collect();

        let content = ReportContent {
            session: session.clone(),
            stats,
            generated_at: Utc::now(),
            blocks,
        };
        let (bytes, layout) = tokio::task::spawn_blocking(move || layout::render(&content)).await??;

        let summary = ReportSummary {
            pages: layout.pages,
            blocks: layout.blocks,
            images: layout.images,
            failed_fetches: layout.failed,
            snapshot_order: ordered.into_iter().map(|r| r.id).collect(),
        };

        tracing::info!(
            session_id = %session.id,
            snapshots = summary.blocks,
            failed_fetches = summary.failed_fetches,
            pages = summary.pages,
            bytes = bytes.len(),
            store = self.store.backend_name(),
            "report generated"
        );

        Ok(Report { bytes, summary })
    }
}
