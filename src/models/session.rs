// Proctoring sessions and stored evidence snapshots

use crate::models::policy::{Policy, ViolationKind};
use crate::models::verdict::Verdict;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A monitored exam attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub user_id: String,
    pub student_name: String,
    pub subject_name: String,
    pub policy: Policy,
    /// Snapshot taken at session start to identify the student
    pub identity_snapshot_id: Option<String>,
    /// Cumulative verdict over every frame checked so far
    pub result: Verdict,
    /// Milliseconds since the Unix epoch
    pub created_at: i64,
}

impl SessionInfo {
    pub fn created_at_utc(&self) -> DateTime<Utc> {
        millis_to_utc(self.created_at)
    }
}

/// Parameters for opening a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSession {
    pub user_id: String,
    pub student_name: String,
    pub subject_name: String,
    pub policy: Policy,
}

/// Metadata of one stored evidence image. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub id: String,
    pub session_id: String,
    pub storage_key: String,
    pub violation: Option<ViolationKind>,
    pub content_type: String,
    pub file_size: i64,
    /// Capture time, milliseconds since the Unix epoch
    pub created_at: i64,
}

impl SnapshotRecord {
    pub fn is_violation(&self) -> bool {
        self.violation.is_some()
    }

    pub fn created_at_utc(&self) -> DateTime<Utc> {
        millis_to_utc(self.created_at)
    }
}

/// Snapshot counts for a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotStats {
    pub total: usize,
    pub violations: usize,
}

impl SnapshotStats {
    pub fn from_records(records: &[SnapshotRecord]) -> Self {
        Self {
            total: records.len(),
            violations: records.iter().filter(|r| r.is_violation()).count(),
        }
    }
}

pub(crate) fn millis_to_utc(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, violation: Option<ViolationKind>) -> SnapshotRecord {
        SnapshotRecord {
            id: id.to_string(),
            session_id: "s".to_string(),
            storage_key: format!("user_1/2024-01-01/{}.jpg", id),
            violation,
            content_type: "image/jpeg".to_string(),
            file_size: 10,
            created_at: 0,
        }
    }

    #[test]
    fn test_stats_from_records() {
        let records = vec![
            record("a", None),
            record("b", Some(ViolationKind::LookingAway)),
            record("c", Some(ViolationKind::ExtraPerson)),
        ];
        let stats = SnapshotStats::from_records(&records);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.violations, 2);
    }

    #[test]
    fn test_millis_to_utc() {
        let dt = millis_to_utc(1_704_067_200_123);
        assert_eq!(dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string(), "2024-01-01 00:00:00.123");
    }
}
