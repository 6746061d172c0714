use crate::models::policy::{Policy, ViolationKind};
use crate::models::session::{NewSession, SessionInfo, SnapshotRecord, SnapshotStats};
use crate::models::verdict::Verdict;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// How long a connection waits on SQLite's write lock before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt row: {0}")]
    InvalidRow(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database file and run migrations
    pub async fn init(db_path: &Path) -> DbResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;

        tracing::info!(path = %db_path.display(), "database ready");
        Ok(db)
    }

    /// Private in-memory database, one connection kept alive for its lifetime
    pub async fn in_memory() -> DbResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Get the pool reference
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> DbResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

// ==============================================================================
// Row Models
// ==============================================================================

#[derive(Debug, Clone, sqlx::FromRow)]
struct SessionRow {
    id: String,
    user_id: String,
    student_name: String,
    subject_name: String,
    policy_json: String,
    identity_snapshot_id: Option<String>,
    detected_absence_person: Option<bool>,
    detected_extra_person: Option<bool>,
    detected_person_substitution: Option<bool>,
    detected_looking_away: Option<bool>,
    detected_mouth_opening: Option<bool>,
    detected_hints_outside: Option<bool>,
    created_at: i64,
}

impl SessionRow {
    fn into_session(self) -> DbResult<SessionInfo> {
        let policy: Policy = serde_json::from_str(&self.policy_json)?;
        Ok(SessionInfo {
            id: self.id,
            user_id: self.user_id,
            student_name: self.student_name,
            subject_name: self.subject_name,
            policy,
            identity_snapshot_id: self.identity_snapshot_id,
            result: Verdict {
                absence_person: self.detected_absence_person,
                extra_person: self.detected_extra_person,
                person_substitution: self.detected_person_substitution,
                looking_away: self.detected_looking_away,
                mouth_opening: self.detected_mouth_opening,
                hints_outside: self.detected_hints_outside,
            },
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct SnapshotRow {
    id: String,
    session_id: String,
    storage_key: String,
    violation: Option<String>,
    content_type: String,
    file_size: i64,
    created_at: i64,
}

impl SnapshotRow {
    fn into_record(self) -> DbResult<SnapshotRecord> {
        let violation = self
            .violation
            .as_deref()
            .map(ViolationKind::from_string)
            .transpose()
            .map_err(DbError::InvalidRow)?;
        Ok(SnapshotRecord {
            id: self.id,
            session_id: self.session_id,
            storage_key: self.storage_key,
            violation,
            content_type: self.content_type,
            file_size: self.file_size,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct VerdictRow {
    detected_absence_person: Option<bool>,
    detected_extra_person: Option<bool>,
    detected_person_substitution: Option<bool>,
    detected_looking_away: Option<bool>,
    detected_mouth_opening: Option<bool>,
    detected_hints_outside: Option<bool>,
}

impl VerdictRow {
    fn into_verdict(self) -> Verdict {
        Verdict {
            absence_person: self.detected_absence_person,
            extra_person: self.detected_extra_person,
            person_substitution: self.detected_person_substitution,
            looking_away: self.detected_looking_away,
            mouth_opening: self.detected_mouth_opening,
            hints_outside: self.detected_hints_outside,
        }
    }
}

/// Cumulative verdict columns, in `Verdict` field order
const VERDICT_COLUMNS: [&str; 6] = [
    "detected_absence_person",
    "detected_extra_person",
    "detected_person_substitution",
    "detected_looking_away",
    "detected_mouth_opening",
    "detected_hints_outside",
];

const SESSION_COLUMNS: &str = "id, user_id, student_name, subject_name, policy_json,
     identity_snapshot_id, detected_absence_person, detected_extra_person,
     detected_person_substitution,
     detected_looking_away, detected_mouth_opening, detected_hints_outside, created_at";

// ==============================================================================
// Sessions
// ==============================================================================

impl Database {
    /// Open a new proctoring session with an unevaluated result
    pub async fn create_session(&self, new: &NewSession) -> DbResult<SessionInfo> {
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = chrono::Utc::now().timestamp_millis();
        let policy_json = serde_json::to_string(&new.policy)?;

        sqlx::query(
            "INSERT INTO sessions (id, user_id, student_name, subject_name, policy_json, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&new.user_id)
        .bind(&new.student_name)
        .bind(&new.subject_name)
        .bind(&policy_json)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(SessionInfo {
            id,
            user_id: new.user_id.clone(),
            student_name: new.student_name.clone(),
            subject_name: new.subject_name.clone(),
            policy: new.policy,
            identity_snapshot_id: None,
            result: Verdict::default(),
            created_at,
        })
    }

    /// Get a session by ID
    pub async fn get_session(&self, id: &str) -> DbResult<Option<SessionInfo>> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {} FROM sessions WHERE id = ?",
            SESSION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SessionRow::into_session).transpose()
    }

    /// Mark one of the session's own snapshots as its identity photo
    pub async fn set_identity_snapshot(&self, session_id: &str, snapshot_id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE sessions SET identity_snapshot_id = ?
             WHERE id = ? AND EXISTS (SELECT 1 FROM snapshots WHERE id = ? AND session_id = ?)",
        )
        .bind(snapshot_id)
        .bind(session_id)
        .bind(snapshot_id)
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!(
                "snapshot {} in session {}",
                snapshot_id, session_id
            )));
        }
        Ok(())
    }

    /// Fold a frame verdict into the stored cumulative result. Returns the new total.
    ///
    /// The merge runs as one `UPDATE`, so concurrent checks on the same session
    /// serialize on SQLite's write lock instead of failing a read-then-write
    /// upgrade. The `CASE` mirrors [`Verdict::merge_into`].
    pub async fn merge_result(&self, session_id: &str, verdict: &Verdict) -> DbResult<Verdict> {
        let assignments = VERDICT_COLUMNS
            .iter()
            .map(|col| {
                format!(
                    "{col} = CASE WHEN {col} = 1 OR ? = 1 THEN 1 \
                     WHEN ? IS NULL THEN {col} ELSE COALESCE({col}, ?) END"
                )
            })
            .collect::<Vec<_>>()
            .join(",\n                ");
        let sql = format!(
            "UPDATE sessions SET {} WHERE id = ? RETURNING {}",
            assignments,
            VERDICT_COLUMNS.join(", ")
        );

        let incoming = [
            verdict.absence_person,
            verdict.extra_person,
            verdict.person_substitution,
            verdict.looking_away,
            verdict.mouth_opening,
            verdict.hints_outside,
        ];
        let mut query = sqlx::query_as::<_, VerdictRow>(&sql);
        for value in incoming {
            query = query.bind(value).bind(value).bind(value);
        }

        let row = query
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("session {}", session_id)))?;

        Ok(row.into_verdict())
    }

    /// Delete a session and, by cascade, its snapshot rows
    pub async fn delete_session(&self, id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

// ==============================================================================
// Snapshots
// ==============================================================================

impl Database {
    pub async fn insert_snapshot(&self, record: &SnapshotRecord) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO snapshots
                (id, session_id, storage_key, violation, content_type, file_size, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.session_id)
        .bind(&record.storage_key)
        .bind(record.violation.map(|v| v.to_string()))
        .bind(&record.content_type)
        .bind(record.file_size)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_snapshot(&self, id: &str) -> DbResult<Option<SnapshotRecord>> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            "SELECT id, session_id, storage_key, violation, content_type, file_size, created_at
             FROM snapshots WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SnapshotRow::into_record).transpose()
    }

    /// Snapshots of a session: identity photo first, then by capture time
    pub async fn list_snapshots(&self, session_id: &str) -> DbResult<Vec<SnapshotRecord>> {
        let rows = sqlx::query_as::<_, SnapshotRow>(
            "SELECT sn.id, sn.session_id, sn.storage_key, sn.violation, sn.content_type,
                    sn.file_size, sn.created_at
             FROM snapshots sn
             JOIN sessions s ON s.id = sn.session_id
             WHERE sn.session_id = ?
             ORDER BY CASE WHEN sn.id = s.identity_snapshot_id THEN 0 ELSE 1 END,
                      sn.created_at ASC, sn.id ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SnapshotRow::into_record).collect()
    }

    /// Total and violation snapshot counts from stored metadata
    pub async fn snapshot_stats(&self, session_id: &str) -> DbResult<SnapshotStats> {
        let (total, violations): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(CASE WHEN violation IS NOT NULL THEN 1 ELSE 0 END), 0)
             FROM snapshots WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(SnapshotStats {
            total: total as usize,
            violations: violations as usize,
        })
    }

    pub async fn delete_snapshot(&self, id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM snapshots WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_test_db() -> Database {
        Database::in_memory()
            .await
            .expect("Failed to create in-memory database")
    }

    fn new_session() -> NewSession {
        NewSession {
            user_id: "42".to_string(),
            student_name: "student42".to_string(),
            subject_name: "Algebra".to_string(),
            policy: Policy::all(),
        }
    }

    fn snapshot(
        session_id: &str,
        id: &str,
        created_at: i64,
        violation: Option<ViolationKind>,
    ) -> SnapshotRecord {
        SnapshotRecord {
            id: id.to_string(),
            session_id: session_id.to_string(),
            storage_key: format!("user_42/{}.jpg", id),
            violation,
            content_type: "image/jpeg".to_string(),
            file_size: 100,
            created_at,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_session() {
        let db = setup_test_db().await;
        let created = db.create_session(&new_session()).await.expect("Failed to create session");

        let session = db
            .get_session(&created.id)
            .await
            .expect("Failed to get session")
            .expect("Session not found");

        assert_eq!(session, created);
        assert_eq!(session.result, Verdict::default());
        assert_eq!(session.policy, Policy::all());
        assert!(db.get_session("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_merge_result_sticks() {
        let db = setup_test_db().await;
        let session = db.create_session(&new_session()).await.unwrap();

        let first = Verdict {
            looking_away: Some(true),
            mouth_opening: Some(false),
            ..Default::default()
        };
        db.merge_result(&session.id, &first).await.unwrap();

        let second = Verdict {
            looking_away: Some(false),
            mouth_opening: Some(true),
            ..Default::default()
        };
        let merged = db.merge_result(&session.id, &second).await.unwrap();

        assert_eq!(merged.looking_away, Some(true));
        assert_eq!(merged.mouth_opening, Some(true));
        assert_eq!(merged.absence_person, None);

        let stored = db.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(stored.result, merged);
    }

    #[tokio::test]
    async fn test_concurrent_merges_on_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::init(&dir.path().join("proctor.db")).await.unwrap();
        let session = db.create_session(&new_session()).await.unwrap();

        let verdicts: Vec<Verdict> = (0..40)
            .map(|i| Verdict {
                looking_away: Some(i == 17),
                mouth_opening: Some(false),
                hints_outside: if i % 2 == 0 { None } else { Some(i == 33) },
                ..Default::default()
            })
            .collect();

        let handles: Vec<_> = verdicts
            .iter()
            .copied()
            .map(|verdict| {
                let db = db.clone();
                let id = session.id.clone();
                tokio::spawn(async move { db.merge_result(&id, &verdict).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().expect("every concurrent merge must succeed");
        }

        let mut expected = Verdict::default();
        for verdict in &verdicts {
            verdict.merge_into(&mut expected);
        }
        let stored = db.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(stored.result, expected);
        assert_eq!(stored.result.looking_away, Some(true));
        assert_eq!(stored.result.hints_outside, Some(true));
        assert_eq!(stored.result.absence_person, None);
    }

    #[tokio::test]
    async fn test_merge_result_unknown_session() {
        let db = setup_test_db().await;
        let err = db.merge_result("nope", &Verdict::default()).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_snapshots_identity_first() {
        let db = setup_test_db().await;
        let session = db.create_session(&new_session()).await.unwrap();

        for (i, ts) in [500i64, 100, 300, 200, 400].iter().enumerate() {
            db.insert_snapshot(&snapshot(&session.id, &format!("snap{}", i), *ts, None))
                .await
                .unwrap();
        }
        // Identity photo captured last, still listed first
        db.insert_snapshot(&snapshot(&session.id, "identity", 900, None)).await.unwrap();
        db.set_identity_snapshot(&session.id, "identity").await.unwrap();

        let listed = db.list_snapshots(&session.id).await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["identity", "snap1", "snap3", "snap2", "snap4", "snap0"]);
    }

    #[tokio::test]
    async fn test_identity_must_belong_to_session() {
        let db = setup_test_db().await;
        let a = db.create_session(&new_session()).await.unwrap();
        let b = db.create_session(&new_session()).await.unwrap();
        db.insert_snapshot(&snapshot(&b.id, "other", 1, None)).await.unwrap();

        let err = db.set_identity_snapshot(&a.id, "other").await.unwrap_err();
        assert!(matches!(err, DbError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_snapshot_stats_and_violation_round_trip() {
        let db = setup_test_db().await;
        let session = db.create_session(&new_session()).await.unwrap();

        db.insert_snapshot(&snapshot(&session.id, "a", 1, None)).await.unwrap();
        db.insert_snapshot(&snapshot(&session.id, "b", 2, Some(ViolationKind::ExtraPerson)))
            .await
            .unwrap();
        db.insert_snapshot(&snapshot(&session.id, "c", 3, Some(ViolationKind::LookingAway)))
            .await
            .unwrap();

        let stats = db.snapshot_stats(&session.id).await.unwrap();
        assert_eq!(stats, SnapshotStats { total: 3, violations: 2 });

        let b = db.get_snapshot("b").await.unwrap().unwrap();
        assert_eq!(b.violation, Some(ViolationKind::ExtraPerson));

        let empty = db.snapshot_stats("none").await.unwrap();
        assert_eq!(empty, SnapshotStats::default());
    }

    #[tokio::test]
    async fn test_delete_snapshot_clears_identity() {
        let db = setup_test_db().await;
        let session = db.create_session(&new_session()).await.unwrap();
        db.insert_snapshot(&snapshot(&session.id, "id", 1, None)).await.unwrap();
        db.set_identity_snapshot(&session.id, "id").await.unwrap();

        assert!(db.delete_snapshot("id").await.unwrap());
        assert!(!db.delete_snapshot("id").await.unwrap());

        let stored = db.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(stored.identity_snapshot_id, None);
    }

    #[tokio::test]
    async fn test_delete_session_cascades() {
        let db = setup_test_db().await;
        let session = db.create_session(&new_session()).await.unwrap();
        db.insert_snapshot(&snapshot(&session.id, "x", 1, None)).await.unwrap();

        assert!(db.delete_session(&session.id).await.unwrap());
        assert!(db.get_session(&session.id).await.unwrap().is_none());
        assert!(db.get_snapshot("x").await.unwrap().is_none());
    }
}
