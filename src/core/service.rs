// Proctoring service
// Entry point for callers: frame checks, evidence uploads and report generation
// over one database, one evidence store and one landmark provider.

use crate::core::aggregator::ViolationAggregator;
use crate::core::config::Config;
use crate::core::database::{Database, DbError};
use crate::core::evidence_store::{
    snapshot_key, EvidenceStore, FsEvidenceStore, HttpEvidenceStore, StorageError,
};
use crate::core::report::{Report, ReportAssembler, ReportError};
use crate::models::frame::{is_image_content_type, Frame, FrameError};
use crate::models::landmarks::LandmarkError;
use crate::models::policy::ViolationKind;
use crate::models::session::{NewSession, SessionInfo, SnapshotRecord};
use crate::models::verdict::Verdict;
use crate::platform::landmarks::LandmarkProvider;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProctorError {
    #[error("Invalid image: {0}")]
    InvalidImage(#[from] FrameError),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Landmark extraction failed: {0}")]
    Landmarks(#[from] LandmarkError),

    #[error("Report generation failed: {0}")]
    Report(#[from] ReportError),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type ProctorResult<T> = Result<T, ProctorError>;

/// Build the evidence store selected by `config`: HTTP when an endpoint is
/// configured, the local directory otherwise.
pub async fn open_evidence_store(config: &Config) -> ProctorResult<Arc<dyn EvidenceStore>> {
    let store: Arc<dyn EvidenceStore> = match &config.evidence_endpoint {
        Some(endpoint) => Arc::new(HttpEvidenceStore::new(
            endpoint,
            &config.evidence_bucket,
            config.evidence_token.clone(),
            Duration::from_secs(config.http_timeout_seconds),
        )?),
        None => Arc::new(FsEvidenceStore::new(config.storage_path.clone()).await?),
    };
    tracing::info!(backend = store.backend_name(), "evidence store ready");
    Ok(store)
}

pub struct ProctoringService {
    db: Database,
    store: Arc<dyn EvidenceStore>,
    landmarks: Arc<dyn LandmarkProvider>,
    aggregator: Arc<ViolationAggregator>,
    reports: ReportAssembler,
}

impl ProctoringService {
    pub fn new(
        db: Database,
        store: Arc<dyn EvidenceStore>,
        landmarks: Arc<dyn LandmarkProvider>,
        config: &Config,
    ) -> Self {
        tracing::info!(
            store = store.backend_name(),
            landmarks = %landmarks.model_info(),
            "proctoring service created"
        );
        Self {
            reports: ReportAssembler::new(store.clone(), config.max_concurrent_fetches),
            aggregator: Arc::new(ViolationAggregator::new(&config.thresholds)),
            db,
            store,
            landmarks,
        }
    }

    /// Open the database and evidence store named in `config`
    pub async fn open(
        config: &Config,
        landmarks: Arc<dyn LandmarkProvider>,
    ) -> ProctorResult<Self> {
        let db = Database::init(&config.database_path).await?;
        let store = open_evidence_store(config).await?;
        Ok(Self::new(db, store, landmarks, config))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub async fn create_session(&self, new: &NewSession) -> ProctorResult<SessionInfo> {
        let session = self.db.create_session(new).await?;
        tracing::info!(session_id = %session.id, user_id = %session.user_id, "session created");
        Ok(session)
    }

    pub async fn get_session(&self, session_id: &str) -> ProctorResult<SessionInfo> {
        self.db
            .get_session(session_id)
            .await?
            .ok_or_else(|| ProctorError::SessionNotFound(session_id.to_string()))
    }

    /// Evaluate one encoded frame under the session's policy and fold the
    /// outcome into the session result. Returns this frame's verdict.
    ///
    /// An undecodable frame is rejected before any state changes.
    pub async fn check_frame(&self, session_id: &str, bytes: Vec<u8>) -> ProctorResult<Verdict> {
        let session = self.get_session(session_id).await?;

        let landmarks = self.landmarks.clone();
        let aggregator = self.aggregator.clone();
        let policy = session.policy;
        let verdict = tokio::task::spawn_blocking(move || -> ProctorResult<Verdict> {
            let frame = Frame::decode(&bytes, Utc::now().timestamp_millis())?;
            let faces = landmarks.detect(&frame)?;
            Ok(aggregator.check(&frame, &faces, &policy))
        })
        .await??;

        let cumulative = match self.db.merge_result(session_id, &verdict).await {
            Err(DbError::NotFound(_)) => {
                return Err(ProctorError::SessionNotFound(session_id.to_string()))
            }
            other => other?,
        };

        tracing::debug!(
            session_id,
            frame = ?verdict.violations(),
            cumulative = ?cumulative.violations(),
            "frame verdict merged"
        );
        Ok(verdict)
    }

    /// Store an evidence image and record it against the session
    pub async fn upload_snapshot(
        &self,
        session_id: &str,
        bytes: Vec<u8>,
        content_type: &str,
        violation: Option<ViolationKind>,
    ) -> ProctorResult<SnapshotRecord> {
        if !is_image_content_type(content_type) {
            return Err(FrameError::UnsupportedContentType(content_type.to_string()).into());
        }
        if bytes.is_empty() {
            return Err(FrameError::EmptyInput.into());
        }

        let session = self.get_session(session_id).await?;
        let taken_at = Utc::now();
        let id = uuid::Uuid::new_v4().to_string();
        let key = snapshot_key(&session.user_id, &id, taken_at, violation);

        let record = SnapshotRecord {
            id,
            session_id: session.id.clone(),
            storage_key: key.clone(),
            violation,
            content_type: content_type.to_string(),
            file_size: bytes.len() as i64,
            created_at: taken_at.timestamp_millis(),
        };

        self.store.put(&key, bytes, content_type).await?;

        // The key embeds this record's id: the object removed here is the one just written
        if let Err(e) = self.db.insert_snapshot(&record).await {
            if let Err(cleanup) = self.store.delete(&key).await {
                tracing::warn!(key = %key, error = %cleanup, "orphaned evidence object in store");
            }
            return Err(e.into());
        }

        tracing::info!(
            session_id,
            snapshot_id = %record.id,
            key = %key,
            violation = record.violation.map(|v| v.to_string()),
            "snapshot stored"
        );
        Ok(record)
    }

    /// Mark an uploaded snapshot as the session's identity photo
    pub async fn set_identity_photo(
        &self,
        session_id: &str,
        snapshot_id: &str,
    ) -> ProctorResult<()> {
        self.get_session(session_id).await?;
        match self.db.set_identity_snapshot(session_id, snapshot_id).await {
            Err(DbError::NotFound(_)) => {
                Err(ProctorError::SnapshotNotFound(snapshot_id.to_string()))
            }
            other => Ok(other?),
        }
    }

    /// Delete the stored object and the record.
    /// A store failure is logged and the record is removed anyway.
    pub async fn delete_snapshot(&self, snapshot_id: &str) -> ProctorResult<()> {
        let record = self
            .db
            .get_snapshot(snapshot_id)
            .await?
            .ok_or_else(|| ProctorError::SnapshotNotFound(snapshot_id.to_string()))?;

        if let Err(e) = self.store.delete(&record.storage_key).await {
            tracing::warn!(
                snapshot_id,
                key = %record.storage_key,
                error = %e,
                "failed to delete evidence object"
            );
        }
        self.db.delete_snapshot(snapshot_id).await?;
        Ok(())
    }

    /// Delete a session with all its evidence
    pub async fn delete_session(&self, session_id: &str) -> ProctorResult<()> {
        let snapshots = self.db.list_snapshots(session_id).await?;
        for record in &snapshots {
            if let Err(e) = self.store.delete(&record.storage_key).await {
                tracing::warn!(
                    session_id,
                    key = %record.storage_key,
                    error = %e,
                    "failed to delete evidence object"
                );
            }
        }

        if !self.db.delete_session(session_id).await? {
            return Err(ProctorError::SessionNotFound(session_id.to_string()));
        }
        tracing::info!(session_id, snapshots = snapshots.len(), "session deleted");
        Ok(())
    }

    pub async fn generate_report(&self, session_id: &str) -> ProctorResult<Report> {
        let session = self.get_session(session_id).await?;
        let snapshots = self.db.list_snapshots(session_id).await?;
        let stats = self.db.snapshot_stats(session_id).await?;

        Ok(self.reports.assemble(&session, &snapshots, stats).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::detectors::test_support::{face_with_eyes, frame_with_pupils, HEIGHT, WIDTH};
    use crate::core::evidence_store::MemoryEvidenceStore;
    use crate::core::report::fetch::tests::jpeg_bytes;
    use crate::models::landmarks::LandmarkSet;
    use crate::models::policy::Policy;
    use crate::platform::landmarks::StaticLandmarks;
    use std::io::Cursor;

    async fn service(set: LandmarkSet) -> (ProctoringService, Arc<MemoryEvidenceStore>) {
        let db = Database::in_memory().await.unwrap();
        let store = Arc::new(MemoryEvidenceStore::new());
        let landmarks = Arc::new(StaticLandmarks::returning(set));
        let service = ProctoringService::new(db, store.clone(), landmarks, &Config::default());
        (service, store)
    }

    fn new_session(policy: Policy) -> NewSession {
        NewSession {
            user_id: "17".to_string(),
            student_name: "Robin Lee".to_string(),
            subject_name: "Chemistry".to_string(),
            policy,
        }
    }

    fn png_bytes(frame: &Frame) -> Vec<u8> {
        let mut bytes = Vec::new();
        frame
            .image
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[tokio::test]
    async fn test_check_frame_without_faces() {
        let (service, _) = service(LandmarkSet::empty(WIDTH, HEIGHT)).await;
        let session = service.create_session(&new_session(Policy::all())).await.unwrap();

        let frame = frame_with_pupils(None, None);
        let verdict = service.check_frame(&session.id, png_bytes(&frame)).await.unwrap();

        assert_eq!(verdict.absence_person, Some(true));
        assert_eq!(verdict.extra_person, Some(false));
        assert_eq!(verdict.person_substitution, Some(false));
        assert_eq!(verdict.looking_away, Some(true));
        assert_eq!(verdict.mouth_opening, Some(false));
        assert_eq!(verdict.hints_outside, Some(true));

        let stored = service.get_session(&session.id).await.unwrap();
        assert_eq!(stored.result, verdict);
    }

    #[tokio::test]
    async fn test_violation_sticks_across_frames() {
        let face = LandmarkSet::new(vec![face_with_eyes()], WIDTH, HEIGHT);
        let (service, _) = service(face).await;
        let policy = Policy::only(&[ViolationKind::LookingAway]);
        let session = service.create_session(&new_session(policy)).await.unwrap();

        let away = png_bytes(&frame_with_pupils(Some(20.0), Some(20.0)));
        let centered = png_bytes(&frame_with_pupils(Some(0.0), Some(0.0)));

        let first = service.check_frame(&session.id, away).await.unwrap();
        assert_eq!(first.looking_away, Some(true));
        assert_eq!(first.absence_person, None);

        let second = service.check_frame(&session.id, centered).await.unwrap();
        assert_eq!(second.looking_away, Some(false));

        let stored = service.get_session(&session.id).await.unwrap();
        assert_eq!(stored.result.looking_away, Some(true));
        assert_eq!(stored.result.hints_outside, None);
    }

    #[tokio::test]
    async fn test_invalid_frame_leaves_result_untouched() {
        let (service, _) = service(LandmarkSet::empty(WIDTH, HEIGHT)).await;
        let session = service.create_session(&new_session(Policy::all())).await.unwrap();

        let err = service.check_frame(&session.id, b"garbage".to_vec()).await.unwrap_err();
        assert!(matches!(err, ProctorError::InvalidImage(_)));
        let err = service.check_frame(&session.id, Vec::new()).await.unwrap_err();
        assert!(matches!(err, ProctorError::InvalidImage(FrameError::EmptyInput)));

        let stored = service.get_session(&session.id).await.unwrap();
        assert_eq!(stored.result, Verdict::default());
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let (service, _) = service(LandmarkSet::empty(WIDTH, HEIGHT)).await;
        let err = service.check_frame("missing", jpeg_bytes(8, 8)).await.unwrap_err();
        assert!(matches!(err, ProctorError::SessionNotFound(_)));
        let err = service.generate_report("missing").await.unwrap_err();
        assert!(matches!(err, ProctorError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn test_upload_snapshot() {
        let (service, store) = service(LandmarkSet::empty(WIDTH, HEIGHT)).await;
        let session = service.create_session(&new_session(Policy::all())).await.unwrap();

        let violation = Some(ViolationKind::MouthOpening);
        let record = service
            .upload_snapshot(&session.id, jpeg_bytes(16, 12), "image/jpeg", violation)
            .await
            .unwrap();

        assert!(record.storage_key.starts_with("user_17/"));
        assert!(record.storage_key.ends_with("_mouth_opening.jpg"));
        assert_eq!(store.content_type(&record.storage_key).await.as_deref(), Some("image/jpeg"));
        assert_eq!(service.database().get_snapshot(&record.id).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_back_to_back_uploads_keep_both_objects() {
        let (service, store) = service(LandmarkSet::empty(WIDTH, HEIGHT)).await;
        let session = service.create_session(&new_session(Policy::all())).await.unwrap();

        let mut records = Vec::new();
        for _ in 0..8 {
            let record = service
                .upload_snapshot(&session.id, jpeg_bytes(8, 8), "image/jpeg", None)
                .await
                .unwrap();
            records.push(record);
        }

        for record in &records {
            assert!(store.get(&record.storage_key).await.is_ok());
        }
        let report = service.generate_report(&session.id).await.unwrap();
        assert_eq!(report.summary.blocks, 8);
        assert_eq!(report.summary.failed_fetches, 0);
    }

    #[tokio::test]
    async fn test_upload_rejects_non_images() {
        let (service, store) = service(LandmarkSet::empty(WIDTH, HEIGHT)).await;
        let session = service.create_session(&new_session(Policy::all())).await.unwrap();

        let err = service
            .upload_snapshot(&session.id, b"%PDF".to_vec(), "application/pdf", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ProctorError::InvalidImage(FrameError::UnsupportedContentType(_))));
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_delete_snapshot_removes_object_and_row() {
        let (service, store) = service(LandmarkSet::empty(WIDTH, HEIGHT)).await;
        let session = service.create_session(&new_session(Policy::all())).await.unwrap();
        let record = service
            .upload_snapshot(&session.id, jpeg_bytes(8, 8), "image/jpeg", None)
            .await
            .unwrap();

        service.delete_snapshot(&record.id).await.unwrap();
        assert_eq!(store.len().await, 0);
        assert!(service.database().get_snapshot(&record.id).await.unwrap().is_none());

        let err = service.delete_snapshot(&record.id).await.unwrap_err();
        assert!(matches!(err, ProctorError::SnapshotNotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_snapshot_survives_missing_object() {
        let (service, store) = service(LandmarkSet::empty(WIDTH, HEIGHT)).await;
        let session = service.create_session(&new_session(Policy::all())).await.unwrap();
        let record = service
            .upload_snapshot(&session.id, jpeg_bytes(8, 8), "image/jpeg", None)
            .await
            .unwrap();
        store.delete(&record.storage_key).await.unwrap();

        service.delete_snapshot(&record.id).await.unwrap();
        assert!(service.database().get_snapshot(&record.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_report_puts_identity_photo_first() {
        let (service, store) = service(LandmarkSet::empty(WIDTH, HEIGHT)).await;
        let session = service.create_session(&new_session(Policy::all())).await.unwrap();

        let mut uploaded = Vec::new();
        for i in 0..5 {
            let violation = (i == 2).then_some(ViolationKind::LookingAway);
            let record = service
                .upload_snapshot(&session.id, jpeg_bytes(20, 15), "image/jpeg", violation)
                .await
                .unwrap();
            uploaded.push(record);
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        let identity = service
            .upload_snapshot(&session.id, jpeg_bytes(20, 15), "image/jpeg", None)
            .await
            .unwrap();
        service.set_identity_photo(&session.id, &identity.id).await.unwrap();

        // one object disappears from the store; the report still lists it
        store.delete(&uploaded[4].storage_key).await.unwrap();

        let report = service.generate_report(&session.id).await.unwrap();
        assert!(report.bytes.starts_with(b"%PDF"));
        assert_eq!(report.summary.snapshot_order.len(), 6);
        assert_eq!(report.summary.snapshot_order[0], identity.id);
        assert_eq!(report.summary.blocks, 6);
        assert_eq!(report.summary.failed_fetches, 1);
        assert_eq!(report.summary.images, 5);
    }

    #[tokio::test]
    async fn test_identity_photo_must_belong_to_session() {
        let (service, _) = service(LandmarkSet::empty(WIDTH, HEIGHT)).await;
        let first = service.create_session(&new_session(Policy::all())).await.unwrap();
        let second = service.create_session(&new_session(Policy::all())).await.unwrap();
        let record = service
            .upload_snapshot(&first.id, jpeg_bytes(8, 8), "image/jpeg", None)
            .await
            .unwrap();

        let err = service.set_identity_photo(&second.id, &record.id).await.unwrap_err();
        assert!(matches!(err, ProctorError::SnapshotNotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_session_removes_evidence() {
        let (service, store) = service(LandmarkSet::empty(WIDTH, HEIGHT)).await;
        let session = service.create_session(&new_session(Policy::all())).await.unwrap();
        for _ in 0..2 {
            service
                .upload_snapshot(&session.id, jpeg_bytes(8, 8), "image/jpeg", None)
                .await
                .unwrap();
        }

        service.delete_session(&session.id).await.unwrap();
        assert_eq!(store.len().await, 0);
        assert!(matches!(
            service.get_session(&session.id).await,
            Err(ProctorError::SessionNotFound(_))
        ));
    }
}
