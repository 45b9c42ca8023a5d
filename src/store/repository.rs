/*!
 * Repository layer for the job store.
 *
 * This is the single source of truth for jobs and work units. Stages reload
 * their units from here on entry (no cross-stage in-process caching) and
 * upsert results keyed by unit id, which keeps every stage independently
 * restartable.
 */

use anyhow::Result;
use chrono::Utc;
use log::debug;
use rusqlite::{Connection, OptionalExtension, params};
use sha2::{Digest, Sha256};

use super::connection::DatabaseConnection;
use super::models::{
    CacheRecord, JobRecord, JobStatus, QualityTier, UnitKind, UnitStatus, WorkUnitRecord,
};

/// Partial update applied to a job row. `None` fields are left untouched;
/// `progress` can only raise the stored value.
#[derive(Debug, Default, Clone)]
pub struct JobUpdate {
    /// New status
    pub status: Option<JobStatus>,
    /// New progress value (clamped to never decrease)
    pub progress: Option<u8>,
    /// New active stage name
    pub stage: Option<String>,
    /// New display message
    pub message: Option<String>,
    /// New error detail
    pub error_detail: Option<String>,
}

/// Typed data access for jobs, work units and the translation cache
#[derive(Clone)]
pub struct Repository {
    /// Database connection
    db: DatabaseConnection,
}

impl Repository {
    /// Create a repository over an existing connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Repository at the default per-user database location
    pub fn new_default() -> Result<Self> {
        Ok(Self::new(DatabaseConnection::new_default()?))
    }

    /// Repository over an in-memory database (tests, scratch runs)
    pub fn new_in_memory() -> Result<Self> {
        Ok(Self::new(DatabaseConnection::new_in_memory()?))
    }

    /// The underlying connection
    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    // =========================================================================
    // Job operations
    // =========================================================================

    /// Insert a new job row
    pub async fn create_job(&self, job: &JobRecord) -> Result<()> {
        let job = job.clone();

        self.db
            .execute_async(move |conn| {
                let glossary = job
                    .glossary
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?;
                conn.execute(
                    r#"
                    INSERT INTO jobs (
                        id, document_ref, source_language, target_language, quality_tier,
                        preserve_formatting, glossary, status, progress, stage, message,
                        error_detail, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                    "#,
                    params![
                        job.id,
                        job.document_ref,
                        job.source_language,
                        job.target_language,
                        job.tier.to_string(),
                        job.preserve_formatting as i64,
                        glossary,
                        job.status.to_string(),
                        job.progress as i64,
                        job.stage,
                        job.message,
                        job.error_detail,
                        job.created_at,
                        job.updated_at,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    /// Load a job by id
    pub async fn get_job(&self, job_id: &str) -> Result<Option<JobRecord>> {
        let job_id = job_id.to_string();

        self.db
            .execute_async(move |conn| {
                let result = conn
                    .query_row(
                        r#"
                        SELECT id, document_ref, source_language, target_language, quality_tier,
                               preserve_formatting, glossary, status, progress, stage, message,
                               error_detail, created_at, updated_at
                        FROM jobs WHERE id = ?1
                        "#,
                        [&job_id],
                        Self::map_job_row,
                    )
                    .optional()?;
                Ok(result)
            })
            .await
    }

    fn map_job_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobRecord> {
        let glossary: Option<String> = row.get(6)?;
        Ok(JobRecord {
            id: row.get(0)?,
            document_ref: row.get(1)?,
            source_language: row.get(2)?,
            target_language: row.get(3)?,
            tier: row
                .get::<_, String>(4)?
                .parse()
                .unwrap_or(QualityTier::Standard),
            preserve_formatting: row.get::<_, i64>(5)? != 0,
            glossary: glossary.and_then(|raw| serde_json::from_str(&raw).ok()),
            status: row
                .get::<_, String>(7)?
                .parse()
                .unwrap_or(JobStatus::Queued),
            progress: row.get::<_, i64>(8)?.clamp(0, 100) as u8,
            stage: row.get(9)?,
            message: row.get(10)?,
            error_detail: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }

    /// Apply a partial update to a job. The progress column uses
    /// `MAX(progress, new)` so no writer can ever regress it.
    pub async fn update_job(&self, job_id: &str, update: JobUpdate) -> Result<()> {
        let job_id = job_id.to_string();
        let now = Utc::now().to_rfc3339();

        self.db
            .execute_async(move |conn| {
                conn.execute(
                    r#"
                    UPDATE jobs SET
                        status       = COALESCE(?2, status),
                        progress     = MAX(progress, COALESCE(?3, progress)),
                        stage        = COALESCE(?4, stage),
                        message      = COALESCE(?5, message),
                        error_detail = COALESCE(?6, error_detail),
                        updated_at   = ?7
                    WHERE id = ?1
                    "#,
                    params![
                        job_id,
                        update.status.map(|s| s.to_string()),
                        update.progress.map(|p| p.min(100) as i64),
                        update.stage,
                        update.message,
                        update.error_detail,
                        now,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    /// Request cancellation of a job. Only queued/processing jobs can be
    /// cancelled; terminal jobs are left untouched.
    pub async fn request_cancel(&self, job_id: &str) -> Result<bool> {
        let job_id = job_id.to_string();
        let now = Utc::now().to_rfc3339();

        self.db
            .execute_async(move |conn| {
                let changed = conn.execute(
                    r#"
                    UPDATE jobs SET status = 'cancelled', message = 'cancellation requested',
                                    updated_at = ?2
                    WHERE id = ?1 AND status IN ('queued', 'processing')
                    "#,
                    params![job_id, now],
                )?;
                Ok(changed > 0)
            })
            .await
    }

    // =========================================================================
    // Work unit operations
    // =========================================================================

    /// Insert work units, ignoring rows whose (job, kind, ordinal) already
    /// exist. Creation is single-shot per the unit contract; re-seeding on
    /// stage re-entry is therefore a no-op.
    pub async fn insert_units(&self, units: Vec<WorkUnitRecord>) -> Result<usize> {
        self.db
            .transaction_async(move |tx| {
                let mut inserted = 0;
                for unit in &units {
                    inserted += tx.execute(
                        r#"
                        INSERT OR IGNORE INTO work_units (
                            id, job_id, kind, ordinal, payload, status, result,
                            error_detail, attempts, updated_at
                        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                        "#,
                        params![
                            unit.id,
                            unit.job_id,
                            unit.kind.to_string(),
                            unit.ordinal,
                            unit.payload,
                            unit.status.to_string(),
                            unit.result,
                            unit.error_detail,
                            unit.attempts,
                            unit.updated_at,
                        ],
                    )?;
                }
                Ok(inserted)
            })
            .await
    }

    /// All units of one kind for a job, ordered by ordinal
    pub async fn load_units(&self, job_id: &str, kind: UnitKind) -> Result<Vec<WorkUnitRecord>> {
        let job_id = job_id.to_string();

        self.db
            .execute_async(move |conn| Self::load_units_sync(conn, &job_id, kind))
            .await
    }

    fn load_units_sync(
        conn: &Connection,
        job_id: &str,
        kind: UnitKind,
    ) -> Result<Vec<WorkUnitRecord>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT id, job_id, kind, ordinal, payload, status, result,
                   error_detail, attempts, updated_at
            FROM work_units
            WHERE job_id = ?1 AND kind = ?2
            ORDER BY ordinal ASC
            "#,
        )?;

        let units = stmt
            .query_map(params![job_id, kind.to_string()], Self::map_unit_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(units)
    }

    fn map_unit_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<WorkUnitRecord> {
        Ok(WorkUnitRecord {
            id: row.get(0)?,
            job_id: row.get(1)?,
            kind: row.get::<_, String>(2)?.parse().unwrap_or(UnitKind::Ocr),
            ordinal: row.get(3)?,
            payload: row.get(4)?,
            status: row
                .get::<_, String>(5)?
                .parse()
                .unwrap_or(UnitStatus::Pending),
            result: row.get(6)?,
            error_detail: row.get(7)?,
            attempts: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    /// Upsert unit results keyed by unit id. Used by the stage runner after
    /// every batch; a failure here is stage-fatal.
    pub async fn upsert_unit_results(&self, units: Vec<WorkUnitRecord>) -> Result<()> {
        if units.is_empty() {
            return Ok(());
        }

        self.db
            .transaction_async(move |tx| {
                for unit in &units {
                    tx.execute(
                        r#"
                        INSERT INTO work_units (
                            id, job_id, kind, ordinal, payload, status, result,
                            error_detail, attempts, updated_at
                        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                        ON CONFLICT (id) DO UPDATE SET
                            status       = excluded.status,
                            result       = excluded.result,
                            error_detail = excluded.error_detail,
                            attempts     = excluded.attempts,
                            updated_at   = excluded.updated_at
                        "#,
                        params![
                            unit.id,
                            unit.job_id,
                            unit.kind.to_string(),
                            unit.ordinal,
                            unit.payload,
                            unit.status.to_string(),
                            unit.result,
                            unit.error_detail,
                            unit.attempts,
                            unit.updated_at,
                        ],
                    )?;
                }
                Ok(())
            })
            .await
    }

    /// Terminal translation units for the external rebuild phase, ordered by
    /// ordinal
    pub async fn completed_translation_units(&self, job_id: &str) -> Result<Vec<WorkUnitRecord>> {
        let job_id = job_id.to_string();

        self.db
            .execute_async(move |conn| {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT id, job_id, kind, ordinal, payload, status, result,
                           error_detail, attempts, updated_at
                    FROM work_units
                    WHERE job_id = ?1 AND kind = 'translation'
                      AND status IN ('completed', 'degraded')
                    ORDER BY ordinal ASC
                    "#,
                )?;
                let units = stmt
                    .query_map([&job_id], Self::map_unit_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(units)
            })
            .await
    }

    // =========================================================================
    // Translation cache
    // =========================================================================

    /// Cache key over the content that makes a translation reusable
    pub fn cache_key(text: &str, source: &str, target: &str, model: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hasher.update([0]);
        hasher.update(source.as_bytes());
        hasher.update([0]);
        hasher.update(target.as_bytes());
        hasher.update([0]);
        hasher.update(model.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Look up a cached translation, bumping its hit count on success
    pub async fn cache_lookup(&self, cache_key: &str) -> Result<Option<CacheRecord>> {
        let cache_key = cache_key.to_string();

        self.db
            .execute_async(move |conn| {
                let record = conn
                    .query_row(
                        r#"
                        SELECT cache_key, translated_text, source_language, target_language,
                               model, confidence, created_at
                        FROM translation_cache WHERE cache_key = ?1
                        "#,
                        [&cache_key],
                        |row| {
                            Ok(CacheRecord {
                                cache_key: row.get(0)?,
                                translated_text: row.get(1)?,
                                source_language: row.get(2)?,
                                target_language: row.get(3)?,
                                model: row.get(4)?,
                                confidence: row.get(5)?,
                                created_at: row.get(6)?,
                            })
                        },
                    )
                    .optional()?;

                if record.is_some() {
                    conn.execute(
                        "UPDATE translation_cache SET hit_count = hit_count + 1 WHERE cache_key = ?1",
                        [&cache_key],
                    )?;
                    debug!("translation cache hit for {}", &cache_key[..12.min(cache_key.len())]);
                }
                Ok(record)
            })
            .await
    }

    /// Store a translation in the cache, replacing any previous entry
    pub async fn cache_store(&self, record: CacheRecord) -> Result<()> {
        self.db
            .execute_async(move |conn| {
                conn.execute(
                    r#"
                    INSERT OR REPLACE INTO translation_cache (
                        cache_key, translated_text, source_language, target_language,
                        model, confidence, created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    "#,
                    params![
                        record.cache_key,
                        record.translated_text,
                        record.source_language,
                        record.target_language,
                        record.model,
                        record.confidence,
                        record.created_at,
                    ],
                )?;
                Ok(())
            })
            .await
    }
}
