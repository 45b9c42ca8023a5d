/*!
 * Database schema for the job store.
 *
 * Three tables: `jobs` (one row per document-processing request),
 * `work_units` (pages and chunks, keyed by id with a uniqueness guarantee on
 * (job, kind, ordinal) so re-seeding is idempotent) and `translation_cache`
 * (content-hash keyed reuse of prior translations).
 */

use anyhow::Result;
use rusqlite::Connection;

/// Create all tables and indexes if they do not exist yet
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id                  TEXT PRIMARY KEY,
            document_ref        TEXT NOT NULL,
            source_language     TEXT NOT NULL DEFAULT 'auto',
            target_language     TEXT NOT NULL,
            quality_tier        TEXT NOT NULL DEFAULT 'standard',
            preserve_formatting INTEGER NOT NULL DEFAULT 0,
            glossary            TEXT,
            status              TEXT NOT NULL DEFAULT 'queued',
            progress            INTEGER NOT NULL DEFAULT 0,
            stage               TEXT,
            message             TEXT NOT NULL DEFAULT '',
            error_detail        TEXT,
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS work_units (
            id           TEXT PRIMARY KEY,
            job_id       TEXT NOT NULL REFERENCES jobs(id),
            kind         TEXT NOT NULL,
            ordinal      INTEGER NOT NULL,
            payload      TEXT NOT NULL,
            status       TEXT NOT NULL DEFAULT 'pending',
            result       TEXT,
            error_detail TEXT,
            attempts     INTEGER NOT NULL DEFAULT 0,
            updated_at   TEXT NOT NULL,
            UNIQUE (job_id, kind, ordinal)
        );

        CREATE INDEX IF NOT EXISTS idx_work_units_job_kind
            ON work_units (job_id, kind, status);

        CREATE TABLE IF NOT EXISTS translation_cache (
            cache_key       TEXT PRIMARY KEY,
            translated_text TEXT NOT NULL,
            source_language TEXT NOT NULL,
            target_language TEXT NOT NULL,
            model           TEXT NOT NULL,
            confidence      REAL NOT NULL,
            created_at      TEXT NOT NULL,
            hit_count       INTEGER NOT NULL DEFAULT 0
        );
        "#,
    )?;

    Ok(())
}
