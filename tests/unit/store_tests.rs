/*!
 * Unit tests for the job/work-unit store.
 */

use std::collections::BTreeMap;

use doctran::store::models::CacheRecord;
use doctran::store::{
    JobRecord, JobStatus, JobUpdate, QualityTier, Repository, UnitKind, UnitStatus,
    WorkUnitRecord,
};

async fn repo_with_job() -> (Repository, JobRecord) {
    let repo = Repository::new_in_memory().expect("Failed to create store");
    let job = JobRecord::new("doc-1", "en", "fr", QualityTier::Premium);
    repo.create_job(&job).await.expect("Failed to create job");
    (repo, job)
}

#[tokio::test]
async fn test_job_roundTrip_shouldPreserveAllFields() {
    let repo = Repository::new_in_memory().unwrap();

    let mut glossary = BTreeMap::new();
    glossary.insert("ledger".to_string(), "registre".to_string());
    let job = JobRecord::new("doc-42", "auto", "fr", QualityTier::Enterprise)
        .with_preserve_formatting(true)
        .with_glossary(glossary.clone());
    repo.create_job(&job).await.unwrap();

    let stored = repo.get_job(&job.id).await.unwrap().expect("job missing");
    assert_eq!(stored.document_ref, "doc-42");
    assert_eq!(stored.source_language, "auto");
    assert_eq!(stored.target_language, "fr");
    assert_eq!(stored.tier, QualityTier::Enterprise);
    assert!(stored.preserve_formatting);
    assert_eq!(stored.glossary, Some(glossary));
    assert_eq!(stored.status, JobStatus::Queued);
    assert_eq!(stored.progress, 0);
}

#[tokio::test]
async fn test_getJob_unknownId_shouldReturnNone() {
    let repo = Repository::new_in_memory().unwrap();
    assert!(repo.get_job("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_updateJob_progress_shouldNeverDecrease() {
    let (repo, job) = repo_with_job().await;

    repo.update_job(
        &job.id,
        JobUpdate {
            progress: Some(60),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    // A later write with a lower value must not win.
    repo.update_job(
        &job.id,
        JobUpdate {
            progress: Some(25),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let stored = repo.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(stored.progress, 60);
}

#[tokio::test]
async fn test_updateJob_partialUpdate_shouldLeaveOtherFields() {
    let (repo, job) = repo_with_job().await;

    repo.update_job(
        &job.id,
        JobUpdate {
            status: Some(JobStatus::Processing),
            stage: Some("ocr".to_string()),
            message: Some("working".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    repo.update_job(
        &job.id,
        JobUpdate {
            progress: Some(10),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let stored = repo.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Processing);
    assert_eq!(stored.stage.as_deref(), Some("ocr"));
    assert_eq!(stored.message, "working");
    assert_eq!(stored.progress, 10);
}

#[tokio::test]
async fn test_requestCancel_shouldOnlyAffectActiveJobs() {
    let (repo, job) = repo_with_job().await;

    assert!(repo.request_cancel(&job.id).await.unwrap());
    let stored = repo.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Cancelled);

    // A second cancel (terminal status) is a no-op.
    assert!(!repo.request_cancel(&job.id).await.unwrap());
}

#[tokio::test]
async fn test_insertUnits_duplicateOrdinals_shouldBeIgnored() {
    let (repo, job) = repo_with_job().await;

    let first = WorkUnitRecord::new(job.id.clone(), UnitKind::Ocr, 1, &"payload-a").unwrap();
    let duplicate = WorkUnitRecord::new(job.id.clone(), UnitKind::Ocr, 1, &"payload-b").unwrap();

    assert_eq!(repo.insert_units(vec![first]).await.unwrap(), 1);
    assert_eq!(repo.insert_units(vec![duplicate]).await.unwrap(), 0);

    let units = repo.load_units(&job.id, UnitKind::Ocr).await.unwrap();
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].payload_as::<String>().unwrap(), "payload-a");
}

#[tokio::test]
async fn test_loadUnits_shouldOrderByOrdinal() {
    let (repo, job) = repo_with_job().await;

    let units: Vec<WorkUnitRecord> = [5i64, 1, 3]
        .iter()
        .map(|ordinal| {
            WorkUnitRecord::new(job.id.clone(), UnitKind::Translation, *ordinal, &"x").unwrap()
        })
        .collect();
    repo.insert_units(units).await.unwrap();

    let loaded = repo.load_units(&job.id, UnitKind::Translation).await.unwrap();
    let ordinals: Vec<i64> = loaded.iter().map(|u| u.ordinal).collect();
    assert_eq!(ordinals, vec![1, 3, 5]);
}

#[tokio::test]
async fn test_upsertUnitResults_shouldTransitionStatus() {
    let (repo, job) = repo_with_job().await;

    let unit = WorkUnitRecord::new(job.id.clone(), UnitKind::Translation, 1, &"x").unwrap();
    repo.insert_units(vec![unit.clone()]).await.unwrap();

    let completed = unit.completed(serde_json::json!({"translated": true}));
    repo.upsert_unit_results(vec![completed]).await.unwrap();

    let loaded = repo.load_units(&job.id, UnitKind::Translation).await.unwrap();
    assert_eq!(loaded[0].status, UnitStatus::Completed);
    assert_eq!(loaded[0].attempts, 1);
    assert!(loaded[0].result.is_some());
}

#[tokio::test]
async fn test_completedTranslationUnits_shouldFilterAndOrder() {
    let (repo, job) = repo_with_job().await;

    let pending = WorkUnitRecord::new(job.id.clone(), UnitKind::Translation, 3, &"x").unwrap();
    let done = WorkUnitRecord::new(job.id.clone(), UnitKind::Translation, 2, &"x").unwrap();
    let degraded = WorkUnitRecord::new(job.id.clone(), UnitKind::Translation, 1, &"x").unwrap();
    let ocr = WorkUnitRecord::new(job.id.clone(), UnitKind::Ocr, 1, &"x").unwrap();
    repo.insert_units(vec![pending, done.clone(), degraded.clone(), ocr])
        .await
        .unwrap();

    repo.upsert_unit_results(vec![
        done.completed(serde_json::json!({})),
        degraded.degraded(serde_json::json!({}), "boom".to_string()),
    ])
    .await
    .unwrap();

    let ready = repo.completed_translation_units(&job.id).await.unwrap();
    let ordinals: Vec<i64> = ready.iter().map(|u| u.ordinal).collect();
    // Pending unit and OCR unit excluded; order by ordinal.
    assert_eq!(ordinals, vec![1, 2]);
}

#[tokio::test]
async fn test_cache_storeAndLookup_shouldRoundTrip() {
    let repo = Repository::new_in_memory().unwrap();

    let key = Repository::cache_key("Hello", "en", "fr", "gpt-4o-mini");
    repo.cache_store(CacheRecord {
        cache_key: key.clone(),
        translated_text: "Bonjour".to_string(),
        source_language: "en".to_string(),
        target_language: "fr".to_string(),
        model: "gpt-4o-mini".to_string(),
        confidence: 0.9,
        created_at: chrono::Utc::now().to_rfc3339(),
    })
    .await
    .unwrap();

    let hit = repo.cache_lookup(&key).await.unwrap().expect("cache miss");
    assert_eq!(hit.translated_text, "Bonjour");
    assert_eq!(hit.model, "gpt-4o-mini");

    assert!(repo.cache_lookup("unknown-key").await.unwrap().is_none());
}

#[tokio::test]
async fn test_fileBackedStore_shouldSurviveReopen() {
    let dir = tempfile::TempDir::new().expect("Failed to create temp dir");
    let db_path = dir.path().join("jobs.db");

    let job = {
        let repo = Repository::new(
            doctran::store::DatabaseConnection::new(&db_path).unwrap(),
        );
        let job = JobRecord::new("doc-persist", "en", "fr", QualityTier::Standard);
        repo.create_job(&job).await.unwrap();
        repo.insert_units(vec![
            WorkUnitRecord::new(job.id.clone(), UnitKind::Ocr, 1, &"page").unwrap(),
        ])
        .await
        .unwrap();
        job
    };

    // A fresh connection sees everything a restarted worker would need.
    let reopened = Repository::new(doctran::store::DatabaseConnection::new(&db_path).unwrap());
    let stored = reopened.get_job(&job.id).await.unwrap().expect("job lost");
    assert_eq!(stored.document_ref, "doc-persist");
    assert_eq!(
        reopened.load_units(&job.id, UnitKind::Ocr).await.unwrap().len(),
        1
    );
}

#[test]
fn test_cacheKey_shouldDependOnAllInputs() {
    let base = Repository::cache_key("text", "en", "fr", "m1");
    assert_ne!(base, Repository::cache_key("text2", "en", "fr", "m1"));
    assert_ne!(base, Repository::cache_key("text", "de", "fr", "m1"));
    assert_ne!(base, Repository::cache_key("text", "en", "es", "m1"));
    assert_ne!(base, Repository::cache_key("text", "en", "fr", "m2"));
    assert_eq!(base, Repository::cache_key("text", "en", "fr", "m1"));
}
