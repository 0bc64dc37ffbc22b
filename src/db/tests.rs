use crate::db::fake::FakeMetadataStore;
use crate::db::models::{JobRecord, JobStatus, RecordFilters};
use crate::db::store::MetadataStore;
use crate::db::MetadataError;
use crate::model::FaceMeta;
use chrono::Utc;
use uuid::Uuid;

fn submitted_record(job_id: Uuid) -> JobRecord {
    JobRecord::submitted(
        job_id,
        "car.jpg",
        "image/jpeg",
        "s3://test-bucket/original/key.jpg",
        2048,
        serde_json::json!({"vehicle_detected": true}),
        Utc::now(),
    )
}

fn one_face_meta() -> FaceMeta {
    FaceMeta {
        face_count: 1,
        boxes: vec![[16, 16, 8, 8]],
        confidences: vec![0.9],
        reason: "face regions blurred".to_string(),
    }
}

#[tokio::test]
async fn insert_then_get_round_trips_record() {
    let store = FakeMetadataStore::new();
    let job_id = Uuid::new_v4();

    store.insert(&submitted_record(job_id)).await.unwrap();

    let fetched = store.get_by_job_id(job_id).await.unwrap().unwrap();
    assert_eq!(fetched.job_id, job_id);
    assert_eq!(fetched.status, JobStatus::Submitted);
    assert!(fetched.is_vehicle_detected);
    assert!(!fetched.is_face_detected);
}

#[tokio::test]
async fn duplicate_job_id_is_a_distinct_error_kind() {
    let store = FakeMetadataStore::new();
    let job_id = Uuid::new_v4();

    store.insert(&submitted_record(job_id)).await.unwrap();
    let err = store.insert(&submitted_record(job_id)).await.unwrap_err();

    assert!(matches!(err, MetadataError::Duplicate(_)));
}

#[tokio::test]
async fn completion_update_sets_flags_from_face_count() {
    let store = FakeMetadataStore::new();
    let job_id = Uuid::new_v4();
    store.insert(&submitted_record(job_id)).await.unwrap();

    store
        .update_on_completion(job_id, "s3://b/processed/key.jpg", 1024, &one_face_meta(), 1.5)
        .await
        .unwrap();

    let record = store.get_by_job_id(job_id).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Completed);
    assert!(record.is_face_detected);
    assert!(record.is_face_blurred);
    assert!(record.blob_processed_url.is_some());
    assert!(record.processed_at.is_some());
    assert_eq!(record.processing_time_seconds, Some(1.5));
}

#[tokio::test]
async fn completion_update_with_zero_faces_keeps_flags_false() {
    let store = FakeMetadataStore::new();
    let job_id = Uuid::new_v4();
    store.insert(&submitted_record(job_id)).await.unwrap();

    store
        .update_on_completion(job_id, "s3://b/processed/key.jpg", 1024, &FaceMeta::none(), 0.5)
        .await
        .unwrap();

    let record = store.get_by_job_id(job_id).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Completed);
    assert!(record.is_vehicle_detected);
    assert!(!record.is_face_detected);
    assert!(!record.is_face_blurred);
}

#[tokio::test]
async fn duplicate_completion_update_is_a_no_op() {
    let store = FakeMetadataStore::new();
    let job_id = Uuid::new_v4();
    store.insert(&submitted_record(job_id)).await.unwrap();

    store
        .update_on_completion(job_id, "s3://b/processed/key.jpg", 1024, &one_face_meta(), 1.0)
        .await
        .unwrap();
    let first = store.get_by_job_id(job_id).await.unwrap().unwrap();

    // Second delivery reports different numbers; the row must not move
    store
        .update_on_completion(job_id, "s3://b/processed/other.jpg", 9, &FaceMeta::none(), 9.0)
        .await
        .unwrap();
    let second = store.get_by_job_id(job_id).await.unwrap().unwrap();

    assert_eq!(first.blob_processed_url, second.blob_processed_url);
    assert_eq!(first.processing_time_seconds, second.processing_time_seconds);
    assert!(second.is_face_blurred);
}

#[tokio::test]
async fn mark_failed_never_regresses_a_completed_row() {
    let store = FakeMetadataStore::new();
    let job_id = Uuid::new_v4();
    store.insert(&submitted_record(job_id)).await.unwrap();

    store
        .update_on_completion(job_id, "s3://b/processed/key.jpg", 1024, &one_face_meta(), 1.0)
        .await
        .unwrap();
    store.mark_failed(job_id, "timeout", None).await.unwrap();

    let record = store.get_by_job_id(job_id).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Completed);
    assert!(record.failure_reason.is_none());
}

#[tokio::test]
async fn failed_rows_carry_a_reason_kind() {
    let store = FakeMetadataStore::new();
    let job_id = Uuid::new_v4();
    store.insert(&submitted_record(job_id)).await.unwrap();

    store
        .mark_failed(job_id, "decode", Some(0.2))
        .await
        .unwrap();

    let record = store.get_by_job_id(job_id).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.failure_reason.as_deref(), Some("decode"));
}

#[tokio::test]
async fn query_filters_on_boolean_flags() {
    let store = FakeMetadataStore::new();

    let blurred = Uuid::new_v4();
    store.insert(&submitted_record(blurred)).await.unwrap();
    store
        .update_on_completion(blurred, "s3://b/p1.jpg", 10, &one_face_meta(), 1.0)
        .await
        .unwrap();

    let plain = Uuid::new_v4();
    store.insert(&submitted_record(plain)).await.unwrap();
    store
        .update_on_completion(plain, "s3://b/p2.jpg", 10, &FaceMeta::none(), 1.0)
        .await
        .unwrap();

    let filters = RecordFilters {
        is_face_blurred: Some(true),
        ..Default::default()
    };
    let matched = store.query(&filters, 100).await.unwrap();

    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].job_id, blurred);
}

#[tokio::test]
async fn aggregate_reports_counts_and_average() {
    let store = FakeMetadataStore::new();

    for (faces, duration) in [(1usize, 2.0f64), (0, 4.0)] {
        let job_id = Uuid::new_v4();
        store.insert(&submitted_record(job_id)).await.unwrap();
        let meta = if faces > 0 {
            one_face_meta()
        } else {
            FaceMeta::none()
        };
        store
            .update_on_completion(job_id, "s3://b/p.jpg", 10, &meta, duration)
            .await
            .unwrap();
    }

    let stats = store.aggregate().await.unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.vehicles_detected, 2);
    assert_eq!(stats.faces_detected, 1);
    assert_eq!(stats.faces_blurred, 1);
    assert_eq!(stats.avg_processing_seconds, Some(3.0));
}
