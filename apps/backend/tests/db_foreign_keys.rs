mod common;

use backend_test_support::TempSqlite;
use scribe_backend::entities::{encounters, transcripts};
use scribe_backend::{connect_db, init_db};
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use time::OffsetDateTime;

fn transcript(encounter_id: i32) -> transcripts::ActiveModel {
    transcripts::ActiveModel {
        encounter_id: Set(encounter_id),
        content: Set("Patient reports mild headache since Tuesday.".to_string()),
        audio_path: Set(None),
        created_at: Set(OffsetDateTime::now_utc()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_orphan_transcript_is_rejected_on_sqlite_file() {
    let db = TempSqlite::new().unwrap();
    let settings = common::settings_with(&[("DATABASE_URL", &db.url())]);
    let engine = connect_db(&settings).unwrap();
    init_db(&engine).await.unwrap();

    let err = engine
        .with_session(|s| {
            Box::pin(async move {
                let txn = s.transaction().await?;
                transcript(404).insert(txn).await?;
                s.commit().await?;
                Ok::<_, scribe_backend::AppError>(())
            })
        })
        .await
        .unwrap_err();

    assert!(
        err.to_string().to_lowercase().contains("foreign key"),
        "unexpected error: {err}"
    );
}

#[tokio::test]
async fn test_cascade_delete_removes_transcripts() {
    let db = TempSqlite::new().unwrap();
    let settings = common::settings_with(&[
        ("DATABASE_URL", &db.url()),
        ("APP_ENV", "development"),
    ]);
    let engine = connect_db(&settings).unwrap();
    init_db(&engine).await.unwrap();

    let remaining = engine
        .with_session(|s| {
            Box::pin(async move {
                let txn = s.transaction().await?;
                let now = OffsetDateTime::now_utc();
                let encounter = encounters::ActiveModel {
                    patient_ref: Set("MRN-0042".to_string()),
                    clinician_name: Set(Some("Dr. Okafor".to_string())),
                    status: Set("open".to_string()),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                }
                .insert(txn)
                .await?;

                transcript(encounter.id).insert(txn).await?;
                encounters::Entity::delete_by_id(encounter.id)
                    .exec(txn)
                    .await?;

                let left = transcripts::Entity::find().all(txn).await?;
                s.commit().await?;
                Ok::<_, scribe_backend::AppError>(left.len())
            })
        })
        .await
        .unwrap();

    assert_eq!(remaining, 0);
}
