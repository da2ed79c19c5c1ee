mod common;

use db_infra::DbInfraError;
use scribe_backend::{connect_db, get_db};

#[tokio::test]
async fn test_scoped_session_closed_once_when_block_fails() {
    let settings = common::settings_with(&[("DATABASE_URL", "sqlite://")]);
    let engine = connect_db(&settings).unwrap();
    let stats = engine.session_stats();

    let result: Result<(), DbInfraError> = engine
        .with_session(|s| {
            Box::pin(async move {
                s.execute_unprepared("SELECT 1").await?;
                Err(DbInfraError::query("handler failed"))
            })
        })
        .await;

    match result {
        Err(DbInfraError::Query { message }) => assert_eq!(message, "handler failed"),
        other => panic!("original error should be returned, got {other:?}"),
    }
    assert_eq!(stats.opened(), 1);
    assert_eq!(stats.closed(), 1);
}

#[tokio::test]
async fn test_get_db_session_closes_on_drop() {
    let settings = common::settings_with(&[("DATABASE_URL", "sqlite://")]);
    let engine = connect_db(&settings).unwrap();
    let stats = engine.session_stats();

    {
        let mut session = get_db(&engine).await.unwrap();
        let one = session.query_string("SELECT '1'").await.unwrap();
        assert_eq!(one.as_deref(), Some("1"));
        assert_eq!(stats.open_now(), 1);
    }

    assert_eq!(stats.opened(), 1);
    assert_eq!(stats.closed(), 1);
}

#[tokio::test]
async fn test_each_call_yields_a_new_session() {
    let settings = common::settings_with(&[("DATABASE_URL", "sqlite://")]);
    let engine = connect_db(&settings).unwrap();

    let mut first = get_db(&engine).await.unwrap();
    first.close().await.unwrap();
    let mut second = get_db(&engine).await.unwrap();
    second.close().await.unwrap();

    assert_ne!(first.id(), second.id());
    assert!(!first.is_open());
    assert_eq!(engine.session_stats().closed(), 2);
}
