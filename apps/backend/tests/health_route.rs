mod common;

use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use backend_test_support::TempSqlite;
use scribe_backend::health;
use scribe_backend::infra::state::build_state;
use serde_json::Value;

#[actix_web::test]
async fn test_health_reports_connected_database() {
    let db = TempSqlite::new().unwrap();
    let settings = common::settings_with(&[("DATABASE_URL", &db.url())]);
    let state = build_state()
        .with_settings(settings)
        .with_schema()
        .build()
        .await
        .unwrap();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .service(web::scope("/api/v1").configure(health::configure)),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/v1/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let json: Value = test::read_body_json(resp).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["environment"], "testing");
    assert_eq!(json["database"]["engine"], "sqlite");
    assert_eq!(json["database"]["connected"], true);
}

#[actix_web::test]
async fn test_health_is_503_when_database_is_down() {
    let settings = common::settings_with(&[(
        "DATABASE_URL",
        "mssql+pymssql://sqladmin:pw@127.0.0.1:1/medicalscribe",
    )]);
    let state = build_state()
        .with_settings(settings)
        .with_db()
        .build()
        .await
        .unwrap();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .service(web::scope("/api/v1").configure(health::configure)),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/v1/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "application/problem+json"
    );

    let json: Value = test::read_body_json(resp).await;
    assert_eq!(json["code"], "DB_UNAVAILABLE");
}
