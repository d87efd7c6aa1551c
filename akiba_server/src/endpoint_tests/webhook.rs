use std::{sync::Arc, time::Duration};

use actix_web::{test, web, App};
use akiba_engine::{
    cache::ReadCache,
    events::EventProducers,
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    ReconciliationApi,
    SqliteDatabase,
};
use serde_json::{json, Value};

use crate::routes::MpesaWebhookRoute;

async fn test_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

#[actix_web::test]
async fn webhook_acknowledges_with_the_fixed_body_for_unknown_correlation_ids() {
    let db = test_db().await;
    let cache = Arc::new(ReadCache::new(Duration::from_secs(30)));
    let rec_api = ReconciliationApi::new(db, cache, EventProducers::default());
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(rec_api))
            .service(web::scope("/wh").service(MpesaWebhookRoute::<SqliteDatabase>::new())),
    )
    .await;

    let payload = json!({
        "correlationId": "ws_CO_unknown",
        "resultCode": 0,
        "resultDescription": "Success",
        "settledAmount": 1000
    });
    let req = test::TestRequest::post().uri("/wh/mpesa").set_json(&payload).to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["ResultCode"], 0);
    assert_eq!(body["ResultDesc"], "Accepted");
}

#[actix_web::test]
async fn webhook_acknowledges_even_when_the_payload_does_not_parse() {
    let db = test_db().await;
    let cache = Arc::new(ReadCache::new(Duration::from_secs(30)));
    let rec_api = ReconciliationApi::new(db, cache, EventProducers::default());
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(rec_api))
            .service(web::scope("/wh").service(MpesaWebhookRoute::<SqliteDatabase>::new())),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/wh/mpesa")
        .insert_header(("content-type", "application/json"))
        .set_payload("this is not json")
        .to_request();
    let response = test::call_service(&app, req).await;
    assert!(response.status().is_success());
}
