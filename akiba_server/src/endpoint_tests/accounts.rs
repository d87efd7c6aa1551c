use std::{sync::Arc, time::Duration};

use actix_web::{test, web, App};
use akiba_engine::{
    cache::ReadCache,
    events::EventProducers,
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    ReconciliationApi,
    SavingsApi,
    SqliteDatabase,
};
use serde_json::{json, Value};

use super::mocks::{StubGateway, StubLedger};
use crate::routes::{
    health,
    BalanceRoute,
    MpesaWebhookRoute,
    RegisterUserRoute,
    RequestDepositRoute,
    TransactionsRoute,
};

macro_rules! test_app {
    ($db:expr) => {{
        let cache = Arc::new(ReadCache::new(Duration::from_secs(30)));
        let rec_api = ReconciliationApi::new($db.clone(), cache.clone(), EventProducers::default());
        let savings_api = SavingsApi::new($db.clone(), StubLedger::default(), StubGateway::default(), cache);
        test::init_service(
            App::new()
                .app_data(web::Data::new(rec_api))
                .app_data(web::Data::new(savings_api))
                .service(health)
                .service(
                    web::scope("/api")
                        .service(BalanceRoute::<SqliteDatabase, StubLedger, StubGateway>::new())
                        .service(TransactionsRoute::<SqliteDatabase, StubLedger, StubGateway>::new())
                        .service(RegisterUserRoute::<SqliteDatabase, StubLedger, StubGateway>::new())
                        .service(RequestDepositRoute::<SqliteDatabase, StubLedger, StubGateway>::new()),
                )
                .service(web::scope("/wh").service(MpesaWebhookRoute::<SqliteDatabase>::new())),
        )
        .await
    }};
}

async fn test_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

#[actix_web::test]
async fn health_check_responds() {
    let db = test_db().await;
    let app = test_app!(db);
    let req = test::TestRequest::get().uri("/health").to_request();
    let response = test::call_service(&app, req).await;
    assert!(response.status().is_success());
}

#[actix_web::test]
async fn new_users_start_with_a_zero_balance() {
    let db = test_db().await;
    let app = test_app!(db);

    let req = test::TestRequest::post().uri("/api/users").set_json(json!({"phone": "0712345678"})).to_request();
    let user: Value = test::call_and_read_body_json(&app, req).await;
    let user_id = user["id"].as_i64().expect("registration returns the user id");

    let req = test::TestRequest::get().uri(&format!("/api/balance/{user_id}")).to_request();
    let balance: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(balance["balance"], 0);
}

#[actix_web::test]
async fn deposit_request_then_callback_settles_the_balance() {
    let db = test_db().await;
    let app = test_app!(db);

    let req = test::TestRequest::post().uri("/api/users").set_json(json!({"phone": "0712345678"})).to_request();
    let user: Value = test::call_and_read_body_json(&app, req).await;
    let user_id = user["id"].as_i64().unwrap();

    let req = test::TestRequest::post()
        .uri("/api/deposits")
        .set_json(json!({"user_id": user_id, "amount": 10_000, "method": "mpesa", "phone": "0712345678"}))
        .to_request();
    let response = test::call_service(&app, req).await;
    assert_eq!(response.status().as_u16(), 202);
    let pending: Value = test::read_body_json(response).await;
    let correlation_id = pending["correlation_id"].as_str().expect("pending operation carries its correlation id");

    let callback = json!({
        "correlationId": correlation_id,
        "resultCode": 0,
        "resultDescription": "The service request is processed successfully.",
        "settledAmount": 10_000
    });
    let req = test::TestRequest::post().uri("/wh/mpesa").set_json(&callback).to_request();
    let ack: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(ack["ResultCode"], 0);

    let req = test::TestRequest::get().uri(&format!("/api/balance/{user_id}")).to_request();
    let balance: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(balance["balance"], 10_000);

    let req = test::TestRequest::get().uri(&format!("/api/transactions/{user_id}")).to_request();
    let history: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(history["transactions"].as_array().map(Vec::len), Some(1));
}
