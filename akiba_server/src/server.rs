use std::{future::Future, net::SocketAddr, pin::Pin, str::FromStr, sync::Arc, time::Duration};

use actix_web::{
    dev::{Server, Service},
    http::KeepAlive,
    middleware::Logger,
    web,
    App,
    HttpServer,
};
use akiba_engine::{
    cache::ReadCache,
    events::{EventHandlers, EventHooks, EventProducers, GoalReachedEvent, SettlementEvent, SettlementKind},
    traits::UserManagement,
    ReconciliationApi,
    SavingsApi,
    SqliteDatabase,
};
use futures::{future::ok, FutureExt};
use log::{info, warn};

use crate::{
    config::ServerConfig,
    errors::ServerError,
    integrations::{LedgerRelayClient, MpesaGateway, SmsNotifier, TemplateKind},
    ledger_worker::start_ledger_worker,
    routes::{
        health,
        BalanceRoute,
        BindWalletRoute,
        ChangeGoalStatusRoute,
        ContributeToGoalRoute,
        CreateGoalRoute,
        GoalByIdRoute,
        GoalsForUserRoute,
        MpesaWebhookRoute,
        PendingOperationsRoute,
        RegisterUserRoute,
        RequestDepositRoute,
        RequestWithdrawalRoute,
        TransactionsRoute,
    },
    sweep_worker::start_sweep_worker,
};

const EVENT_BUFFER_SIZE: usize = 64;

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.run_migrations().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let cache = Arc::new(ReadCache::new(config.cache_ttl));

    let notifier = SmsNotifier::new(config.notifier.clone());
    let handlers = EventHandlers::new(EVENT_BUFFER_SIZE, notification_hooks(db.clone(), notifier));
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let ledger = LedgerRelayClient::new(config.ledger.clone());
    let _sweeper = start_sweep_worker(db.clone(), cache.clone(), producers.clone(), config.sweep_interval);
    let _ledger_events =
        start_ledger_worker(db.clone(), cache.clone(), producers.clone(), ledger.clone(), config.ledger.poll_interval);

    let srv = create_server_instance(config, db, cache, producers, ledger)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    cache: Arc<ReadCache>,
    producers: EventProducers,
    ledger: LedgerRelayClient,
) -> Result<Server, ServerError> {
    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        let rec_api = ReconciliationApi::new(db.clone(), cache.clone(), producers.clone());
        let mpesa = MpesaGateway::new(config.mpesa.clone());
        let savings_api = SavingsApi::new(db.clone(), ledger.clone(), mpesa, cache.clone())
            .with_pending_ttl(config.pending_ttl);
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("akiba::access_log"))
            .app_data(web::Data::new(rec_api))
            .app_data(web::Data::new(savings_api));
        let api_scope = web::scope("/api")
            .service(BalanceRoute::<SqliteDatabase, LedgerRelayClient, MpesaGateway>::new())
            .service(TransactionsRoute::<SqliteDatabase, LedgerRelayClient, MpesaGateway>::new())
            .service(GoalByIdRoute::<SqliteDatabase, LedgerRelayClient, MpesaGateway>::new())
            .service(GoalsForUserRoute::<SqliteDatabase, LedgerRelayClient, MpesaGateway>::new())
            .service(PendingOperationsRoute::<SqliteDatabase, LedgerRelayClient, MpesaGateway>::new())
            .service(RegisterUserRoute::<SqliteDatabase, LedgerRelayClient, MpesaGateway>::new())
            .service(BindWalletRoute::<SqliteDatabase, LedgerRelayClient, MpesaGateway>::new())
            .service(RequestDepositRoute::<SqliteDatabase, LedgerRelayClient, MpesaGateway>::new())
            .service(RequestWithdrawalRoute::<SqliteDatabase, LedgerRelayClient, MpesaGateway>::new())
            .service(CreateGoalRoute::<SqliteDatabase, LedgerRelayClient, MpesaGateway>::new())
            .service(ContributeToGoalRoute::<SqliteDatabase, LedgerRelayClient, MpesaGateway>::new())
            .service(ChangeGoalStatusRoute::<SqliteDatabase, LedgerRelayClient, MpesaGateway>::new());
        let use_x_forwarded_for = config.use_x_forwarded_for;
        let use_forwarded = config.use_forwarded;
        let mpesa_whitelist = config.mpesa.whitelist.clone();
        let webhook_scope = web::scope("/wh")
            .wrap_fn(move |req, srv| {
                // Collect peer IP from x-forwarded-for, or forwarded headers _if_ `use_nnn` has been set to true
                // in the configuration. Otherwise, use the peer address from the connection info.
                let peer_addr = req.connection_info().peer_addr().map(|a| a.to_string());

                let peer_ip = req
                    .headers()
                    .get("X-Forwarded-For")
                    .and_then(|v| use_x_forwarded_for.then(|| v.to_str().ok()).flatten())
                    .or_else(|| {
                        req.headers().get("Forwarded").and_then(|v| use_forwarded.then(|| v.to_str().ok()).flatten())
                    })
                    .or_else(|| peer_addr.as_ref().map(|s| s.as_str()))
                    .and_then(|s| SocketAddr::from_str(s).ok());
                let whitelisted = match (peer_ip, &mpesa_whitelist) {
                    (Some(ip), Some(whitelist)) => {
                        info!("Payment callback from {ip}");
                        whitelist.contains(&ip.ip())
                    },
                    (_, None) => true,
                    (None, Some(_)) => {
                        warn!("No IP address found in payment callback request, denying access.");
                        false
                    },
                };
                if whitelisted {
                    srv.call(req)
                } else {
                    ok(req.error_response(ServerError::Forbidden("Callback peer is not whitelisted".to_string())))
                        .boxed_local()
                }
            })
            .service(MpesaWebhookRoute::<SqliteDatabase>::new());
        app.service(health).service(api_scope).service(webhook_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}

/// Wires the engine's settlement and goal events to the SMS dispatcher. The hooks run on the event handler's own
/// tasks: a slow or failing notification can never block or roll back a settlement.
fn notification_hooks(db: SqliteDatabase, notifier: SmsNotifier) -> EventHooks {
    let mut hooks = EventHooks::default();
    let settle_db = db.clone();
    let settle_notifier = notifier.clone();
    hooks.on_settlement(move |event: SettlementEvent| {
        let db = settle_db.clone();
        let notifier = settle_notifier.clone();
        Box::pin(async move { notify_settlement(db, notifier, event).await }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    hooks.on_goal_reached(move |event: GoalReachedEvent| {
        let db = db.clone();
        let notifier = notifier.clone();
        Box::pin(async move { notify_goal_reached(db, notifier, event).await }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    hooks
}

async fn notify_settlement(db: SqliteDatabase, notifier: SmsNotifier, event: SettlementEvent) {
    let user = match db.fetch_user(event.user_id).await {
        Ok(user) => user,
        Err(e) => {
            warn!("📣️ Cannot notify user #{}: {e}", event.user_id);
            return;
        },
    };
    let (template, amount, reference) = match (&event.outcome, &event.transaction, &event.operation) {
        (SettlementKind::Completed, Some(tx), _) => {
            let template =
                if tx.kind.is_credit() { TemplateKind::DepositCompleted } else { TemplateKind::WithdrawalCompleted };
            (template, tx.amount.to_string(), tx.external_ref.clone().unwrap_or_default())
        },
        (SettlementKind::Failed, Some(tx), _) => {
            (TemplateKind::OperationFailed, tx.amount.to_string(), tx.description.clone().unwrap_or_default())
        },
        (SettlementKind::Expired, _, Some(op)) => {
            (TemplateKind::OperationExpired, op.amount.to_string(), op.correlation_id.to_string())
        },
        _ => return,
    };
    notifier.notify(&user.phone, template, &[("amount", amount), ("reference", reference)]).await;
}

async fn notify_goal_reached(db: SqliteDatabase, notifier: SmsNotifier, event: GoalReachedEvent) {
    let user = match db.fetch_user(event.goal.user_id).await {
        Ok(user) => user,
        Err(e) => {
            warn!("📣️ Cannot notify user #{}: {e}", event.goal.user_id);
            return;
        },
    };
    notifier
        .notify(&user.phone, TemplateKind::GoalReached, &[
            ("goal", event.goal.name.clone()),
            ("target", event.goal.target_amount.to_string()),
        ])
        .await;
}
