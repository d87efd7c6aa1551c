//! Request handler definitions
//!
//! Define each route and its handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause
//! the current worker to stop processing new requests. For this reason, any long, non-cpu-bound operation (e.g. I/O,
//! database operations, etc.) should be expressed as futures or asynchronous functions. Async handlers get executed
//! concurrently by worker threads and thus don't block execution.
use actix_web::{get, web, HttpResponse, Responder};
use akiba_common::Cents;
use akiba_engine::{
    gateway::{CallbackAck, PaymentCallback, PaymentGateway},
    helpers::WalletSignature,
    ledger::{LedgerClient, SignedSubmission},
    traits::{Pagination, ReconciliationDatabase},
    DepositRequest,
    PaymentMethod,
    ReconciliationApi,
    SavingsApi,
    SavingsApiError,
    WithdrawalRequest,
};
use log::*;

use crate::{
    data_objects::{
        BindWalletParams,
        ContributeParams,
        CreateGoalParams,
        DepositParams,
        GoalStatusChange,
        GoalStatusParams,
        PaymentMethodParams,
        PendingOperationResponse,
        RegisterUserParams,
        TransactionPageQuery,
        WithdrawalParams,
    },
    errors::ServerError,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Webhook  ----------------------------------------------------
route!(mpesa_webhook => Post "/mpesa" impl ReconciliationDatabase);
/// The payment provider's callback endpoint.
///
/// Deliveries are at-least-once and unsigned, so the payload is treated as untrusted input that only gains meaning
/// by matching a known pending operation. The response is always the fixed acknowledgement body: backend-side
/// errors are logged and resolved through the retry/alerting path, never by making the provider retry.
pub async fn mpesa_webhook<B>(body: web::Bytes, api: web::Data<ReconciliationApi<B>>) -> HttpResponse
where B: ReconciliationDatabase {
    let callback = match serde_json::from_slice::<PaymentCallback>(&body) {
        Ok(callback) => callback,
        Err(e) => {
            warn!("📨️ Received a callback that does not parse: {e}. Acknowledging to stop retries.");
            return HttpResponse::Ok().json(CallbackAck::accepted());
        },
    };
    let cid = callback.correlation_id.clone();
    trace!("📨️ Received payment callback for [{cid}]");
    match api.process_payment_callback(callback).await {
        Ok(Some(outcome)) => {
            info!("📨️ Callback [{cid}] settled transaction #{} for user #{}", outcome.transaction.id, outcome.user_id);
        },
        Ok(None) => {
            debug!("📨️ Callback [{cid}] required no action");
        },
        Err(e) => {
            // the durable retry already ran its course; the entry stays pending for the sweep/alerting path
            error!("📨️ Callback [{cid}] could not be processed: {e}");
        },
    }
    HttpResponse::Ok().json(CallbackAck::accepted())
}

//----------------------------------------------   Read surface  -----------------------------------------------
route!(balance => Get "/balance/{user_id}" impl ReconciliationDatabase, LedgerClient, PaymentGateway);
pub async fn balance<B, L, G>(
    path: web::Path<i64>,
    api: web::Data<SavingsApi<B, L, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: ReconciliationDatabase,
    L: LedgerClient,
    G: PaymentGateway,
{
    let user_id = path.into_inner();
    let projection = api.get_balance(user_id).await.map_err(ServerError::from)?;
    Ok(HttpResponse::Ok().json(projection))
}

route!(transactions => Get "/transactions/{user_id}" impl ReconciliationDatabase, LedgerClient, PaymentGateway);
pub async fn transactions<B, L, G>(
    path: web::Path<i64>,
    query: web::Query<TransactionPageQuery>,
    api: web::Data<SavingsApi<B, L, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: ReconciliationDatabase,
    L: LedgerClient,
    G: PaymentGateway,
{
    let user_id = path.into_inner();
    let pagination = Pagination::new(query.page, query.limit);
    let list = api.list_transactions(user_id, pagination).await.map_err(ServerError::from)?;
    Ok(HttpResponse::Ok().json(list))
}

route!(goal_by_id => Get "/goals/{user_id}/{goal_id}" impl ReconciliationDatabase, LedgerClient, PaymentGateway);
pub async fn goal_by_id<B, L, G>(
    path: web::Path<(i64, i64)>,
    api: web::Data<SavingsApi<B, L, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: ReconciliationDatabase,
    L: LedgerClient,
    G: PaymentGateway,
{
    let (user_id, goal_id) = path.into_inner();
    let view = api.get_goal(user_id, goal_id).await.map_err(ServerError::from)?;
    Ok(HttpResponse::Ok().json(view))
}

route!(goals_for_user => Get "/goals/{user_id}" impl ReconciliationDatabase, LedgerClient, PaymentGateway);
pub async fn goals_for_user<B, L, G>(
    path: web::Path<i64>,
    api: web::Data<SavingsApi<B, L, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: ReconciliationDatabase,
    L: LedgerClient,
    G: PaymentGateway,
{
    let user_id = path.into_inner();
    let views = api.list_goals(user_id).await.map_err(ServerError::from)?;
    Ok(HttpResponse::Ok().json(views))
}

route!(pending_operations => Get "/pending/{user_id}" impl ReconciliationDatabase, LedgerClient, PaymentGateway);
pub async fn pending_operations<B, L, G>(
    path: web::Path<i64>,
    api: web::Data<SavingsApi<B, L, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: ReconciliationDatabase,
    L: LedgerClient,
    G: PaymentGateway,
{
    let user_id = path.into_inner();
    let ops = api.pending_operations(user_id).await.map_err(ServerError::from)?;
    let ops: Vec<PendingOperationResponse> = ops.into_iter().map(PendingOperationResponse::from).collect();
    Ok(HttpResponse::Ok().json(ops))
}

//----------------------------------------------   Users  -------------------------------------------------------
route!(register_user => Post "/users" impl ReconciliationDatabase, LedgerClient, PaymentGateway);
pub async fn register_user<B, L, G>(
    body: web::Json<RegisterUserParams>,
    api: web::Data<SavingsApi<B, L, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: ReconciliationDatabase,
    L: LedgerClient,
    G: PaymentGateway,
{
    let params = body.into_inner();
    let user = api.register_user(&params.phone).await.map_err(ServerError::from)?;
    Ok(HttpResponse::Ok().json(user))
}

route!(bind_wallet => Post "/users/{user_id}/wallet" impl ReconciliationDatabase, LedgerClient, PaymentGateway);
/// Binds an on-chain address to the user. The request carries an ownership proof signed client-side; the server
/// only ever verifies it; key material never reaches this backend.
pub async fn bind_wallet<B, L, G>(
    path: web::Path<i64>,
    body: web::Json<BindWalletParams>,
    api: web::Data<SavingsApi<B, L, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: ReconciliationDatabase,
    L: LedgerClient,
    G: PaymentGateway,
{
    let user_id = path.into_inner();
    let params = body.into_inner();
    let proof = WalletSignature::new(&params.address, user_id, params.nonce, &params.public_key, &params.signature)
        .map_err(SavingsApiError::from)
        .map_err(ServerError::from)?;
    let user = api.bind_wallet(user_id, &proof).await.map_err(ServerError::from)?;
    Ok(HttpResponse::Ok().json(user))
}

//----------------------------------------------   Write surface  -----------------------------------------------
route!(request_deposit => Post "/deposits" impl ReconciliationDatabase, LedgerClient, PaymentGateway);
pub async fn request_deposit<B, L, G>(
    body: web::Json<DepositParams>,
    api: web::Data<SavingsApi<B, L, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: ReconciliationDatabase,
    L: LedgerClient,
    G: PaymentGateway,
{
    let params = body.into_inner();
    let request = DepositRequest {
        user_id: params.user_id,
        amount: Cents::from(params.amount),
        method: params.method.into(),
    };
    let pending = api.request_deposit(request).await.map_err(ServerError::from)?;
    Ok(HttpResponse::Accepted().json(PendingOperationResponse::from(pending)))
}

route!(request_withdrawal => Post "/withdrawals" impl ReconciliationDatabase, LedgerClient, PaymentGateway);
pub async fn request_withdrawal<B, L, G>(
    body: web::Json<WithdrawalParams>,
    api: web::Data<SavingsApi<B, L, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: ReconciliationDatabase,
    L: LedgerClient,
    G: PaymentGateway,
{
    let params = body.into_inner();
    let request = WithdrawalRequest {
        user_id: params.user_id,
        amount: Cents::from(params.amount),
        method: params.method.into(),
        remark: params.remark,
    };
    let pending = api.request_withdrawal(request).await.map_err(ServerError::from)?;
    Ok(HttpResponse::Accepted().json(PendingOperationResponse::from(pending)))
}

route!(create_goal => Post "/goals" impl ReconciliationDatabase, LedgerClient, PaymentGateway);
pub async fn create_goal<B, L, G>(
    body: web::Json<CreateGoalParams>,
    api: web::Data<SavingsApi<B, L, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: ReconciliationDatabase,
    L: LedgerClient,
    G: PaymentGateway,
{
    let params = body.into_inner();
    let goal = api
        .create_goal(params.user_id, &params.name, Cents::from(params.target_amount), params.duration_days)
        .await
        .map_err(ServerError::from)?;
    Ok(HttpResponse::Ok().json(goal))
}

route!(contribute_to_goal => Post "/goals/contribute" impl ReconciliationDatabase, LedgerClient, PaymentGateway);
pub async fn contribute_to_goal<B, L, G>(
    body: web::Json<ContributeParams>,
    api: web::Data<SavingsApi<B, L, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: ReconciliationDatabase,
    L: LedgerClient,
    G: PaymentGateway,
{
    let params = body.into_inner();
    let signed = SignedSubmission { raw_tx: params.raw_tx };
    let pending = api
        .contribute_to_goal(params.user_id, params.goal_id, Cents::from(params.amount), signed)
        .await
        .map_err(ServerError::from)?;
    Ok(HttpResponse::Accepted().json(PendingOperationResponse::from(pending)))
}

route!(change_goal_status => Post "/goals/{user_id}/{goal_id}/status" impl ReconciliationDatabase, LedgerClient, PaymentGateway);
pub async fn change_goal_status<B, L, G>(
    path: web::Path<(i64, i64)>,
    body: web::Json<GoalStatusParams>,
    api: web::Data<SavingsApi<B, L, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: ReconciliationDatabase,
    L: LedgerClient,
    G: PaymentGateway,
{
    let (user_id, goal_id) = path.into_inner();
    let goal = match body.into_inner().status {
        GoalStatusChange::Paused => api.pause_goal(user_id, goal_id).await,
        GoalStatusChange::Active => api.resume_goal(user_id, goal_id).await,
        GoalStatusChange::Cancelled => api.cancel_goal(user_id, goal_id).await,
    }
    .map_err(ServerError::from)?;
    Ok(HttpResponse::Ok().json(goal))
}

impl From<PaymentMethodParams> for PaymentMethod {
    fn from(params: PaymentMethodParams) -> Self {
        match params {
            PaymentMethodParams::Mpesa { phone } => PaymentMethod::Mpesa { phone },
            PaymentMethodParams::Crypto { raw_tx } => PaymentMethod::Crypto { signed: SignedSubmission { raw_tx } },
        }
    }
}
