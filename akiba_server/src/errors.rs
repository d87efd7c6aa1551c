use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use akiba_engine::{traits::StoreError, SavingsApiError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Payload deserialization error")]
    CouldNotDeserializePayload,
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Could not read request path: {0}")]
    InvalidRequestPath(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("The request was rejected. {0}")]
    RequestRejected(String),
    #[error("Forbidden. {0}")]
    Forbidden(String),
    #[error("Insufficient funds. {0}")]
    InsufficientFunds(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::CouldNotDeserializePayload => StatusCode::BAD_REQUEST,
            Self::InvalidRequestPath(_) => StatusCode::BAD_REQUEST,
            Self::RequestRejected(_) => StatusCode::BAD_REQUEST,
            Self::InsufficientFunds(_) => StatusCode::CONFLICT,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

impl From<SavingsApiError> for ServerError {
    fn from(e: SavingsApiError) -> Self {
        match e {
            SavingsApiError::Store(StoreError::GoalNotFound(_)) | SavingsApiError::Store(StoreError::OperationNotFound(_)) => {
                Self::NoRecordFound(e.to_string())
            },
            SavingsApiError::Store(StoreError::DatabaseError(msg)) => Self::BackendError(msg),
            SavingsApiError::Store(_) => Self::RequestRejected(e.to_string()),
            SavingsApiError::User(akiba_engine::traits::UserStoreError::UserNotFound(_)) => {
                Self::NoRecordFound(e.to_string())
            },
            SavingsApiError::User(akiba_engine::traits::UserStoreError::DatabaseError(msg)) => {
                Self::BackendError(msg)
            },
            SavingsApiError::User(_) => Self::RequestRejected(e.to_string()),
            SavingsApiError::InsufficientFunds { .. } => Self::InsufficientFunds(e.to_string()),
            SavingsApiError::ExternalCallFailure(msg) => Self::BackendError(msg),
            SavingsApiError::Phone(_)
            | SavingsApiError::Signature(_)
            | SavingsApiError::InvalidOwnershipProof
            | SavingsApiError::NonPositiveAmount
            | SavingsApiError::NoWalletBound(_)
            | SavingsApiError::GoalNotContributable(_) => Self::RequestRejected(e.to_string()),
        }
    }
}
