use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use bloom_engine::{CheckoutError, OrderStoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
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
    #[error("Missing credentials. {0}")]
    Unauthenticated(String),
    #[error("Insufficient Permissions. {0}")]
    InsufficientPermissions(String),
    #[error("{0}")]
    Checkout(#[from] CheckoutError),
    #[error("{0}")]
    OrderStore(#[from] OrderStoreError),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequestPath(_) => StatusCode::BAD_REQUEST,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::InsufficientPermissions(_) => StatusCode::FORBIDDEN,
            Self::Checkout(e) => match e {
                CheckoutError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                CheckoutError::InvalidSignature(_) => StatusCode::BAD_REQUEST,
                CheckoutError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
                CheckoutError::NotFound(_) => StatusCode::NOT_FOUND,
                CheckoutError::GatewayUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
                CheckoutError::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
                CheckoutError::Gateway(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::OrderStore(e) => match e {
                OrderStoreError::OrderNotFound(_) => StatusCode::NOT_FOUND,
                OrderStoreError::NotificationNotFound(_) => StatusCode::NOT_FOUND,
                OrderStoreError::IllegalTransition(_) => StatusCode::BAD_REQUEST,
                OrderStoreError::InvalidOrder(_) => StatusCode::BAD_REQUEST,
                OrderStoreError::TransitionConflict { .. } => StatusCode::CONFLICT,
                OrderStoreError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
                OrderStoreError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}
