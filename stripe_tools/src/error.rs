use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum StripeApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("Invalid REST request: {0}")]
    RestRequestError(String),
    #[error("Invalid REST response: {0}")]
    RestResponseError(String),
    #[error("The request timed out: {0}")]
    Timeout(String),
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    #[error("Query failed. Error {status}. {message}")]
    QueryError { status: u16, message: String },
    #[error("The webhook signature is missing or malformed. {0}")]
    MissingSignature(String),
    #[error("The webhook signature does not match the payload")]
    InvalidSignature,
    #[error("The webhook signature is {age}s old, which is outside the tolerance")]
    SignatureExpired { age: i64 },
}

impl StripeApiError {
    /// Network-level failures that are worth one more attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::RestRequestError(_))
    }
}
