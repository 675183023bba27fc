//! Error types for fetch, score and route operations

use rating_core::Provider;
use thiserror::Error;

/// Errors surfaced by the engine to its callers
#[derive(Debug, Error)]
pub enum FetchError {
    /// Unknown ticker, or the stock has no identifier for the provider
    #[error("Not found: {0}")]
    NotFound(String),

    /// The provider declined due to quota
    #[error("{} rate limit exceeded, try again later", provider.display_name())]
    RateLimited { provider: Provider },

    /// The provider could not be reached or its answer could not be used
    #[error("Bad gateway: {0}")]
    BadGateway(String),

    /// The provider requires a paid tier for the requested data
    #[error("{} requires a premium subscription for {ticker}", provider.display_name())]
    PremiumRequired { provider: Provider, ticker: String },

    /// Malformed request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No adapter or base URL is configured for the provider
    #[error("{} is not configured", provider.display_name())]
    NotConfigured { provider: Provider },

    /// Caller is not authenticated
    #[error("This endpoint is available to authenticated users only")]
    Unauthorized,

    /// Caller lacks the required access rights
    #[error("The authenticated user account does not have the rights necessary to access this endpoint")]
    Forbidden,

    /// Route exists but not for this method
    #[error("Method {0} not allowed")]
    MethodNotAllowed(String),

    /// The stock store rejected an operation
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network or HTTP error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, FetchError>;

impl FetchError {
    /// HTTP status code reported for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) => 400,
            Self::Unauthorized => 401,
            Self::PremiumRequired { .. } => 402,
            Self::Forbidden => 403,
            Self::NotFound(_) => 404,
            Self::MethodNotAllowed(_) => 405,
            Self::RateLimited { .. } => 429,
            Self::Store(_) | Self::Config(_) => 500,
            Self::BadGateway(_)
            | Self::NotConfigured { .. }
            | Self::Network(_)
            | Self::Json(_) => 502,
        }
    }
}

impl From<rating_core::Error> for FetchError {
    fn from(err: rating_core::Error) -> Self {
        match err {
            rating_core::Error::NotFound(msg) => Self::NotFound(msg),
            rating_core::Error::InvalidInput(msg) => Self::InvalidRequest(msg),
            rating_core::Error::Store(msg) | rating_core::Error::Generic(msg) => Self::Store(msg),
        }
    }
}

impl From<FetchError> for rating_core::Error {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::NotFound(msg) => rating_core::Error::NotFound(msg),
            FetchError::InvalidRequest(msg) => rating_core::Error::InvalidInput(msg),
            FetchError::Store(msg) => rating_core::Error::Store(msg),
            other => rating_core::Error::Generic(other.to_string()),
        }
    }
}
