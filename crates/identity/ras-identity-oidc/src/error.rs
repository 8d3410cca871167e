//! OIDC relying party error types.

use thiserror::Error;

use crate::id_token::IdTokenRejection;

pub type OidcResult<T> = Result<T, OidcError>;

#[derive(Debug, Error)]
pub enum OidcError {
    #[error("Invalid configuration: missing required field `{0}`")]
    MissingConfigField(&'static str),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// The OS random source failed and the insecure fallback was not allowed.
    #[error("Secure randomness unavailable: {0}")]
    InsecureRandomness(String),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Token request failed: {0}")]
    TokenRequest(String),

    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    #[error("Invalid token response: {0}")]
    TokenResponseFormat(String),

    #[error("User info request failed: {0}")]
    UserInfoRequest(String),

    #[error("Invalid user info response: {0}")]
    UserInfoResponseFormat(String),

    #[error("JWKS request failed: {0}")]
    JwksRequest(String),

    #[error("Discovery request failed: {0}")]
    DiscoveryRequest(String),

    #[error("Issuer mismatch: expected {expected}, got {actual}")]
    IssuerMismatch { expected: String, actual: String },

    #[error("Signing key not found: {0}")]
    KeyNotFound(String),

    #[error("Unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("JWT error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),

    #[error("ID token rejected: {0}")]
    IdTokenRejected(#[from] IdTokenRejection),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),
}

impl OidcError {
    /// True for failures caused by missing or invalid setup rather than by a
    /// provider or the network.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            OidcError::MissingConfigField(_)
                | OidcError::ConfigError(_)
                | OidcError::InsecureRandomness(_)
        )
    }
}

/// Reason phrase for a non-success status, e.g. `Bad Request`.
pub(crate) fn status_text(status: reqwest::StatusCode) -> String {
    status
        .canonical_reason()
        .map(str::to_owned)
        .unwrap_or_else(|| status.as_str().to_owned())
}
