//! Relying party configuration types.

use serde::{Deserialize, Serialize};

use crate::error::{OidcError, OidcResult};
use crate::types::ProviderMetadata;

pub const DEFAULT_RESPONSE_TYPE: &str = "code";
pub const DEFAULT_SCOPE: &str = "openid profile email";

/// Optional parameters forwarded verbatim on the authorization request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorizationParams {
    pub response_mode: Option<String>,
    pub display: Option<String>,
    pub prompt: Option<String>,
    /// Maximum authentication age in seconds
    pub max_age: Option<u64>,
    pub ui_locales: Option<String>,
    pub id_token_hint: Option<String>,
    pub login_hint: Option<String>,
    pub acr_values: Option<String>,
}

impl AuthorizationParams {
    /// Query pairs for every configured parameter, in a fixed order.
    /// Empty values count as unset.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        let mut push = |key: &'static str, value: &Option<String>| {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                pairs.push((key, value.to_string()));
            }
        };

        push("response_mode", &self.response_mode);
        push("display", &self.display);
        push("prompt", &self.prompt);
        push("ui_locales", &self.ui_locales);
        push("id_token_hint", &self.id_token_hint);
        push("login_hint", &self.login_hint);
        push("acr_values", &self.acr_values);

        if let Some(max_age) = self.max_age {
            pairs.push(("max_age", max_age.to_string()));
        }

        pairs
    }
}

/// Relying party configuration.
///
/// Every field is defaulted on deserialization so that a configuration file
/// missing a required key is reported by [`RelyingPartyConfig::validate`]
/// with the field's name rather than by the deserializer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelyingPartyConfig {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: Option<String>,
    pub jwks_uri: Option<String>,
    /// When set, the `iss` claim of ID tokens must equal this value
    pub expected_issuer: Option<String>,
    pub response_type: Option<String>,
    pub scope: Option<String>,
    /// Passthrough authorization parameters
    pub auth_params: AuthorizationParams,
    /// Previously issued state, when rehydrating an engine at callback time
    pub state: Option<String>,
    /// Previously issued nonce, when rehydrating an engine at callback time
    pub nonce: Option<String>,
    /// Previously issued PKCE verifier, when rehydrating with `use_pkce`
    pub code_verifier: Option<String>,
    /// Whether to use PKCE (S256)
    pub use_pkce: bool,
    /// Permit a non-cryptographic secret generator when the OS source fails
    pub allow_insecure_randomness: bool,
    /// Request timeout; no timeout when unset
    pub http_timeout_seconds: Option<u64>,
}

impl RelyingPartyConfig {
    pub fn new(
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
        authorization_endpoint: impl Into<String>,
        token_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            authorization_endpoint: authorization_endpoint.into(),
            token_endpoint: token_endpoint.into(),
            ..Self::default()
        }
    }

    /// Build a configuration from a provider's discovery document.
    ///
    /// PKCE is enabled when the provider advertises the S256 method.
    pub fn from_metadata(
        metadata: &ProviderMetadata,
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            userinfo_endpoint: metadata.userinfo_endpoint.clone(),
            jwks_uri: metadata.jwks_uri.clone(),
            expected_issuer: Some(metadata.issuer.clone()),
            use_pkce: metadata.supports_pkce_s256(),
            ..Self::new(
                client_id,
                redirect_uri,
                metadata.authorization_endpoint.clone(),
                metadata.token_endpoint.clone(),
            )
        }
    }

    pub fn with_client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(client_secret.into());
        self
    }

    pub fn with_userinfo_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.userinfo_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_jwks_uri(mut self, jwks_uri: impl Into<String>) -> Self {
        self.jwks_uri = Some(jwks_uri.into());
        self
    }

    pub fn with_expected_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.expected_issuer = Some(issuer.into());
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_auth_params(mut self, params: AuthorizationParams) -> Self {
        self.auth_params = params;
        self
    }

    /// Reuse the state and nonce issued with an earlier authorization request.
    pub fn with_secrets(mut self, state: impl Into<String>, nonce: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self.nonce = Some(nonce.into());
        self
    }

    pub fn with_pkce(mut self, use_pkce: bool) -> Self {
        self.use_pkce = use_pkce;
        self
    }

    pub fn with_http_timeout(mut self, seconds: u64) -> Self {
        self.http_timeout_seconds = Some(seconds);
        self
    }

    /// Check required fields in order; the first empty one is reported.
    pub fn validate(&self) -> OidcResult<()> {
        let required = [
            ("client_id", &self.client_id),
            ("redirect_uri", &self.redirect_uri),
            ("authorization_endpoint", &self.authorization_endpoint),
            ("token_endpoint", &self.token_endpoint),
        ];

        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(OidcError::MissingConfigField(field));
            }
        }

        Ok(())
    }

    /// Fill unset `response_type` and `scope` with their defaults.
    pub fn with_defaults(mut self) -> Self {
        self.response_type
            .get_or_insert_with(|| DEFAULT_RESPONSE_TYPE.to_string());
        self.scope.get_or_insert_with(|| DEFAULT_SCOPE.to_string());
        self
    }

    pub fn response_type(&self) -> &str {
        self.response_type.as_deref().unwrap_or(DEFAULT_RESPONSE_TYPE)
    }

    pub fn scope(&self) -> &str {
        self.scope.as_deref().unwrap_or(DEFAULT_SCOPE)
    }
}
