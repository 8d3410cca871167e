//! OpenID Connect protocol types.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Error codes reported by [`CallbackResult::Error`] for locally detected failures
pub mod callback_errors {
    /// The `state` parameter was missing or did not match
    pub const INVALID_STATE: &str = "invalid_state";
    /// The callback carried neither an error nor an authorization code
    pub const INVALID_RESPONSE: &str = "invalid_response";
    /// The authorization code could not be exchanged for tokens
    pub const TOKEN_ERROR: &str = "token_error";
}

/// Token endpoint response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// Provider-specific fields not covered above
    #[serde(flatten)]
    pub additional_fields: Map<String, Value>,
}

/// Outcome of processing an authorization response.
///
/// Protocol failures are reported here instead of as errors so that a
/// callback handler always has a value to render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CallbackResult {
    Success {
        token_response: TokenResponse,
    },
    Error {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_description: Option<String>,
    },
}

impl CallbackResult {
    pub(crate) fn error(error: impl Into<String>, description: Option<String>) -> Self {
        CallbackResult::Error {
            error: error.into(),
            error_description: description,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CallbackResult::Success { .. })
    }

    pub fn token_response(&self) -> Option<&TokenResponse> {
        match self {
            CallbackResult::Success { token_response } => Some(token_response),
            CallbackResult::Error { .. } => None,
        }
    }

    pub fn into_token_response(self) -> Option<TokenResponse> {
        match self {
            CallbackResult::Success { token_response } => Some(token_response),
            CallbackResult::Error { .. } => None,
        }
    }

    pub fn error_code(&self) -> Option<&str> {
        match self {
            CallbackResult::Error { error, .. } => Some(error),
            CallbackResult::Success { .. } => None,
        }
    }
}

/// The `aud` claim: a single audience or a list of them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    pub fn contains(&self, client_id: &str) -> bool {
        match self {
            Audience::Single(aud) => aud == client_id,
            Audience::Multiple(auds) => auds.iter().any(|aud| aud == client_id),
        }
    }
}

/// Decoded ID token payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdTokenClaims {
    #[serde(default)]
    pub iss: String,
    #[serde(default)]
    pub sub: String,
    pub aud: Audience,
    /// Expiry as a NumericDate; fractional seconds are allowed
    pub exp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amr: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c_hash: Option<String>,
    #[serde(flatten)]
    pub additional_claims: Map<String, Value>,
}

impl IdTokenClaims {
    pub fn claim<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        typed_claim(&self.additional_claims, name)
    }
}

/// UserInfo endpoint response
///
/// The subject comes from `sub`. Legacy OAuth2 profile APIs that only send
/// `id` are accepted as well; when both are present `id` stays an ordinary claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawUserInfo")]
pub struct UserInfo {
    pub sub: String,
    pub email: Option<String>,
    pub email_verified: Option<bool>,
    pub name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub picture: Option<String>,
    pub locale: Option<String>,
    #[serde(flatten)]
    pub additional_claims: Map<String, Value>,
}

#[derive(Deserialize)]
struct RawUserInfo {
    sub: Option<String>,
    email: Option<String>,
    email_verified: Option<bool>,
    name: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
    picture: Option<String>,
    locale: Option<String>,
    #[serde(flatten)]
    additional_claims: Map<String, Value>,
}

impl TryFrom<RawUserInfo> for UserInfo {
    type Error = String;

    fn try_from(raw: RawUserInfo) -> Result<Self, Self::Error> {
        let mut additional_claims = raw.additional_claims;

        let sub = match raw.sub {
            Some(sub) => sub,
            None => match additional_claims.remove("id") {
                Some(Value::String(id)) => id,
                Some(Value::Number(id)) => id.to_string(),
                _ => return Err("missing field `sub`".to_string()),
            },
        };

        Ok(Self {
            sub,
            email: raw.email,
            email_verified: raw.email_verified,
            name: raw.name,
            given_name: raw.given_name,
            family_name: raw.family_name,
            picture: raw.picture,
            locale: raw.locale,
            additional_claims,
        })
    }
}

impl UserInfo {
    /// Read a non-standard claim as a concrete type.
    pub fn claim<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        typed_claim(&self.additional_claims, name)
    }
}

fn typed_claim<T: DeserializeOwned>(claims: &Map<String, Value>, name: &str) -> Option<T> {
    claims
        .get(name)
        .and_then(|value| serde_json::from_value(value.clone()).ok())
}

/// OpenID provider metadata (`/.well-known/openid-configuration`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    #[serde(default)]
    pub jwks_uri: Option<String>,
    #[serde(default)]
    pub scopes_supported: Option<Vec<String>>,
    #[serde(default)]
    pub response_types_supported: Option<Vec<String>>,
    #[serde(default)]
    pub grant_types_supported: Option<Vec<String>>,
    #[serde(default)]
    pub id_token_signing_alg_values_supported: Option<Vec<String>>,
    #[serde(default)]
    pub code_challenge_methods_supported: Option<Vec<String>>,
}

impl ProviderMetadata {
    pub fn supports_pkce_s256(&self) -> bool {
        self.code_challenge_methods_supported
            .as_ref()
            .is_some_and(|methods| methods.iter().any(|m| m == "S256"))
    }
}
