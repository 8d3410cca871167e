//! OpenID Connect relying party.
//!
//! This crate implements the client side of the OpenID Connect Authorization
//! Code flow: building the authorization request, validating the redirect back
//! (provider errors, anti-CSRF `state`), exchanging the code or a refresh token
//! at the token endpoint, checking the claims of the returned ID token and
//! fetching profile claims from the userinfo endpoint.
//!
//! [`RelyingParty::validate_id_token`] performs structural and claim validation
//! only. Signature verification against the provider's key set is a separate
//! step, [`RelyingParty::verify_id_token`].

mod client;
mod config;
mod discovery;
mod error;
mod id_token;
mod jwks;
mod secrets;
mod types;


pub use client::RelyingParty;
pub use config::{AuthorizationParams, DEFAULT_RESPONSE_TYPE, DEFAULT_SCOPE, RelyingPartyConfig};
pub use discovery::{discover, discovery_url};
pub use error::{OidcError, OidcResult};
pub use id_token::{IdTokenRejection, decode_unverified};
pub use jwks::fetch_jwks;
pub use secrets::{FlowSecrets, PkceChallenge, SecretSource};
pub use types::{
    Audience, CallbackResult, IdTokenClaims, ProviderMetadata, TokenResponse, UserInfo,
    callback_errors,
};

// Re-export for callers holding key sets
pub use jsonwebtoken::jwk::JwkSet;
