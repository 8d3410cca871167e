//! The relying party engine.

use jsonwebtoken::jwk::JwkSet;
use reqwest::Client;
use reqwest::header::ACCEPT;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::RelyingPartyConfig;
use crate::error::{OidcError, OidcResult, status_text};
use crate::id_token::{self, ClaimExpectations, IdTokenRejection};
use crate::{discovery, jwks};
use crate::secrets::{FlowSecrets, SecretSource};
use crate::types::{CallbackResult, IdTokenClaims, TokenResponse, UserInfo, callback_errors};

/// Endpoints parsed once at construction
#[derive(Debug)]
struct Endpoints {
    redirect: Url,
    authorization: Url,
    token: Url,
    userinfo: Option<Url>,
    jwks: Option<Url>,
}

impl Endpoints {
    fn parse(config: &RelyingPartyConfig) -> OidcResult<Self> {
        Ok(Self {
            redirect: parse_endpoint("redirect_uri", &config.redirect_uri)?,
            authorization: parse_endpoint(
                "authorization_endpoint",
                &config.authorization_endpoint,
            )?,
            token: parse_endpoint("token_endpoint", &config.token_endpoint)?,
            userinfo: config
                .userinfo_endpoint
                .as_deref()
                .map(|url| parse_endpoint("userinfo_endpoint", url))
                .transpose()?,
            jwks: config
                .jwks_uri
                .as_deref()
                .map(|url| parse_endpoint("jwks_uri", url))
                .transpose()?,
        })
    }
}

fn parse_endpoint(field: &str, value: &str) -> OidcResult<Url> {
    Url::parse(value).map_err(|e| OidcError::ConfigError(format!("{field} is not a valid URL: {e}")))
}

#[derive(Debug)]
struct Inner {
    config: RelyingPartyConfig,
    endpoints: Endpoints,
    secrets: FlowSecrets,
}

/// OpenID Connect relying party for one authorization attempt.
///
/// Configuration and flow secrets are fixed at construction, so a single
/// instance can be shared between tasks. Servers handling many users create
/// one instance per authorization attempt, or rehydrate one at callback time
/// with the persisted state and nonce (see [`RelyingPartyConfig::with_secrets`]).
#[derive(Debug, Clone)]
pub struct RelyingParty {
    inner: Arc<Inner>,
    http_client: Client,
}

impl RelyingParty {
    pub fn new(config: RelyingPartyConfig) -> OidcResult<Self> {
        config.validate()?;
        let config = config.with_defaults();
        let endpoints = Endpoints::parse(&config)?;
        let secrets = FlowSecrets::resolve(&config)?;

        if secrets.source == SecretSource::InsecureFallback {
            warn!(
                "Relying party for client {} is running with insecure flow secrets",
                config.client_id
            );
        }

        let mut builder = Client::builder();
        if let Some(seconds) = config.http_timeout_seconds {
            builder = builder.timeout(Duration::from_secs(seconds));
        }
        let http_client = builder.build()?;

        debug!("Created relying party for client {}", config.client_id);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                endpoints,
                secrets,
            }),
            http_client,
        })
    }

    /// Discover the provider's endpoints and build a relying party for it.
    pub async fn from_issuer(
        issuer: &str,
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> OidcResult<Self> {
        let metadata = discovery::discover(&Client::new(), issuer).await?;
        Self::new(RelyingPartyConfig::from_metadata(
            &metadata,
            client_id,
            redirect_uri,
        ))
    }

    /// Use a caller-provided HTTP client, e.g. one with custom TLS or proxy settings.
    pub fn with_http_client(mut self, http_client: Client) -> Self {
        self.http_client = http_client;
        self
    }

    pub fn config(&self) -> &RelyingPartyConfig {
        &self.inner.config
    }

    /// The state, nonce and PKCE verifier to persist across the redirect.
    pub fn secrets(&self) -> &FlowSecrets {
        &self.inner.secrets
    }

    pub fn state(&self) -> &str {
        &self.inner.secrets.state
    }

    pub fn nonce(&self) -> &str {
        &self.inner.secrets.nonce
    }

    /// False when the secrets came from the insecure fallback generator.
    pub fn is_secure(&self) -> bool {
        self.inner.secrets.is_secure()
    }

    /// Authorization endpoint URL to redirect the user agent to.
    pub fn authorization_url(&self) -> Url {
        let config = &self.inner.config;
        let secrets = &self.inner.secrets;
        let mut url = self.inner.endpoints.authorization.clone();

        {
            let mut params = url.query_pairs_mut();
            params.append_pair("client_id", &config.client_id);
            params.append_pair("redirect_uri", &config.redirect_uri);
            params.append_pair("response_type", config.response_type());
            params.append_pair("scope", config.scope());
            params.append_pair("state", &secrets.state);
            params.append_pair("nonce", &secrets.nonce);

            for (key, value) in config.auth_params.query_pairs() {
                params.append_pair(key, &value);
            }

            if let Some(pkce) = &secrets.pkce {
                params.append_pair("code_challenge", &pkce.code_challenge);
                params.append_pair("code_challenge_method", &pkce.code_challenge_method);
            }
        }

        url
    }

    /// Process the URL the provider redirected back to.
    ///
    /// Never fails: provider errors, state mismatches, missing codes and
    /// failed exchanges are all reported through [`CallbackResult::Error`].
    pub async fn handle_callback(&self, redirected_url: &str) -> CallbackResult {
        let url = match self.inner.endpoints.redirect.join(redirected_url) {
            Ok(url) => url,
            Err(e) => {
                warn!("Unparseable callback URL: {}", e);
                return CallbackResult::error(
                    callback_errors::INVALID_RESPONSE,
                    Some(format!("Callback URL could not be parsed: {e}")),
                );
            }
        };

        let param = |name: &str| {
            url.query_pairs()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned())
        };

        if let Some(error) = param("error") {
            let error_description = param("error_description");
            info!(
                "Provider returned error {} ({})",
                error,
                error_description.as_deref().unwrap_or("no description")
            );
            return CallbackResult::error(error, error_description);
        }

        if param("state").as_deref() != Some(self.state()) {
            warn!("Callback state does not match the issued state");
            return CallbackResult::error(
                callback_errors::INVALID_STATE,
                Some("State parameter does not match".to_string()),
            );
        }

        let Some(code) = param("code") else {
            return CallbackResult::error(
                callback_errors::INVALID_RESPONSE,
                Some("Authorization code is missing".to_string()),
            );
        };

        match self.exchange_code(&code).await {
            Ok(token_response) => CallbackResult::Success { token_response },
            Err(e) => CallbackResult::error(callback_errors::TOKEN_ERROR, Some(e.to_string())),
        }
    }

    /// Exchange an authorization code for tokens.
    ///
    /// Codes are single use; this is never retried.
    pub async fn exchange_code(&self, code: &str) -> OidcResult<TokenResponse> {
        let config = &self.inner.config;

        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", config.redirect_uri.as_str()),
            ("client_id", config.client_id.as_str()),
        ];
        if let Some(secret) = &config.client_secret {
            params.push(("client_secret", secret.as_str()));
        }
        if let Some(verifier) = self.inner.secrets.code_verifier() {
            params.push(("code_verifier", verifier));
        }

        let token_response = self
            .token_request(&params)
            .await
            .map_err(|failure| match failure {
                TokenFailure::Status(text) => OidcError::TokenRequest(text),
                TokenFailure::Other(e) => e,
            })?;

        info!("Successfully exchanged code for tokens");
        Ok(token_response)
    }

    /// Obtain fresh tokens with a refresh token.
    pub async fn refresh_token(&self, refresh_token: &str) -> OidcResult<TokenResponse> {
        let config = &self.inner.config;

        let mut params = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", config.client_id.as_str()),
        ];
        if let Some(secret) = &config.client_secret {
            params.push(("client_secret", secret.as_str()));
        }

        let token_response = self
            .token_request(&params)
            .await
            .map_err(|failure| match failure {
                TokenFailure::Status(text) => OidcError::TokenRefresh(text),
                TokenFailure::Other(e) => e,
            })?;

        info!("Successfully refreshed tokens");
        Ok(token_response)
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenResponse, TokenFailure> {
        let response = self
            .http_client
            .post(self.inner.endpoints.token.clone())
            .header(ACCEPT, "application/json")
            .form(params)
            .send()
            .await
            .map_err(|e| TokenFailure::Other(e.into()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Token request failed with {}: {}", status, error_text);
            return Err(TokenFailure::Status(status_text(status)));
        }

        response
            .json()
            .await
            .map_err(|e| TokenFailure::Other(OidcError::TokenResponseFormat(e.to_string())))
    }

    /// Structurally validate an ID token against this engine's client id and
    /// nonce. The signature is **not** verified.
    pub fn validate_id_token(&self, id_token: &str) -> bool {
        match self.id_token_claims(id_token) {
            Ok(_) => true,
            Err(rejection) => {
                debug!("ID token rejected: {}", rejection);
                false
            }
        }
    }

    /// Same checks as [`validate_id_token`](Self::validate_id_token), returning
    /// the decoded claims or the reason for rejection.
    pub fn id_token_claims(&self, id_token: &str) -> Result<IdTokenClaims, IdTokenRejection> {
        let claims = id_token::decode_unverified(id_token)?;
        id_token::check_claims(&claims, &self.claim_expectations())?;
        Ok(claims)
    }

    pub(crate) fn claim_expectations(&self) -> ClaimExpectations<'_> {
        ClaimExpectations {
            client_id: &self.inner.config.client_id,
            nonce: &self.inner.secrets.nonce,
            issuer: self.inner.config.expected_issuer.as_deref(),
        }
    }

    /// Fetch the provider's signing keys from `jwks_uri`.
    pub async fn fetch_jwks(&self) -> OidcResult<JwkSet> {
        let jwks_uri = self
            .inner
            .endpoints
            .jwks
            .as_ref()
            .ok_or(OidcError::MissingConfigField("jwks_uri"))?;

        jwks::fetch_jwks(&self.http_client, jwks_uri.clone()).await
    }

    /// Verify the ID token signature against `jwks`, then apply the claim checks.
    pub fn verify_id_token(&self, id_token: &str, jwks: &JwkSet) -> OidcResult<IdTokenClaims> {
        jwks::verify_id_token(id_token, jwks, &self.claim_expectations())
    }

    /// Fetch profile claims from the userinfo endpoint.
    pub async fn user_info(&self, access_token: &str) -> OidcResult<UserInfo> {
        let userinfo_endpoint = self
            .inner
            .endpoints
            .userinfo
            .as_ref()
            .ok_or(OidcError::MissingConfigField("userinfo_endpoint"))?;

        let response = self
            .http_client
            .get(userinfo_endpoint.clone())
            .header(ACCEPT, "application/json")
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("User info request failed with {}: {}", status, error_text);
            return Err(OidcError::UserInfoRequest(status_text(status)));
        }

        let user_info: UserInfo = response
            .json()
            .await
            .map_err(|e| OidcError::UserInfoResponseFormat(e.to_string()))?;

        debug!(
            "Successfully retrieved user info for subject: {}",
            user_info.sub
        );
        Ok(user_info)
    }
}

/// Token endpoint failure before it is mapped to the grant-specific error
enum TokenFailure {
    Status(String),
    Other(OidcError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthorizationParams;
    use crate::id_token::test_tokens::{claims, unsigned};
    use std::collections::HashMap;

    fn test_config() -> RelyingPartyConfig {
        RelyingPartyConfig::new(
            "test_client_id",
            "http://localhost:3000/callback",
            "https://example.com/auth",
            "https://example.com/token",
        )
    }

    fn query(url: &Url) -> HashMap<String, String> {
        url.query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn test_construction_reports_missing_field() {
        let mut config = test_config();
        config.redirect_uri = String::new();
        config.token_endpoint = String::new();

        match RelyingParty::new(config) {
            Err(OidcError::MissingConfigField(field)) => assert_eq!(field, "redirect_uri"),
            other => panic!("expected missing redirect_uri, got {other:?}"),
        }
    }

    #[test]
    fn test_construction_rejects_invalid_endpoint() {
        let mut config = test_config();
        config.token_endpoint = "not a url".to_string();

        let err = RelyingParty::new(config).unwrap_err();
        assert!(err.is_configuration_error());
        assert!(err.to_string().contains("token_endpoint"));
    }

    #[test]
    fn test_authorization_url_base_parameters() {
        let rp = RelyingParty::new(test_config()).unwrap();
        let url = rp.authorization_url();

        assert_eq!(url.host_str(), Some("example.com"));
        assert_eq!(url.path(), "/auth");

        let params = query(&url);
        assert_eq!(params.len(), 6);
        assert_eq!(params["client_id"], "test_client_id");
        assert_eq!(params["redirect_uri"], "http://localhost:3000/callback");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["scope"], "openid profile email");
        assert_eq!(params["state"], rp.state());
        assert_eq!(params["nonce"], rp.nonce());
    }

    #[test]
    fn test_authorization_url_optional_parameters() {
        let config = test_config().with_auth_params(AuthorizationParams {
            response_mode: Some("form_post".to_string()),
            display: Some("popup".to_string()),
            prompt: Some("login consent".to_string()),
            max_age: Some(600),
            ui_locales: Some("en-GB fr".to_string()),
            id_token_hint: Some("hint.token.sig".to_string()),
            login_hint: Some("user@example.com".to_string()),
            acr_values: Some("urn:mace:incommon:iap:silver".to_string()),
        });
        let rp = RelyingParty::new(config).unwrap();
        let url = rp.authorization_url();
        let params = query(&url);

        assert_eq!(params.len(), 14);
        assert_eq!(params["response_mode"], "form_post");
        assert_eq!(params["display"], "popup");
        assert_eq!(params["prompt"], "login consent");
        assert_eq!(params["max_age"], "600");
        assert_eq!(params["ui_locales"], "en-GB fr");
        assert_eq!(params["id_token_hint"], "hint.token.sig");
        assert_eq!(params["login_hint"], "user@example.com");
        assert_eq!(params["acr_values"], "urn:mace:incommon:iap:silver");

        // form encoding of reserved characters
        let raw = url.query().unwrap();
        assert!(raw.contains("login_hint=user%40example.com"));
        assert!(raw.contains("prompt=login+consent"));
    }

    #[test]
    fn test_authorization_url_is_idempotent() {
        let rp = RelyingParty::new(test_config()).unwrap();
        assert_eq!(rp.authorization_url(), rp.authorization_url());
    }

    #[test]
    fn test_authorization_url_keeps_existing_query() {
        let mut config = test_config();
        config.authorization_endpoint = "https://example.com/auth?tenant=acme".to_string();
        let rp = RelyingParty::new(config).unwrap();

        let params = query(&rp.authorization_url());
        assert_eq!(params["tenant"], "acme");
        assert_eq!(params["client_id"], "test_client_id");
    }

    #[test]
    fn test_authorization_url_with_pkce() {
        let rp = RelyingParty::new(test_config().with_pkce(true)).unwrap();
        let params = query(&rp.authorization_url());
        let pkce = rp.secrets().pkce.as_ref().unwrap();

        assert_eq!(params["code_challenge"], pkce.code_challenge);
        assert_eq!(params["code_challenge_method"], "S256");
        assert!(!params.contains_key("code_verifier"));
    }

    #[test]
    fn test_custom_scope_and_response_type_are_kept() {
        let mut config = test_config().with_scope("openid offline_access");
        config.response_type = Some("code id_token".to_string());
        let rp = RelyingParty::new(config).unwrap();

        let params = query(&rp.authorization_url());
        assert_eq!(params["scope"], "openid offline_access");
        assert_eq!(params["response_type"], "code id_token");
    }

    #[test]
    fn test_validate_id_token() {
        let rp = RelyingParty::new(test_config()).unwrap();

        assert!(rp.validate_id_token(&unsigned(&claims("test_client_id", None))));
        assert!(rp.validate_id_token(&unsigned(&claims("test_client_id", Some(rp.nonce())))));
        assert!(!rp.validate_id_token(&unsigned(&claims("test_client_id", Some("other")))));
        assert!(!rp.validate_id_token(&unsigned(&claims("another_client", None))));
        assert!(!rp.validate_id_token("only.two"));
    }

    #[test]
    fn test_id_token_claims_reports_reason() {
        let rp = RelyingParty::new(test_config().with_expected_issuer("https://issuer.example"))
            .unwrap();
        let token = unsigned(&claims("test_client_id", None));

        assert!(matches!(
            rp.id_token_claims(&token),
            Err(IdTokenRejection::IssuerMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_user_info_requires_endpoint() {
        let rp = RelyingParty::new(test_config()).unwrap();

        for token in ["", "any-token"] {
            let err = rp.user_info(token).await.unwrap_err();
            assert!(err.is_configuration_error());
            assert!(matches!(err, OidcError::MissingConfigField("userinfo_endpoint")));
        }
    }

    #[tokio::test]
    async fn test_fetch_jwks_requires_uri() {
        let rp = RelyingParty::new(test_config()).unwrap();
        assert!(matches!(
            rp.fetch_jwks().await,
            Err(OidcError::MissingConfigField("jwks_uri"))
        ));
    }

    #[tokio::test]
    async fn test_callback_rejects_state_mismatch_before_exchange() {
        // The token endpoint is unreachable; reaching it would yield token_error.
        let rp = RelyingParty::new(test_config()).unwrap();
        let result = rp
            .handle_callback("http://localhost:3000/callback?state=forged&code=valid")
            .await;
        assert_eq!(result.error_code(), Some(callback_errors::INVALID_STATE));

        let result = rp.handle_callback("/callback?code=valid").await;
        assert_eq!(result.error_code(), Some(callback_errors::INVALID_STATE));
    }

    #[tokio::test]
    async fn test_callback_missing_code() {
        let rp = RelyingParty::new(test_config()).unwrap();
        let result = rp
            .handle_callback(&format!("/callback?state={}", rp.state()))
            .await;

        assert_eq!(
            result,
            CallbackResult::Error {
                error: "invalid_response".to_string(),
                error_description: Some("Authorization code is missing".to_string()),
            }
        );
    }
}
