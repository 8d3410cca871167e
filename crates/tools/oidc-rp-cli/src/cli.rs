use crate::error::ToolError;
use crate::settings::Settings;
use clap::{Parser, Subcommand};
use ras_identity_oidc::{RelyingParty, RelyingPartyConfig, discover};
use serde_json::{Value, json};
use std::path::PathBuf;
use tracing::info;

/// Drive an OpenID Connect provider from the command line
#[derive(Parser, Debug, Clone)]
#[command(name = "oidc-rp")]
#[command(about = "OpenID Connect relying party for the command line")]
#[command(version = "0.1.0")]
pub struct Args {
    /// Configuration file (TOML); defaults to $OIDC_CONFIG_FILE or ./oidc.toml
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print an authorization URL and the secrets to keep until the callback
    Authorize {
        /// Add a PKCE (S256) challenge, also enabled by `rp.use_pkce`
        #[arg(long)]
        pkce: bool,
    },

    /// Handle the URL the provider redirected back to
    Callback {
        /// Redirect URL, absolute or relative to the configured redirect_uri
        url: String,

        /// State printed by `authorize`
        #[arg(long)]
        state: String,

        /// Nonce printed by `authorize`
        #[arg(long)]
        nonce: String,

        /// PKCE verifier printed by `authorize --pkce`
        #[arg(long)]
        code_verifier: Option<String>,
    },

    /// Check an ID token's claims, and optionally its signature
    Validate {
        id_token: String,

        /// Nonce the token must carry, if it carries one
        #[arg(long)]
        nonce: Option<String>,

        /// Also verify the signature against the provider's jwks_uri
        #[arg(long)]
        verify: bool,
    },

    /// Fetch profile claims with an access token
    Userinfo { access_token: String },

    /// Exchange a refresh token for new tokens
    Refresh { refresh_token: String },

    /// Fetch a provider's discovery document
    Discover {
        /// Issuer URL; defaults to the configured expected_issuer
        issuer: Option<String>,
    },
}

impl Args {
    pub fn load_settings(&self) -> Result<Settings, ToolError> {
        Settings::load(self.config.as_deref())
    }

    /// Load settings and run the command, returning its JSON output.
    pub async fn run(&self) -> Result<Value, ToolError> {
        let settings = self.load_settings()?;
        self.execute(settings).await
    }

    pub async fn execute(&self, settings: Settings) -> Result<Value, ToolError> {
        let rp_config = settings.rp;

        match &self.command {
            Command::Authorize { pkce } => {
                let use_pkce = *pkce || rp_config.use_pkce;
                let rp = RelyingParty::new(rp_config.with_pkce(use_pkce))?;
                let url = rp.authorization_url();
                info!("Built authorization request for {}", rp.config().client_id);

                Ok(json!({
                    "authorization_url": url.as_str(),
                    "state": rp.state(),
                    "nonce": rp.nonce(),
                    "code_verifier": rp.secrets().code_verifier(),
                    "secure": rp.is_secure(),
                }))
            }
            Command::Callback {
                url,
                state,
                nonce,
                code_verifier,
            } => {
                let mut config = rp_config.with_secrets(state.as_str(), nonce.as_str());
                match code_verifier {
                    Some(verifier) => {
                        config.code_verifier = Some(verifier.clone());
                        config.use_pkce = true;
                    }
                    // A freshly generated verifier would never match the issued challenge
                    None if config.use_pkce && config.code_verifier.is_none() => {
                        return Err(ToolError::InvalidSetting(
                            "PKCE is enabled; pass the verifier printed by `authorize` with --code-verifier"
                                .to_string(),
                        ));
                    }
                    None => {}
                }

                let rp = RelyingParty::new(config)?;
                let result = rp.handle_callback(url).await;

                let id_token_valid = result
                    .token_response()
                    .and_then(|tokens| tokens.id_token.as_deref())
                    .map(|id_token| rp.validate_id_token(id_token));

                Ok(json!({
                    "result": result,
                    "id_token_valid": id_token_valid,
                }))
            }
            Command::Validate {
                id_token,
                nonce,
                verify,
            } => {
                let mut config = rp_config;
                config.nonce = nonce.clone();
                let rp = RelyingParty::new(config)?;

                let outcome = if *verify {
                    let jwks = rp.fetch_jwks().await?;
                    rp.verify_id_token(id_token, &jwks)
                        .map_err(|e| e.to_string())
                } else {
                    rp.id_token_claims(id_token).map_err(|e| e.to_string())
                };

                Ok(match outcome {
                    Ok(claims) => json!({
                        "valid": true,
                        "signature_verified": *verify,
                        "claims": claims,
                    }),
                    Err(reason) => json!({
                        "valid": false,
                        "reason": reason,
                    }),
                })
            }
            Command::Userinfo { access_token } => {
                let rp = RelyingParty::new(rp_config)?;
                Ok(serde_json::to_value(rp.user_info(access_token).await?)?)
            }
            Command::Refresh { refresh_token } => {
                let rp = RelyingParty::new(rp_config)?;
                Ok(serde_json::to_value(rp.refresh_token(refresh_token).await?)?)
            }
            Command::Discover { issuer } => {
                let issuer = issuer
                    .clone()
                    .or(rp_config.expected_issuer)
                    .ok_or_else(|| {
                        ToolError::InvalidSetting(
                            "an issuer argument or rp.expected_issuer is required".to_string(),
                        )
                    })?;

                let metadata = discover(&reqwest::Client::new(), &issuer).await?;
                let suggested = RelyingPartyConfig::from_metadata(
                    &metadata,
                    rp_config.client_id,
                    rp_config.redirect_uri,
                );

                Ok(json!({
                    "metadata": metadata,
                    "pkce_s256_supported": metadata.supports_pkce_s256(),
                    "rp": suggested,
                }))
            }
        }
    }
}

/// True when a callback command's output reports a failed flow.
pub fn is_failure(output: &Value) -> bool {
    output.pointer("/result/error").is_some()
}
