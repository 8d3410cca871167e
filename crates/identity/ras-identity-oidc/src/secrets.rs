//! Flow secrets: anti-CSRF state, replay nonce and PKCE verifier.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

use crate::config::RelyingPartyConfig;
use crate::error::{OidcError, OidcResult};

/// Number of random bytes behind each generated secret
const SECRET_BYTES: usize = 32;

/// Where the flow secrets of an engine came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretSource {
    /// Generated from the operating system CSPRNG
    OsRng,
    /// Supplied by the caller through configuration
    CallerSupplied,
    /// Generated from a time-seeded PRNG because the OS source failed.
    /// Values are predictable and must not be trusted for CSRF or replay protection.
    InsecureFallback,
}

/// PKCE code challenge and verifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkceChallenge {
    pub code_verifier: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
}

impl PkceChallenge {
    pub fn from_verifier(code_verifier: String) -> Self {
        let code_challenge = Self::generate_code_challenge(&code_verifier);

        Self {
            code_verifier,
            code_challenge,
            code_challenge_method: "S256".to_string(),
        }
    }

    fn generate_code_challenge(verifier: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }
}

/// Secrets bound to a single authorization attempt.
///
/// They are fixed for the lifetime of the engine that owns them. Callers that
/// complete the flow in another process persist `state`, `nonce` and
/// `code_verifier` and pass them back through [`RelyingPartyConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowSecrets {
    pub state: String,
    pub nonce: String,
    pub pkce: Option<PkceChallenge>,
    pub source: SecretSource,
}

impl FlowSecrets {
    /// Resolve the secrets for a configuration, generating whatever the caller
    /// did not supply.
    pub fn resolve(config: &RelyingPartyConfig) -> OidcResult<Self> {
        Self::resolve_with(config, &mut OsRng)
    }

    pub(crate) fn resolve_with(
        config: &RelyingPartyConfig,
        rng: &mut dyn RngCore,
    ) -> OidcResult<Self> {
        let mut generator = SecretGenerator::new(rng, config.allow_insecure_randomness);

        let state = supplied_or_generated("state", &config.state, &mut generator)?;
        let nonce = supplied_or_generated("nonce", &config.nonce, &mut generator)?;
        let pkce = if config.use_pkce {
            let verifier =
                supplied_or_generated("code_verifier", &config.code_verifier, &mut generator)?;
            Some(PkceChallenge::from_verifier(verifier))
        } else {
            None
        };

        let source = if generator.degraded {
            SecretSource::InsecureFallback
        } else if generator.generated {
            SecretSource::OsRng
        } else {
            SecretSource::CallerSupplied
        };

        Ok(Self {
            state,
            nonce,
            pkce,
            source,
        })
    }

    pub fn code_verifier(&self) -> Option<&str> {
        self.pkce.as_ref().map(|p| p.code_verifier.as_str())
    }

    pub fn is_secure(&self) -> bool {
        self.source != SecretSource::InsecureFallback
    }
}

fn supplied_or_generated(
    field: &str,
    supplied: &Option<String>,
    generator: &mut SecretGenerator<'_>,
) -> OidcResult<String> {
    match supplied {
        Some(value) if value.is_empty() => Err(OidcError::ConfigError(format!(
            "supplied {field} must not be empty"
        ))),
        Some(value) => Ok(value.clone()),
        None => generator.next_secret(),
    }
}

struct SecretGenerator<'a> {
    rng: &'a mut dyn RngCore,
    allow_insecure: bool,
    fallback: Option<StdRng>,
    generated: bool,
    degraded: bool,
}

impl<'a> SecretGenerator<'a> {
    fn new(rng: &'a mut dyn RngCore, allow_insecure: bool) -> Self {
        Self {
            rng,
            allow_insecure,
            fallback: None,
            generated: false,
            degraded: false,
        }
    }

    fn next_secret(&mut self) -> OidcResult<String> {
        let mut bytes = [0u8; SECRET_BYTES];

        if let Err(err) = self.rng.try_fill_bytes(&mut bytes) {
            if !self.allow_insecure {
                return Err(OidcError::InsecureRandomness(err.to_string()));
            }

            if !self.degraded {
                warn!(
                    "OS random source failed ({}); using insecure fallback generator",
                    err
                );
                self.degraded = true;
            }

            self.fallback
                .get_or_insert_with(|| StdRng::seed_from_u64(fallback_seed()))
                .fill_bytes(&mut bytes);
        }

        self.generated = true;
        Ok(URL_SAFE_NO_PAD.encode(bytes))
    }
}

fn fallback_seed() -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();
    nanos ^ (u64::from(std::process::id()) << 32)
}
