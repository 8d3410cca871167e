//! OpenID provider discovery.

use reqwest::Client;
use reqwest::header::ACCEPT;
use tracing::{debug, error};

use crate::error::{OidcError, OidcResult, status_text};
use crate::types::ProviderMetadata;

const WELL_KNOWN_PATH: &str = "/.well-known/openid-configuration";

pub fn discovery_url(issuer: &str) -> String {
    format!("{}{}", issuer.trim_end_matches('/'), WELL_KNOWN_PATH)
}

/// Fetch the discovery document for `issuer`.
///
/// The document's `issuer` must match the requested one; a trailing slash
/// difference is tolerated.
pub async fn discover(http: &Client, issuer: &str) -> OidcResult<ProviderMetadata> {
    let url = discovery_url(issuer);

    let response = http
        .get(&url)
        .header(ACCEPT, "application/json")
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        error!("Discovery request to {} failed with {}", url, status);
        return Err(OidcError::DiscoveryRequest(status_text(status)));
    }

    let metadata: ProviderMetadata = response
        .json()
        .await
        .map_err(|e| OidcError::DiscoveryRequest(format!("invalid discovery document: {e}")))?;

    if metadata.issuer.trim_end_matches('/') != issuer.trim_end_matches('/') {
        return Err(OidcError::IssuerMismatch {
            expected: issuer.to_string(),
            actual: metadata.issuer,
        });
    }

    debug!("Discovered provider metadata for {}", metadata.issuer);
    Ok(metadata)
}
