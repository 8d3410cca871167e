//! Provider key sets and ID token signature verification.

use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use reqwest::Client;
use reqwest::header::ACCEPT;
use tracing::{debug, error};
use url::Url;

use crate::error::{OidcError, OidcResult, status_text};
use crate::id_token::{ClaimExpectations, check_claims};
use crate::types::IdTokenClaims;

/// Fetch a JSON Web Key Set
pub async fn fetch_jwks(http: &Client, jwks_uri: Url) -> OidcResult<JwkSet> {
    let response = http
        .get(jwks_uri)
        .header(ACCEPT, "application/json")
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        error!("JWKS request failed with {}", status);
        return Err(OidcError::JwksRequest(status_text(status)));
    }

    let jwks: JwkSet = response
        .json()
        .await
        .map_err(|e| OidcError::JwksRequest(format!("invalid key set: {e}")))?;

    debug!("Fetched {} signing keys", jwks.keys.len());
    Ok(jwks)
}

pub(crate) fn verify_id_token(
    id_token: &str,
    jwks: &JwkSet,
    expected: &ClaimExpectations<'_>,
) -> OidcResult<IdTokenClaims> {
    let header = decode_header(id_token)?;

    // A key set only carries public keys; shared-secret algorithms cannot be verified against it.
    if matches!(
        header.alg,
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
    ) {
        return Err(OidcError::UnsupportedAlgorithm(format!("{:?}", header.alg)));
    }

    let jwk = match &header.kid {
        Some(kid) => jwks
            .find(kid)
            .ok_or_else(|| OidcError::KeyNotFound(kid.clone()))?,
        None if jwks.keys.len() == 1 => &jwks.keys[0],
        None => return Err(OidcError::KeyNotFound("token has no kid".to_string())),
    };

    let decoding_key = DecodingKey::from_jwk(jwk)?;

    let mut validation = Validation::new(header.alg);
    validation.set_audience(&[expected.client_id]);
    if let Some(issuer) = expected.issuer {
        validation.set_issuer(&[issuer]);
    }
    validation.leeway = 0;

    let claims = decode::<IdTokenClaims>(id_token, &decoding_key, &validation)?.claims;
    check_claims(&claims, expected)?;

    debug!("Verified ID token signature for subject {}", claims.sub);
    Ok(claims)
}
