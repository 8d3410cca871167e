//! Structural ID token validation.
//!
//! Validation here decodes the payload and checks its claims. It does **not**
//! verify the signature; the third segment of the token is ignored. Use
//! [`RelyingParty::verify_id_token`](crate::RelyingParty::verify_id_token)
//! with the provider's key set before trusting any claim for authorization
//! decisions.

use base64::Engine;
use base64::alphabet::URL_SAFE;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use chrono::Utc;
use thiserror::Error;

use crate::types::IdTokenClaims;

/// base64url that accepts both padded and unpadded segments
const SEGMENT_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Why an ID token was rejected
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IdTokenRejection {
    #[error("expected 3 dot-separated segments, found {0}")]
    Malformed(usize),

    #[error("payload is not valid base64url: {0}")]
    PayloadEncoding(String),

    #[error("payload is not a valid claim set: {0}")]
    PayloadFormat(String),

    #[error("token expired at {exp} (now {now})")]
    Expired { exp: f64, now: i64 },

    #[error("issuer claim is missing")]
    MissingIssuer,

    #[error("issuer {actual} does not match expected issuer {expected}")]
    IssuerMismatch { expected: String, actual: String },

    #[error("audience does not include client {0}")]
    AudienceMismatch(String),

    #[error("nonce does not match")]
    NonceMismatch,
}

/// Claim expectations for one engine instance
pub(crate) struct ClaimExpectations<'a> {
    pub client_id: &'a str,
    pub nonce: &'a str,
    pub issuer: Option<&'a str>,
}

/// Decode the payload segment without looking at the signature.
pub fn decode_unverified(id_token: &str) -> Result<IdTokenClaims, IdTokenRejection> {
    let segments: Vec<&str> = id_token.split('.').collect();
    if segments.len() != 3 {
        return Err(IdTokenRejection::Malformed(segments.len()));
    }

    let payload = SEGMENT_ENGINE
        .decode(segments[1])
        .map_err(|e| IdTokenRejection::PayloadEncoding(e.to_string()))?;

    serde_json::from_slice(&payload).map_err(|e| IdTokenRejection::PayloadFormat(e.to_string()))
}

/// Check expiry, issuer, audience and nonce, stopping at the first failure.
pub(crate) fn check_claims(
    claims: &IdTokenClaims,
    expected: &ClaimExpectations<'_>,
) -> Result<(), IdTokenRejection> {
    let now = Utc::now().timestamp();
    if claims.exp <= now as f64 {
        return Err(IdTokenRejection::Expired {
            exp: claims.exp,
            now,
        });
    }

    if claims.iss.is_empty() {
        return Err(IdTokenRejection::MissingIssuer);
    }

    if let Some(issuer) = expected.issuer {
        if claims.iss != issuer {
            return Err(IdTokenRejection::IssuerMismatch {
                expected: issuer.to_string(),
                actual: claims.iss.clone(),
            });
        }
    }

    if !claims.aud.contains(expected.client_id) {
        return Err(IdTokenRejection::AudienceMismatch(
            expected.client_id.to_string(),
        ));
    }

    // An absent nonce claim is accepted.
    if let Some(nonce) = &claims.nonce {
        if nonce != expected.nonce {
            return Err(IdTokenRejection::NonceMismatch);
        }
    }

    Ok(())
}
