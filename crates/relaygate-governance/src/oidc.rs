use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use relaygate_common::OidcConfig;

#[derive(Debug, thiserror::Error)]
pub enum OidcError {
    #[error("state mismatch")]
    StateMismatch,
    #[error("nonce mismatch")]
    NonceMismatch,
    #[error("id token invalid: {0}")]
    InvalidIdToken(String),
    #[error("email domain {0} is not allowed")]
    DisallowedDomain(String),
}

/// The values the login endpoint must stash (in a short-lived signed state
/// cookie) between redirecting to the issuer and handling the callback
/// (spec.md §4.G).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PkceState {
    pub state: String,
    pub nonce: String,
    pub code_verifier: String,
}

impl PkceState {
    pub fn generate() -> Self {
        Self {
            state: random_url_safe_token(),
            nonce: random_url_safe_token(),
            code_verifier: random_url_safe_token(),
        }
    }

    /// `code_challenge = base64url(sha256(code_verifier))`, S256 only.
    pub fn code_challenge(&self) -> String {
        let digest = Sha256::digest(self.code_verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(digest)
    }
}

fn random_url_safe_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn authorize_url(config: &OidcConfig, pkce: &PkceState) -> String {
    let issuer = config.issuer_url.trim_end_matches('/');
    format!(
        "{issuer}/authorize?response_type=code&client_id={client_id}&redirect_uri={redirect_uri}&scope=openid%20email%20profile&state={state}&nonce={nonce}&code_challenge={challenge}&code_challenge_method=S256",
        client_id = urlencoding::encode(&config.client_id),
        redirect_uri = urlencoding::encode(&config.redirect_url),
        state = pkce.state,
        nonce = pkce.nonce,
        challenge = pkce.code_challenge(),
    )
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdTokenClaims {
    pub aud: String,
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub nonce: Option<String>,
    pub exp: i64,
}

/// Verifies the ID token's signature and standard claims (`aud`, `exp`) and
/// the request-scoped `nonce` / `allowed_email_domain` checks from
/// spec.md §4.G. The issuer's signing key is resolved by the caller (JWKS
/// fetch/caching is out of this workspace's scope — see DESIGN.md).
pub fn verify_id_token(
    id_token: &str,
    decoding_key: &DecodingKey,
    algorithm: Algorithm,
    config: &OidcConfig,
    expected_nonce: &str,
) -> Result<IdTokenClaims, OidcError> {
    let mut validation = Validation::new(algorithm);
    validation.set_audience(&[&config.client_id]);

    let claims = decode::<IdTokenClaims>(id_token, decoding_key, &validation)
        .map_err(|e| OidcError::InvalidIdToken(e.to_string()))?
        .claims;

    if claims.nonce.as_deref() != Some(expected_nonce) {
        return Err(OidcError::NonceMismatch);
    }

    if let Some(allowed_domain) = &config.allowed_email_domain {
        let email = claims.email.as_deref().unwrap_or("");
        let domain = email.rsplit_once('@').map(|(_, d)| d).unwrap_or("");
        if !domain.eq_ignore_ascii_case(allowed_domain) {
            return Err(OidcError::DisallowedDomain(domain.to_string()));
        }
    }

    Ok(claims)
}

pub fn check_state(expected: &str, received: &str) -> Result<(), OidcError> {
    if expected == received {
        Ok(())
    } else {
        Err(OidcError::StateMismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_challenge_is_sha256_of_verifier() {
        let pkce = PkceState::generate();
        let expected = URL_SAFE_NO_PAD.encode(Sha256::digest(pkce.code_verifier.as_bytes()));
        assert_eq!(pkce.code_challenge(), expected);
    }

    #[test]
    fn state_check_rejects_mismatch() {
        assert!(check_state("a", "b").is_err());
        assert!(check_state("a", "a").is_ok());
    }
}
