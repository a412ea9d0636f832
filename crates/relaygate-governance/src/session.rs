use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session token invalid or expired: {0}")]
    Invalid(String),
}

/// Claims carried by the opaque signed session cookie (spec.md §4.G).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub user_id: String,
    pub email: String,
    pub role: String,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub team_ids: Vec<String>,
    #[serde(default)]
    pub org_id: Option<String>,
    #[serde(default)]
    pub end_user_id: Option<String>,
    #[serde(default)]
    pub sso_user_id: Option<String>,
    /// Unix timestamp; validated by `jsonwebtoken`'s default `exp` check.
    pub exp: i64,
}

/// Signs and verifies the session cookie with HS256. The same mechanism is
/// reused for the short-lived OIDC `state` cookie (`PkceState`) below.
pub struct SessionCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl SessionCodec {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    pub fn sign(&self, claims: &SessionClaims) -> Result<String, SessionError> {
        encode(&Header::default(), claims, &self.encoding_key)
            .map_err(|e| SessionError::Invalid(e.to_string()))
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaims, SessionError> {
        decode::<SessionClaims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| SessionError::Invalid(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_session_claims() {
        let codec = SessionCodec::new(b"test-secret-test-secret-32bytes!");
        let claims = SessionClaims {
            user_id: "u1".into(),
            email: "a@example.com".into(),
            role: "member".into(),
            team_id: Some("t1".into()),
            team_ids: vec!["t1".into()],
            org_id: None,
            end_user_id: None,
            sso_user_id: None,
            exp: time::OffsetDateTime::now_utc().unix_timestamp() + 3600,
        };
        let token = codec.sign(&claims).unwrap();
        let decoded = codec.verify(&token).unwrap();
        assert_eq!(decoded.user_id, "u1");
    }

    #[test]
    fn rejects_expired_session() {
        let codec = SessionCodec::new(b"test-secret-test-secret-32bytes!");
        let claims = SessionClaims {
            user_id: "u1".into(),
            email: "a@example.com".into(),
            role: "member".into(),
            team_id: None,
            team_ids: vec![],
            org_id: None,
            end_user_id: None,
            sso_user_id: None,
            exp: time::OffsetDateTime::now_utc().unix_timestamp() - 10,
        };
        let token = codec.sign(&claims).unwrap();
        assert!(codec.verify(&token).is_err());
    }
}
