//! Admin Capability Tokens
//!
//! HS256 tokens gate admin commands at the server boundary, before
//! admission into the coordinator. When no secret is configured the
//! check is disabled and every admin frame is accepted, matching the
//! deployments this server replaced; see DESIGN.md.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::quiz::state::HOST_USER_ID;

/// Claims carried by an admin token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminClaims {
    /// Subject. Must be the reserved host identifier.
    pub sub: String,
    /// Expiry timestamp, Unix seconds.
    pub exp: u64,
}

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Admin frame arrived without a token while a secret is configured.
    #[error("missing admin token")]
    MissingToken,

    /// Token failed signature, format, or expiry validation.
    #[error("invalid admin token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    /// Token is valid but not issued to the host identity.
    #[error("token subject is not the host")]
    NotHost,

    /// Token issuing requested while auth is disabled.
    #[error("admin authentication not configured")]
    NotConfigured,
}

/// Validates admin capability tokens against an optional shared secret.
#[derive(Clone)]
pub struct AdminAuth {
    secret: Option<String>,
}

impl AdminAuth {
    /// Build from an optional secret. None disables the check.
    pub fn new(secret: Option<String>) -> Self {
        Self { secret }
    }

    /// An allow-all validator.
    pub fn disabled() -> Self {
        Self { secret: None }
    }

    /// Whether admin frames are actually being checked.
    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    /// Verify the token on an admin frame.
    pub fn verify(&self, token: Option<&str>) -> Result<(), AuthError> {
        let Some(secret) = &self.secret else {
            return Ok(());
        };
        let token = token.ok_or(AuthError::MissingToken)?;

        let data = decode::<AdminClaims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;

        if data.claims.sub != HOST_USER_ID {
            return Err(AuthError::NotHost);
        }
        Ok(())
    }

    /// Issue a host token valid for `ttl_secs`. Operator convenience.
    pub fn issue(&self, ttl_secs: u64) -> Result<String, AuthError> {
        let secret = self.secret.as_ref().ok_or(AuthError::NotConfigured)?;
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let claims = AdminClaims {
            sub: HOST_USER_ID.to_string(),
            exp: now + ttl_secs,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )?;
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_accepts_anything() {
        let auth = AdminAuth::disabled();
        assert!(!auth.is_enabled());
        assert!(auth.verify(None).is_ok());
        assert!(auth.verify(Some("garbage")).is_ok());
    }

    #[test]
    fn test_issue_and_verify_roundtrip() {
        let auth = AdminAuth::new(Some("test-secret".to_string()));
        let token = auth.issue(60).unwrap();
        assert!(auth.verify(Some(&token)).is_ok());
    }

    #[test]
    fn test_missing_token_rejected_when_enabled() {
        let auth = AdminAuth::new(Some("test-secret".to_string()));
        assert!(matches!(auth.verify(None), Err(AuthError::MissingToken)));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let issuer = AdminAuth::new(Some("secret-a".to_string()));
        let verifier = AdminAuth::new(Some("secret-b".to_string()));
        let token = issuer.issue(60).unwrap();
        assert!(matches!(
            verifier.verify(Some(&token)),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_non_host_subject_rejected() {
        let secret = "test-secret";
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let claims = AdminClaims {
            sub: "alice".to_string(),
            exp: now + 60,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap();

        let auth = AdminAuth::new(Some(secret.to_string()));
        assert!(matches!(auth.verify(Some(&token)), Err(AuthError::NotHost)));
    }

    #[test]
    fn test_issue_requires_secret() {
        let auth = AdminAuth::disabled();
        assert!(matches!(auth.issue(60), Err(AuthError::NotConfigured)));
    }
}
