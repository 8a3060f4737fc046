use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use boardcp_core::{RoleId, UserId};

use crate::Principal;

/// JWT claims model.
///
/// The minimal set of claims the control panel expects once a token has been
/// decoded and its signature verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject / user identifier.
    pub sub: UserId,

    /// Roles held by the user (site-wide and board roles alike).
    pub roles: Vec<RoleId>,

    /// Issued-at timestamp.
    pub issued_at: DateTime<Utc>,

    /// Expiration timestamp.
    pub expires_at: DateTime<Utc>,
}

impl JwtClaims {
    pub fn principal(&self) -> Principal {
        Principal::new(self.sub, self.roles.clone())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,

    #[error("malformed or unsigned token: {0}")]
    Malformed(String),
}

/// Deterministically validate JWT claims.
///
/// Validates the *claims* only; signature verification happens in a
/// [`JwtValidator`].
pub fn validate_claims(claims: &JwtClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claims.expires_at <= claims.issued_at {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < claims.issued_at {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.expires_at {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

/// Verifies a bearer token and returns its validated claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError>;
}

/// HS256 shared-secret validator.
pub struct Hs256JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl Hs256JwtValidator {
    pub fn new(secret: Vec<u8>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Time claims are RFC 3339 fields checked by `validate_claims`.
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        Self {
            key: DecodingKey::from_secret(&secret),
            validation,
        }
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError> {
        let data = jsonwebtoken::decode::<JwtClaims>(token, &self.key, &self.validation)
            .map_err(|e| TokenValidationError::Malformed(e.to_string()))?;
        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Duration;
    use jsonwebtoken::{EncodingKey, Header};

    fn claims(now: DateTime<Utc>) -> JwtClaims {
        JwtClaims {
            sub: UserId::new(),
            roles: vec![RoleId::new()],
            issued_at: now,
            expires_at: now + Duration::minutes(10),
        }
    }

    fn sign(claims: &JwtClaims, secret: &str) -> String {
        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn time_window_checks() {
        let now = Utc::now();
        let c = claims(now);

        assert_eq!(validate_claims(&c, now), Ok(()));
        assert_eq!(
            validate_claims(&c, now - Duration::seconds(1)),
            Err(TokenValidationError::NotYetValid)
        );
        assert_eq!(
            validate_claims(&c, now + Duration::minutes(10)),
            Err(TokenValidationError::Expired)
        );

        let inverted = JwtClaims {
            expires_at: now,
            ..c
        };
        assert_eq!(
            validate_claims(&inverted, now),
            Err(TokenValidationError::InvalidTimeWindow)
        );
    }

    #[test]
    fn hs256_round_trip_yields_principal() {
        let now = Utc::now();
        let c = claims(now);
        let validator = Hs256JwtValidator::new(b"secret".to_vec());

        let decoded = validator.validate(&sign(&c, "secret"), now).unwrap();

        assert_eq!(decoded, c);
        assert_eq!(decoded.principal().roles, c.roles);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let now = Utc::now();
        let validator = Hs256JwtValidator::new(b"secret".to_vec());

        let err = validator.validate(&sign(&claims(now), "other"), now).unwrap_err();

        assert!(matches!(err, TokenValidationError::Malformed(_)));
    }
}
