//! HS256 token issuing and verification.

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use spadesk_core::{TenantId, UserId};

use crate::claims::{JwtClaims, TokenKind, TokenValidationError, validate_claims};
use crate::Role;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("failed to encode token: {0}")]
    Encode(String),

    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("expected {expected:?} token")]
    WrongKind { expected: TokenKind },

    #[error(transparent)]
    Window(#[from] TokenValidationError),
}

/// Registered-claim form of [`JwtClaims`] as it travels inside the JWT.
#[derive(Debug, Serialize, Deserialize)]
struct WireClaims {
    sub: UserId,
    tenant_id: TenantId,
    roles: Vec<Role>,
    sid: Uuid,
    kind: TokenKind,
    iat: i64,
    exp: i64,
}

impl From<&JwtClaims> for WireClaims {
    fn from(c: &JwtClaims) -> Self {
        Self {
            sub: c.sub,
            tenant_id: c.tenant_id,
            roles: c.roles.clone(),
            sid: c.session_id,
            kind: c.kind,
            iat: c.issued_at.timestamp(),
            exp: c.expires_at.timestamp(),
        }
    }
}

impl TryFrom<WireClaims> for JwtClaims {
    type Error = TokenError;

    fn try_from(w: WireClaims) -> Result<Self, Self::Error> {
        let ts = |secs: i64| -> Result<DateTime<Utc>, TokenError> {
            Utc.timestamp_opt(secs, 0)
                .single()
                .ok_or_else(|| TokenError::Invalid(format!("bad timestamp {secs}")))
        };
        Ok(Self {
            sub: w.sub,
            tenant_id: w.tenant_id,
            roles: w.roles,
            session_id: w.sid,
            kind: w.kind,
            issued_at: ts(w.iat)?,
            expires_at: ts(w.exp)?,
        })
    }
}

/// A freshly signed token with the claims it carries.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: JwtClaims,
}

/// Signs access and refresh tokens with a shared secret.
#[derive(Clone)]
pub struct JwtIssuer {
    key: EncodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtIssuer {
    pub fn new(secret: &[u8], access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            key: EncodingKey::from_secret(secret),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    pub fn issue(
        &self,
        kind: TokenKind,
        user_id: UserId,
        tenant_id: TenantId,
        roles: Vec<Role>,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        // JWT timestamps are whole seconds; truncate so decoded claims compare equal.
        let issued_at = Utc
            .timestamp_opt(now.timestamp(), 0)
            .single()
            .unwrap_or(now);
        let claims = JwtClaims {
            sub: user_id,
            tenant_id,
            roles,
            session_id,
            kind,
            issued_at,
            expires_at: issued_at + ttl,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &WireClaims::from(&claims),
            &self.key,
        )
        .map_err(|e| TokenError::Encode(e.to_string()))?;
        Ok(IssuedToken { token, claims })
    }
}

impl core::fmt::Debug for JwtIssuer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("JwtIssuer")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

/// Verifies signatures and decodes claims.
#[derive(Clone)]
pub struct JwtValidator {
    key: DecodingKey,
}

impl JwtValidator {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: DecodingKey::from_secret(secret),
        }
    }

    /// Decode `token`, check its signature, time window and kind.
    pub fn validate(
        &self,
        token: &str,
        expected: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<JwtClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // The window is checked against `now` below.
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let data = decode::<WireClaims>(token, &self.key, &validation)
            .map_err(|e| TokenError::Invalid(e.to_string()))?;
        let claims = JwtClaims::try_from(data.claims)?;
        validate_claims(&claims, now)?;
        if claims.kind != expected {
            return Err(TokenError::WrongKind { expected });
        }
        Ok(claims)
    }
}

impl core::fmt::Debug for JwtValidator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("JwtValidator").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> JwtIssuer {
        JwtIssuer::new(b"test-secret", Duration::hours(1), Duration::days(7))
    }

    #[test]
    fn access_token_round_trips() {
        let now = Utc::now();
        let user = UserId::new();
        let tenant = TenantId::new();
        let sid = Uuid::now_v7();
        let issued = issuer()
            .issue(TokenKind::Access, user, tenant, vec![Role::new("cashier")], sid, now)
            .unwrap();

        let claims = JwtValidator::new(b"test-secret")
            .validate(&issued.token, TokenKind::Access, now)
            .unwrap();

        assert_eq!(claims, issued.claims);
        assert_eq!(claims.session_id, sid);
        assert_eq!(claims.roles, vec![Role::new("cashier")]);
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let now = Utc::now();
        let issued = issuer()
            .issue(TokenKind::Refresh, UserId::new(), TenantId::new(), vec![], Uuid::now_v7(), now)
            .unwrap();

        let err = JwtValidator::new(b"test-secret")
            .validate(&issued.token, TokenKind::Access, now)
            .unwrap_err();
        assert!(matches!(err, TokenError::WrongKind { .. }));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let now = Utc::now();
        let issued = issuer()
            .issue(TokenKind::Access, UserId::new(), TenantId::new(), vec![], Uuid::now_v7(), now)
            .unwrap();

        let err = JwtValidator::new(b"other-secret")
            .validate(&issued.token, TokenKind::Access, now)
            .unwrap_err();
        assert!(matches!(err, TokenError::Invalid(_)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let then = Utc::now() - Duration::hours(2);
        let issued = issuer()
            .issue(TokenKind::Access, UserId::new(), TenantId::new(), vec![], Uuid::now_v7(), then)
            .unwrap();

        let err = JwtValidator::new(b"test-secret")
            .validate(&issued.token, TokenKind::Access, Utc::now())
            .unwrap_err();
        assert!(matches!(err, TokenError::Window(TokenValidationError::Expired)));
    }
}
