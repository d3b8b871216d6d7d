//! Caller Authentication
//!
//! A connection acts as one account, named by the `sub` of a JWT from an
//! external identity provider. The authority never issues tokens. A token
//! may also claim a `role`; resolver and arbiter roles are only honoured
//! when the account is registered for them in the resolution engine.

use std::collections::HashSet;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Sha256, Digest};
use thiserror::Error;

use crate::core::account::AccountId;
use crate::protocol::resolution::ResolutionEngine;

/// Clock skew tolerated on `exp`, in seconds.
const EXPIRY_LEEWAY_SECS: u64 = 30;

/// Token verification settings.
#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    /// Required `iss`, if any.
    pub issuer: Option<String>,
    /// Required `aud`, if any.
    pub audience: Option<String>,
    /// RS256 public key in PEM format. Takes precedence over `secret`.
    pub public_key_pem: Option<String>,
    /// HS256 shared secret.
    pub secret: Option<String>,
}

impl AuthConfig {
    /// Read `AUTH_ISSUER`, `AUTH_AUDIENCE`, `AUTH_PUBLIC_KEY_PEM` and `AUTH_SECRET`.
    pub fn from_env() -> Self {
        Self {
            issuer: std::env::var("AUTH_ISSUER").ok(),
            audience: std::env::var("AUTH_AUDIENCE").ok(),
            public_key_pem: std::env::var("AUTH_PUBLIC_KEY_PEM").ok(),
            secret: std::env::var("AUTH_SECRET").ok(),
        }
    }

    /// Whether any verification key is set.
    pub fn is_configured(&self) -> bool {
        self.public_key_pem.is_some() || self.secret.is_some()
    }

    fn key(&self) -> Result<(Algorithm, DecodingKey), AuthError> {
        match (&self.public_key_pem, &self.secret) {
            (Some(pem), _) => DecodingKey::from_rsa_pem(pem.as_bytes())
                .map(|key| (Algorithm::RS256, key))
                .map_err(|e| AuthError::DecodeError(format!("invalid public key: {}", e))),
            (None, Some(secret)) => Ok((Algorithm::HS256, DecodingKey::from_secret(secret.as_bytes()))),
            (None, None) => Err(AuthError::NotConfigured),
        }
    }

    fn validation(&self, algorithm: Algorithm) -> Validation {
        let mut validation = Validation::new(algorithm);
        validation.required_spec_claims = HashSet::from(["exp".to_string(), "sub".to_string()]);
        validation.leeway = EXPIRY_LEEWAY_SECS;
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        validation
    }
}

/// What a token says the caller does.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallerRole {
    /// Posts claims, wagers and collects payouts.
    #[default]
    Bettor,
    /// Submits AI verdicts.
    Resolver,
    /// Submits human verdicts.
    Arbiter,
}

impl CallerRole {
    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            CallerRole::Bettor => "bettor",
            CallerRole::Resolver => "resolver",
            CallerRole::Arbiter => "arbiter",
        }
    }
}

impl std::fmt::Display for CallerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Claims read from a caller token. Registered claims other than
/// `sub` and `exp` are checked by validation and not kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Identity-provider subject.
    pub sub: String,
    /// Expiry, unix seconds.
    pub exp: u64,
    /// Claimed role; bettor when absent.
    #[serde(default)]
    pub role: CallerRole,
}

/// An authenticated caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Caller {
    /// Account every submission is attributed to.
    pub account: AccountId,
    /// Role the token claimed.
    pub role: CallerRole,
}

impl Caller {
    /// Refuse a resolver or arbiter role the engine does not grant.
    pub fn check_role(&self, engine: &ResolutionEngine) -> Result<(), AuthError> {
        let granted = match self.role {
            CallerRole::Bettor => true,
            CallerRole::Resolver => engine.is_resolver(&self.account),
            CallerRole::Arbiter => engine.is_arbiter(&self.account),
        };
        if granted {
            Ok(())
        } else {
            Err(AuthError::RoleNotGranted(self.role))
        }
    }
}

/// Map an identity-provider subject to its account id.
pub fn account_for_subject(sub: &str) -> AccountId {
    let mut hasher = Sha256::new();
    hasher.update(b"claim-wager-account:");
    hasher.update(sub.as_bytes());
    AccountId::new(hasher.finalize().into())
}

/// Why a token was refused.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No verification key configured.
    #[error("authentication not configured")]
    NotConfigured,
    /// Not a JWT.
    #[error("invalid token format")]
    InvalidFormat,
    /// Signature does not verify.
    #[error("invalid signature")]
    InvalidSignature,
    /// Past `exp`.
    #[error("token expired")]
    Expired,
    /// Wrong `iss`.
    #[error("invalid issuer")]
    InvalidIssuer,
    /// Wrong `aud`.
    #[error("invalid audience")]
    InvalidAudience,
    /// A required claim is absent or empty.
    #[error("missing required claim: {0}")]
    MissingClaim(String),
    /// Token claims a role the account is not registered for.
    #[error("account is not a registered {0}")]
    RoleNotGranted(CallerRole),
    /// Anything else the JWT library refused.
    #[error("decode error: {0}")]
    DecodeError(String),
}

/// Verify `token` and resolve the caller it names.
pub fn validate_token(token: &str, config: &AuthConfig) -> Result<Caller, AuthError> {
    let (algorithm, key) = config.key()?;
    let claims = decode::<TokenClaims>(token, &key, &config.validation(algorithm))
        .map_err(map_jwt_error)?
        .claims;

    if claims.sub.trim().is_empty() {
        return Err(AuthError::MissingClaim("sub".into()));
    }

    Ok(Caller {
        account: account_for_subject(&claims.sub),
        role: claims.role,
    })
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    use jsonwebtoken::errors::ErrorKind;
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
        ErrorKind::InvalidAudience => AuthError::InvalidAudience,
        ErrorKind::MissingRequiredClaim(claim) => AuthError::MissingClaim(claim.clone()),
        ErrorKind::InvalidToken | ErrorKind::Base64(_) => AuthError::InvalidFormat,
        _ => AuthError::DecodeError(err.to_string()),
    }
}

// =============================================================================
// TESTS
// =============================================================================
