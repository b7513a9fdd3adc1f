//! Token verifier — HS256 session credentials.
//!
//! A credential is accepted only if its signature validates under the
//! server secret, it is unexpired, and its embedded `userId` claim equals
//! the identity the connection claims out-of-band. Stateless.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::Config;
use crate::error::AuthError;
use crate::types::{Handshake, UserId};

/// Claims carried by a session credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default)]
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct TokenVerifier {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    issuer: Option<String>,
}

impl TokenVerifier {
    pub fn new(secret: &[u8], issuer: Option<String>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(iss) = &issuer {
            validation.set_issuer(&[iss.as_str()]);
        }
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            issuer,
        }
    }

    /// Build from config. Without a configured secret a random one is
    /// generated, so credentials do not survive a restart.
    pub fn from_config(config: &Config) -> Self {
        match &config.jwt_secret {
            Some(secret) => Self::new(secret.as_bytes(), config.jwt_issuer.clone()),
            None => {
                warn!("JWT_SECRET not set — using a random per-process secret");
                let secret: [u8; 32] = rand::thread_rng().gen();
                Self::new(&secret, config.jwt_issuer.clone())
            }
        }
    }

    /// Verify a handshake. Runs once per connection, before anything else.
    pub fn verify_handshake(&self, handshake: &Handshake) -> Result<UserId, AuthError> {
        self.verify(handshake.token.as_deref(), handshake.user_id.as_deref())
    }

    /// Check order: token present, identity present, signature + expiry,
    /// claim equals claimed identity.
    pub fn verify(&self, token: Option<&str>, claimed: Option<&str>) -> Result<UserId, AuthError> {
        let token = present(token).ok_or(AuthError::MissingCredential)?;
        let claimed = present(claimed).ok_or(AuthError::MissingIdentity)?;

        let claims = self.decode(token)?;
        if claims.user_id != claimed {
            return Err(AuthError::IdentityMismatch);
        }
        Ok(UserId::new(claims.user_id))
    }

    /// Verify a bearer credential where the token itself is the only
    /// source of identity (REST calls).
    pub fn verify_bearer(&self, token: Option<&str>) -> Result<UserId, AuthError> {
        let token = present(token).ok_or(AuthError::MissingCredential)?;
        let claims = self.decode(token)?;
        if claims.user_id.is_empty() {
            return Err(AuthError::MissingIdentity);
        }
        Ok(UserId::new(claims.user_id))
    }

    /// Issue a credential for `user_id`, valid for `ttl`.
    pub fn issue(
        &self,
        user_id: &UserId,
        email: Option<&str>,
        ttl: Duration,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            user_id: user_id.to_string(),
            email: email.map(str::to_owned),
            sub: Some(user_id.to_string()),
            iss: self.issuer.clone(),
            iat: now,
            exp: now + ttl.as_secs() as i64,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
    }

    fn decode(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| AuthError::InvalidSignature {
                expired: matches!(e.kind(), ErrorKind::ExpiredSignature),
            })
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
