use std::time::Duration;

use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use thiserror::Error;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;

use crate::auth::{claims::Claims, repo_types::UserId};
use crate::config::JwtConfig;

/// Sessions last seven days from issuance; the cookie Max-Age uses the same value.
pub const SESSION_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature is invalid")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
    #[error("token claims are invalid")]
    InvalidClaims,
    #[error("token could not be signed")]
    Signing,
}

/// Signs and verifies session tokens.
///
/// Only HMAC and the clock are involved, so the route guard and the API
/// extractors share this exact type without touching the database.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    ttl: Duration,
}

impl JwtKeys {
    pub fn new(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: SESSION_TTL,
        }
    }

    pub fn sign(&self, user_id: UserId) -> Result<String, TokenError> {
        self.sign_at(user_id, OffsetDateTime::now_utc())
    }

    /// Signs a token as if issued at `now`.
    pub fn sign_at(&self, user_id: UserId, now: OffsetDateTime) -> Result<String, TokenError> {
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.unix_timestamp().max(0) as usize,
            exp: exp.unix_timestamp().max(0) as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|_| TokenError::Signing)?;
        debug!(user_id, "jwt signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                ErrorKind::InvalidIssuer
                | ErrorKind::InvalidAudience
                | ErrorKind::InvalidSubject
                | ErrorKind::MissingRequiredClaim(_)
                | ErrorKind::ImmatureSignature => TokenError::InvalidClaims,
                _ => TokenError::Malformed,
            }
        })?;

        // jsonwebtoken only rejects `exp < now`; a session ends at its expiry second.
        let now = OffsetDateTime::now_utc().unix_timestamp().max(0) as usize;
        if data.claims.exp <= now {
            return Err(TokenError::Expired);
        }
        if data.claims.user_id().is_none() {
            return Err(TokenError::InvalidClaims);
        }
        debug!(sub = %data.claims.sub, "jwt verified");
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_keys(secret: &str, issuer: &str, audience: &str) -> JwtKeys {
        JwtKeys::new(&JwtConfig {
            secret: secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
        })
    }

    fn keys() -> JwtKeys {
        make_keys("dev-secret", "test-issuer", "test-aud")
    }

    #[test]
    fn sign_and_verify_session_token() {
        let keys = keys();
        let token = keys.sign(7).expect("sign");
        let claims = keys.verify(&token).expect("verify token");
        assert_eq!(claims.user_id(), Some(7));
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.exp - claims.iat, SESSION_TTL.as_secs() as usize);
    }

    #[test]
    fn token_still_valid_just_before_expiry() {
        let keys = keys();
        let issued = OffsetDateTime::now_utc() - TimeDuration::days(7) + TimeDuration::minutes(1);
        let token = keys.sign_at(1, issued).expect("sign");
        assert!(keys.verify(&token).is_ok());
    }

    #[test]
    fn token_rejected_after_expiry() {
        let keys = keys();
        let issued = OffsetDateTime::now_utc() - TimeDuration::days(7) - TimeDuration::seconds(5);
        let token = keys.sign_at(1, issued).expect("sign");
        assert_eq!(keys.verify(&token).unwrap_err(), TokenError::Expired);
    }

    #[test]
    fn token_rejected_at_expiry_instant() {
        let keys = keys();
        let ttl = TimeDuration::seconds(SESSION_TTL.as_secs() as i64);
        let issued = OffsetDateTime::now_utc() - ttl;
        let token = keys.sign_at(1, issued).expect("sign");
        assert_eq!(keys.verify(&token).unwrap_err(), TokenError::Expired);
    }

    #[test]
    fn spliced_signature_is_rejected() {
        let keys = keys();
        let mine = keys.sign(1).expect("sign");
        let theirs = keys.sign(2).expect("sign");
        let (my_body, _) = mine.rsplit_once('.').unwrap();
        let (_, their_sig) = theirs.rsplit_once('.').unwrap();
        let forged = format!("{my_body}.{their_sig}");
        assert_eq!(keys.verify(&forged).unwrap_err(), TokenError::InvalidSignature);
    }

    #[test]
    fn other_secret_is_rejected() {
        let token = make_keys("secret-a", "iss", "aud").sign(1).expect("sign");
        let err = make_keys("secret-b", "iss", "aud").verify(&token).unwrap_err();
        assert_eq!(err, TokenError::InvalidSignature);
    }

    #[test]
    fn verify_rejects_wrong_issuer_or_audience() {
        let good_keys = make_keys("same-secret", "good-iss", "good-aud");
        let bad_keys = make_keys("same-secret", "bad-iss", "bad-aud");
        let token = good_keys.sign(1).expect("sign");
        assert_eq!(bad_keys.verify(&token).unwrap_err(), TokenError::InvalidClaims);
    }

    #[test]
    fn garbage_and_unsigned_tokens_are_malformed() {
        let keys = keys();
        assert_eq!(keys.verify("").unwrap_err(), TokenError::Malformed);
        assert_eq!(keys.verify("not.a.jwt").unwrap_err(), TokenError::Malformed);

        // {"alg":"none","typ":"JWT"} with a valid-looking payload and no signature
        let token = keys.sign(1).expect("sign");
        let payload = token.split('.').nth(1).unwrap();
        let unsigned = format!("eyJhbGciOiJub25lIiwidHlwIjoiSldUIn0.{payload}.");
        assert!(keys.verify(&unsigned).is_err());
    }
}
