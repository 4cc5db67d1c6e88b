use std::convert::Infallible;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use tracing::debug;

use super::{cookie::get_cookie, cookie::SESSION_COOKIE_NAME, jwt::JwtKeys, repo_types::UserId};

/// Identity resolved from a verified token.
///
/// Only the user ID is known at this point; handlers that need the name or email
/// load the record from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionUser {
    pub user_id: UserId,
}

/// Session from `Authorization: Bearer <token>`. `None` when the header is
/// missing, uses another scheme, or carries an invalid token.
pub struct BearerSession(pub Option<SessionUser>);

/// Session from the `token` cookie. `None` when the cookie is missing or invalid.
pub struct CookieSession(pub Option<SessionUser>);

fn resolve(keys: &JwtKeys, token: &str, source: &'static str) -> Option<SessionUser> {
    match keys.verify(token) {
        Ok(claims) => claims.user_id().map(|user_id| SessionUser { user_id }),
        Err(e) => {
            debug!(source, error = %e, "session token rejected");
            None
        }
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let auth = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())?;
    auth.strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for BearerSession
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        Ok(Self(bearer_token(parts).and_then(|t| resolve(&keys, t, "bearer"))))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CookieSession
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let session = get_cookie(&parts.headers, SESSION_COOKIE_NAME)
            .and_then(|t| resolve(&keys, t, "cookie"));
        Ok(Self(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;
    use axum::http::Request;

    fn keys() -> JwtKeys {
        JwtKeys::new(&JwtConfig {
            secret: "extractor-secret".into(),
            issuer: "iss".into(),
            audience: "aud".into(),
        })
    }

    fn parts(name: header::HeaderName, value: &str) -> Parts {
        let (parts, _) = Request::builder()
            .header(name, value)
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    #[tokio::test]
    async fn bearer_resolves_valid_token() {
        let keys = keys();
        let token = keys.sign(5).unwrap();
        let mut p = parts(header::AUTHORIZATION, &format!("Bearer {token}"));
        let BearerSession(s) = BearerSession::from_request_parts(&mut p, &keys).await.unwrap();
        assert_eq!(s, Some(SessionUser { user_id: 5 }));
    }

    #[tokio::test]
    async fn bearer_ignores_cookie() {
        let keys = keys();
        let token = keys.sign(5).unwrap();
        let mut p = parts(header::COOKIE, &format!("token={token}"));
        let BearerSession(s) = BearerSession::from_request_parts(&mut p, &keys).await.unwrap();
        assert_eq!(s, None);
    }

    #[tokio::test]
    async fn cookie_resolves_valid_token_and_rejects_invalid() {
        let keys = keys();
        let token = keys.sign(9).unwrap();
        let mut p = parts(header::COOKIE, &format!("a=b; token={token}"));
        let CookieSession(s) = CookieSession::from_request_parts(&mut p, &keys).await.unwrap();
        assert_eq!(s, Some(SessionUser { user_id: 9 }));

        let mut p = parts(header::COOKIE, "token=garbage");
        let CookieSession(s) = CookieSession::from_request_parts(&mut p, &keys).await.unwrap();
        assert_eq!(s, None);
    }

    #[tokio::test]
    async fn non_bearer_scheme_is_anonymous() {
        let keys = keys();
        let mut p = parts(header::AUTHORIZATION, "Basic dXNlcjpwYXNz");
        let BearerSession(s) = BearerSession::from_request_parts(&mut p, &keys).await.unwrap();
        assert_eq!(s, None);
    }
}
