use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        cookie::{clear_session_cookie, session_cookie},
        dto::{LoginRequest, LoginResponse, MessageResponse, SignupRequest, UserResponse},
        extractors::{BearerSession, CookieSession},
        services::{authenticate, create_user, is_valid_email},
    },
    error::ApiError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/signup", post(signup))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload.map(|Json(b)| b).map_err(|e| {
        warn!(error = %e, "rejected request body");
        ApiError::validation("Invalid request body")
    })
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let payload = body(payload)?;
    let name = payload.name.trim();
    let email = payload.email.trim();

    if name.is_empty() || email.is_empty() || payload.password.trim().is_empty() {
        return Err(ApiError::validation("Name, email and password are required"));
    }
    if !is_valid_email(email) {
        warn!(email = %email, "invalid email");
        return Err(ApiError::validation("Invalid email"));
    }

    let user = create_user(state.users.as_ref(), name, email, &payload.password)
        .await
        .inspect_err(|e| warn!(email = %email, error = %e, "signup failed"))?;

    info!(user_id = user.id, email = %user.email, "user registered");
    Ok((StatusCode::CREATED, Json(UserResponse { user: user.into() })))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = body(payload)?;
    let email = payload.email.trim();

    if email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::validation("Email and password are required"));
    }

    let Some(user) = authenticate(state.users.as_ref(), email, &payload.password).await? else {
        warn!(email = %email, "login rejected");
        return Err(ApiError::InvalidCredentials);
    };

    let token = state
        .keys
        .sign(user.id)
        .map_err(|e| ApiError::Internal(e.into()))?;

    info!(user_id = user.id, email = %user.email, "user logged in");
    Ok((
        [(header::SET_COOKIE, session_cookie(&token))],
        Json(LoginResponse {
            message: "Login successful",
            user: user.into(),
            token,
        }),
    ))
}

/// Always succeeds; there is no server-side session to end.
#[instrument]
pub async fn logout() -> impl IntoResponse {
    (
        [(header::SET_COOKIE, clear_session_cookie())],
        Json(MessageResponse {
            message: "Logout successful",
        }),
    )
}

/// Accepts either a bearer token or the session cookie; the bearer header wins
/// when both carry a valid session.
#[instrument(skip_all)]
pub async fn me(
    State(state): State<AppState>,
    BearerSession(bearer): BearerSession,
    CookieSession(cookie): CookieSession,
) -> Result<Json<UserResponse>, ApiError> {
    let session = bearer.or(cookie).ok_or(ApiError::Unauthenticated)?;
    let user = state
        .users
        .find_by_id(session.user_id)
        .await?
        .ok_or_else(|| {
            warn!(user_id = session.user_id, "session for missing user");
            ApiError::Unauthenticated
        })?;
    Ok(Json(UserResponse { user: user.into() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::repo_types::User;
    use time::OffsetDateTime;

    #[test]
    fn user_response_never_contains_hash() {
        let user = User {
            id: 1,
            name: "Ann".into(),
            email: "ann@x.com".into(),
            password_hash: "$argon2id$v=19$secret-hash".into(),
            created_at: OffsetDateTime::now_utc(),
        };
        let json = serde_json::to_string(&UserResponse { user: user.into() }).unwrap();
        assert!(json.contains("ann@x.com"));
        assert!(json.contains("\"id\":1"));
        assert!(!json.contains("argon2"));
        assert!(!json.contains("password"));
    }
}
