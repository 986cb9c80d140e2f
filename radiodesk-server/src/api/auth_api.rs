use crate::auth::{authenticate_user, jwt::create_token, LoginRequest, LoginResponse, UserInfo};
use crate::AppState;
use axum::{extract::State, http::StatusCode, Json};
use std::time::{Duration, SystemTime};

const MAX_LOGIN_ATTEMPTS: u32 = 5;
const LOGIN_WINDOW: Duration = Duration::from_secs(15 * 60);

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, StatusCode> {
    {
        let mut attempts = state.login_attempts.write().await;
        let entry = attempts
            .entry(payload.username.clone())
            .or_insert((0, SystemTime::now()));

        if entry.1.elapsed().unwrap_or(Duration::ZERO) > LOGIN_WINDOW {
            *entry = (0, SystemTime::now());
        }

        if entry.0 >= MAX_LOGIN_ATTEMPTS {
            tracing::warn!("Login rate limit exceeded for user: {}", payload.username);
            return Err(StatusCode::TOO_MANY_REQUESTS);
        }

        entry.0 += 1;
    }

    let mut conn = state
        .db
        .get()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let user = authenticate_user(&mut conn, &payload.username, &payload.password)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    state.login_attempts.write().await.remove(&payload.username);

    let token = create_token(
        user.id,
        &user.username,
        &user.role,
        &state.config.jwt.secret,
        state.config.jwt.expiration_hours,
    )
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    tracing::info!("User {} logged in", user.username);
    Ok(Json(LoginResponse {
        token,
        user: UserInfo {
            id: user.id,
            username: user.username,
            role: user.role,
        },
    }))
}

pub async fn logout() -> StatusCode {
    // Tokens are stateless; the client discards its copy.
    StatusCode::OK
}
