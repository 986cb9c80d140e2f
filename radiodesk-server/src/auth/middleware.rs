use crate::auth::jwt::verify_token;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

/// Resolves the bearer token to a [`User`](crate::models::User) and attaches
/// it, with the decoded claims, to the request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    use crate::models::User;
    use crate::schema::users::dsl::*;
    use diesel::prelude::*;

    let token = headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let claims =
        verify_token(token, &state.config.jwt.secret).map_err(|_| StatusCode::UNAUTHORIZED)?;

    let mut conn = match state.db.get() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Auth Middleware - Failed to get DB connection: {}", e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let user = match users
        .filter(id.eq(claims.user_id))
        .select(User::as_select())
        .first::<User>(&mut conn)
    {
        Ok(u) => u,
        Err(e) => {
            tracing::warn!(
                "Auth Middleware - Token for unknown user {}: {}",
                claims.user_id,
                e
            );
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    request.extensions_mut().insert(claims);
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}
