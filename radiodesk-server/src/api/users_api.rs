use crate::auth::hash_password;
use crate::models::{NewUser, User, ROLES, ROLE_ADMIN};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde::Deserialize;

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    pub role: String,
}

#[derive(Deserialize)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
}

fn known_role(candidate: &str) -> Result<(), StatusCode> {
    if ROLES.contains(&candidate) {
        Ok(())
    } else {
        Err(StatusCode::BAD_REQUEST)
    }
}

// Refuses to demote or delete the last remaining admin.
fn guard_last_admin(conn: &mut SqliteConnection, user_id: i32) -> Result<(), StatusCode> {
    use crate::schema::users::dsl::*;

    let target = users
        .filter(id.eq(user_id))
        .select(User::as_select())
        .first::<User>(conn)
        .optional()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    if let Some(target) = target {
        if target.is_admin() {
            let admin_count: i64 = users
                .filter(role.eq(ROLE_ADMIN))
                .count()
                .get_result(conn)
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
            if admin_count <= 1 {
                return Err(StatusCode::BAD_REQUEST);
            }
        }
    }
    Ok(())
}

pub async fn list_users(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<User>>, StatusCode> {
    if !user.is_admin() {
        return Err(StatusCode::FORBIDDEN);
    }
    use crate::schema::users::dsl::*;

    let mut conn = state
        .db
        .get()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let results = users
        .order(username.asc())
        .select(User::as_select())
        .load(&mut conn)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(results))
}

pub async fn create_user(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), StatusCode> {
    if !user.is_admin() {
        return Err(StatusCode::FORBIDDEN);
    }
    known_role(&req.role)?;
    if req.username.trim().is_empty() || req.password.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    use crate::schema::users;

    let mut conn = state
        .db
        .get()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let password_hash =
        hash_password(&req.password).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let new_user = NewUser {
        username: req.username.trim().to_string(),
        password_hash,
        role: req.role,
    };

    let created = diesel::insert_into(users::table)
        .values(&new_user)
        .returning(User::as_select())
        .get_result(&mut conn)
        .map_err(|e| match e {
            diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _,
            ) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        })?;

    tracing::info!("Created user {} with role {}", created.username, created.role);
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_user(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(user_id): Path<i32>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<User>, StatusCode> {
    if !user.is_admin() {
        return Err(StatusCode::FORBIDDEN);
    }
    use crate::schema::users::dsl::*;

    let mut conn = state
        .db
        .get()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    if let Some(new_role) = &req.role {
        known_role(new_role)?;
        if new_role != ROLE_ADMIN {
            guard_last_admin(&mut conn, user_id)?;
        }
    }

    let new_hash = req
        .password
        .as_deref()
        .map(hash_password)
        .transpose()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        if let Some(new_username) = &req.username {
            diesel::update(users.filter(id.eq(user_id)))
                .set(username.eq(new_username))
                .execute(conn)?;
        }
        if let Some(new_hash) = &new_hash {
            diesel::update(users.filter(id.eq(user_id)))
                .set(password_hash.eq(new_hash))
                .execute(conn)?;
        }
        if let Some(new_role) = &req.role {
            diesel::update(users.filter(id.eq(user_id)))
                .set(role.eq(new_role))
                .execute(conn)?;
        }
        diesel::update(users.filter(id.eq(user_id)))
            .set(updated_at.eq(chrono::Utc::now().naive_utc()))
            .execute(conn)?;
        Ok(())
    })
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let updated = users
        .filter(id.eq(user_id))
        .select(User::as_select())
        .first(&mut conn)
        .optional()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(updated))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(user_id): Path<i32>,
) -> Result<StatusCode, StatusCode> {
    if !user.is_admin() {
        return Err(StatusCode::FORBIDDEN);
    }
    use crate::schema::users::dsl::*;

    let mut conn = state
        .db
        .get()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    guard_last_admin(&mut conn, user_id)?;

    diesel::delete(users.filter(id.eq(user_id)))
        .execute(&mut conn)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(StatusCode::NO_CONTENT)
}
