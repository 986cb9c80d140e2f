use super::conflict::Conflict;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("{0}")]
    Validation(String),

    #[error("schedule conflict with {0}")]
    Conflict(Conflict),

    #[error("{0} not found")]
    NotFound(String),

    #[error("corrupt schedule row {id}: {reason}")]
    CorruptRow { id: String, reason: String },

    #[error("storage error: {0}")]
    Storage(#[from] diesel::result::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
}

impl ScheduleError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ScheduleError::Validation(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ScheduleError::Validation(_) => StatusCode::BAD_REQUEST,
            ScheduleError::Conflict(_) => StatusCode::CONFLICT,
            ScheduleError::NotFound(_) => StatusCode::NOT_FOUND,
            ScheduleError::CorruptRow { .. }
            | ScheduleError::Storage(_)
            | ScheduleError::Pool(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ScheduleError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            ScheduleError::Conflict(conflict) => json!({
                "error": self.to_string(),
                "conflict": conflict,
            }),
            ScheduleError::Validation(_) | ScheduleError::NotFound(_) => {
                json!({ "error": self.to_string() })
            }
            _ => {
                tracing::error!("Schedule storage failure: {}", self);
                json!({ "error": "internal storage error" })
            }
        };
        (status, Json(body)).into_response()
    }
}
