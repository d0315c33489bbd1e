use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::validation::{FieldError, NON_FIELD_ERRORS, ValidationErrors};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    /// A path id that does not match a row of the named resource.
    #[error("{0} not Found")]
    NotFound(&'static str),

    /// A path segment that cannot be an id at all.
    #[error("Not Found")]
    BadPath,

    #[error("User credentials are not correct!")]
    AuthFailed,

    #[error("{0}")]
    Unauthenticated(&'static str),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Internal(anyhow::Error::new(err))
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(err: bcrypt::BcryptError) -> Self {
        Self::Internal(anyhow::Error::new(err))
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(anyhow::Error::new(err))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(ValidationErrors::single(
            NON_FIELD_ERRORS,
            FieldError::Malformed(rejection.body_text()),
        ))
    }
}

impl From<QueryRejection> for AppError {
    fn from(_: QueryRejection) -> Self {
        Self::Validation(ValidationErrors::single("page", FieldError::InvalidPage))
    }
}

impl From<PathRejection> for AppError {
    fn from(_: PathRejection) -> Self {
        Self::BadPath
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        match self {
            AppError::Validation(errors) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "errors": errors }))).into_response()
            },
            AppError::NotFound(_) | AppError::BadPath => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": message }))).into_response()
            },
            AppError::AuthFailed => {
                (StatusCode::UNAUTHORIZED, Json(json!({ "error": message }))).into_response()
            },
            AppError::Unauthenticated(_) => {
                let mut resp =
                    (StatusCode::UNAUTHORIZED, Json(json!({ "error": message }))).into_response();
                resp.headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Token"));
                resp
            },
            AppError::Internal(err) => {
                tracing::error!(error = %err, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "Internal server error" })))
                    .into_response()
            },
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
