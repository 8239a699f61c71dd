use hyper::StatusCode;

use crate::domain::person::PersonError;

/// Failure of a request. Rendered as its status code alone, without a body.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<PersonError> for ApiError {
    fn from(value: PersonError) -> Self {
        match value {
            PersonError::BadRequest(reason) => ApiError::BadRequest(reason.to_string()),
            e @ PersonError::NotFound(_) => ApiError::NotFound(e.to_string()),
            PersonError::Storage(e) => ApiError::Internal(e.to_string()),
        }
    }
}
