use axum::{Json, http::StatusCode, response::IntoResponse};
use latch_common::views::ApiErrorResponse;
use latch_db::storage::StoreError;
use latch_engine::EngineError;
use thiserror::Error;

const INTERNAL_MESSAGE: &str = "Something went wrong on our end. Please try again later.";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Engine(err) => match err {
                EngineError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                EngineError::NotFound => StatusCode::NOT_FOUND,
                EngineError::AlreadyUsed
                | EngineError::MachineAlreadyBound
                | EngineError::Conflict => StatusCode::CONFLICT,
                EngineError::Expired => StatusCode::GONE,
                EngineError::Storage(_) | EngineError::Malformed(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Engine(err) => match err {
                EngineError::InvalidRequest(_) => "InvalidRequest",
                EngineError::NotFound => "NotFound",
                EngineError::AlreadyUsed => "AlreadyUsed",
                EngineError::MachineAlreadyBound => "MachineAlreadyBound",
                EngineError::Conflict => "Conflict",
                EngineError::Expired => "Expired",
                EngineError::Storage(_) | EngineError::Malformed(_) => "InternalError",
            },
            Self::Storage(_) => "InternalError",
        }
    }
}

impl From<ApiError> for ApiErrorResponse {
    fn from(err: ApiError) -> Self {
        ApiErrorResponse {
            code: Some(err.code().into()),

            message: if err.status_code().is_server_error() {
                INTERNAL_MESSAGE.into()
            } else {
                err.to_string()
            },

            #[cfg(debug_assertions)]
            details: Some(err.to_string()),

            #[cfg(not(debug_assertions))]
            details: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status_code = self.status_code();
        if status_code.is_server_error() {
            tracing::error!("Error returned by handler: {self}");
        } else {
            tracing::debug!("Request rejected: {self}");
        }

        (status_code, Json(ApiErrorResponse::from(self))).into_response()
    }
}
