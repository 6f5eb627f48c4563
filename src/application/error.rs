use std::error::Error as StdError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{domain::error::PackageError, infra::error::InfraError};

/// Full error chain attached to a response for the logging middleware.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Handler error: a terse public message plus the detailed report.
#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    public_message: &'static str,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        let report = ErrorReport::from_message(source, status, detail);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        error: &dyn StdError,
    ) -> Self {
        let report = ErrorReport::from_error(source, status, error);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn not_found(source: &'static str, detail: impl Into<String>) -> Self {
        Self::new(source, StatusCode::NOT_FOUND, "Package not found", detail)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.public_message).into_response();
        self.report.attach(&mut response);
        response
    }
}

impl From<PackageError> for HttpError {
    fn from(error: PackageError) -> Self {
        const SOURCE: &str = "infra::http::package_error_to_http_error";
        match &error {
            error if error.is_format() => HttpError::from_error(
                SOURCE,
                StatusCode::BAD_REQUEST,
                "Upload must be a .zip archive",
                error,
            ),
            PackageError::Archive(_) => HttpError::from_error(
                SOURCE,
                StatusCode::BAD_REQUEST,
                "Upload is not a readable zip archive",
                &error,
            ),
            error if error.is_existence() => {
                HttpError::from_error(SOURCE, StatusCode::NOT_FOUND, "Package not found", error)
            }
            _ => HttpError::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                &error,
            ),
        }
    }
}

/// Process-level failure reported by `main` before exiting.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Package(#[from] PackageError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("execution interrupted")]
    Interrupted,
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Interrupted => 2,
            _ => 1,
        }
    }
}
