use std::error::Error as StdError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{
    application::{cache::CacheError, metadata::MetadataSyncError, repos::RepoError},
    config::LoadError,
    infra::error::InfraError,
};

/// Private diagnostic carried on an error response until the logging
/// middleware takes it off.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages: Vec<String> = Vec::new();
        let mut current = Some(error);
        while let Some(err) = current {
            let message = err.to_string();
            // Wrapping errors often repeat their source verbatim.
            if messages.last() != Some(&message) {
                messages.push(message);
            }
            current = err.source();
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

/// Error response whose body is a fixed public message; details stay in the
/// attached [`ErrorReport`].
#[derive(Debug)]
pub struct HttpError {
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
        Self {
            public_message,
            report: ErrorReport::from_message(source, status, detail),
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        error: &dyn StdError,
    ) -> Self {
        Self {
            public_message,
            report: ErrorReport::from_error(source, status, error),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.report.status
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = (self.report.status, self.public_message).into_response();
        self.report.attach(&mut response);
        response
    }
}

/// Failure of a command-line run.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Metadata(#[from] MetadataSyncError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

/// `sysexits.h` codes used by [`AppError::exit_code`].
const EX_DATAERR: i32 = 65;
const EX_UNAVAILABLE: i32 = 69;
const EX_SOFTWARE: i32 = 70;
const EX_IOERR: i32 = 74;
const EX_CONFIG: i32 = 78;

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Process exit status for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Config(_) | AppError::Infra(InfraError::Configuration { .. }) => EX_CONFIG,
            AppError::Cache(CacheError::Fetch(_))
            | AppError::Metadata(MetadataSyncError::Fetch(_)) => EX_UNAVAILABLE,
            AppError::Cache(CacheError::Transform(_))
            | AppError::Metadata(MetadataSyncError::Parse(_))
            | AppError::Repo(RepoError::InvalidInput { .. } | RepoError::NotFound) => EX_DATAERR,
            AppError::Infra(InfraError::Io(_) | InfraError::Store { .. })
            | AppError::Cache(CacheError::Io(_))
            | AppError::Repo(RepoError::Persistence(_)) => EX_IOERR,
            _ => EX_SOFTWARE,
        }
    }
}
