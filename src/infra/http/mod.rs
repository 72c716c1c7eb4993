mod middleware;
mod public;

pub use middleware::REQUEST_ID_HEADER;
pub use public::{HttpState, build_router};

use axum::http::StatusCode;

use crate::application::{error::HttpError, repos::RepoError};

/// Translate a post-store failure into the response a save or render handler
/// returns.
pub fn repo_error_to_http(source: &'static str, err: RepoError) -> HttpError {
    let (status, public_message) = match &err {
        RepoError::NotFound => (StatusCode::NOT_FOUND, "Post not found"),
        RepoError::InvalidInput { .. } => (StatusCode::BAD_REQUEST, "Post rejected"),
        RepoError::Duplicate { .. } => (StatusCode::CONFLICT, "Post conflicts with existing data"),
        RepoError::Persistence(_) => (StatusCode::SERVICE_UNAVAILABLE, "Post store unavailable"),
    };
    HttpError::from_error(source, status, public_message, &err)
}

#[cfg(test)]
mod tests {
    use axum::response::IntoResponse;

    use super::*;
    use crate::application::error::ErrorReport;

    #[test]
    fn invalid_input_keeps_store_message_private() {
        let err = RepoError::InvalidInput {
            message: "title must not be empty".to_string(),
        };
        let response = repo_error_to_http("tests", err).into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let report = response
            .extensions()
            .get::<ErrorReport>()
            .expect("report attached");
        assert!(report.messages[0].contains("title must not be empty"));
    }

    #[test]
    fn persistence_failure_is_unavailable() {
        let err = RepoError::Persistence("disk full".to_string());
        assert_eq!(
            repo_error_to_http("tests", err).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
