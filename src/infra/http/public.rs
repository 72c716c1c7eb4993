use std::{io::ErrorKind, sync::Arc};

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::{
        HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE},
    },
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use serde::Deserialize;
use tracing::error;
use uuid::Uuid;

use crate::{
    application::{
        error::HttpError,
        publish::PublishService,
        repos::{PostsRepo, PostsWriteRepo, SavePostParams},
    },
    domain::entities::PostKind,
    infra::media::{MediaError, MediaStorage},
    presentation::views::{
        PostPageView, PostTemplate, render_not_found_response, render_template_response,
    },
};

use super::{
    middleware::{log_responses, set_request_context},
    repo_error_to_http,
};

#[derive(Clone)]
pub struct HttpState {
    pub posts: Arc<dyn PostsRepo>,
    pub writer: Arc<dyn PostsWriteRepo>,
    pub publish: Arc<PublishService>,
    pub media: Arc<MediaStorage>,
    /// URL path the media directory is mounted under, without surrounding slashes.
    pub media_path: String,
}

pub fn build_router(state: HttpState) -> Router {
    let media_route = format!("/{}/{{file}}", state.media_path);

    Router::new()
        .route("/posts/{id}", get(post_detail).put(save_post))
        .route(&media_route, get(serve_media))
        .route("/_health", get(health))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

#[derive(Debug, Deserialize)]
struct SavePostRequest {
    title: String,
    body: String,
    #[serde(default)]
    kind: PostKind,
}

async fn post_detail(State(state): State<HttpState>, Path(id): Path<Uuid>) -> Response {
    const SOURCE: &str = "infra::http::public::post_detail";

    match state.posts.find_post(id).await {
        Ok(Some(post)) => {
            let rendered = state.publish.render_post(post).await;
            let view = PostPageView::from_rendered(rendered);
            let mut response = render_template_response(PostTemplate { view }, StatusCode::OK);
            set_no_store(&mut response);
            response
        }
        Ok(None) => render_not_found_response(),
        Err(err) => repo_error_to_http(SOURCE, err).into_response(),
    }
}

/// Host save endpoint. Save hooks, including the metadata sync, run before
/// the response is returned.
async fn save_post(
    State(state): State<HttpState>,
    Path(id): Path<Uuid>,
    Json(request): Json<SavePostRequest>,
) -> Response {
    const SOURCE: &str = "infra::http::public::save_post";

    let params = SavePostParams {
        id,
        kind: request.kind,
        title: request.title,
        body: request.body,
    };
    if let Err(err) = state.writer.save_post(params).await {
        return repo_error_to_http(SOURCE, err).into_response();
    }

    // Re-read so the response reflects fields written by save hooks.
    match state.posts.find_post(id).await {
        Ok(Some(post)) => Json(post).into_response(),
        Ok(None) => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "Resource not found",
            "Post disappeared after save",
        )
        .into_response(),
        Err(err) => repo_error_to_http(SOURCE, err).into_response(),
    }
}

async fn serve_media(State(state): State<HttpState>, Path(file): Path<String>) -> Response {
    const SOURCE: &str = "infra::http::public::serve_media";

    match state.media.read(&file).await {
        Ok(bytes) => build_media_response(&file, bytes),
        Err(MediaError::InvalidPath) => media_not_found(SOURCE),
        Err(MediaError::Io(err)) if err.kind() == ErrorKind::NotFound => media_not_found(SOURCE),
        Err(err) => {
            error!(
                target = SOURCE,
                file = %file,
                error = %err,
                "failed to read media file"
            );
            HttpError::new(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read media file",
                err.to_string(),
            )
            .into_response()
        }
    }
}

fn media_not_found(source: &'static str) -> Response {
    HttpError::new(
        source,
        StatusCode::NOT_FOUND,
        "Media not found",
        "The requested media file is not available",
    )
    .into_response()
}

async fn health() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

fn set_no_store(response: &mut Response) {
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
}

fn build_media_response(path: &str, bytes: Bytes) -> Response {
    let length = bytes.len();
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&length.to_string()) {
        headers.insert(CONTENT_LENGTH, value);
    }
    // Names are content hashes, so a file never changes once written.
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );

    response
}
