use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;

use crate::application::error::{ErrorReport, HttpError};
use crate::application::publish::{BodySegment, NotebookEmbed, RenderState, RenderedPost};

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn render_not_found_response() -> Response {
    let view = ErrorPageView {
        status: StatusCode::NOT_FOUND.as_u16(),
        title: "Not found".to_string(),
        message: "The requested post does not exist.".to_string(),
    };
    let mut response = render_template_response(ErrorTemplate { view }, StatusCode::NOT_FOUND);
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        "Resource not found",
    )
    .attach(&mut response);
    response
}

#[derive(Clone)]
pub struct ErrorPageView {
    pub status: u16,
    pub title: String,
    pub message: String,
}

#[derive(Clone)]
pub struct NotebookEmbedView {
    pub element_id: String,
    pub source_url: String,
    pub state_label: String,
    pub available: bool,
    /// JavaScript string literal, already escaped for `<script>`.
    pub payload: String,
}

#[derive(Clone)]
pub struct SegmentView {
    /// Host-authored HTML, emitted verbatim.
    pub html: Option<String>,
    pub notebook: Option<NotebookEmbedView>,
}

#[derive(Clone)]
pub struct ScriptView {
    pub src: String,
}

#[derive(Clone)]
pub struct PostPageView {
    pub title: String,
    pub excerpt: String,
    pub tags: Vec<String>,
    pub segments: Vec<SegmentView>,
    pub library_scripts: Vec<ScriptView>,
    /// Empty when the post embeds no notebook.
    pub site_urls_script: String,
    pub entry_script: Option<ScriptView>,
}

impl PostPageView {
    pub fn from_rendered(rendered: RenderedPost) -> Self {
        let has_notebooks = rendered.has_notebooks();
        let RenderedPost {
            post,
            segments,
            mut scripts,
            site_urls,
        } = rendered;

        let entry_script = scripts.pop().map(|asset| ScriptView { src: asset.url });
        let library_scripts = scripts
            .into_iter()
            .map(|asset| ScriptView { src: asset.url })
            .collect();

        let mut embeds = 0usize;
        let segments = segments
            .into_iter()
            .filter_map(|segment| match segment {
                BodySegment::Text(html) => Some(SegmentView {
                    html: Some(html),
                    notebook: None,
                }),
                BodySegment::Notebook(embed) => {
                    embeds += 1;
                    Some(SegmentView {
                        html: None,
                        notebook: Some(embed_view(embed, embeds)),
                    })
                }
                BodySegment::Empty => None,
            })
            .collect();

        Self {
            title: post.title,
            excerpt: post.excerpt,
            tags: post.tags.into_iter().collect(),
            segments,
            library_scripts,
            site_urls_script: if has_notebooks { site_urls } else { String::new() },
            entry_script,
        }
    }
}

fn embed_view(embed: NotebookEmbed, ordinal: usize) -> NotebookEmbedView {
    NotebookEmbedView {
        element_id: format!("nbpress-notebook-{ordinal}"),
        available: embed.state != RenderState::Unavailable,
        state_label: embed.state.to_string(),
        source_url: embed.source_url,
        payload: embed.payload.unwrap_or_default(),
    }
}

#[derive(Template)]
#[template(path = "post.html")]
pub struct PostTemplate {
    pub view: PostPageView,
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub view: ErrorPageView,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::assets::ScriptManifest;
    use crate::domain::entities::{PostKind, PostRecord};
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn rendered(segments: Vec<BodySegment>) -> RenderedPost {
        RenderedPost {
            post: PostRecord {
                id: Uuid::new_v4(),
                kind: PostKind::Post,
                slug: "hello".to_string(),
                title: "Hello".to_string(),
                excerpt: String::new(),
                body: String::new(),
                tags: Default::default(),
                category_ids: Default::default(),
                updated_at: OffsetDateTime::UNIX_EPOCH,
            },
            segments,
            scripts: ScriptManifest::new("/static/nbpress").ordered(),
            site_urls: r#"window.NBPRESS_URLS = {"siteurl":"https://blog.example"};"#.to_string(),
        }
    }

    #[test]
    fn entry_point_script_follows_payload() {
        let view = PostPageView::from_rendered(rendered(vec![
            BodySegment::Text("<p>Intro</p>".to_string()),
            BodySegment::Notebook(NotebookEmbed {
                source_url: "https://github.com/u/r/blob/main/a.ipynb".to_string(),
                payload: Some(r#""{\"cells\":[]}""#.to_string()),
                state: RenderState::Fresh,
            }),
        ]));

        let html = PostTemplate { view }.render().expect("render");

        let payload_at = html.find("render_notebook(").expect("payload call");
        let urls_at = html.find("window.NBPRESS_URLS").expect("site urls");
        let entry_at = html.find("/static/nbpress/nbpreview.js").expect("entry point");
        let library_at = html.find("/static/nbpress/marked.min.js").expect("library");
        assert!(library_at < urls_at && urls_at < entry_at);
        assert!(payload_at < entry_at);
        assert!(html.contains("<p>Intro</p>"));
        assert!(html.contains("Render is fresh"));
    }

    #[test]
    fn unavailable_embed_renders_without_payload() {
        let view = PostPageView::from_rendered(rendered(vec![BodySegment::Notebook(
            NotebookEmbed {
                source_url: "https://github.com/u/r/blob/main/a.ipynb".to_string(),
                payload: None,
                state: RenderState::Unavailable,
            },
        )]));

        let html = PostTemplate { view }.render().expect("render");
        assert!(!html.contains("render_notebook("));
        assert!(html.contains("Render is unavailable"));
    }
}
