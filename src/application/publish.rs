//! Per-render entry point: turns notebook directives in a post body into
//! embeddable documents plus the scripts that render them client-side.

use std::{fmt, sync::Arc, time::Instant};

use tracing::{info, warn};
use uuid::Uuid;

use crate::application::assets::{ScriptAsset, ScriptManifest};
use crate::application::cache::{CacheError, CachedNotebook, Freshness, NotebookCache};
use crate::application::metadata::{MetadataSyncService, Prefetched};
use crate::domain::entities::PostRecord;
use crate::domain::shortcode::find_directives;

/// How the embedded document relates to the source at render time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderState {
    /// Regenerated by this request.
    Fresh,
    Cached { age_secs: u64 },
    /// The pipeline failed; the page renders without the notebook.
    Unavailable,
}

impl fmt::Display for RenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderState::Fresh => f.write_str("fresh"),
            RenderState::Cached { age_secs } => write!(f, "{age_secs} seconds old"),
            RenderState::Unavailable => f.write_str("unavailable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotebookEmbed {
    pub source_url: String,
    /// JavaScript string literal holding the single-line document.
    pub payload: Option<String>,
    pub state: RenderState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodySegment {
    Text(String),
    Notebook(NotebookEmbed),
    /// A directive without a source URL renders as nothing.
    Empty,
}

/// Post body split around its directives, ready for the page template.
#[derive(Debug, Clone)]
pub struct RenderedPost {
    pub post: PostRecord,
    pub segments: Vec<BodySegment>,
    /// Empty when the body has no notebook embeds.
    pub scripts: Vec<ScriptAsset>,
    pub site_urls: String,
}

impl RenderedPost {
    pub fn has_notebooks(&self) -> bool {
        self.segments
            .iter()
            .any(|segment| matches!(segment, BodySegment::Notebook(_)))
    }
}

#[derive(Clone)]
pub struct PublishService {
    cache: Arc<NotebookCache>,
    metadata: Arc<MetadataSyncService>,
    scripts: ScriptManifest,
    site_url: String,
}

impl PublishService {
    pub fn new(
        cache: Arc<NotebookCache>,
        metadata: Arc<MetadataSyncService>,
        scripts: ScriptManifest,
        site_url: &str,
    ) -> Self {
        Self {
            cache,
            metadata,
            scripts,
            site_url: site_url.trim_end_matches('/').to_string(),
        }
    }

    /// Render every directive in the post body. Pipeline failures never fail
    /// the page; the affected embed is marked unavailable instead.
    pub async fn render_post(&self, post: PostRecord) -> RenderedPost {
        let mut segments = Vec::new();
        let mut cursor = 0;

        for directive in find_directives(&post.body) {
            if directive.span.start > cursor {
                segments.push(BodySegment::Text(
                    post.body[cursor..directive.span.start].to_string(),
                ));
            }
            cursor = directive.span.end;

            let segment = match directive.url {
                Some(url) => BodySegment::Notebook(self.embed(Some(post.id), &url).await),
                None => BodySegment::Empty,
            };
            segments.push(segment);
        }
        if cursor < post.body.len() {
            segments.push(BodySegment::Text(post.body[cursor..].to_string()));
        }

        let has_notebooks = segments
            .iter()
            .any(|segment| matches!(segment, BodySegment::Notebook(_)));
        let scripts = if has_notebooks {
            self.scripts.ordered()
        } else {
            Vec::new()
        };

        RenderedPost {
            post,
            segments,
            scripts,
            site_urls: self.site_urls_script(),
        }
    }

    /// Produce one embed. When the cache was regenerated, the metadata sync
    /// for `post_id` runs in the background on the document just downloaded.
    pub async fn embed(&self, post_id: Option<Uuid>, source_url: &str) -> NotebookEmbed {
        let started_at = Instant::now();

        match self.cache.load(source_url).await {
            Ok(CachedNotebook {
                document,
                freshness,
            }) => {
                let state = match freshness {
                    Freshness::Regenerated { raw } => {
                        if let Some(post_id) = post_id {
                            self.spawn_metadata_sync(post_id, source_url.to_string(), raw);
                        }
                        RenderState::Fresh
                    }
                    Freshness::Cached { age } => RenderState::Cached {
                        age_secs: age.as_secs(),
                    },
                };

                info!(
                    target = "application::publish",
                    op = "publish::embed",
                    result = "ok",
                    source_url = %source_url,
                    state = %state,
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    "Notebook embed ready"
                );

                NotebookEmbed {
                    source_url: source_url.to_string(),
                    payload: Some(embeddable_payload(&document)),
                    state,
                }
            }
            Err(err) => {
                warn!(
                    target = "application::publish",
                    op = "publish::embed",
                    result = "unavailable",
                    source_url = %source_url,
                    error = %err,
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    "Notebook embed unavailable"
                );
                NotebookEmbed {
                    source_url: source_url.to_string(),
                    payload: None,
                    state: RenderState::Unavailable,
                }
            }
        }
    }

    /// The transformed document flattened to one line, without script glue.
    pub async fn single_line_document(&self, source_url: &str) -> Result<String, CacheError> {
        let loaded = self.cache.load(source_url).await?;
        Ok(single_line(&loaded.document))
    }

    /// Script body assigning the site URL global read by the entry point.
    pub fn site_urls_script(&self) -> String {
        let urls = serde_json::json!({ "siteurl": self.site_url });
        format!("window.NBPRESS_URLS = {};", escape_script(&urls.to_string()))
    }

    fn spawn_metadata_sync(&self, post_id: Uuid, source_url: String, raw: String) {
        let metadata = Arc::clone(&self.metadata);
        tokio::spawn(async move {
            let prefetched = Prefetched {
                source_url: &source_url,
                raw: &raw,
            };
            if let Err(err) = metadata.sync(post_id, Some(prefetched)).await {
                warn!(
                    target = "application::publish",
                    op = "publish::metadata_sync",
                    result = "error",
                    post_id = %post_id,
                    error = %err,
                    "Background metadata sync failed"
                );
            }
        });
    }
}

fn single_line(document: &str) -> String {
    document.replace('\n', "")
}

/// JSON string literal of the single-line document, safe inside `<script>`.
pub fn embeddable_payload(document: &str) -> String {
    let literal = serde_json::Value::String(single_line(document)).to_string();
    escape_script(&literal)
}

fn escape_script(text: &str) -> String {
    text.replace("</", "<\\/")
}
