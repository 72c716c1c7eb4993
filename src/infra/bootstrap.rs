//! Wires settings, the host store and the notebook pipeline together.

use std::sync::Arc;

use crate::{
    application::{
        assets::ScriptManifest,
        cache::NotebookCache,
        fetch::{GithubFetcher, NotebookSource},
        images::ImageMaterializer,
        metadata::MetadataSyncService,
        publish::PublishService,
        transform::NotebookTransformer,
    },
    config::Settings,
    infra::{error::InfraError, http::HttpState, media::MediaStorage, store::JsonStore},
};

/// Long-lived services shared by the HTTP server and the CLI commands.
pub struct Services {
    pub store: Arc<JsonStore>,
    pub metadata: Arc<MetadataSyncService>,
    pub publish: Arc<PublishService>,
    pub media: Arc<MediaStorage>,
    media_path: String,
}

impl Services {
    /// Open the configured store and build the pipeline around a GitHub fetcher.
    pub async fn from_settings(settings: &Settings) -> Result<Self, InfraError> {
        let store = match settings.store.path.clone() {
            Some(path) => JsonStore::open(path).await?,
            None => JsonStore::in_memory(),
        };
        let fetcher = GithubFetcher::new(settings.fetch.timeout, &settings.fetch.user_agent)?;
        Self::build(settings, Arc::new(store), Arc::new(fetcher))
    }

    pub fn build(
        settings: &Settings,
        store: Arc<JsonStore>,
        source: Arc<dyn NotebookSource>,
    ) -> Result<Self, InfraError> {
        let directory = settings.storage.directory.clone();
        let images = ImageMaterializer::new(
            directory.clone(),
            settings.storage.public_base_url(&settings.site),
        )?;
        let transformer = Arc::new(NotebookTransformer::new(Arc::new(images)));
        let cache = NotebookCache::new(
            directory.clone(),
            settings.storage.cache_ttl,
            Arc::clone(&source),
            transformer,
        )?;

        let metadata = Arc::new(MetadataSyncService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            source,
        ));
        store.register_hook(metadata.clone());

        let publish = Arc::new(PublishService::new(
            Arc::new(cache),
            Arc::clone(&metadata),
            ScriptManifest::new(&settings.assets.base_url),
            &settings.site.url,
        ));
        let media = Arc::new(MediaStorage::new(directory)?);

        Ok(Self {
            store,
            metadata,
            publish,
            media,
            media_path: settings.storage.public_path.clone(),
        })
    }

    pub fn http_state(&self) -> HttpState {
        HttpState {
            posts: self.store.clone(),
            writer: self.store.clone(),
            publish: Arc::clone(&self.publish),
            media: Arc::clone(&self.media),
            media_path: self.media_path.clone(),
        }
    }
}
