//! Client for the catalog service.
//!
//! Every operation is a blocking call that may run from any thread. List
//! and search results land in the [`CatalogStore`]; observers are told once
//! a collection changed.

use super::transport::{HttpTransport, Transport};
use super::types::{Credentials, Endpoints, Request, Response};
use crate::cache::{CacheStats, Payload, ResponseCache};
use crate::deserializer::{Diagnostic, FieldSetters, ItemDeserializer};
use crate::error::{ClientError, Result};
use crate::lock::LockBridge;
use crate::notify::{Event, Observers};
use crate::serializer::{serialize, WireBody};
use crate::store::{ApplyMode, CatalogStore, Collection, Stored};
use crate::text::TextCleaner;
use shared::{Anime, CatalogItem, Manga, MalConfig};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of a list fetch or search
#[derive(Debug, Clone)]
pub struct FetchReport {
    /// Records finalized by the parser
    pub parsed: usize,
    /// Collection size after the batch was applied
    pub stored: usize,
    pub diagnostics: Vec<Diagnostic>,
}

/// Item kinds the client can fetch, search and submit
trait ClientItem: FieldSetters + WireBody + Stored {
    fn deserializer(client: &MalClient) -> &ItemDeserializer<Self>;
}

impl ClientItem for Anime {
    fn deserializer(client: &MalClient) -> &ItemDeserializer<Self> {
        &client.anime_parser
    }
}

impl ClientItem for Manga {
    fn deserializer(client: &MalClient) -> &ItemDeserializer<Self> {
        &client.manga_parser
    }
}

#[derive(Debug, Clone, Copy)]
enum Submit {
    Update,
    Add,
}

/// Catalog service client
pub struct MalClient {
    config: MalConfig,
    credentials: Credentials,
    endpoints: Endpoints,
    transport: Box<dyn Transport>,
    locks: LockBridge,
    store: CatalogStore,
    /// Cover images keyed by URL
    images: ResponseCache<String>,
    /// Manga covers keyed by catalog id
    manga_images: ResponseCache<u64>,
    observers: Observers,
    anime_parser: ItemDeserializer<Anime>,
    manga_parser: ItemDeserializer<Manga>,
}

impl MalClient {
    /// Create a client over any transport
    pub fn new(
        config: MalConfig,
        credentials: Credentials,
        transport: Box<dyn Transport>,
        cleaner: Arc<dyn TextCleaner>,
    ) -> Self {
        info!(base_url = %config.base_url, user = %credentials.username, "Creating client");

        Self {
            endpoints: Endpoints::from_config(&config),
            config,
            credentials,
            transport,
            locks: LockBridge::default(),
            store: CatalogStore::new(),
            images: ResponseCache::new(),
            manga_images: ResponseCache::new(),
            observers: Observers::new(),
            anime_parser: ItemDeserializer::new(Arc::clone(&cleaner)),
            manga_parser: ItemDeserializer::new(cleaner),
        }
    }

    /// Create a client over the default HTTP transport
    pub fn with_http(
        config: MalConfig,
        credentials: Credentials,
        cleaner: Arc<dyn TextCleaner>,
    ) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::new(config, credentials, Box::new(transport), cleaner))
    }

    pub fn config(&self) -> &MalConfig {
        &self.config
    }

    pub fn store(&self) -> &CatalogStore {
        &self.store
    }

    pub fn locks(&self) -> &LockBridge {
        &self.locks
    }

    /// Receive an [`Event`] after every store change
    pub fn subscribe(&self) -> Receiver<Event> {
        self.observers.subscribe()
    }

    /// Replace the anime list with the user's list from the service
    pub fn fetch_anime_list(&self) -> Result<FetchReport> {
        self.fetch_list::<Anime>()
    }

    /// Replace the manga list with the user's list from the service
    pub fn fetch_manga_list(&self) -> Result<FetchReport> {
        self.fetch_list::<Manga>()
    }

    /// Replace the anime search results with matches for `terms`
    pub fn search_anime(&self, terms: &str) -> Result<FetchReport> {
        self.search::<Anime>(terms)
    }

    /// Replace the manga search results with matches for `terms`
    pub fn search_manga(&self, terms: &str) -> Result<FetchReport> {
        self.search::<Manga>(terms)
    }

    /// Submit new progress for an anime already on the list
    pub fn update_anime(&self, anime: &Anime) -> Result<()> {
        self.submit(anime, Submit::Update)
    }

    pub fn update_manga(&self, manga: &Manga) -> Result<()> {
        self.submit(manga, Submit::Update)
    }

    /// Put an anime on the list
    pub fn add_anime(&self, anime: &Anime) -> Result<()> {
        self.submit(anime, Submit::Add)
    }

    pub fn add_manga(&self, manga: &Manga) -> Result<()> {
        self.submit(manga, Submit::Add)
    }

    /// Cover image of an item, cached by its URL
    pub fn fetch_image<T: CatalogItem>(&self, item: &T) -> Result<Payload> {
        let url = &item.series().image_url;
        if url.is_empty() {
            return Err(ClientError::transport(format!("{} record has no image url", T::KIND)));
        }
        self.images.get_or_fetch(url, || self.download(url))
    }

    /// Cover image of a manga, cached by its catalog id
    pub fn fetch_manga_image(&self, manga: &Manga) -> Result<Payload> {
        let id = manga.series.id().ok_or(ClientError::MissingId(Manga::KIND))?;
        let url = &manga.series.image_url;
        if url.is_empty() {
            return Err(ClientError::transport(format!("manga {id} has no image url")));
        }
        self.manga_images.get_or_fetch(&id, || self.download(url))
    }

    pub fn image_cache_stats(&self) -> CacheStats {
        let urls = self.images.stats();
        let ids = self.manga_images.stats();
        CacheStats {
            total_entries: urls.total_entries + ids.total_entries,
            total_size_bytes: urls.total_size_bytes + ids.total_size_bytes,
        }
    }

    fn fetch_list<T: ClientItem>(&self) -> Result<FetchReport> {
        info!(kind = %T::KIND, user = %self.credentials.username, "Fetching list");
        let request = self.endpoints.list(
            T::KIND,
            &self.credentials.username,
            &self.config.list_status,
        );
        let report = self.load(request, T::list(&self.store))?;

        self.observers.notify(Event::list_updated(T::KIND));
        Ok(report)
    }

    fn search<T: ClientItem>(&self, terms: &str) -> Result<FetchReport> {
        info!(kind = %T::KIND, terms = terms, "Searching");
        let request = self
            .endpoints
            .search(T::KIND, terms)
            .credentials(self.credentials.clone());
        let report = self.load(request, T::search_results(&self.store))?;

        self.observers.notify(Event::search_completed(T::KIND));
        Ok(report)
    }

    /// Send, parse and swap the result into `collection`
    ///
    /// A failed request or a body the reader gave up on leaves the collection
    /// untouched.
    fn load<T: ClientItem>(
        &self,
        request: Request,
        collection: &Collection<T>,
    ) -> Result<FetchReport> {
        let response = self.send(&request)?;
        let parsed = T::deserializer(self).deserialize_str(&response.text());
        parsed.log_diagnostics(collection.name());
        if let Some(error) = parsed.read_error() {
            warn!(
                collection = collection.name(),
                error = %error,
                "Response unreadable, keeping collection"
            );
            return Err(ClientError::Malformed {
                url: request.url,
                error: error.clone(),
            });
        }

        let count = parsed.records.len();
        let stored = collection.apply(parsed.records, ApplyMode::Replace);
        info!(
            collection = collection.name(),
            parsed = count,
            stored,
            diagnostics = parsed.diagnostics.len(),
            "Collection refreshed"
        );

        Ok(FetchReport {
            parsed: count,
            stored,
            diagnostics: parsed.diagnostics,
        })
    }

    fn submit<T: ClientItem>(&self, record: &T, mode: Submit) -> Result<()> {
        let id = record.series().id().ok_or(ClientError::MissingId(T::KIND))?;
        let body = serialize(record);
        let request = match mode {
            Submit::Update => self.endpoints.update(T::KIND, id, body),
            Submit::Add => self.endpoints.add(T::KIND, id, body),
        }
        .credentials(self.credentials.clone());

        info!(kind = %T::KIND, id, ?mode, "Submitting record");
        self.send(&request)?;

        T::list(&self.store).apply(vec![record.clone()], ApplyMode::Merge);
        self.observers.notify(Event::list_updated(T::KIND));
        Ok(())
    }

    fn download(&self, url: &str) -> Result<Vec<u8>> {
        debug!(url = url, "Downloading image");
        Ok(self.send(&Request::get(url))?.body)
    }

    /// Execute a request; any non-2xx status is an error
    fn send(&self, request: &Request) -> Result<Response> {
        let response = self
            .transport
            .execute(request, &self.locks)
            .inspect_err(|e| warn!(url = %request.url, error = %e, "Request error"))?;

        if !response.is_success() {
            let body = response.text();
            warn!(url = %request.url, status = response.status, error = %body, "Request failed");
            return Err(ClientError::Status {
                url: request.url.clone(),
                status: response.status,
                body,
            });
        }

        debug!(url = %request.url, status = response.status, "Request successful");
        Ok(response)
    }
}
