//! Search session
//!
//! Owns everything one interactive search surface needs: the lazily loaded
//! asset bundle, the query encoder, the book filter and the last ranked
//! candidate list. Requests carry a token; only the newest one may publish
//! results.

use crate::assets::{self, AssetSource, SearchAssets};
use crate::config::{AssetsConfig, Config, EmbeddingConfig};
use crate::corpus::{Testament, Translation};
use crate::embedding::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};
use crate::error::{Result, VersemapError};
use crate::retrieval::{
    FilterSet, RankedMatch, RankingEngine, ResultMaterializer, SearchMode, SearchOutcome,
    TestamentState, Unavailable,
};
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;
use tokio::sync::OnceCell;
use uuid::Uuid;

/// One in-flight bundle load, awaited by every caller that arrives before it ends
type AssetLoad = Shared<BoxFuture<'static, std::result::Result<Arc<SearchAssets>, assets::AssetError>>>;

/// Candidates of the newest completed search, kept for re-filtering
#[derive(Debug, Clone)]
struct CachedSearch {
    token: u64,
    mode: SearchMode,
    candidates: Arc<Vec<RankedMatch>>,
}

pub struct SearchSession {
    id: Uuid,
    started_at: DateTime<Utc>,
    source: Arc<dyn AssetSource>,
    assets_config: AssetsConfig,
    dimension: usize,
    min_query_chars: usize,
    engine: RankingEngine,
    display_limit: usize,
    assets: OnceCell<Arc<SearchAssets>>,
    loading: Mutex<Option<AssetLoad>>,
    encoder: RwLock<Option<Arc<dyn EmbeddingProvider>>>,
    filter: RwLock<FilterSet>,
    translation: RwLock<Translation>,
    latest_request: AtomicU64,
    last: Mutex<Option<CachedSearch>>,
}

impl std::fmt::Debug for SearchSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchSession")
            .field("id", &self.id)
            .field("source", &self.source.describe())
            .field("dimension", &self.dimension)
            .field("assets_loaded", &self.assets_loaded())
            .field("encoder_ready", &self.encoder_ready())
            .finish()
    }
}

impl SearchSession {
    /// Create a session reading assets from `source`
    ///
    /// Nothing is fetched until the first search or [`Self::load_search_assets`].
    pub fn new(config: &Config, source: Arc<dyn AssetSource>) -> Self {
        let id = Uuid::new_v4();
        tracing::debug!("Created search session {} over {}", id, source.describe());

        Self {
            id,
            started_at: Utc::now(),
            source,
            assets_config: config.assets.clone(),
            dimension: config.embedding.dimension,
            min_query_chars: config.search.min_query_chars.max(1),
            engine: RankingEngine::new(config.search.candidate_window),
            display_limit: config.search.display_limit,
            assets: OnceCell::new(),
            loading: Mutex::new(None),
            encoder: RwLock::new(None),
            filter: RwLock::new(FilterSet::default()),
            translation: RwLock::new(config.search.translation),
            latest_request: AtomicU64::new(0),
            last: Mutex::new(None),
        }
    }

    /// Create a session with the asset source named in the config
    pub fn from_config(config: &Config) -> Result<Self> {
        let source = assets::source_from_config(&config.assets)?;
        Ok(Self::new(config, source))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Install a query encoder; its dimension must match the stores
    pub fn set_encoder(&self, encoder: Arc<dyn EmbeddingProvider>) -> Result<()> {
        if encoder.dimension() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: encoder.dimension(),
            }
            .into());
        }

        tracing::info!("Query encoder ready: {}", encoder.model_name());
        *self.encoder.write().unwrap() = Some(encoder);
        Ok(())
    }

    /// Load the configured FastEmbed model off the async runtime and install it
    pub async fn initialize_encoder(&self, config: &EmbeddingConfig) -> Result<()> {
        let config = config.clone();
        let started = Instant::now();

        let provider = tokio::task::spawn_blocking(move || match &config.model_dir {
            Some(dir) => FastEmbedProvider::from_model_dir(dir, config.dimension),
            None => FastEmbedProvider::new(&config.model),
        })
        .await
        .map_err(|e| VersemapError::EncoderUnavailable(format!("model loader panicked: {e}")))??;

        tracing::info!("Loaded query encoder in {:?}", started.elapsed());
        self.set_encoder(Arc::new(provider))
    }

    pub fn encoder_ready(&self) -> bool {
        self.encoder.read().unwrap().is_some()
    }

    fn encoder(&self) -> Option<Arc<dyn EmbeddingProvider>> {
        self.encoder.read().unwrap().clone()
    }

    /// Load the asset bundle once
    ///
    /// Concurrent callers share one load and all see its outcome. A failed
    /// load is not cached, so the next call after it fetches again.
    pub async fn load_search_assets(&self) -> std::result::Result<Arc<SearchAssets>, assets::AssetError> {
        let load = {
            let mut loading = self.loading.lock().unwrap();
            if let Some(assets) = self.assets.get() {
                return Ok(Arc::clone(assets));
            }
            match loading.as_ref() {
                Some(load) => load.clone(),
                None => {
                    let source = Arc::clone(&self.source);
                    let files = self.assets_config.clone();
                    let dimension = self.dimension;
                    let load = async move {
                        assets::load_search_assets(source.as_ref(), &files, dimension)
                            .await
                            .map(Arc::new)
                    }
                    .boxed()
                    .shared();
                    *loading = Some(load.clone());
                    load
                }
            }
        };

        let result = load.clone().await;

        let mut loading = self.loading.lock().unwrap();
        if let Ok(assets) = &result {
            let _ = self.assets.set(Arc::clone(assets));
        }
        if loading.as_ref().is_some_and(|current| current.ptr_eq(&load)) {
            *loading = None;
        }
        result
    }

    pub fn assets_loaded(&self) -> bool {
        self.assets.initialized()
    }

    /// Current filter, copied
    pub fn filter(&self) -> FilterSet {
        self.filter.read().unwrap().clone()
    }

    pub fn set_filter(&self, filter: FilterSet) {
        *self.filter.write().unwrap() = filter;
    }

    /// Flip one book; returns whether it is now allowed
    pub fn toggle_book(&self, book_num: u8) -> bool {
        self.filter.write().unwrap().toggle_book(book_num)
    }

    pub fn toggle_testament(&self, testament: Testament) -> TestamentState {
        self.filter.write().unwrap().toggle_testament(testament)
    }

    pub fn translation(&self) -> Translation {
        *self.translation.read().unwrap()
    }

    pub fn set_translation(&self, translation: Translation) {
        *self.translation.write().unwrap() = translation;
    }

    /// Search with the session's current filter
    pub async fn search(&self, query: &str, mode: SearchMode) -> Result<SearchOutcome> {
        let filter = self.filter();
        self.search_with_filter(query, mode, &filter).await
    }

    /// Search with an explicit filter snapshot
    ///
    /// A newer call made before this one finishes makes this one return
    /// [`SearchOutcome::Superseded`].
    pub async fn search_with_filter(
        &self,
        query: &str,
        mode: SearchMode,
        filter: &FilterSet,
    ) -> Result<SearchOutcome> {
        let token = self.latest_request.fetch_add(1, Ordering::SeqCst) + 1;
        let started = Instant::now();

        // A newer request invalidates the cached candidates
        self.last.lock().unwrap().take();

        if !self.accepts_query(query) {
            tracing::debug!("Request {}: blank query, nothing to encode", token);
            return Ok(SearchOutcome::Empty);
        }
        let query = query.trim();

        let Some(encoder) = self.encoder() else {
            return Ok(SearchOutcome::Unavailable(Unavailable::EncoderNotReady));
        };

        let assets = match self.load_search_assets().await {
            Ok(assets) => assets,
            Err(e) => {
                tracing::warn!("Search assets unavailable: {}", e);
                return Ok(SearchOutcome::Unavailable(Unavailable::AssetsFailed {
                    message: e.to_string(),
                    retryable: e.is_retryable(),
                }));
            }
        };

        let text = query.to_string();
        let vector = tokio::task::spawn_blocking(move || encoder.embed(&text))
            .await
            .map_err(|e| VersemapError::Other(e.into()))??;

        if !self.is_current(token) {
            tracing::debug!("Request {} superseded after encoding", token);
            return Ok(SearchOutcome::Superseded);
        }

        let engine = self.engine;
        let ranked_assets = Arc::clone(&assets);
        let candidates = tokio::task::spawn_blocking(move || {
            engine.rank(&vector, ranked_assets.store(mode))
        })
        .await
        .map_err(|e| VersemapError::Other(e.into()))?;
        let candidates = Arc::new(candidates);

        {
            let mut last = self.last.lock().unwrap();
            if !self.is_current(token) {
                tracing::debug!("Request {} superseded after ranking", token);
                return Ok(SearchOutcome::Superseded);
            }
            *last = Some(CachedSearch {
                token,
                mode,
                candidates: Arc::clone(&candidates),
            });
        }

        let outcome = self.materialize(mode, &candidates, filter, &assets);
        tracing::debug!(
            "Request {}: {} search for {:?} took {:?}",
            token,
            mode,
            query,
            started.elapsed()
        );
        Ok(outcome)
    }

    /// Re-apply the current filter and translation to the last search
    ///
    /// Returns `None` before any search has completed.
    pub fn refresh(&self) -> Option<SearchOutcome> {
        let cached = self.last.lock().unwrap().clone()?;
        let assets = self.assets.get()?;
        let filter = self.filter();

        tracing::debug!("Refreshing request {} under {}", cached.token, filter.label());
        Some(self.materialize(cached.mode, &cached.candidates, &filter, assets))
    }

    /// Whether `query` is long enough to encode once trimmed
    pub fn accepts_query(&self, query: &str) -> bool {
        query.trim().chars().count() >= self.min_query_chars
    }

    fn is_current(&self, token: u64) -> bool {
        self.latest_request.load(Ordering::SeqCst) == token
    }

    fn materialize(
        &self,
        mode: SearchMode,
        candidates: &[RankedMatch],
        filter: &FilterSet,
        assets: &SearchAssets,
    ) -> SearchOutcome {
        let filtered = filter.apply(candidates, |i| assets.book_of(mode, i));
        let materializer = ResultMaterializer::new(self.display_limit, self.translation());

        let results = match mode {
            SearchMode::Verses => {
                materializer.materialize_verses(&filtered, &assets.verses, candidates.len())
            }
            SearchMode::Passages => materializer.materialize_passages(
                &filtered,
                &assets.passages,
                &assets.verses,
                candidates.len(),
            ),
        };

        match results {
            Some(results) => SearchOutcome::Ranked(results),
            None => SearchOutcome::NoResults,
        }
    }
}
