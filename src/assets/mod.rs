//! Search asset transport and loading
//!
//! The search bundle is five files: the verse points, the optional alternate
//! translation, the passage metadata and the two quantized embedding stores.
//! They come from an [`AssetSource`] (HTTP base URL or local directory) and
//! are loaded together into an immutable [`SearchAssets`].

use crate::config::AssetsConfig;
use crate::corpus::{CorpusEntry, PassageIndex, VerseIndex};
use crate::embedding::QuantizedStore;
use crate::retrieval::SearchMode;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Asset failures are shared between every caller waiting on one load,
/// so the underlying sources sit behind `Arc`
#[derive(Error, Debug, Clone)]
pub enum AssetError {
    #[error("HTTP {status} fetching {name}")]
    Http { name: String, status: u16 },

    #[error("Network error fetching {name}: {source}")]
    Transport {
        name: String,
        #[source]
        source: Arc<reqwest::Error>,
    },

    #[error("Failed to read {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("Failed to parse {name}: {source}")]
    Json {
        name: String,
        #[source]
        source: Arc<serde_json::Error>,
    },

    #[error("Store {name} has {len} bytes, not a multiple of dimension {dimension}")]
    MalformedStore {
        name: String,
        len: usize,
        dimension: usize,
    },

    #[error("Store {name} has {store_items} items but the corpus has {corpus_items}")]
    CountMismatch {
        name: String,
        store_items: usize,
        corpus_items: usize,
    },

    #[error("Store {name} has dimension {actual}, other stores have {expected}")]
    DimensionMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
}

impl AssetError {
    /// Whether fetching again could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AssetError::Http { .. } | AssetError::Transport { .. } | AssetError::Io { .. }
        )
    }
}

/// Where asset files come from
#[async_trait]
pub trait AssetSource: Send + Sync {
    /// Fetch one file by name
    async fn fetch(&self, name: &str) -> Result<Vec<u8>, AssetError>;

    /// Human-readable origin for logs
    fn describe(&self) -> String;
}

/// Fetches files relative to a base URL
#[derive(Debug, Clone)]
pub struct HttpAssetSource {
    client: reqwest::Client,
    base: String,
}

impl HttpAssetSource {
    pub fn new(base: &str, timeout: Duration) -> Result<Self, AssetError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| AssetError::Transport {
                name: base.to_string(),
                source: Arc::new(source),
            })?;

        Ok(Self {
            client,
            base: base.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, name: &str) -> String {
        format!("{}/{}", self.base, name)
    }
}

#[async_trait]
impl AssetSource for HttpAssetSource {
    async fn fetch(&self, name: &str) -> Result<Vec<u8>, AssetError> {
        let url = self.url(name);
        tracing::debug!("GET {}", url);

        let transport = |source| AssetError::Transport {
            name: name.to_string(),
            source: Arc::new(source),
        };

        let resp = self.client.get(&url).send().await.map_err(transport)?;
        if !resp.status().is_success() {
            return Err(AssetError::Http {
                name: name.to_string(),
                status: resp.status().as_u16(),
            });
        }

        let bytes = resp.bytes().await.map_err(transport)?;
        Ok(bytes.to_vec())
    }

    fn describe(&self) -> String {
        self.base.clone()
    }
}

/// Reads files from a local directory
#[derive(Debug, Clone)]
pub struct DirAssetSource {
    root: PathBuf,
}

impl DirAssetSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl AssetSource for DirAssetSource {
    async fn fetch(&self, name: &str) -> Result<Vec<u8>, AssetError> {
        tokio::fs::read(self.root.join(name))
            .await
            .map_err(|source| AssetError::Io {
                name: name.to_string(),
                source: Arc::new(source),
            })
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

/// In-memory files, counting every fetch
#[derive(Debug, Default)]
pub struct MemoryAssetSource {
    files: HashMap<String, Vec<u8>>,
    fetches: AtomicUsize,
}

impl MemoryAssetSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.files.insert(name.into(), bytes.into());
        self
    }

    /// Number of fetch calls so far, successful or not
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssetSource for MemoryAssetSource {
    async fn fetch(&self, name: &str) -> Result<Vec<u8>, AssetError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.files.get(name).cloned().ok_or_else(|| AssetError::Io {
            name: name.to_string(),
            source: Arc::new(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "not in memory source",
            )),
        })
    }

    fn describe(&self) -> String {
        format!("memory ({} files)", self.files.len())
    }
}

/// Pick HTTP for `http(s)://` bases, a local directory otherwise
pub fn source_from_config(
    config: &AssetsConfig,
) -> Result<Arc<dyn AssetSource>, AssetError> {
    let base = config.base.trim();
    if base.starts_with("http://") || base.starts_with("https://") {
        let source = HttpAssetSource::new(base, Duration::from_secs(config.timeout_secs))?;
        Ok(Arc::new(source))
    } else {
        Ok(Arc::new(DirAssetSource::new(expand_home(base))))
    }
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

/// Everything a search needs, loaded once and shared
#[derive(Debug, Clone)]
pub struct SearchAssets {
    pub verses: Arc<VerseIndex>,
    pub verse_store: QuantizedStore,
    pub passages: Arc<PassageIndex>,
    pub passage_store: QuantizedStore,
}

impl SearchAssets {
    /// Check that both stores share one dimension and match their corpus
    pub fn new(
        verses: VerseIndex,
        verse_store: QuantizedStore,
        passages: PassageIndex,
        passage_store: QuantizedStore,
    ) -> Result<Self, AssetError> {
        if passage_store.dimension() != verse_store.dimension() {
            return Err(AssetError::DimensionMismatch {
                name: passage_store.name().to_string(),
                expected: verse_store.dimension(),
                actual: passage_store.dimension(),
            });
        }

        for (store, corpus_items) in [(&verse_store, verses.len()), (&passage_store, passages.len())]
        {
            if store.item_count() != corpus_items {
                return Err(AssetError::CountMismatch {
                    name: store.name().to_string(),
                    store_items: store.item_count(),
                    corpus_items,
                });
            }
        }

        Ok(Self {
            verses: Arc::new(verses),
            verse_store,
            passages: Arc::new(passages),
            passage_store,
        })
    }

    /// Store ranked for the given mode
    pub fn store(&self, mode: SearchMode) -> &QuantizedStore {
        match mode {
            SearchMode::Verses => &self.verse_store,
            SearchMode::Passages => &self.passage_store,
        }
    }

    /// Book number of an item in the given mode's corpus
    pub fn book_of(&self, mode: SearchMode, index: usize) -> Option<u8> {
        match mode {
            SearchMode::Verses => self.verses.get(index).map(|v| v.book_num()),
            SearchMode::Passages => self.passages.get(index).map(|p| p.book_num()),
        }
    }
}

/// Fetch and parse the whole bundle concurrently
///
/// The alternate translation is optional: a failure there is logged and the
/// verses keep their primary text only.
pub async fn load_search_assets(
    source: &dyn AssetSource,
    files: &AssetsConfig,
    dimension: usize,
) -> Result<SearchAssets, AssetError> {
    let started = Instant::now();
    tracing::info!("Loading search assets from {}", source.describe());

    let alternates = async {
        match files.alternates_file.as_deref() {
            Some(name) => Ok::<_, AssetError>(Some(source.fetch(name).await)),
            None => Ok(None),
        }
    };

    let (verse_bytes, verse_store_bytes, passage_bytes, passage_store_bytes, alternate_bytes) = tokio::try_join!(
        source.fetch(&files.verses_file),
        source.fetch(&files.verse_embeddings_file),
        source.fetch(&files.passages_file),
        source.fetch(&files.passage_embeddings_file),
        alternates,
    )?;

    let mut verses = VerseIndex::from_json(&verse_bytes).map_err(|source| AssetError::Json {
        name: files.verses_file.clone(),
        source: Arc::new(source),
    })?;

    match (files.alternates_file.as_deref(), alternate_bytes) {
        (Some(name), Some(Ok(bytes))) => match verses.attach_alternates(&bytes) {
            Ok(count) => tracing::info!("Attached {} alternate verse texts", count),
            Err(e) => tracing::warn!("Ignoring unparseable {}: {}", name, e),
        },
        (Some(name), Some(Err(e))) => {
            tracing::warn!("Alternate translation unavailable ({}): {}", name, e)
        }
        _ => {}
    }

    let passages = PassageIndex::from_json(&passage_bytes).map_err(|source| AssetError::Json {
        name: files.passages_file.clone(),
        source: Arc::new(source),
    })?;

    let verse_store = QuantizedStore::from_bytes(
        files.verse_embeddings_file.clone(),
        verse_store_bytes,
        dimension,
    )?;
    let passage_store = QuantizedStore::from_bytes(
        files.passage_embeddings_file.clone(),
        passage_store_bytes,
        dimension,
    )?;

    let assets = SearchAssets::new(verses, verse_store, passages, passage_store)?;

    tracing::info!(
        "Loaded {} verses and {} passages in {:?}",
        assets.verses.len(),
        assets.passages.len(),
        started.elapsed()
    );

    Ok(assets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::quantize_vector;

    const SPHERE: &str = r#"{"points": [
        {"ref": "Genesis 1:1", "text": "In the beginning", "book": "Genesis", "book_num": 1,
         "testament": "OT", "sx": 1.0, "sy": 0.0, "sz": 0.0},
        {"ref": "John 1:1", "text": "In the beginning was the Word", "book": "John",
         "book_num": 43, "testament": "NT", "sx": 0.0, "sy": 1.0, "sz": 0.0}
    ]}"#;

    const PASSAGES: &str = r#"[
        {"id": 0, "title": "Prologue", "ref": "John 1:1", "book": "John", "book_num": 43,
         "testament": "NT", "chapter": 1, "start_verse": 1, "end_verse": 1,
         "verse_ids": [1], "text": "In the beginning was the Word"}
    ]"#;

    fn files() -> AssetsConfig {
        AssetsConfig::default()
    }

    fn memory_source(passage_rows: usize) -> MemoryAssetSource {
        let files = files();
        let mut verse_store = quantize_vector(&[1.0, 0.0]);
        verse_store.extend(quantize_vector(&[0.0, 1.0]));
        let passage_store: Vec<u8> = (0..passage_rows)
            .flat_map(|_| quantize_vector(&[0.0, 1.0]))
            .collect();

        MemoryAssetSource::new()
            .with_file(files.verses_file.clone(), SPHERE)
            .with_file(files.verse_embeddings_file.clone(), verse_store)
            .with_file(files.passages_file.clone(), PASSAGES)
            .with_file(files.passage_embeddings_file.clone(), passage_store)
    }

    #[tokio::test]
    async fn test_load_without_alternates() {
        let source = memory_source(1);
        let assets = load_search_assets(&source, &files(), 2).await.unwrap();

        assert_eq!(assets.verses.len(), 2);
        assert_eq!(assets.passages.len(), 1);
        assert!(!assets.verses.has_alternates());
        assert_eq!(assets.store(SearchMode::Passages).item_count(), 1);
        assert_eq!(assets.book_of(SearchMode::Verses, 1), Some(43));
        assert_eq!(assets.book_of(SearchMode::Passages, 5), None);
    }

    #[tokio::test]
    async fn test_load_with_alternates() {
        let files = files();
        let source = memory_source(1).with_file(
            files.alternates_file.clone().unwrap(),
            r#"["", "In the beginning was the Word (BSB)"]"#,
        );

        let assets = load_search_assets(&source, &files, 2).await.unwrap();
        assert!(assets.verses.has_alternates());
        assert!(assets.verses.get(0).unwrap().alternate_text.is_none());
    }

    #[tokio::test]
    async fn test_count_mismatch() {
        let source = memory_source(3);
        let err = load_search_assets(&source, &files(), 2).await.unwrap_err();
        assert!(matches!(
            err,
            AssetError::CountMismatch {
                store_items: 3,
                corpus_items: 1,
                ..
            }
        ));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_missing_required_file() {
        let files = files();
        let source = MemoryAssetSource::new().with_file(files.verses_file.clone(), SPHERE);
        let err = load_search_assets(&source, &files, 2).await.unwrap_err();
        assert!(matches!(err, AssetError::Io { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_wrong_dimension_is_malformed() {
        // 2 verses * 2 components = 4 bytes, not a multiple of 3
        let source = memory_source(1);
        let err = load_search_assets(&source, &files(), 3).await.unwrap_err();
        assert!(matches!(err, AssetError::MalformedStore { .. }));
    }

    #[test]
    fn test_stores_must_share_dimension() {
        let verses = VerseIndex::from_json(SPHERE.as_bytes()).unwrap();
        let passages = PassageIndex::from_json(PASSAGES.as_bytes()).unwrap();
        let verse_store = QuantizedStore::from_bytes("verses", vec![127; 4], 2).unwrap();
        let passage_store = QuantizedStore::from_bytes("passages", vec![127; 4], 4).unwrap();

        let err = SearchAssets::new(verses, verse_store, passages, passage_store).unwrap_err();
        assert!(matches!(
            err,
            AssetError::DimensionMismatch {
                expected: 2,
                actual: 4,
                ..
            }
        ));
    }

    #[test]
    fn test_source_from_config() {
        let mut config = files();
        config.base = "https://example.org/data/".to_string();
        assert_eq!(
            source_from_config(&config).unwrap().describe(),
            "https://example.org/data"
        );

        config.base = "/srv/versemap".to_string();
        assert_eq!(
            source_from_config(&config).unwrap().describe(),
            "/srv/versemap"
        );
    }
}
