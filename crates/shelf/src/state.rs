use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use common::{is_track_hash, TrackRecord};
use library::{Collection, IndexStats, LibraryError, SearchOptions};
use tokio::task::JoinError;
use tracing::{debug, info};

use crate::config::{resolve_path, ConfigError, ShelfConfig};
use crate::file_ids::FileIdCache;
use crate::normalize::{NormalizeSettings, Normalizer};
use crate::paging::{PageToken, WindowKind};
use crate::scan;
use crate::store::StoreError;
use crate::transcode::FfmpegTranscoder;
use crate::votes::VoteStore;

/// Everything the front end talks to: the collection, ratings and the
/// uploaded-file identifiers.
pub struct Shelf {
    config: ShelfConfig,
    search: SearchOptions,
    collection: Collection,
    votes: VoteStore,
    file_ids: FileIdCache,
    normalizer: Arc<Normalizer<FfmpegTranscoder>>,
}

impl Shelf {
    /// Validates `config`, scans the collection and opens both stores.
    /// Relative paths resolve against `config_path`.
    pub async fn open(config_path: &Path, config: ShelfConfig) -> Result<Self, ShelfError> {
        config.validate()?;
        let root = resolve_path(config_path, &config.collection_path);
        let (collection, stats) = scan::open::<ShelfError>(root, config.index_options()).await?;
        info!("Indexed {} tracks ({} skipped)", stats.tracks, stats.skipped);

        let votes = VoteStore::open(&resolve_path(config_path, &config.votes_path))?;
        let file_ids = FileIdCache::open(&resolve_path(config_path, &config.file_ids_path))?;
        Ok(Self::from_parts(config, collection, votes, file_ids))
    }

    pub fn from_parts(
        config: ShelfConfig,
        collection: Collection,
        votes: VoteStore,
        file_ids: FileIdCache,
    ) -> Self {
        let normalize = &config.normalize;
        let transcoder = FfmpegTranscoder::new(
            normalize.transcoder.clone(),
            Duration::from_secs(normalize.timeout_secs),
        );
        let normalizer = Arc::new(Normalizer::new(
            collection.clone(),
            transcoder,
            NormalizeSettings::from(normalize),
        ));
        Self {
            search: config.search.to_options(),
            config,
            collection,
            votes,
            file_ids,
            normalizer,
        }
    }

    pub fn config(&self) -> &ShelfConfig {
        &self.config
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    pub async fn reindex(&self) -> Result<IndexStats, ShelfError> {
        scan::reindex::<ShelfError>(&self.collection).await
    }

    /// The shelf's single normalizer; every caller shares its run guard.
    pub fn normalizer(&self) -> Arc<Normalizer<FfmpegTranscoder>> {
        Arc::clone(&self.normalizer)
    }

    pub fn search(&self, query: &str) -> Vec<String> {
        let found = self.collection.snapshot().search(query, &self.search);
        debug!("Search '{}' found {} tracks", query, found.len());
        found
    }

    pub fn random(&self) -> Option<String> {
        self.collection.snapshot().random().map(str::to_string)
    }

    pub fn random_many(&self, count: usize) -> Vec<String> {
        self.collection
            .snapshot()
            .random_many(count)
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub fn exists(&self, caption: &str) -> bool {
        self.collection.snapshot().exists(caption)
    }

    pub fn get_by_hash(&self, hash: &str) -> Option<String> {
        if !is_track_hash(hash) {
            return None;
        }
        self.collection.snapshot().get_by_hash(hash).map(str::to_string)
    }

    pub fn track(&self, caption: &str) -> Option<TrackRecord> {
        self.collection.snapshot().get(caption).cloned()
    }

    /// Records a vote for the track behind `hash` and returns its caption.
    pub fn rate_by_hash(&self, user: &str, hash: &str) -> Result<String, ShelfError> {
        let caption = self
            .get_by_hash(hash)
            .ok_or_else(|| ShelfError::NotFound(hash.to_string()))?;
        self.votes.rate(user, &caption)?;
        info!("{} rated '{}'", user, caption);
        Ok(caption)
    }

    pub fn votes(&self, caption: &str) -> Result<usize, ShelfError> {
        Ok(self.votes.votes(caption)?)
    }

    /// The user's rated tracks that are still in the collection.
    pub fn liked(&self, user: &str) -> Result<Vec<String>, ShelfError> {
        let index = self.collection.snapshot();
        Ok(self
            .votes
            .liked_tracks(user)?
            .into_iter()
            .filter(|caption| index.exists(caption))
            .collect())
    }

    /// Most rated tracks still in the collection, at most `top_limit`.
    pub fn top(&self) -> Result<Vec<String>, ShelfError> {
        self.top_n(self.config.top_limit)
    }

    pub fn top_n(&self, limit: usize) -> Result<Vec<String>, ShelfError> {
        let index = self.collection.snapshot();
        Ok(self
            .votes
            .top(usize::MAX)?
            .into_iter()
            .filter(|caption| index.exists(caption))
            .take(limit)
            .collect())
    }

    pub fn first_window(&self, kind: WindowKind, count: usize) -> Option<PageToken> {
        PageToken::first(kind, self.config.page_size, count)
    }

    /// Re-runs the list behind `token` and returns the captions of its
    /// window. `query` is used for search windows, `user` for liked ones.
    pub fn window(
        &self,
        token: &PageToken,
        query: &str,
        user: &str,
    ) -> Result<Vec<String>, ShelfError> {
        let items = match token.kind {
            WindowKind::Search => self.search(query),
            WindowKind::Liked => self.liked(user)?,
            WindowKind::Top => self.top()?,
        };
        Ok(token.slice(&items).to_vec())
    }

    /// Cached provider identifier for the file behind `caption`.
    pub fn file_id(&self, caption: &str) -> Result<Option<String>, ShelfError> {
        match self.filename(caption) {
            Some(filename) => Ok(self.file_ids.get(&filename)?),
            None => Ok(None),
        }
    }

    pub fn remember_file_id(&self, caption: &str, id: &str) -> Result<(), ShelfError> {
        let filename = self
            .filename(caption)
            .ok_or_else(|| ShelfError::NotFound(caption.to_string()))?;
        self.file_ids.set(&filename, id)?;
        Ok(())
    }

    /// Drops an identifier the provider no longer accepts.
    pub fn forget_file_id(&self, caption: &str) -> Result<bool, ShelfError> {
        match self.filename(caption) {
            Some(filename) => Ok(self.file_ids.remove(&filename)?),
            None => Ok(false),
        }
    }

    fn filename(&self, caption: &str) -> Option<String> {
        self.collection
            .snapshot()
            .filename(caption)
            .map(str::to_string)
    }
}

#[derive(Debug)]
pub enum ShelfError {
    Library(LibraryError),
    Store(StoreError),
    Config(ConfigError),
    Join(JoinError),
    NotFound(String),
}

impl std::fmt::Display for ShelfError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShelfError::Library(err) => write!(f, "library error: {}", err),
            ShelfError::Store(err) => write!(f, "store error: {}", err),
            ShelfError::Config(err) => write!(f, "{}", err),
            ShelfError::Join(err) => write!(f, "task join error: {}", err),
            ShelfError::NotFound(key) => write!(f, "no track for '{}'", key),
        }
    }
}

impl std::error::Error for ShelfError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ShelfError::Library(err) => Some(err),
            ShelfError::Store(err) => Some(err),
            ShelfError::Config(err) => Some(err),
            ShelfError::Join(err) => Some(err),
            ShelfError::NotFound(_) => None,
        }
    }
}

impl From<LibraryError> for ShelfError {
    fn from(err: LibraryError) -> Self {
        ShelfError::Library(err)
    }
}

impl From<StoreError> for ShelfError {
    fn from(err: StoreError) -> Self {
        ShelfError::Store(err)
    }
}

impl From<ConfigError> for ShelfError {
    fn from(err: ConfigError) -> Self {
        ShelfError::Config(err)
    }
}

impl From<JoinError> for ShelfError {
    fn from(err: JoinError) -> Self {
        ShelfError::Join(err)
    }
}
