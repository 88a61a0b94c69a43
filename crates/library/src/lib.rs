pub mod parts;
pub mod search;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::{caption_hash, normalize_caption, TrackRecord};
use metadata::{extract, file_stem, MetadataMode, TrackMetadata};
use parking_lot::{Mutex, RwLock};
use rand::seq::IndexedRandom;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub use search::SearchOptions;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexOptions {
    pub mode: MetadataMode,
    /// Lowercase extensions without the leading dot.
    pub extensions: Vec<String>,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            mode: MetadataMode::Filename,
            extensions: vec!["mp3".to_string()],
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub tracks: usize,
    pub skipped: usize,
}

/// One immutable snapshot of the collection, keyed by caption.
#[derive(Debug, Default)]
pub struct CollectionIndex {
    tracks: HashMap<String, TrackRecord>,
    by_hash: HashMap<String, String>,
}

impl CollectionIndex {
    pub fn from_records(records: impl IntoIterator<Item = TrackRecord>) -> Self {
        let mut index = Self::default();
        for record in records {
            index.insert(record);
        }
        index
    }

    fn insert(&mut self, record: TrackRecord) {
        let caption = record.caption.clone();
        let hash = record.hash.clone();
        if let Some(previous) = self.tracks.insert(caption.clone(), record) {
            debug!(
                "Duplicate caption '{}': {:?} replaced by a later file",
                caption, previous.path
            );
        }
        self.by_hash.entry(hash).or_insert(caption);
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &TrackRecord> {
        self.tracks.values()
    }

    /// All captions in ascending order.
    pub fn captions(&self) -> Vec<&str> {
        let mut captions: Vec<&str> = self.tracks.keys().map(String::as_str).collect();
        captions.sort_unstable();
        captions
    }

    pub fn get(&self, caption: &str) -> Option<&TrackRecord> {
        self.tracks.get(caption)
    }

    pub fn exists(&self, caption: &str) -> bool {
        self.tracks.contains_key(caption)
    }

    pub fn path(&self, caption: &str) -> Option<&Path> {
        self.get(caption).map(|record| record.path.as_path())
    }

    pub fn filename(&self, caption: &str) -> Option<&str> {
        self.get(caption).map(|record| record.filename.as_str())
    }

    pub fn author(&self, caption: &str) -> Option<&str> {
        self.get(caption).map(|record| record.author.as_str())
    }

    pub fn title(&self, caption: &str) -> Option<&str> {
        self.get(caption).map(|record| record.title.as_str())
    }

    pub fn album(&self, caption: &str) -> Option<&str> {
        self.get(caption).and_then(|record| record.album.as_deref())
    }

    pub fn length(&self, caption: &str) -> Option<u64> {
        self.get(caption).map(|record| record.length)
    }

    pub fn hash(&self, caption: &str) -> Option<&str> {
        self.get(caption).map(|record| record.hash.as_str())
    }

    pub fn get_by_hash(&self, hash: &str) -> Option<&str> {
        self.by_hash.get(hash).map(String::as_str)
    }

    fn whole_recordings(&self) -> Vec<&str> {
        self.tracks
            .keys()
            .map(String::as_str)
            .filter(|caption| !parts::is_part(caption))
            .collect()
    }

    /// A random caption that is not one part of a multi-part recording.
    pub fn random(&self) -> Option<&str> {
        self.whole_recordings().choose(&mut rand::rng()).copied()
    }

    /// Up to `count` distinct random captions, parts excluded.
    pub fn random_many(&self, count: usize) -> Vec<&str> {
        self.whole_recordings()
            .choose_multiple(&mut rand::rng(), count)
            .copied()
            .collect()
    }

    pub fn search(&self, query: &str, options: &SearchOptions) -> Vec<String> {
        search::search(self, query, options)
    }
}

/// The collection rooted at one directory; rebuilds replace the whole
/// snapshot at once.
#[derive(Clone)]
pub struct Collection {
    root: PathBuf,
    options: IndexOptions,
    current: Arc<RwLock<Arc<CollectionIndex>>>,
    rebuild: Arc<Mutex<()>>,
}

impl Collection {
    pub fn open(root: PathBuf, options: IndexOptions) -> Result<(Self, IndexStats), LibraryError> {
        let (index, stats) = build_index(&root, &options)?;
        info!(
            "Collection ready in {:?}: {} tracks ({} skipped)",
            root, stats.tracks, stats.skipped
        );
        let collection = Self {
            root,
            options,
            current: Arc::new(RwLock::new(Arc::new(index))),
            rebuild: Arc::new(Mutex::new(())),
        };
        Ok((collection, stats))
    }

    /// Rebuilds from scratch. On failure the previous snapshot stays live.
    pub fn reindex(&self) -> Result<IndexStats, LibraryError> {
        let _guard = self.rebuild.lock();
        let (index, stats) = build_index(&self.root, &self.options)?;
        *self.current.write() = Arc::new(index);
        info!(
            "Reindexed {:?}: {} tracks ({} skipped)",
            self.root, stats.tracks, stats.skipped
        );
        Ok(stats)
    }

    pub fn snapshot(&self) -> Arc<CollectionIndex> {
        self.current.read().clone()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn options(&self) -> &IndexOptions {
        &self.options
    }
}

#[derive(Debug)]
pub enum LibraryError {
    NotFound(PathBuf),
    Io(std::io::Error),
}

impl std::fmt::Display for LibraryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LibraryError::NotFound(path) => write!(f, "{:?} is not a valid directory", path),
            LibraryError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for LibraryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LibraryError::NotFound(_) => None,
            LibraryError::Io(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for LibraryError {
    fn from(err: std::io::Error) -> Self {
        LibraryError::Io(err)
    }
}

pub fn build_index(
    root: &Path,
    options: &IndexOptions,
) -> Result<(CollectionIndex, IndexStats), LibraryError> {
    if !root.is_dir() {
        return Err(LibraryError::NotFound(root.to_path_buf()));
    }

    let files = collect_audio_files(root, &options.extensions)?;
    info!("Found {} audio files in {:?}", files.len(), root);

    let mut index = CollectionIndex::default();
    let mut skipped = 0usize;
    for file in files {
        let meta = match extract(&file, options.mode) {
            Ok(meta) => meta,
            Err(err) => {
                warn!("Skipping {:?}: {}", file, err);
                skipped += 1;
                continue;
            }
        };
        index.insert(track_record(&file, meta, options.mode));
    }

    let stats = IndexStats {
        tracks: index.len(),
        skipped,
    };
    Ok((index, stats))
}

fn track_record(path: &Path, meta: TrackMetadata, mode: MetadataMode) -> TrackRecord {
    let stem = file_stem(path);
    let caption = match mode {
        MetadataMode::Filename => stem.clone(),
        MetadataMode::Tags => {
            let joined = if meta.author.is_empty() {
                meta.title.clone()
            } else {
                format!("{} - {}", meta.author, meta.title)
            };
            normalize_caption(&joined)
        }
    };
    let caption = if caption.is_empty() { stem } else { caption };

    TrackRecord {
        hash: caption_hash(&caption),
        caption,
        path: path.to_path_buf(),
        author: meta.author,
        title: meta.title,
        album: meta.album,
        filename: meta.filename,
        length: meta.length_secs,
    }
}

fn collect_audio_files(root: &Path, extensions: &[String]) -> Result<Vec<PathBuf>, LibraryError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => {
                let err = err
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("directory walk failed"));
                return Err(err.into());
            }
            Err(err) => {
                warn!("Skipping unreadable entry: {}", err);
                continue;
            }
        };
        if entry.file_type().is_file() && has_audio_extension(entry.path(), extensions) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

fn has_audio_extension(path: &Path, extensions: &[String]) -> bool {
    let ext = match path.extension() {
        Some(ext) => ext.to_string_lossy().to_ascii_lowercase(),
        None => return false,
    };
    extensions.iter().any(|candidate| *candidate == ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_wav(path: &Path) {
        let data_len = 16_000u32;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&8_000u32.to_le_bytes());
        bytes.extend_from_slice(&16_000u32.to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        bytes.resize(44 + data_len as usize, 0);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::File::create(path).unwrap().write_all(&bytes).unwrap();
    }

    fn tag_wav(path: &Path, artist: &str, title: &str, album: &str) {
        use lofty::config::WriteOptions;
        use lofty::prelude::{Accessor, TagExt, TaggedFileExt};
        use lofty::tag::Tag;

        let tagged_file = lofty::read_from_path(path).unwrap();
        let mut tag = Tag::new(tagged_file.primary_tag_type());
        tag.set_title(title.to_string());
        if !artist.is_empty() {
            tag.set_artist(artist.to_string());
        }
        if !album.is_empty() {
            tag.set_album(album.to_string());
        }
        tag.save_to_path(path, WriteOptions::default()).unwrap();
    }

    fn wav_options() -> IndexOptions {
        IndexOptions {
            mode: MetadataMode::Filename,
            extensions: vec!["wav".to_string()],
        }
    }

    #[test]
    fn missing_root_is_not_found() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        match Collection::open(missing.clone(), wav_options()) {
            Err(LibraryError::NotFound(path)) => assert_eq!(path, missing),
            other => panic!("unexpected result: {:?}", other.map(|(_, stats)| stats)),
        }
    }

    #[test]
    fn indexes_nested_files_by_caption() {
        let dir = TempDir::new().unwrap();
        write_wav(&dir.path().join("Pushkin - Eugene Onegin.wav"));
        write_wav(&dir.path().join("nested/deeper/Gogol  -  Dead Souls.WAV"));
        write_wav(&dir.path().join("Untitled recording.wav"));
        fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let (collection, stats) = Collection::open(dir.path().to_path_buf(), wav_options()).unwrap();
        assert_eq!(stats, IndexStats { tracks: 3, skipped: 0 });

        let index = collection.snapshot();
        assert_eq!(
            index.captions(),
            vec!["Gogol - Dead Souls", "Pushkin - Eugene Onegin", "Untitled recording"]
        );
        assert_eq!(index.author("Gogol - Dead Souls"), Some("Gogol"));
        assert_eq!(index.title("Gogol - Dead Souls"), Some("Dead Souls"));
        assert_eq!(index.author("Untitled recording"), Some(""));
        assert_eq!(index.length("Pushkin - Eugene Onegin"), Some(1));
        assert_eq!(
            index.filename("Gogol - Dead Souls"),
            Some("Gogol  -  Dead Souls.WAV")
        );
        assert!(index.path("Gogol - Dead Souls").unwrap().ends_with("deeper/Gogol  -  Dead Souls.WAV"));
        assert!(!index.exists("Gogol"));
        assert_eq!(index.path("missing"), None);
    }

    #[test]
    fn hashes_recompute_from_captions() {
        let dir = TempDir::new().unwrap();
        for name in ["A - One.wav", "B - Two.wav", "Три.wav"] {
            write_wav(&dir.path().join(name));
        }
        let (collection, _) = Collection::open(dir.path().to_path_buf(), wav_options()).unwrap();
        let index = collection.snapshot();
        for record in index.records() {
            assert_eq!(record.hash, caption_hash(&record.caption));
            assert_eq!(index.get_by_hash(&record.hash), Some(record.caption.as_str()));
        }
        assert_eq!(index.get_by_hash("0000000000"), None);
    }

    #[test]
    fn corrupt_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        write_wav(&dir.path().join("Good - Track.wav"));
        fs::write(dir.path().join("Bad - Track.wav"), b"garbage").unwrap();

        let (collection, stats) = Collection::open(dir.path().to_path_buf(), wav_options()).unwrap();
        assert_eq!(stats, IndexStats { tracks: 1, skipped: 1 });
        assert!(collection.snapshot().exists("Good - Track"));
    }

    #[test]
    fn duplicate_captions_keep_last_path() {
        let dir = TempDir::new().unwrap();
        write_wav(&dir.path().join("a/Same - Name.wav"));
        write_wav(&dir.path().join("b/Same  - Name.wav"));

        let (collection, stats) = Collection::open(dir.path().to_path_buf(), wav_options()).unwrap();
        assert_eq!(stats.tracks, 1);
        let index = collection.snapshot();
        assert!(index.path("Same - Name").unwrap().starts_with(dir.path().join("b")));
    }

    #[test]
    fn tag_mode_falls_back_to_stem_without_tags() {
        let dir = TempDir::new().unwrap();
        write_wav(&dir.path().join("No  Tags Here.wav"));
        let options = IndexOptions {
            mode: MetadataMode::Tags,
            ..wav_options()
        };
        let (collection, _) = Collection::open(dir.path().to_path_buf(), options).unwrap();
        let index = collection.snapshot();
        assert!(index.exists("No Tags Here"));
        assert_eq!(index.album("No Tags Here"), Some(""));
    }

    #[test]
    fn random_never_returns_parts() {
        let records = ["Book (Part 1)", "Book (Part 2)", "Whole Book", "Story (chapter 3-4)"]
            .iter()
            .map(|caption| TrackRecord {
                caption: caption.to_string(),
                path: PathBuf::from(format!("/tmp/{}.mp3", caption)),
                author: String::new(),
                title: caption.to_string(),
                album: None,
                filename: format!("{}.mp3", caption),
                length: 1,
                hash: caption_hash(caption),
            });
        let index = CollectionIndex::from_records(records);
        for _ in 0..200 {
            assert_eq!(index.random(), Some("Whole Book"));
        }
        assert_eq!(index.random_many(5), vec!["Whole Book"]);
        assert_eq!(CollectionIndex::default().random(), None);
        assert!(CollectionIndex::default().random_many(3).is_empty());
    }

    #[test]
    fn reindex_swaps_snapshot_for_new_readers_only() {
        let dir = TempDir::new().unwrap();
        write_wav(&dir.path().join("First.wav"));
        let (collection, _) = Collection::open(dir.path().to_path_buf(), wav_options()).unwrap();
        let before = collection.snapshot();

        write_wav(&dir.path().join("Second.wav"));
        fs::remove_file(dir.path().join("First.wav")).unwrap();
        let stats = collection.reindex().unwrap();
        assert_eq!(stats.tracks, 1);

        assert!(before.exists("First"));
        assert!(!before.exists("Second"));
        let after = collection.snapshot();
        assert!(after.exists("Second"));
        assert!(!after.exists("First"));
    }

    #[test]
    fn failed_reindex_keeps_previous_snapshot() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("books");
        write_wav(&root.join("Kept.wav"));
        let (collection, _) = Collection::open(root.clone(), wav_options()).unwrap();

        fs::remove_dir_all(&root).unwrap();
        assert!(matches!(collection.reindex(), Err(LibraryError::NotFound(_))));
        assert!(collection.snapshot().exists("Kept"));
    }

    #[test]
    fn tag_mode_captions_from_embedded_tags() {
        let dir = TempDir::new().unwrap();
        let tagged = dir.path().join("track01.wav");
        write_wav(&tagged);
        tag_wav(&tagged, "Gogol", "Dead  Souls", "Collected Works");
        let title_only = dir.path().join("track02.wav");
        write_wav(&title_only);
        tag_wav(&title_only, "", "The Nose", "");
        write_wav(&dir.path().join("untagged.wav"));

        let options = IndexOptions {
            mode: MetadataMode::Tags,
            ..wav_options()
        };
        let (index, stats) = build_index(dir.path(), &options).unwrap();
        assert_eq!(stats.tracks, 3);

        let caption = "Gogol - Dead Souls";
        assert!(index.exists(caption));
        assert_eq!(index.author(caption), Some("Gogol"));
        assert_eq!(index.title(caption), Some("Dead  Souls"));
        assert_eq!(index.album(caption), Some("Collected Works"));
        assert_eq!(index.filename(caption), Some("track01.wav"));
        assert_eq!(index.path(caption), Some(tagged.as_path()));

        assert!(index.exists("The Nose"));
        assert_eq!(index.author("The Nose"), Some(""));
        assert_eq!(index.album("The Nose"), Some(""));
        assert!(index.exists("untagged"));
    }
}
