use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use common::file_stem_for_caption;
use library::parts::{is_part, part_number, part_suffix, strip_part_marker};
use library::{Collection, CollectionIndex, IndexStats, LibraryError};
use metadata::{split_author_title, MetadataError};
use tokio::sync::Mutex;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::NormalizeConfig;
use crate::scan;
use crate::transcode::{segment_path, staged_path, Transcoder};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizeSettings {
    pub size_limit_bytes: u64,
    pub segment_budget_bytes: u64,
    pub part_label: String,
}

impl Default for NormalizeSettings {
    fn default() -> Self {
        Self::from(&NormalizeConfig::default())
    }
}

impl From<&NormalizeConfig> for NormalizeSettings {
    fn from(config: &NormalizeConfig) -> Self {
        Self {
            size_limit_bytes: config.size_limit_bytes,
            segment_budget_bytes: config.segment_budget_bytes,
            part_label: config.part_label.clone(),
        }
    }
}

/// Parts of one recording, in playback order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartGroup {
    pub base_caption: String,
    pub paths: Vec<PathBuf>,
}

#[derive(Debug)]
pub struct UnitFailure {
    /// Base caption of a merge group or path of a split file.
    pub unit: String,
    pub error: NormalizeError,
}

#[derive(Debug, Default)]
pub struct NormalizeReport {
    pub merged: Vec<String>,
    pub split: Vec<PathBuf>,
    pub failures: Vec<UnitFailure>,
    pub cancelled: bool,
    pub stats: IndexStats,
}

#[derive(Debug)]
pub enum NormalizeError {
    Tool(String),
    Timeout(Duration),
    Io(std::io::Error),
    Metadata(MetadataError),
    Library(LibraryError),
    Join(JoinError),
    OutputExists(PathBuf),
    MissingOutput(PathBuf),
    Oversized { path: PathBuf, size: u64 },
    AlreadyRunning,
}

impl std::fmt::Display for NormalizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NormalizeError::Tool(message) => write!(f, "transcoder failed: {}", message),
            NormalizeError::Timeout(limit) => {
                write!(f, "transcoder timed out after {}s", limit.as_secs())
            }
            NormalizeError::Io(err) => write!(f, "io error: {}", err),
            NormalizeError::Metadata(err) => write!(f, "metadata error: {}", err),
            NormalizeError::Library(err) => write!(f, "library error: {}", err),
            NormalizeError::Join(err) => write!(f, "task join error: {}", err),
            NormalizeError::OutputExists(path) => write!(f, "output {:?} already exists", path),
            NormalizeError::MissingOutput(path) => {
                write!(f, "output {:?} is missing or empty", path)
            }
            NormalizeError::Oversized { path, size } => {
                write!(f, "output {:?} is still too large ({} bytes)", path, size)
            }
            NormalizeError::AlreadyRunning => write!(f, "normalization is already running"),
        }
    }
}

impl std::error::Error for NormalizeError {}

impl From<std::io::Error> for NormalizeError {
    fn from(err: std::io::Error) -> Self {
        NormalizeError::Io(err)
    }
}

impl From<MetadataError> for NormalizeError {
    fn from(err: MetadataError) -> Self {
        NormalizeError::Metadata(err)
    }
}

impl From<LibraryError> for NormalizeError {
    fn from(err: LibraryError) -> Self {
        NormalizeError::Library(err)
    }
}

impl From<JoinError> for NormalizeError {
    fn from(err: JoinError) -> Self {
        NormalizeError::Join(err)
    }
}

/// Groups part-marked captions by their unmarked caption, keeping only
/// groups with at least one file over `size_limit`.
pub fn collect_part_groups(index: &CollectionIndex, size_limit: u64) -> Vec<PartGroup> {
    let mut groups: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for record in index.records() {
        if is_part(&record.caption) {
            groups
                .entry(strip_part_marker(&record.caption))
                .or_default()
                .push(record.path.clone());
        }
    }

    groups
        .into_iter()
        .filter(|(_, paths)| paths.iter().any(|path| file_size(path) > size_limit))
        .map(|(base_caption, mut paths)| {
            sort_parts(&mut paths);
            PartGroup {
                base_caption,
                paths,
            }
        })
        .collect()
}

pub fn collect_oversized(index: &CollectionIndex, size_limit: u64) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = index
        .records()
        .filter(|record| file_size(&record.path) > size_limit)
        .map(|record| record.path.clone())
        .collect();
    paths.sort();
    paths
}

/// Longest segment that stays within `budget_bytes` at `bitrate_kbps`.
pub fn segment_seconds(budget_bytes: u64, bitrate_kbps: u32) -> u64 {
    if bitrate_kbps == 0 {
        return 0;
    }
    budget_bytes * 8 / (u64::from(bitrate_kbps) * 1000)
}

/// Orders by the number in the part marker so "Part 10" follows "Part 9".
fn sort_parts(paths: &mut [PathBuf]) {
    paths.sort_by_cached_key(|path| {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        (part_number(&stem).unwrap_or(0), path.clone())
    });
}

fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|meta| meta.len()).unwrap_or(0)
}

pub fn merge_output_path(group: &PartGroup) -> Option<PathBuf> {
    let first = group.paths.first()?;
    let mut name = file_stem_for_caption(&group.base_caption);
    if let Some(ext) = first.extension() {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }
    Some(first.with_file_name(name))
}

pub struct Normalizer<T> {
    collection: Collection,
    transcoder: T,
    settings: NormalizeSettings,
    pub(crate) running: Mutex<()>,
}

impl<T: Transcoder> Normalizer<T> {
    pub fn new(collection: Collection, transcoder: T, settings: NormalizeSettings) -> Self {
        Self {
            collection,
            transcoder,
            settings,
            running: Mutex::new(()),
        }
    }

    /// Merges oversized part groups, reindexes, splits oversized files and
    /// reindexes again. Failures are collected per unit; only a failed
    /// reindex or a concurrent run abort the whole pass.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<NormalizeReport, NormalizeError> {
        let _guard = self
            .running
            .try_lock()
            .map_err(|_| NormalizeError::AlreadyRunning)?;
        let mut report = NormalizeReport::default();

        let groups = collect_part_groups(&self.collection.snapshot(), self.settings.size_limit_bytes);
        info!("Merging {} part groups", groups.len());
        for group in groups {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            match self.merge_group(&group).await {
                Ok(output) => {
                    info!("Merged {} parts into {:?}", group.paths.len(), output);
                    report.merged.push(group.base_caption);
                }
                Err(err) => {
                    warn!("Merge of '{}' failed: {}", group.base_caption, err);
                    report.failures.push(UnitFailure {
                        unit: group.base_caption,
                        error: err,
                    });
                }
            }
        }

        info!("Reindexing...");
        report.stats = scan::reindex::<NormalizeError>(&self.collection).await?;
        if report.cancelled {
            return Ok(report);
        }

        let oversized = collect_oversized(&self.collection.snapshot(), self.settings.size_limit_bytes);
        info!("Splitting {} oversized files", oversized.len());
        for path in oversized {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            match self.split_file(&path).await {
                Ok(parts) => {
                    info!("Split {:?} into {} parts", path, parts.len());
                    report.split.push(path);
                }
                Err(err) => {
                    warn!("Split of {:?} failed: {}", path, err);
                    report.failures.push(UnitFailure {
                        unit: path.to_string_lossy().to_string(),
                        error: err,
                    });
                }
            }
        }

        info!("Reindexing...");
        report.stats = scan::reindex::<NormalizeError>(&self.collection).await?;
        Ok(report)
    }

    async fn merge_group(&self, group: &PartGroup) -> Result<PathBuf, NormalizeError> {
        let output = merge_output_path(group)
            .ok_or_else(|| NormalizeError::Tool("empty part group".to_string()))?;
        if tokio::fs::try_exists(&output).await? {
            return Err(NormalizeError::OutputExists(output));
        }

        if let Err(err) = self.transcoder.concat(&group.paths, &output).await {
            remove_quietly(&output).await;
            return Err(err);
        }
        if file_size(&output) == 0 {
            remove_quietly(&output).await;
            return Err(NormalizeError::MissingOutput(output));
        }

        let source = group.paths[0].clone();
        let fallback = split_author_title(&group.base_caption).1;
        let target = output.clone();
        let retitled = tokio::task::spawn_blocking(move || {
            let title = metadata::read_title(&source)?
                .map(|title| strip_part_marker(&title))
                .filter(|title| !title.is_empty())
                .unwrap_or(fallback);
            metadata::write_title(&target, &title)
        })
        .await?;
        if let Err(err) = retitled {
            warn!("Failed to fix title of {:?}: {}", output, err);
        }

        for part in &group.paths {
            tokio::fs::remove_file(part).await?;
        }
        Ok(output)
    }

    /// Segments into a private staging directory, then moves the parts next
    /// to `path`. Files that already sit at a part's final name are never
    /// touched; the unit fails with `OutputExists` instead.
    async fn split_file(&self, path: &Path) -> Result<Vec<PathBuf>, NormalizeError> {
        let staging = staging_dir(path);
        if tokio::fs::try_exists(&staging).await? {
            return Err(NormalizeError::OutputExists(staging));
        }

        let kbps = self.transcoder.probe_bitrate_kbps(path).await?;
        let seconds = segment_seconds(self.settings.segment_budget_bytes, kbps);
        if seconds == 0 {
            return Err(NormalizeError::Tool(format!(
                "bitrate {} kbps leaves no room for a segment",
                kbps
            )));
        }
        info!("{:?} bitrate: {} kbps, segment time: {}s", path, kbps, seconds);

        tokio::fs::create_dir(&staging).await?;
        let result = self.split_staged(path, &staging, seconds).await;
        if let Err(err) = tokio::fs::remove_dir_all(&staging).await {
            warn!("Failed to remove {:?}: {}", staging, err);
        }
        result
    }

    async fn split_staged(
        &self,
        path: &Path,
        staging: &Path,
        seconds: u64,
    ) -> Result<Vec<PathBuf>, NormalizeError> {
        let label = self.settings.part_label.as_str();
        let staged = self.transcoder.segment(path, staging, seconds, label).await?;
        self.verify_segments(&staged_path(path, staging), &staged)?;

        let mut targets = Vec::with_capacity(staged.len());
        for part in &staged {
            let name = part
                .file_name()
                .ok_or_else(|| NormalizeError::MissingOutput(part.clone()))?;
            let target = path.with_file_name(name);
            if tokio::fs::try_exists(&target).await? {
                return Err(NormalizeError::OutputExists(target));
            }
            targets.push(target);
        }

        let fallback = split_author_title(&metadata::file_stem(path)).1;
        let titled = staged.clone();
        let label = label.to_string();
        tokio::task::spawn_blocking(move || {
            for (index, part) in titled.iter().enumerate() {
                let number = index as u32 + 1;
                let base = match metadata::read_title(part) {
                    Ok(Some(title)) => title,
                    _ => fallback.clone(),
                };
                let title = format!("{} {}", base, part_suffix(&label, number));
                if let Err(err) = metadata::write_title(part, &title) {
                    warn!("Failed to fix title of {:?}: {}", part, err);
                }
            }
        })
        .await?;

        let mut moved: Vec<PathBuf> = Vec::with_capacity(targets.len());
        for (part, target) in staged.iter().zip(targets) {
            if let Err(err) = tokio::fs::rename(part, &target).await {
                for done in &moved {
                    remove_quietly(done).await;
                }
                return Err(err.into());
            }
            moved.push(target);
        }

        tokio::fs::remove_file(path).await?;
        Ok(moved)
    }

    fn verify_segments(&self, staged: &Path, parts: &[PathBuf]) -> Result<(), NormalizeError> {
        if parts.is_empty() {
            return Err(NormalizeError::MissingOutput(segment_path(
                staged,
                &self.settings.part_label,
                1,
            )));
        }
        for part in parts {
            let size = file_size(part);
            if size == 0 {
                return Err(NormalizeError::MissingOutput(part.clone()));
            }
            if size >= self.settings.size_limit_bytes {
                return Err(NormalizeError::Oversized {
                    path: part.clone(),
                    size,
                });
            }
        }
        Ok(())
    }
}

/// Hidden per-file directory beside `path` that holds segments until they
/// are verified.
fn staging_dir(path: &Path) -> PathBuf {
    let mut name = std::ffi::OsString::from(".");
    if let Some(file_name) = path.file_name() {
        name.push(file_name);
    }
    name.push(".split");
    path.with_file_name(name)
}

async fn remove_quietly(path: &Path) {
    if let Err(err) = tokio::fs::remove_file(path).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove {:?}: {}", path, err);
        }
    }
}
