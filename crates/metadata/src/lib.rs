use std::path::Path;

use common::normalize_caption;
use lofty::config::WriteOptions;
use lofty::error::LoftyError;
use lofty::prelude::{Accessor, AudioFile, ItemKey, TagExt, TaggedFileExt};
use lofty::tag::Tag;
use serde::{Deserialize, Serialize};

const AUTHOR_SEPARATOR: &str = " - ";

/// Where author and title come from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataMode {
    /// "Author - Title" file naming convention.
    #[default]
    Filename,
    /// Embedded tag data.
    Tags,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TrackMetadata {
    pub author: String,
    pub title: String,
    pub album: Option<String>,
    pub length_secs: u64,
    pub filename: String,
}

#[derive(Debug, Default, Clone)]
pub struct TagInfo {
    pub artist: Option<String>,
    pub album: Option<String>,
    pub title: Option<String>,
    pub duration_secs: u64,
    pub bitrate_kbps: Option<u32>,
}

#[derive(Debug)]
pub enum MetadataError {
    Io(std::io::Error),
    Lofty(LoftyError),
    NoBitrate,
}

impl std::fmt::Display for MetadataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataError::Io(err) => write!(f, "io error: {}", err),
            MetadataError::Lofty(err) => write!(f, "tag error: {}", err),
            MetadataError::NoBitrate => write!(f, "audio bitrate unavailable"),
        }
    }
}

impl std::error::Error for MetadataError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MetadataError::Io(err) => Some(err),
            MetadataError::Lofty(err) => Some(err),
            MetadataError::NoBitrate => None,
        }
    }
}

impl From<std::io::Error> for MetadataError {
    fn from(err: std::io::Error) -> Self {
        MetadataError::Io(err)
    }
}

impl From<LoftyError> for MetadataError {
    fn from(err: LoftyError) -> Self {
        MetadataError::Lofty(err)
    }
}

/// Reads author, title, album and length of one audio file.
///
/// The stream is always decoded for its duration, so an unreadable file
/// fails in both modes.
pub fn extract(path: &Path, mode: MetadataMode) -> Result<TrackMetadata, MetadataError> {
    let tag = read_tags(path)?;
    let filename = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let (author, title, album) = match mode {
        MetadataMode::Filename => {
            let (author, title) = split_author_title(&file_stem(path));
            (author, title, None)
        }
        MetadataMode::Tags => (
            tag.artist.unwrap_or_default(),
            tag.title.unwrap_or_default(),
            Some(tag.album.unwrap_or_default()),
        ),
    };

    Ok(TrackMetadata {
        author,
        title,
        album,
        length_secs: tag.duration_secs,
        filename,
    })
}

pub fn read_tags(path: &Path) -> Result<TagInfo, MetadataError> {
    let tagged_file = lofty::read_from_path(path)?;
    let properties = tagged_file.properties();

    let mut info = TagInfo {
        duration_secs: properties.duration().as_secs(),
        bitrate_kbps: properties
            .audio_bitrate()
            .or(properties.overall_bitrate())
            .filter(|kbps| *kbps > 0),
        ..TagInfo::default()
    };

    if let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
        info.title = non_empty(tag.get_string(&ItemKey::TrackTitle));
        info.album = non_empty(tag.get_string(&ItemKey::AlbumTitle));
        let track_artist = non_empty(tag.get_string(&ItemKey::TrackArtist));
        let album_artist = non_empty(tag.get_string(&ItemKey::AlbumArtist));
        info.artist = track_artist.or(album_artist);
    }

    Ok(info)
}

pub fn probe_bitrate_kbps(path: &Path) -> Result<u32, MetadataError> {
    read_tags(path)?.bitrate_kbps.ok_or(MetadataError::NoBitrate)
}

pub fn read_title(path: &Path) -> Result<Option<String>, MetadataError> {
    Ok(read_tags(path)?.title)
}

/// Rewrites the title tag, creating the file's primary tag when it has none.
pub fn write_title(path: &Path, title: &str) -> Result<(), MetadataError> {
    let mut tagged_file = lofty::read_from_path(path)?;
    if tagged_file.primary_tag().is_none() && tagged_file.first_tag().is_none() {
        let tag_type = tagged_file.primary_tag_type();
        tagged_file.insert_tag(Tag::new(tag_type));
    }

    let tag = if tagged_file.primary_tag().is_some() {
        tagged_file.primary_tag_mut()
    } else {
        tagged_file.first_tag_mut()
    };
    if let Some(tag) = tag {
        tag.set_title(title.to_string());
        tag.save_to_path(path, WriteOptions::default())?;
    }
    Ok(())
}

/// Splits a name on the first `" - "`; without a separator the author is
/// empty and the whole name is the title.
pub fn split_author_title(name: &str) -> (String, String) {
    match name.split_once(AUTHOR_SEPARATOR) {
        Some((author, title)) => (author.trim().to_string(), title.trim().to_string()),
        None => (String::new(), name.to_string()),
    }
}

/// File name without extension, whitespace normalized.
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| normalize_caption(&s.to_string_lossy()))
        .unwrap_or_default()
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
}
