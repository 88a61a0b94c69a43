use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::normalize::NormalizeError;

/// The external tool that concatenates and segments audio without
/// re-encoding.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn probe_bitrate_kbps(&self, path: &Path) -> Result<u32, NormalizeError>;

    /// Joins `inputs` in order into `output`.
    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> Result<(), NormalizeError>;

    /// Cuts `input` into chunks of `segment_secs`, written into `out_dir` as
    /// `<stem> (<part_label> N).<ext>` numbered from 1. Returns the produced
    /// files in order.
    async fn segment(
        &self,
        input: &Path,
        out_dir: &Path,
        segment_secs: u64,
        part_label: &str,
    ) -> Result<Vec<PathBuf>, NormalizeError>;
}

#[derive(Clone, Debug)]
pub struct FfmpegTranscoder {
    program: String,
    timeout: Duration,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    async fn run(&self, args: Vec<OsString>) -> Result<(), NormalizeError> {
        debug!("Running {} {:?}", self.program, args);
        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => return Err(NormalizeError::Timeout(self.timeout)),
        };
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
        let message = tail.into_iter().rev().collect::<Vec<_>>().join("\n");
        Err(NormalizeError::Tool(format!(
            "{} exited with {}: {}",
            self.program, output.status, message
        )))
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn probe_bitrate_kbps(&self, path: &Path) -> Result<u32, NormalizeError> {
        let path = path.to_path_buf();
        let kbps = tokio::task::spawn_blocking(move || metadata::probe_bitrate_kbps(&path))
            .await
            .map_err(|err| NormalizeError::Tool(format!("bitrate probe failed: {}", err)))??;
        Ok(kbps)
    }

    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> Result<(), NormalizeError> {
        let list_path = concat_list_path(output);
        tokio::fs::write(&list_path, concat_list(inputs)).await?;

        let args: Vec<OsString> = vec![
            "-hide_banner".into(),
            "-nostdin".into(),
            "-n".into(),
            "-f".into(),
            "concat".into(),
            "-safe".into(),
            "0".into(),
            "-i".into(),
            list_path.clone().into_os_string(),
            "-map_metadata".into(),
            "0".into(),
            "-c".into(),
            "copy".into(),
            output.as_os_str().to_os_string(),
        ];
        let result = self.run(args).await;
        let _ = tokio::fs::remove_file(&list_path).await;
        result
    }

    async fn segment(
        &self,
        input: &Path,
        out_dir: &Path,
        segment_secs: u64,
        part_label: &str,
    ) -> Result<Vec<PathBuf>, NormalizeError> {
        let staged = staged_path(input, out_dir);
        let pattern = segment_pattern(&staged, part_label);
        let args: Vec<OsString> = vec![
            "-hide_banner".into(),
            "-nostdin".into(),
            "-n".into(),
            "-i".into(),
            input.as_os_str().to_os_string(),
            "-f".into(),
            "segment".into(),
            "-segment_time".into(),
            segment_secs.to_string().into(),
            "-segment_start_number".into(),
            "1".into(),
            "-c".into(),
            "copy".into(),
            pattern.into_os_string(),
        ];
        self.run(args).await?;
        Ok(existing_segments(&staged, part_label))
    }
}

fn concat_list_path(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".concat.txt");
    output.with_file_name(name)
}

/// Concat demuxer list; single quotes inside paths are escaped as `'\''`.
fn concat_list(inputs: &[PathBuf]) -> String {
    let mut list = String::new();
    for input in inputs {
        let escaped = input.to_string_lossy().replace('\'', r"'\''");
        list.push_str(&format!("file '{}'\n", escaped));
    }
    list
}

/// Path of the `number`-th segment of `input`.
pub fn segment_path(input: &Path, part_label: &str, number: u32) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = match input.extension() {
        Some(ext) => format!("{} ({} {}).{}", stem, part_label, number, ext.to_string_lossy()),
        None => format!("{} ({} {})", stem, part_label, number),
    };
    input.with_file_name(name)
}

/// Where `input` would sit inside `out_dir`; segment names derive from it.
pub fn staged_path(input: &Path, out_dir: &Path) -> PathBuf {
    match input.file_name() {
        Some(name) => out_dir.join(name),
        None => out_dir.to_path_buf(),
    }
}

/// Output template for the segment muxer; literal `%` is doubled.
fn segment_pattern(input: &Path, part_label: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().replace('%', "%%"))
        .unwrap_or_default();
    let label = part_label.replace('%', "%%");
    let name = match input.extension() {
        Some(ext) => format!(
            "{} ({} %d).{}",
            stem,
            label,
            ext.to_string_lossy().replace('%', "%%")
        ),
        None => format!("{} ({} %d)", stem, label),
    };
    input.with_file_name(name)
}

/// Numbered segments of `input` that exist on disk, stopping at the first gap.
pub fn existing_segments(input: &Path, part_label: &str) -> Vec<PathBuf> {
    let mut segments = Vec::new();
    for number in 1u32.. {
        let path = segment_path(input, part_label, number);
        if !path.is_file() {
            break;
        }
        segments.push(path);
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn names_segments_after_input() {
        let input = Path::new("/audio/Gogol - Dead Souls.mp3");
        assert_eq!(
            segment_path(input, "Part", 2),
            PathBuf::from("/audio/Gogol - Dead Souls (Part 2).mp3")
        );
        assert_eq!(
            segment_pattern(Path::new("/audio/100% Hits.mp3"), "Part"),
            PathBuf::from("/audio/100%% Hits (Part %d).mp3")
        );
        let staged = staged_path(input, Path::new("/audio/.split"));
        assert_eq!(
            segment_path(&staged, "Part", 1),
            PathBuf::from("/audio/.split/Gogol - Dead Souls (Part 1).mp3")
        );
    }

    #[test]
    fn collects_contiguous_segments() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("Book.mp3");
        for number in [1, 2, 4] {
            fs::write(segment_path(&input, "Part", number), b"x").unwrap();
        }
        assert_eq!(
            existing_segments(&input, "Part"),
            vec![dir.path().join("Book (Part 1).mp3"), dir.path().join("Book (Part 2).mp3")]
        );
    }

    #[test]
    fn concat_list_quotes_paths() {
        let list = concat_list(&[PathBuf::from("/a/It's.mp3"), PathBuf::from("/a/b.mp3")]);
        assert_eq!(list, "file '/a/It'\\''s.mp3'\nfile '/a/b.mp3'\n");
        assert_eq!(
            concat_list_path(Path::new("/a/Book.mp3")),
            PathBuf::from("/a/Book.mp3.concat.txt")
        );
    }

    #[tokio::test]
    async fn failing_tool_reports_error() {
        let transcoder = FfmpegTranscoder::new("false", Duration::from_secs(5));
        let err = transcoder.run(Vec::new()).await.unwrap_err();
        assert!(matches!(err, NormalizeError::Tool(_)));
    }

    #[tokio::test]
    async fn missing_tool_is_io_error() {
        let transcoder =
            FfmpegTranscoder::new("definitely-not-a-real-transcoder", Duration::from_secs(5));
        let err = transcoder.run(Vec::new()).await.unwrap_err();
        assert!(matches!(err, NormalizeError::Io(_)));
    }

    #[tokio::test]
    async fn slow_tool_times_out() {
        let transcoder = FfmpegTranscoder::new("sleep", Duration::from_millis(100));
        let err = transcoder.run(vec!["5".into()]).await.unwrap_err();
        assert!(matches!(err, NormalizeError::Timeout(_)));
    }
}
