//! Out-of-process tag lookup used when a file's embedded artist tag is
//! missing. The probe tool is optional; if it cannot be spawned, the lookup
//! simply yields nothing.

use std::path::Path;
use std::process::{Command, Stdio};

use log::debug;

/// Artist/title pair reported by an external tag reader
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProbedTags {
    pub artist: Option<String>,
    pub title: Option<String>,
}

impl ProbedTags {
    pub fn is_empty(&self) -> bool {
        self.artist.is_none() && self.title.is_none()
    }
}

/// Secondary source of track tags
pub trait TagFallback: Send + Sync {
    /// Look up tags for `path`; `None` when nothing useful was found
    fn lookup(&self, path: &Path) -> Option<ProbedTags>;
}

/// Fallback that never finds anything
pub struct NoTagFallback;

impl TagFallback for NoTagFallback {
    fn lookup(&self, _path: &Path) -> Option<ProbedTags> {
        None
    }
}

/// Tag lookup through `ffprobe` (or a compatible program)
pub struct FfprobeTagReader {
    program: String,
}

impl FfprobeTagReader {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }

    /// Parse `key=value` lines as printed by
    /// `-show_entries format_tags=artist,title -of default=noprint_wrappers=1`
    pub fn parse_output(output: &str) -> ProbedTags {
        let mut tags = ProbedTags::default();

        for line in output.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim().trim_start_matches("TAG:").to_lowercase();
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match key.as_str() {
                "artist" if tags.artist.is_none() => tags.artist = Some(value.to_string()),
                "title" if tags.title.is_none() => tags.title = Some(value.to_string()),
                _ => {}
            }
        }

        tags
    }
}

impl Default for FfprobeTagReader {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

impl TagFallback for FfprobeTagReader {
    fn lookup(&self, path: &Path) -> Option<ProbedTags> {
        let output = Command::new(&self.program)
            .args(["-v", "quiet", "-show_entries", "format_tags=artist,title", "-of", "default=noprint_wrappers=1"])
            .arg(path)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output();

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                debug!("Tag probe '{}' unavailable: {}", self.program, e);
                return None;
            }
        };

        if !output.status.success() {
            debug!("Tag probe exited with {} for {}", output.status, path.display());
            return None;
        }

        let tags = Self::parse_output(&String::from_utf8_lossy(&output.stdout));
        if tags.is_empty() {
            None
        } else {
            Some(tags)
        }
    }
}
