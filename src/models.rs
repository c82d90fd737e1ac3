use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Placeholder shown when neither the file nor the tag probe names an artist
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// The two decks the engine plays side by side
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TrackSlot {
    Primary,
    Mixer,
}

impl TrackSlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackSlot::Primary => "primary",
            TrackSlot::Mixer => "mixer",
        }
    }
}

impl std::fmt::Display for TrackSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Information about a loaded track
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackInfo {
    pub path: PathBuf,
    pub metadata: AudioMetadata,
    pub duration: Duration,
    pub sample_rate: u32,
    pub channels: u16,
}

impl TrackInfo {
    pub fn new(path: PathBuf, metadata: AudioMetadata, duration: Duration, sample_rate: u32, channels: u16) -> Self {
        Self {
            path,
            metadata,
            duration,
            sample_rate,
            channels,
        }
    }

    /// Get the display name for this track (title or filename)
    pub fn display_name(&self) -> String {
        self.metadata
            .title
            .clone()
            .unwrap_or_else(|| {
                self.path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("Unknown")
                    .to_string()
            })
    }

    /// Get the artist name or "Unknown Artist"
    pub fn artist_name(&self) -> String {
        self.metadata
            .artist
            .clone()
            .unwrap_or_else(|| UNKNOWN_ARTIST.to_string())
    }

    /// One-line "Artist - Title (m:ss)" label for the presentation layer
    pub fn summary(&self) -> String {
        format!(
            "{} - {} ({})",
            self.artist_name(),
            self.display_name(),
            format_seconds(self.duration.as_secs_f64())
        )
    }
}

/// Audio metadata extracted from files
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AudioMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub year: Option<u32>,
}

impl AudioMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if metadata has any information
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.artist.is_none() && self.album.is_none() && self.year.is_none()
    }

    /// Create metadata with basic information
    pub fn with_title_artist(title: String, artist: String) -> Self {
        Self {
            title: Some(title),
            artist: Some(artist),
            ..Default::default()
        }
    }

    /// Artist tags that say nothing and should trigger the external tag probe
    pub fn has_meaningful_artist(&self) -> bool {
        match self.artist.as_deref().map(str::trim) {
            None | Some("") => false,
            Some(artist) => {
                let lower = artist.to_lowercase();
                !(lower == "unknown" || lower == "unknown artist" || lower == "various artists")
            }
        }
    }
}

/// A block of decoded, interleaved samples
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
    pub frames: usize,
}

impl AudioBuffer {
    pub fn new(channels: u16, sample_rate: u32, frames: usize) -> Self {
        Self {
            samples: vec![0.0; frames * channels as usize],
            channels,
            sample_rate,
            frames,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Playback state enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

impl PlaybackState {
    /// Get a human-readable string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::Stopped => "Stopped",
            PlaybackState::Playing => "Playing",
            PlaybackState::Paused => "Paused",
        }
    }

    pub(crate) fn to_u8(self) -> u8 {
        match self {
            PlaybackState::Stopped => 0,
            PlaybackState::Playing => 1,
            PlaybackState::Paused => 2,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => PlaybackState::Playing,
            2 => PlaybackState::Paused,
            _ => PlaybackState::Stopped,
        }
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A-B loop region on the primary timeline, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct AbLoopRegion {
    pub enabled: bool,
    pub start: f64,
    pub end: f64,
}

impl AbLoopRegion {
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Whether [start, end) is a usable region on a track of `length` seconds
    pub fn is_valid_for(start: f64, end: f64, length: f64) -> bool {
        start.is_finite() && end.is_finite() && start >= 0.0 && end > start && end <= length
    }
}

/// Snapshot of one deck for the status display
#[derive(Debug, Clone, PartialEq)]
pub struct DeckStatus {
    pub slot: TrackSlot,
    pub track: Option<TrackInfo>,
    pub state: PlaybackState,
    pub position: f64,
    pub length: f64,
    pub gain: f32,
    pub muted: bool,
    pub looping: bool,
}

impl DeckStatus {
    /// Get progress as a fraction (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.length > 0.0 {
            (self.position / self.length).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Snapshot of the whole player, polled by the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerStatus {
    pub primary: DeckStatus,
    pub mixer: DeckStatus,
    pub speed: f64,
    pub ab_loop: AbLoopRegion,
    pub output_device: Option<String>,
}

/// Format seconds as M:SS (or H:MM:SS for long tracks)
pub fn format_seconds(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 { seconds as u64 } else { 0 };
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}
