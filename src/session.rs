//! Session persistence: what was playing, where, how loud and how fast,
//! plus the marker list. Stored as TOML so it can be read and edited by hand.

use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::audio::resampler::{MAX_SPEED, MIN_SPEED};
use crate::error::ConfigError;
use crate::markers::Marker;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    pub last_file: Option<PathBuf>,
    /// Seconds into `last_file`
    pub last_position: f64,
    pub volume: f32,
    pub speed: f64,
    pub markers: Vec<Marker>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            last_file: None,
            last_position: 0.0,
            volume: 0.8,
            speed: 1.0,
            markers: Vec::new(),
        }
    }
}

impl SessionState {
    /// Bring hand-edited or stale values back into range
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if !self.last_position.is_finite() || self.last_position < 0.0 {
            self.last_position = 0.0;
        }
        self.volume = if self.volume.is_finite() {
            self.volume.clamp(0.0, 1.0)
        } else {
            defaults.volume
        };
        self.speed = if self.speed.is_finite() {
            self.speed.clamp(MIN_SPEED, MAX_SPEED)
        } else {
            defaults.speed
        };
        self.markers.retain(|m| m.timestamp.is_finite() && m.timestamp >= 0.0);
        self.markers
            .sort_by(|a, b| a.timestamp.partial_cmp(&b.timestamp).unwrap_or(std::cmp::Ordering::Equal));
        self
    }

    /// The remembered file, if it is still on disk
    pub fn restorable_file(&self) -> Option<&Path> {
        self.last_file.as_deref().filter(|path| path.is_file())
    }
}

/// Reads and writes the session file
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the session, or `None` when there is no file yet
    pub fn try_load(&self) -> Result<Option<SessionState>, ConfigError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path).map_err(ConfigError::IoError)?;
        let state: SessionState = toml::from_str(&content).map_err(ConfigError::DeserializationError)?;
        Ok(Some(state.sanitized()))
    }

    /// Load the session, falling back to defaults when the file is missing or unreadable
    pub fn load(&self) -> SessionState {
        match self.try_load() {
            Ok(Some(state)) => {
                debug!("Session loaded from {}", self.path.display());
                state
            }
            Ok(None) => SessionState::default(),
            Err(e) => {
                warn!("Ignoring session file {}: {}", self.path.display(), e);
                SessionState::default()
            }
        }
    }

    /// Write the session, replacing the previous file in one step
    pub fn save(&self, state: &SessionState) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(ConfigError::IoError)?;
            }
        }

        let content = toml::to_string_pretty(state).map_err(ConfigError::SerializationError)?;
        let staging = self.path.with_extension("toml.tmp");
        std::fs::write(&staging, content).map_err(ConfigError::IoError)?;
        std::fs::rename(&staging, &self.path).map_err(ConfigError::IoError)?;

        debug!("Session saved to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn sample_state(file: PathBuf) -> SessionState {
        SessionState {
            last_file: Some(file),
            last_position: 42.5,
            volume: 0.65,
            speed: 1.25,
            markers: vec![
                Marker { timestamp: 3.0, label: "intro".to_string() },
                Marker { timestamp: 61.0, label: "solo".to_string() },
            ],
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("nested").join("session.toml"));
        let state = sample_state(dir.path().join("song.flac"));

        store.save(&state).unwrap();
        assert_eq!(store.load(), state);

        let text = fs::read_to_string(store.path()).unwrap();
        assert!(text.contains("last_position"));
        assert!(text.contains("[[markers]]"));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("session.toml"));
        assert!(store.try_load().unwrap().is_none());
        assert_eq!(store.load(), SessionState::default());
    }

    #[test]
    fn test_corrupt_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.toml");
        fs::write(&path, "volume = \"loud\"\nmarkers = 7").unwrap();

        let store = SessionStore::new(path);
        assert!(store.try_load().is_err());
        assert_eq!(store.load(), SessionState::default());
    }

    #[test]
    fn test_values_are_sanitized() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.toml");
        fs::write(
            &path,
            "last_position = -3.0\nvolume = 4.0\nspeed = 9.0\n\n[[markers]]\ntimestamp = 9.0\nlabel = \"b\"\n\n[[markers]]\ntimestamp = 1.0\nlabel = \"a\"\n",
        )
        .unwrap();

        let state = SessionStore::new(path).load();
        assert_eq!(state.last_position, 0.0);
        assert_eq!(state.volume, 1.0);
        assert_eq!(state.speed, 2.0);
        assert_eq!(state.markers[0].label, "a");
        assert_eq!(state.last_file, None);
    }

    #[test]
    fn test_restorable_file_requires_existing_file() {
        let dir = TempDir::new().unwrap();
        let song = dir.path().join("song.wav");
        let state = sample_state(song.clone());
        assert_eq!(state.restorable_file(), None);

        fs::write(&song, b"RIFF").unwrap();
        assert_eq!(state.restorable_file(), Some(song.as_path()));
    }
}
