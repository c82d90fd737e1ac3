use thiserror::Error;

use crate::models::TrackSlot;

/// Main player error type
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("File error: {0}")]
    File(#[from] std::io::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("CLI parse error: {0}")]
    Parse(#[from] crate::cli::ParseError),
}

impl PlayerError {
    /// Get user-friendly error message with suggested solutions
    pub fn user_message(&self) -> String {
        match self {
            PlayerError::Audio(err) => err.user_message(),
            PlayerError::File(err) => Self::format_file_error(err),
            PlayerError::Decode(err) => err.user_message(),
            PlayerError::Config(err) => err.user_message(),
            PlayerError::Parse(err) => format!("Command error: {}", err),
        }
    }

    /// Get suggested recovery actions for the error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            PlayerError::Audio(err) => err.recovery_suggestions(),
            PlayerError::File(err) => Self::file_error_suggestions(err),
            PlayerError::Decode(err) => err.recovery_suggestions(),
            PlayerError::Config(err) => err.recovery_suggestions(),
            PlayerError::Parse(_) => vec!["Type 'help' to see available commands".to_string()],
        }
    }

    /// Check if the player can carry on without user intervention
    pub fn is_recoverable(&self) -> bool {
        match self {
            PlayerError::Audio(err) => err.is_recoverable(),
            PlayerError::File(_) => false,
            PlayerError::Decode(err) => err.is_recoverable(),
            PlayerError::Config(err) => err.is_recoverable(),
            PlayerError::Parse(_) => false,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            PlayerError::Audio(AudioError::InvalidLoopRegion { .. }) => ErrorSeverity::Info,
            PlayerError::Audio(AudioError::NoTrackLoaded { .. }) => ErrorSeverity::Info,
            PlayerError::Audio(AudioError::DeviceNotFound { .. }) => ErrorSeverity::Error,
            PlayerError::Audio(_) => ErrorSeverity::Critical,
            PlayerError::File(_) => ErrorSeverity::Error,
            PlayerError::Decode(DecodeError::UnsupportedFormat { .. }) => ErrorSeverity::Warning,
            PlayerError::Decode(_) => ErrorSeverity::Error,
            PlayerError::Config(_) => ErrorSeverity::Warning,
            PlayerError::Parse(_) => ErrorSeverity::Info,
        }
    }

    fn format_file_error(err: &std::io::Error) -> String {
        match err.kind() {
            std::io::ErrorKind::NotFound => "No such file".to_string(),
            std::io::ErrorKind::PermissionDenied => "The file is not readable by this user".to_string(),
            _ => format!("Could not read the file: {}", err),
        }
    }

    fn file_error_suggestions(err: &std::io::Error) -> Vec<String> {
        let mut suggestions = Vec::new();
        if err.kind() == std::io::ErrorKind::NotFound {
            suggestions.push("Paths are relative to the directory mixdeck was started from".to_string());
            suggestions.push("Quote paths that contain spaces, or use '~/'".to_string());
        } else {
            suggestions.push("Check the file's permissions".to_string());
        }
        suggestions
    }
}

/// Error severity levels for logging and user feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Info => "INFO",
            ErrorSeverity::Warning => "WARNING",
            ErrorSeverity::Error => "ERROR",
            ErrorSeverity::Critical => "CRITICAL",
        }
    }

    pub fn log_level(&self) -> log::Level {
        match self {
            ErrorSeverity::Info => log::Level::Info,
            ErrorSeverity::Warning => log::Level::Warn,
            ErrorSeverity::Error => log::Level::Error,
            ErrorSeverity::Critical => log::Level::Error,
        }
    }
}

/// Audio transport and output errors
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Device not found: {device}")]
    DeviceNotFound { device: String },

    #[error("Unsupported format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Stream error: {0}")]
    StreamError(String),

    #[error("Audio initialization failed: {0}")]
    InitializationFailed(String),

    #[error("No track loaded on the {slot} deck")]
    NoTrackLoaded { slot: TrackSlot },

    #[error("Invalid loop region: {start:.2}s..{end:.2}s for a {length:.2}s track")]
    InvalidLoopRegion { start: f64, end: f64, length: f64 },
}

impl AudioError {
    pub fn user_message(&self) -> String {
        match self {
            AudioError::DeviceNotFound { device } => {
                format!("Audio device '{}' is not available or has been disconnected", device)
            }
            AudioError::UnsupportedFormat { format } => {
                format!("Audio format '{}' is not supported by the output device", format)
            }
            AudioError::StreamError(msg) => format!("Audio playback interrupted: {}", msg),
            AudioError::InitializationFailed(msg) => {
                format!("Failed to initialize audio system: {}", msg)
            }
            AudioError::NoTrackLoaded { slot } => {
                format!("Load a file on the {} deck first", slot)
            }
            AudioError::InvalidLoopRegion { start, end, length } => format!(
                "Cannot loop {:.1}s to {:.1}s - the start must come before the end and both must lie within {:.1}s",
                start, end, length
            ),
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            AudioError::DeviceNotFound { .. } => vec![
                "Use 'devices' to see available audio devices".to_string(),
                "Check that your audio device is connected and powered on".to_string(),
            ],
            AudioError::UnsupportedFormat { .. } => vec![
                "Try selecting a different audio device with 'device <name>'".to_string(),
            ],
            AudioError::StreamError(_) => vec![
                "Try pausing and resuming playback".to_string(),
                "Check audio device connections".to_string(),
            ],
            AudioError::InitializationFailed(_) => vec![
                "Restart the application".to_string(),
                "Check that no other applications are using exclusive audio access".to_string(),
            ],
            AudioError::NoTrackLoaded { slot } => match slot {
                TrackSlot::Primary => vec!["Use 'load <file>' to load a track".to_string()],
                TrackSlot::Mixer => vec!["Use 'mix <file>' to load a mixer track".to_string()],
            },
            AudioError::InvalidLoopRegion { length, .. } => vec![
                format!("Use a region between 0 and {:.1} seconds", length),
                "Make sure the loop start is smaller than the loop end".to_string(),
            ],
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            AudioError::DeviceNotFound { .. } => true, // Can fall back to default device
            AudioError::UnsupportedFormat { .. } => false,
            AudioError::StreamError(_) => true,
            AudioError::InitializationFailed(_) => true,
            AudioError::NoTrackLoaded { .. } => true,
            AudioError::InvalidLoopRegion { .. } => true,
        }
    }
}

/// Audio decoding errors
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Unsupported format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Corrupted file: {0}")]
    CorruptedFile(String),

    #[error("Decode failed: {0}")]
    DecodeFailed(String),
}

impl DecodeError {
    pub fn user_message(&self) -> String {
        match self {
            DecodeError::UnsupportedFormat { format } => {
                format!("Audio format '{}' is not supported by this player", format)
            }
            DecodeError::CorruptedFile(msg) => {
                format!("Audio file appears to be corrupted or damaged: {}", msg)
            }
            DecodeError::DecodeFailed(msg) => format!("Failed to decode audio data: {}", msg),
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            DecodeError::UnsupportedFormat { .. } => vec![
                "Supported formats: WAV, AIFF, FLAC, MP3, OGG/Vorbis, M4A/AAC".to_string(),
                "Check if the file extension matches the actual format".to_string(),
            ],
            DecodeError::CorruptedFile(_) => vec![
                "Try re-downloading or re-copying the file".to_string(),
                "Try playing the file in another audio player to confirm corruption".to_string(),
            ],
            DecodeError::DecodeFailed(_) => vec![
                "Check that the file exists and is readable".to_string(),
                "Verify the file is not corrupted".to_string(),
            ],
        }
    }

    pub fn is_recoverable(&self) -> bool {
        // The previously loaded track keeps playing, so every decode failure is local
        true
    }
}

/// Configuration and session storage errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found")]
    ConfigDirNotFound,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] toml::de::Error),
}

impl ConfigError {
    pub fn user_message(&self) -> String {
        match self {
            ConfigError::ConfigDirNotFound => {
                "Cannot find or create configuration directory".to_string()
            }
            ConfigError::IoError(err) => format!("Cannot access configuration file: {}", err),
            ConfigError::SerializationError(_) => "Failed to save settings".to_string(),
            ConfigError::DeserializationError(_) => {
                "Settings file is corrupted or has invalid format".to_string()
            }
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            ConfigError::ConfigDirNotFound => vec![
                "Check that you have write permissions to your home directory".to_string(),
                "Try creating the directory manually: ~/.config/mixdeck/".to_string(),
            ],
            ConfigError::IoError(_) => vec![
                "Check file permissions for the configuration directory".to_string(),
                "Ensure the disk is not full".to_string(),
            ],
            ConfigError::SerializationError(_) => vec![
                "Current settings stay active for this run".to_string(),
            ],
            ConfigError::DeserializationError(_) => vec![
                "Delete the file to reset to defaults".to_string(),
            ],
        }
    }

    pub fn is_recoverable(&self) -> bool {
        true
    }
}
