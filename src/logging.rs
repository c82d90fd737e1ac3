use chrono::{DateTime, Utc};
use log::{debug, error, info, trace, warn};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

const LOG_LEVEL_VAR: &str = "MIXDECK_LOG_LEVEL";
const MAX_EVENTS: usize = 500;

/// Something the user did to the player, kept for the `history` command
#[derive(Debug, Clone)]
pub struct PlaybackEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: PlaybackEventType,
    pub details: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEventType {
    TrackLoaded,
    MixerLoaded,
    LoadFailed,
    Play,
    Pause,
    Stop,
    Seek,
    LoopChanged,
    AbLoopChanged,
    SpeedChanged,
    DeviceChanged,
    SessionSaved,
    SessionRestored,
}

impl PlaybackEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackEventType::TrackLoaded => "TRACK_LOADED",
            PlaybackEventType::MixerLoaded => "MIXER_LOADED",
            PlaybackEventType::LoadFailed => "LOAD_FAILED",
            PlaybackEventType::Play => "PLAY",
            PlaybackEventType::Pause => "PAUSE",
            PlaybackEventType::Stop => "STOP",
            PlaybackEventType::Seek => "SEEK",
            PlaybackEventType::LoopChanged => "LOOP_CHANGED",
            PlaybackEventType::AbLoopChanged => "AB_LOOP_CHANGED",
            PlaybackEventType::SpeedChanged => "SPEED_CHANGED",
            PlaybackEventType::DeviceChanged => "DEVICE_CHANGED",
            PlaybackEventType::SessionSaved => "SESSION_SAVED",
            PlaybackEventType::SessionRestored => "SESSION_RESTORED",
        }
    }
}

/// Logger for player operations: forwards to `log` and keeps a bounded history
#[derive(Clone)]
pub struct PlayerLogger {
    events: Arc<Mutex<VecDeque<PlaybackEvent>>>,
    max_events: usize,
}

impl PlayerLogger {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::new())),
            max_events: MAX_EVENTS,
        }
    }

    /// Initialize the env_logger backend. `MIXDECK_LOG_LEVEL` overrides `default_level`.
    pub fn init(default_level: &str) -> Result<(), Box<dyn std::error::Error>> {
        let log_level = std::env::var(LOG_LEVEL_VAR).unwrap_or_else(|_| default_level.to_string());

        let mut builder = env_logger::Builder::new();

        builder.format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{}] [{}:{}] {}",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        });

        builder.filter_level(Self::parse_level(&log_level));
        builder.try_init()?;

        info!("Logging initialized with level: {}", log_level);
        Ok(())
    }

    fn parse_level(level: &str) -> log::LevelFilter {
        match level.to_lowercase().as_str() {
            "trace" => log::LevelFilter::Trace,
            "debug" => log::LevelFilter::Debug,
            "info" => log::LevelFilter::Info,
            "warn" => log::LevelFilter::Warn,
            "error" => log::LevelFilter::Error,
            "off" => log::LevelFilter::Off,
            _ => log::LevelFilter::Warn,
        }
    }

    fn lock_events(&self) -> MutexGuard<'_, VecDeque<PlaybackEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn log_event(&self, event_type: PlaybackEventType, details: impl Into<String>) {
        let details = details.into();

        match event_type {
            PlaybackEventType::LoadFailed => error!("[{}] {}", event_type.as_str(), details),
            PlaybackEventType::Seek => debug!("[{}] {}", event_type.as_str(), details),
            _ => info!("[{}] {}", event_type.as_str(), details),
        }

        let mut events = self.lock_events();
        events.push_back(PlaybackEvent {
            timestamp: Utc::now(),
            event_type,
            details,
        });
        while events.len() > self.max_events {
            events.pop_front();
        }
    }

    /// The last `count` events, oldest first
    pub fn get_recent_events(&self, count: usize) -> Vec<PlaybackEvent> {
        let events = self.lock_events();
        let skip = events.len().saturating_sub(count);
        events.iter().skip(skip).cloned().collect()
    }

    pub fn clear_events(&self) {
        self.lock_events().clear();
    }

    pub fn event_count(&self, event_type: PlaybackEventType) -> usize {
        self.lock_events()
            .iter()
            .filter(|event| event.event_type == event_type)
            .count()
    }
}

impl Default for PlayerLogger {
    fn default() -> Self {
        Self::new()
    }
}

/// Timer utility for measuring operation durations
pub struct OperationTimer {
    start_time: Instant,
    operation_name: String,
}

impl OperationTimer {
    pub fn new(operation_name: impl Into<String>) -> Self {
        let operation_name = operation_name.into();
        trace!("Starting operation: {}", operation_name);
        Self {
            start_time: Instant::now(),
            operation_name,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn finish_with_threshold(self, threshold: Duration) -> Duration {
        let duration = self.elapsed();
        if duration > threshold {
            warn!(
                "Operation '{}' took {}ms (threshold: {}ms)",
                self.operation_name,
                duration.as_millis(),
                threshold.as_millis()
            );
        } else {
            debug!("Completed operation '{}' in {}ms", self.operation_name, duration.as_millis());
        }
        duration
    }
}
