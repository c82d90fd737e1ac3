use crate::audio::output::DeviceDescription;
use crate::audio::waveform::Peak;
use crate::error::{ErrorSeverity, PlayerError};
use crate::logging::PlaybackEvent;
use crate::models::{format_seconds, DeckStatus, PlaybackState, PlayerStatus};

const WAVEFORM_LEVELS: [char; 9] = [' ', '▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
const WAVEFORM_WIDTH: usize = 56;

/// Status display formatter for the CLI
pub struct StatusDisplay;

impl StatusDisplay {
    /// Display both decks, the shared transport settings and the primary waveform
    pub fn display_full_status(status: &PlayerStatus, waveform: &[Peak]) {
        for line in Self::full_status_lines(status, waveform) {
            println!("{}", line);
        }
    }

    pub fn full_status_lines(status: &PlayerStatus, waveform: &[Peak]) -> Vec<String> {
        let mut lines = vec!["┌─ Player Status ─────────────────────────────────────────┐".to_string()];

        lines.extend(Self::deck_lines("Primary", &status.primary));
        if !waveform.is_empty() {
            lines.push(format!(
                "│ {}",
                Self::waveform_line(waveform, status.primary.progress())
            ));
        }

        lines.push("│".to_string());
        if status.mixer.track.is_some() {
            lines.extend(Self::deck_lines("Mixer", &status.mixer));
        } else {
            lines.push("│ Mixer: empty".to_string());
        }

        lines.push("│".to_string());
        lines.push(format!("│ Speed: {:.2}x", status.speed));
        if status.ab_loop.enabled {
            lines.push(format!(
                "│ A-B loop: {} - {}",
                format_seconds(status.ab_loop.start),
                format_seconds(status.ab_loop.end)
            ));
        }
        lines.push(format!(
            "│ Device: {}",
            Self::truncate(status.output_device.as_deref().unwrap_or("None"), 49)
        ));
        lines.push("└─────────────────────────────────────────────────────────┘".to_string());
        lines
    }

    fn deck_lines(label: &str, deck: &DeckStatus) -> Vec<String> {
        let mut lines = Vec::new();
        match &deck.track {
            Some(track) => {
                lines.push(format!("│ {}: {}", label, Self::truncate(&track.display_name(), 45)));
                lines.push(format!("│ Artist: {}", Self::truncate(&track.artist_name(), 49)));
            }
            None => {
                lines.push(format!("│ {}: No file loaded", label));
                return lines;
            }
        }

        lines.push(format!(
            "│ {} {} / {}{}",
            Self::format_playback_state(deck.state),
            format_seconds(deck.position),
            format_seconds(deck.length),
            if deck.looping { "  [loop]" } else { "" }
        ));
        lines.push(format!(
            "│ [{}] {:.1}%",
            Self::create_progress_bar(deck.progress() as f32, 40),
            deck.progress() * 100.0
        ));
        lines.push(format!(
            "│ Volume: {}%{}",
            (deck.gain * 100.0).round() as u8,
            if deck.muted { " (muted)" } else { "" }
        ));
        lines
    }

    /// Single line for the live view, overwritten in place
    pub fn watch_line(status: &PlayerStatus) -> String {
        let primary = &status.primary;
        let mut line = format!(
            "{} [{}] {}/{} {:.2}x",
            Self::format_playback_state(primary.state),
            Self::create_progress_bar(primary.progress() as f32, 30),
            format_seconds(primary.position),
            format_seconds(primary.length),
            status.speed
        );
        if status.mixer.track.is_some() {
            line.push_str(&format!(
                " | mix {}/{}",
                format_seconds(status.mixer.position),
                format_seconds(status.mixer.length)
            ));
        }
        if status.ab_loop.enabled {
            line.push_str(" | A-B");
        } else if primary.looping {
            line.push_str(" | loop");
        }
        line
    }

    /// Display real-time position update (single line)
    pub fn display_position_update(status: &PlayerStatus) {
        use std::io::{self, Write};
        print!("\r{}\x1b[K", Self::watch_line(status));
        let _ = io::stdout().flush();
    }

    /// One row of block characters, with `|` at the play head
    pub fn waveform_line(peaks: &[Peak], progress: f64) -> String {
        let head = if peaks.is_empty() {
            None
        } else {
            Some(((progress.clamp(0.0, 1.0) * peaks.len() as f64) as usize).min(peaks.len() - 1))
        };
        peaks
            .iter()
            .enumerate()
            .map(|(i, peak)| {
                if Some(i) == head {
                    return '|';
                }
                let amplitude = peak.max.abs().max(peak.min.abs()).min(1.0);
                let level = (amplitude * (WAVEFORM_LEVELS.len() - 1) as f32).round() as usize;
                WAVEFORM_LEVELS[level.min(WAVEFORM_LEVELS.len() - 1)]
            })
            .collect()
    }

    pub fn waveform_width() -> usize {
        WAVEFORM_WIDTH
    }

    /// Display the recent event history, oldest first
    pub fn display_history(events: &[PlaybackEvent]) {
        if events.is_empty() {
            println!("No events yet");
            return;
        }
        for event in events {
            println!("{}", Self::history_line(event));
        }
    }

    pub fn history_line(event: &PlaybackEvent) -> String {
        format!(
            "{} {:<16} {}",
            event.timestamp.format("%H:%M:%S"),
            event.event_type.as_str(),
            event.details
        )
    }

    pub fn display_devices(devices: &[DeviceDescription]) {
        if devices.is_empty() {
            println!("No output devices found");
            return;
        }
        println!("Output devices:");
        for device in devices {
            println!(
                "  {} {} ({} Hz, {} ch)",
                if device.is_current { "*" } else { " " },
                device.name,
                device.default_sample_rate,
                device.channels
            );
        }
    }

    /// Display error message with formatting and recovery suggestions
    pub fn display_error(error: &PlayerError) {
        let severity = error.severity();
        let severity_icon = match severity {
            ErrorSeverity::Info => "ℹ",
            ErrorSeverity::Warning => "⚠",
            ErrorSeverity::Error => "✗",
            ErrorSeverity::Critical => "!!",
        };

        eprintln!(
            "┌─ {} {} ─────────────────────────────────────────────────┐",
            severity_icon,
            severity.as_str()
        );

        for line in Self::wrap_text(&error.user_message(), 55) {
            eprintln!("│ {}", line);
        }

        let suggestions = error.recovery_suggestions();
        if !suggestions.is_empty() {
            eprintln!("│");
            eprintln!("│ Suggestions:");
            for suggestion in suggestions.iter().take(3) {
                for line in Self::wrap_text(&format!("• {}", suggestion), 53) {
                    eprintln!("│   {}", line);
                }
            }
        }

        eprintln!("└─────────────────────────────────────────────────────────┘");
    }

    /// Wrap text to fit within specified width
    pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
        let mut lines = Vec::new();
        let mut current_line = String::new();

        for word in text.split_whitespace() {
            if current_line.is_empty() {
                current_line = word.to_string();
            } else if current_line.chars().count() + word.chars().count() < width {
                current_line.push(' ');
                current_line.push_str(word);
            } else {
                lines.push(current_line);
                current_line = word.to_string();
            }
        }

        if !current_line.is_empty() {
            lines.push(current_line);
        }
        lines
    }

    /// Truncate string to fit display width
    pub fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len || max_len <= 3 {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len - 3).collect();
            format!("{}...", kept)
        }
    }

    /// Create a progress bar string
    pub fn create_progress_bar(progress: f32, width: usize) -> String {
        let filled = ((progress.clamp(0.0, 1.0) * width as f32) as usize).min(width);
        format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
    }

    pub fn format_playback_state(state: PlaybackState) -> &'static str {
        match state {
            PlaybackState::Playing => "▶ Playing",
            PlaybackState::Paused => "⏸ Paused",
            PlaybackState::Stopped => "⏹ Stopped",
        }
    }
}
