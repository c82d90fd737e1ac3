use crate::controls::{ActionId, ArgumentKind};
use clap::Parser;
use std::path::PathBuf;

pub mod status;
pub use status::StatusDisplay;

/// Two-deck audio player
#[derive(Debug, Parser)]
#[command(name = "mixdeck")]
#[command(about = "A two-deck CLI audio player with looping, A-B loops and varispeed")]
#[command(version)]
pub struct CliApp {
    /// File to load into the primary deck
    pub file: Option<PathBuf>,

    /// File to load into the mixer deck
    #[arg(long, short = 'm')]
    pub mixer: Option<PathBuf>,

    /// Session file to restore from and save to
    #[arg(long)]
    pub session: Option<PathBuf>,

    /// Output device name
    #[arg(long, short = 'd')]
    pub device: Option<String>,

    /// Start fresh instead of restoring the last session
    #[arg(long)]
    pub no_restore: bool,

    /// Start playing as soon as the file is loaded
    #[arg(long)]
    pub autoplay: bool,
}

/// Parsed argument of an interactive command
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    None,
    Path(PathBuf),
    Seconds(f64),
    Toggle(Option<bool>),
    Range { start: f64, end: f64 },
    /// Gain in 0.0..=1.0
    Level(f32),
    Ratio(f64),
    Text(String),
    /// Zero-based
    Index(usize),
}

/// One interactive command line, ready for dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub action: ActionId,
    pub argument: Argument,
}

impl CliApp {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }

    /// Expand tilde (~) in path to home directory
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home_dir) = dirs::home_dir() {
                home_dir.join(rest)
            } else {
                PathBuf::from(path)
            }
        } else if path == "~" {
            dirs::home_dir().unwrap_or_else(|| PathBuf::from(path))
        } else {
            PathBuf::from(path)
        }
    }

    /// Parse command from string (for interactive mode)
    pub fn parse_command(input: &str) -> Result<Command, ParseError> {
        let input = input.trim();
        let (word, rest) = match input.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (input, ""),
        };
        if word.is_empty() {
            return Err(ParseError::EmptyCommand);
        }

        let action = ActionId::from_keyword(word).ok_or_else(|| ParseError::UnknownCommand {
            command: word.to_string(),
        })?;
        let args: Vec<&str> = rest.split_whitespace().collect();

        let argument = match action.argument_kind() {
            ArgumentKind::None => Argument::None,
            ArgumentKind::Path => {
                if rest.is_empty() {
                    return Err(Self::missing(action, "file"));
                }
                Argument::Path(Self::expand_path(Self::unquote(rest)))
            }
            ArgumentKind::Text => {
                if rest.is_empty() {
                    return Err(Self::missing(action, "name"));
                }
                Argument::Text(Self::unquote(rest).to_string())
            }
            ArgumentKind::OptionalText => {
                if rest.is_empty() {
                    Argument::None
                } else {
                    Argument::Text(Self::unquote(rest).to_string())
                }
            }
            ArgumentKind::Time => match args.first() {
                Some(time) => Argument::Seconds(Self::parse_time(time)?),
                None => return Err(Self::missing(action, "time")),
            },
            ArgumentKind::OptionalSeconds => match args.first() {
                Some(time) => Argument::Seconds(Self::parse_time(time)?),
                None => Argument::None,
            },
            ArgumentKind::OptionalToggle => match args.first().map(|a| a.to_lowercase()) {
                None => Argument::Toggle(None),
                Some(value) => match value.as_str() {
                    "on" | "true" | "1" | "yes" => Argument::Toggle(Some(true)),
                    "off" | "false" | "0" | "no" => Argument::Toggle(Some(false)),
                    _ => {
                        return Err(ParseError::InvalidArgument {
                            argument: action.keyword().to_string(),
                            value,
                            expected: "on or off".to_string(),
                        })
                    }
                },
            },
            ArgumentKind::Range => {
                if args.len() < 2 {
                    return Err(Self::missing(action, "start and end"));
                }
                Argument::Range {
                    start: Self::parse_time(args[0])?,
                    end: Self::parse_time(args[1])?,
                }
            }
            ArgumentKind::Level => match args.first() {
                Some(value) => Argument::Level(Self::parse_level(value)?),
                None => return Err(Self::missing(action, "level")),
            },
            ArgumentKind::Ratio => match args.first() {
                Some(value) => Argument::Ratio(Self::parse_ratio(value)?),
                None => return Err(Self::missing(action, "ratio")),
            },
            ArgumentKind::Index => match args.first() {
                Some(value) => match value.parse::<usize>() {
                    Ok(n) if n >= 1 => Argument::Index(n - 1),
                    _ => {
                        return Err(ParseError::InvalidArgument {
                            argument: "marker number".to_string(),
                            value: value.to_string(),
                            expected: "a number starting at 1".to_string(),
                        })
                    }
                },
                None => return Err(Self::missing(action, "marker number")),
            },
        };

        Ok(Command { action, argument })
    }

    fn missing(action: ActionId, argument: &str) -> ParseError {
        ParseError::MissingArgument {
            command: action.keyword().to_string(),
            argument: argument.to_string(),
        }
    }

    fn unquote(text: &str) -> &str {
        let text = text.trim();
        for quote in ['"', '\''] {
            if let Some(inner) = text.strip_prefix(quote).and_then(|t| t.strip_suffix(quote)) {
                return inner;
            }
        }
        text
    }

    /// Volume as a percentage 0-100
    pub fn parse_level(value: &str) -> Result<f32, ParseError> {
        match value.trim_end_matches('%').parse::<u8>() {
            Ok(level) if level <= 100 => Ok(level as f32 / 100.0),
            Ok(_) => Err(ParseError::InvalidArgument {
                argument: "volume level".to_string(),
                value: value.to_string(),
                expected: "0-100".to_string(),
            }),
            Err(_) => Err(ParseError::InvalidArgument {
                argument: "volume level".to_string(),
                value: value.to_string(),
                expected: "number 0-100".to_string(),
            }),
        }
    }

    /// Speed ratio such as "1.25" or "1.25x"; range clamping is left to the engine
    pub fn parse_ratio(value: &str) -> Result<f64, ParseError> {
        match value.trim_end_matches(['x', 'X']).parse::<f64>() {
            Ok(ratio) if ratio.is_finite() && ratio > 0.0 => Ok(ratio),
            _ => Err(ParseError::InvalidArgument {
                argument: "speed".to_string(),
                value: value.to_string(),
                expected: "a ratio between 0.5 and 2.0".to_string(),
            }),
        }
    }

    /// Parse "1:30", "1:30.5", "90" or "90s" into seconds
    pub fn parse_time(time_str: &str) -> Result<f64, ParseError> {
        let trimmed = time_str.trim();
        let invalid = || ParseError::InvalidTimeFormat {
            input: time_str.to_string(),
        };

        if trimmed.is_empty() {
            return Err(invalid());
        }

        if trimmed.contains(':') {
            let parts: Vec<&str> = trimmed.split(':').collect();
            if parts.len() != 2 {
                return Err(invalid());
            }

            let minutes: u64 = parts[0].parse().map_err(|_| invalid())?;
            let seconds: f64 = parts[1].parse().map_err(|_| invalid())?;

            if !(0.0..60.0).contains(&seconds) {
                return Err(invalid());
            }

            Ok(minutes as f64 * 60.0 + seconds)
        } else {
            let seconds: f64 = trimmed.trim_end_matches('s').parse().map_err(|_| invalid())?;

            if !seconds.is_finite() || seconds < 0.0 {
                return Err(invalid());
            }

            Ok(seconds)
        }
    }

    /// Display help information
    pub fn display_help() {
        println!("mixdeck - available commands:");
        println!();
        for action in ActionId::all() {
            println!("  {}", action.help_line());
        }
    }
}

/// Command parsing errors
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Empty command")]
    EmptyCommand,

    #[error("Unknown command: {command}")]
    UnknownCommand { command: String },

    #[error("Missing argument for {command}: {argument}")]
    MissingArgument { command: String, argument: String },

    #[error("Invalid argument {argument}: got '{value}', expected {expected}")]
    InvalidArgument {
        argument: String,
        value: String,
        expected: String,
    },

    #[error("Invalid time format: {input}")]
    InvalidTimeFormat { input: String },
}

#[cfg(test)]
mod tests;
