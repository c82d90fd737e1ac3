//! Command dispatch: each logical action maps to a handler closure that
//! drives the engine. The presentation layer parses input into a
//! [`Command`], hands it to [`ControlDispatcher::dispatch`] and acts on the
//! returned [`Outcome`].

use std::collections::HashMap;

use crate::audio::engine::PlaybackEngine;
use crate::cli::{Argument, Command, ParseError};
use crate::error::PlayerError;
use crate::logging::{PlaybackEventType, PlayerLogger};
use crate::markers::MarkerList;
use crate::models::{format_seconds, PlaybackState};

const MARKER_GRACE_SECONDS: f64 = 0.5;

/// Every action the player understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionId {
    Load,
    LoadMixer,
    UnloadMixer,
    Play,
    Pause,
    PlayPause,
    Stop,
    Restart,
    GoToStart,
    GoToEnd,
    Seek,
    Forward,
    Backward,
    Loop,
    AbLoop,
    AbLoopOff,
    Mute,
    MixerMute,
    Volume,
    MixerVolume,
    Speed,
    AddMarker,
    RemoveMarker,
    JumpToMarker,
    NextMarker,
    PreviousMarker,
    ListMarkers,
    ClearMarkers,
    Status,
    Watch,
    History,
    Devices,
    Device,
    SaveSession,
    Clear,
    Help,
    Quit,
}

/// Shape of the argument an action takes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentKind {
    None,
    Path,
    Time,
    OptionalSeconds,
    OptionalToggle,
    Range,
    Level,
    Ratio,
    OptionalText,
    Text,
    Index,
}

const ACTIONS: &[(ActionId, &str, &[&str], ArgumentKind, &str)] = &[
    (ActionId::Load, "load", &["open"], ArgumentKind::Path, "load <file>         Load a file into the primary deck"),
    (ActionId::LoadMixer, "mix", &["mixer"], ArgumentKind::Path, "mix <file>          Load a file into the mixer deck"),
    (ActionId::UnloadMixer, "unmix", &[], ArgumentKind::None, "unmix               Unload the mixer deck"),
    (ActionId::Play, "play", &["resume"], ArgumentKind::None, "play                Start or resume playback"),
    (ActionId::Pause, "pause", &[], ArgumentKind::None, "pause               Pause playback"),
    (ActionId::PlayPause, "toggle", &["p"], ArgumentKind::None, "toggle              Play/pause"),
    (ActionId::Stop, "stop", &[], ArgumentKind::None, "stop                Stop and rewind both decks"),
    (ActionId::Restart, "restart", &[], ArgumentKind::None, "restart             Jump back to the beginning"),
    (ActionId::GoToStart, "start", &["home"], ArgumentKind::None, "start               Go to the start"),
    (ActionId::GoToEnd, "end", &[], ArgumentKind::None, "end                 Go to just before the end"),
    (ActionId::Seek, "seek", &[], ArgumentKind::Time, "seek <time>         Seek (e.g. '1:30', '90', '90s')"),
    (ActionId::Forward, "ff", &["forward"], ArgumentKind::OptionalSeconds, "ff [seconds]        Jump forward"),
    (ActionId::Backward, "rw", &["back", "rewind"], ArgumentKind::OptionalSeconds, "rw [seconds]        Jump backward"),
    (ActionId::Loop, "loop", &[], ArgumentKind::OptionalToggle, "loop [on|off]       Toggle or set track looping"),
    (ActionId::AbLoop, "ab", &[], ArgumentKind::Range, "ab <start> <end>    Loop the region between two times"),
    (ActionId::AbLoopOff, "aboff", &[], ArgumentKind::None, "aboff               Disable the A-B loop"),
    (ActionId::Mute, "mute", &[], ArgumentKind::None, "mute                Toggle primary mute"),
    (ActionId::MixerMute, "mixmute", &[], ArgumentKind::None, "mixmute             Toggle mixer mute"),
    (ActionId::Volume, "vol", &["volume"], ArgumentKind::Level, "vol <0-100>         Primary volume"),
    (ActionId::MixerVolume, "mixvol", &[], ArgumentKind::Level, "mixvol <0-100>      Mixer volume"),
    (ActionId::Speed, "speed", &[], ArgumentKind::Ratio, "speed <0.5-2.0>     Playback speed for both decks"),
    (ActionId::AddMarker, "mark", &[], ArgumentKind::OptionalText, "mark [label]        Add a marker at the current position"),
    (ActionId::RemoveMarker, "unmark", &[], ArgumentKind::Index, "unmark <n>          Remove marker n"),
    (ActionId::JumpToMarker, "goto", &[], ArgumentKind::Index, "goto <n>            Jump to marker n"),
    (ActionId::NextMarker, "next", &["n"], ArgumentKind::None, "next                Jump to the next marker"),
    (ActionId::PreviousMarker, "prev", &["previous"], ArgumentKind::None, "prev                Jump to the previous marker"),
    (ActionId::ListMarkers, "markers", &[], ArgumentKind::None, "markers             List markers"),
    (ActionId::ClearMarkers, "clearmarks", &[], ArgumentKind::None, "clearmarks          Remove all markers"),
    (ActionId::Status, "status", &["s"], ArgumentKind::None, "status              Show player status"),
    (ActionId::Watch, "watch", &[], ArgumentKind::None, "watch               Live status view"),
    (ActionId::History, "history", &[], ArgumentKind::None, "history             Recent player events"),
    (ActionId::Devices, "devices", &[], ArgumentKind::None, "devices             List output devices"),
    (ActionId::Device, "device", &[], ArgumentKind::Text, "device <name>       Switch output device"),
    (ActionId::SaveSession, "save", &[], ArgumentKind::None, "save                Save the session now"),
    (ActionId::Clear, "clear", &["eject"], ArgumentKind::None, "clear               Stop and unload both decks"),
    (ActionId::Help, "help", &["?", "h"], ArgumentKind::None, "help                Show this help"),
    (ActionId::Quit, "quit", &["exit", "q"], ArgumentKind::None, "quit                Save the session and exit"),
];

impl ActionId {
    fn entry(&self) -> &'static (ActionId, &'static str, &'static [&'static str], ArgumentKind, &'static str) {
        ACTIONS
            .iter()
            .find(|entry| entry.0 == *self)
            .unwrap_or(&ACTIONS[ACTIONS.len() - 1])
    }

    pub fn all() -> impl Iterator<Item = ActionId> {
        ACTIONS.iter().map(|entry| entry.0)
    }

    pub fn keyword(&self) -> &'static str {
        self.entry().1
    }

    pub fn argument_kind(&self) -> ArgumentKind {
        self.entry().3
    }

    pub fn help_line(&self) -> &'static str {
        self.entry().4
    }

    pub fn from_keyword(word: &str) -> Option<ActionId> {
        let word = word.to_lowercase();
        ACTIONS
            .iter()
            .find(|(_, keyword, aliases, _, _)| *keyword == word || aliases.contains(&word.as_str()))
            .map(|entry| entry.0)
    }
}

/// What the presentation layer should do after a command ran
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Message(String),
    ShowStatus,
    Watch,
    ShowHistory,
    ListDevices,
    SelectDevice(String),
    SaveSession,
    ShowHelp,
    Quit,
}

/// State a handler may touch
pub struct ControlContext<'a> {
    pub engine: &'a mut PlaybackEngine,
    pub markers: &'a mut MarkerList,
    pub logger: &'a PlayerLogger,
    pub jump_seconds: f64,
}

pub type Handler = Box<dyn Fn(&mut ControlContext<'_>, &Argument) -> Result<Outcome, PlayerError>>;

pub struct ControlDispatcher {
    handlers: HashMap<ActionId, Handler>,
}

impl ControlDispatcher {
    /// Dispatcher with the standard handler for every action
    pub fn new() -> Self {
        let mut dispatcher = Self { handlers: HashMap::new() };
        dispatcher.register_defaults();
        dispatcher
    }

    pub fn register<F>(&mut self, action: ActionId, handler: F)
    where
        F: Fn(&mut ControlContext<'_>, &Argument) -> Result<Outcome, PlayerError> + 'static,
    {
        self.handlers.insert(action, Box::new(handler));
    }

    pub fn has_handler(&self, action: ActionId) -> bool {
        self.handlers.contains_key(&action)
    }

    pub fn dispatch(&self, context: &mut ControlContext<'_>, command: &Command) -> Result<Outcome, PlayerError> {
        let handler = self.handlers.get(&command.action).ok_or_else(|| ParseError::UnknownCommand {
            command: command.action.keyword().to_string(),
        })?;
        handler(context, &command.argument)
    }

    fn register_defaults(&mut self) {
        self.register(ActionId::Load, |ctx, arg| {
            let path = expect_path(arg, ActionId::Load)?;
            match ctx.engine.load_file(path) {
                Ok(info) => {
                    ctx.markers.clear();
                    ctx.logger.log_event(PlaybackEventType::TrackLoaded, info.summary());
                    Ok(Outcome::Message(format!("Loaded {}", info.summary())))
                }
                Err(e) => {
                    ctx.logger
                        .log_event(PlaybackEventType::LoadFailed, format!("{}: {}", path.display(), e));
                    Err(e)
                }
            }
        });

        self.register(ActionId::LoadMixer, |ctx, arg| {
            let path = expect_path(arg, ActionId::LoadMixer)?;
            match ctx.engine.load_mixer_file(path) {
                Ok(info) => {
                    ctx.logger.log_event(PlaybackEventType::MixerLoaded, info.summary());
                    Ok(Outcome::Message(format!("Mixer: {}", info.summary())))
                }
                Err(e) => {
                    ctx.logger
                        .log_event(PlaybackEventType::LoadFailed, format!("{}: {}", path.display(), e));
                    Err(e)
                }
            }
        });

        self.register(ActionId::UnloadMixer, |ctx, _| {
            ctx.engine.unload_mixer();
            Ok(Outcome::Message("Mixer deck unloaded".to_string()))
        });

        self.register(ActionId::Play, |ctx, _| {
            if ctx.engine.primary_info().is_none() {
                return Ok(Outcome::Message("No file loaded".to_string()));
            }
            ctx.engine.play();
            ctx.logger.log_event(PlaybackEventType::Play, ctx.engine.metadata_text());
            Ok(Outcome::Message("Playing".to_string()))
        });

        self.register(ActionId::Pause, |ctx, _| {
            ctx.engine.pause();
            ctx.logger
                .log_event(PlaybackEventType::Pause, format_seconds(ctx.engine.get_current_position()));
            Ok(Outcome::Message(ctx.engine.playback_state().to_string()))
        });

        self.register(ActionId::PlayPause, |ctx, _| {
            let state = ctx.engine.toggle_play_pause();
            let event = match state {
                PlaybackState::Playing => PlaybackEventType::Play,
                _ => PlaybackEventType::Pause,
            };
            ctx.logger.log_event(event, ctx.engine.metadata_text());
            Ok(Outcome::Message(state.to_string()))
        });

        self.register(ActionId::Stop, |ctx, _| {
            ctx.engine.stop();
            ctx.logger.log_event(PlaybackEventType::Stop, ctx.engine.metadata_text());
            Ok(Outcome::Message("Stopped".to_string()))
        });

        for action in [ActionId::Restart, ActionId::GoToStart] {
            self.register(action, |ctx, _| {
                ctx.engine.go_to_start();
                Ok(seek_message(ctx))
            });
        }

        self.register(ActionId::GoToEnd, |ctx, _| {
            ctx.engine.go_to_end();
            Ok(seek_message(ctx))
        });

        self.register(ActionId::Seek, |ctx, arg| {
            let Argument::Seconds(seconds) = arg else {
                return Err(missing(ActionId::Seek, "time"));
            };
            ctx.engine.set_position(*seconds);
            Ok(seek_message(ctx))
        });

        self.register(ActionId::Forward, |ctx, arg| {
            let seconds = optional_seconds(arg, ctx.jump_seconds);
            ctx.engine.jump_forward(seconds);
            Ok(seek_message(ctx))
        });

        self.register(ActionId::Backward, |ctx, arg| {
            let seconds = optional_seconds(arg, ctx.jump_seconds);
            ctx.engine.jump_backward(seconds);
            Ok(seek_message(ctx))
        });

        self.register(ActionId::Loop, |ctx, arg| {
            let looping = match arg {
                Argument::Toggle(Some(value)) => *value,
                _ => !ctx.engine.is_looping(),
            };
            ctx.engine.set_looping(looping);
            let text = if looping { "Looping on" } else { "Looping off" };
            ctx.logger.log_event(PlaybackEventType::LoopChanged, text);
            Ok(Outcome::Message(text.to_string()))
        });

        self.register(ActionId::AbLoop, |ctx, arg| {
            let Argument::Range { start, end } = arg else {
                return Err(missing(ActionId::AbLoop, "start end"));
            };
            ctx.engine.set_ab_looping(true, *start, *end)?;
            let text = format!("A-B loop {} - {}", format_seconds(*start), format_seconds(*end));
            ctx.logger.log_event(PlaybackEventType::AbLoopChanged, text.clone());
            Ok(Outcome::Message(text))
        });

        self.register(ActionId::AbLoopOff, |ctx, _| {
            let region = ctx.engine.ab_loop();
            ctx.engine.set_ab_looping(false, region.start, region.end)?;
            ctx.logger.log_event(PlaybackEventType::AbLoopChanged, "A-B loop off");
            Ok(Outcome::Message("A-B loop off".to_string()))
        });

        self.register(ActionId::Mute, |ctx, _| {
            let muted = ctx.engine.toggle_mute();
            Ok(Outcome::Message(if muted { "Muted" } else { "Unmuted" }.to_string()))
        });

        self.register(ActionId::MixerMute, |ctx, _| {
            if !ctx.engine.has_mixer() {
                return Ok(Outcome::Message("No mixer track loaded".to_string()));
            }
            let muted = ctx.engine.toggle_mixer_mute();
            Ok(Outcome::Message(if muted { "Mixer muted" } else { "Mixer unmuted" }.to_string()))
        });

        self.register(ActionId::Volume, |ctx, arg| {
            let Argument::Level(level) = arg else {
                return Err(missing(ActionId::Volume, "level"));
            };
            ctx.engine.set_gain(*level);
            Ok(Outcome::Message(format!("Volume {:.0}%", level * 100.0)))
        });

        self.register(ActionId::MixerVolume, |ctx, arg| {
            let Argument::Level(level) = arg else {
                return Err(missing(ActionId::MixerVolume, "level"));
            };
            if !ctx.engine.has_mixer() {
                return Ok(Outcome::Message("No mixer track loaded".to_string()));
            }
            ctx.engine.set_mixer_gain(*level);
            Ok(Outcome::Message(format!("Mixer volume {:.0}%", level * 100.0)))
        });

        self.register(ActionId::Speed, |ctx, arg| {
            let Argument::Ratio(ratio) = arg else {
                return Err(missing(ActionId::Speed, "ratio"));
            };
            let applied = ctx.engine.set_speed(*ratio);
            ctx.logger
                .log_event(PlaybackEventType::SpeedChanged, format!("{:.2}x", applied));
            Ok(Outcome::Message(format!("Speed {:.2}x", applied)))
        });

        self.register(ActionId::AddMarker, |ctx, arg| {
            if ctx.engine.primary_info().is_none() {
                return Ok(Outcome::Message("No file loaded".to_string()));
            }
            let label = match arg {
                Argument::Text(label) => label.clone(),
                _ => String::new(),
            };
            let position = ctx.engine.get_current_position();
            match ctx.markers.add(position, label) {
                Some(index) => {
                    let marker = ctx.markers.get(index).map(|m| m.label.clone()).unwrap_or_default();
                    Ok(Outcome::Message(format!(
                        "Marker {} '{}' at {}",
                        index + 1,
                        marker,
                        format_seconds(position)
                    )))
                }
                None => Ok(Outcome::Message("Could not add marker".to_string())),
            }
        });

        self.register(ActionId::RemoveMarker, |ctx, arg| {
            let index = expect_index(arg, ActionId::RemoveMarker)?;
            match ctx.markers.remove(index) {
                Some(marker) => Ok(Outcome::Message(format!("Removed marker '{}'", marker.label))),
                None => Err(no_such_marker(index)),
            }
        });

        self.register(ActionId::JumpToMarker, |ctx, arg| {
            let index = expect_index(arg, ActionId::JumpToMarker)?;
            let timestamp = ctx.markers.get(index).map(|m| m.timestamp).ok_or_else(|| no_such_marker(index))?;
            ctx.engine.set_position(timestamp);
            Ok(seek_message(ctx))
        });

        self.register(ActionId::NextMarker, |ctx, _| {
            let position = ctx.engine.get_current_position();
            match ctx.markers.next_after(position).map(|m| m.timestamp) {
                Some(timestamp) => {
                    ctx.engine.set_position(timestamp);
                    Ok(seek_message(ctx))
                }
                None => Ok(Outcome::Message("No marker after the current position".to_string())),
            }
        });

        self.register(ActionId::PreviousMarker, |ctx, _| {
            // A marker right behind the play head counts as the current one
            let position = ctx.engine.get_current_position() - MARKER_GRACE_SECONDS;
            match ctx.markers.previous_before(position).map(|m| m.timestamp) {
                Some(timestamp) => {
                    ctx.engine.set_position(timestamp);
                    Ok(seek_message(ctx))
                }
                None => Ok(Outcome::Message("No marker before the current position".to_string())),
            }
        });

        self.register(ActionId::ListMarkers, |ctx, _| {
            if ctx.markers.is_empty() {
                return Ok(Outcome::Message("No markers".to_string()));
            }
            let lines: Vec<String> = ctx
                .markers
                .iter()
                .enumerate()
                .map(|(i, m)| format!("{:>3}. {:>8}  {}", i + 1, format_seconds(m.timestamp), m.label))
                .collect();
            Ok(Outcome::Message(lines.join("\n")))
        });

        self.register(ActionId::ClearMarkers, |ctx, _| {
            ctx.markers.clear();
            Ok(Outcome::Message("Markers cleared".to_string()))
        });

        self.register(ActionId::Clear, |ctx, _| {
            ctx.engine.stop_and_clear();
            ctx.markers.clear();
            ctx.logger.log_event(PlaybackEventType::Stop, "Cleared both decks");
            Ok(Outcome::Message("Both decks cleared".to_string()))
        });

        self.register(ActionId::Status, |_, _| Ok(Outcome::ShowStatus));
        self.register(ActionId::Watch, |_, _| Ok(Outcome::Watch));
        self.register(ActionId::History, |_, _| Ok(Outcome::ShowHistory));
        self.register(ActionId::Devices, |_, _| Ok(Outcome::ListDevices));
        self.register(ActionId::Device, |_, arg| match arg {
            Argument::Text(name) => Ok(Outcome::SelectDevice(name.clone())),
            _ => Err(missing(ActionId::Device, "name")),
        });
        self.register(ActionId::SaveSession, |_, _| Ok(Outcome::SaveSession));
        self.register(ActionId::Help, |_, _| Ok(Outcome::ShowHelp));
        self.register(ActionId::Quit, |_, _| Ok(Outcome::Quit));
    }
}

impl Default for ControlDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn seek_message(ctx: &mut ControlContext<'_>) -> Outcome {
    let position = ctx.engine.get_current_position();
    ctx.logger.log_event(PlaybackEventType::Seek, format_seconds(position));
    Outcome::Message(format!(
        "Position {} / {}",
        format_seconds(position),
        format_seconds(ctx.engine.get_length_in_seconds())
    ))
}

fn optional_seconds(arg: &Argument, default: f64) -> f64 {
    match arg {
        Argument::Seconds(seconds) => *seconds,
        _ => default,
    }
}

fn missing(action: ActionId, argument: &str) -> PlayerError {
    ParseError::MissingArgument {
        command: action.keyword().to_string(),
        argument: argument.to_string(),
    }
    .into()
}

fn expect_path(arg: &Argument, action: ActionId) -> Result<&std::path::Path, PlayerError> {
    match arg {
        Argument::Path(path) => Ok(path.as_path()),
        _ => Err(missing(action, "file")),
    }
}

fn expect_index(arg: &Argument, action: ActionId) -> Result<usize, PlayerError> {
    match arg {
        Argument::Index(index) => Ok(*index),
        _ => Err(missing(action, "marker number")),
    }
}

fn no_such_marker(index: usize) -> PlayerError {
    ParseError::InvalidArgument {
        argument: "marker".to_string(),
        value: (index + 1).to_string(),
        expected: "a listed marker number".to_string(),
    }
    .into()
}
