//! End-to-end tests: real WAV files through the decoder, engine, command
//! layer and session store.

use std::path::Path;

use tempfile::TempDir;

use crate::audio::decoder::tests::write_test_wav;
use crate::audio::engine::PlaybackEngine;
use crate::audio::tags::NoTagFallback;
use crate::cli::CliApp;
use crate::config::PlayerConfig;
use crate::controls::{ControlContext, ControlDispatcher, Outcome};
use crate::error::{AudioError, PlayerError};
use crate::logging::{PlaybackEventType, PlayerLogger};
use crate::markers::MarkerList;
use crate::models::PlaybackState;
use crate::session::{SessionState, SessionStore};

const RATE: u32 = 8000;
/// One output block of 0.1 s, mono
const BLOCK: usize = 800;

fn engine() -> PlaybackEngine {
    let config = PlayerConfig {
        default_volume: 1.0,
        default_mixer_volume: 1.0,
        block_size: BLOCK,
        ..PlayerConfig::default()
    };
    let engine = PlaybackEngine::with_tag_fallback(&config, Box::new(NoTagFallback));
    engine.prepare_to_play(BLOCK, RATE, 1);
    engine
}

fn wav(dir: &Path, name: &str, seconds: f64, value: f32) -> std::path::PathBuf {
    write_test_wav(dir, name, RATE, 1, seconds, value)
}

/// Render `seconds` of output and return the last block
fn render(engine: &PlaybackEngine, seconds: f64) -> Vec<f32> {
    let mut block = vec![0.0f32; BLOCK];
    let blocks = (seconds * RATE as f64 / BLOCK as f64).round() as usize;
    for _ in 0..blocks {
        engine.get_next_audio_block(&mut block);
    }
    block
}

fn close(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() < tolerance
}

#[test]
fn test_loaded_length_matches_file() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine();
    let path = wav(dir.path(), "thirty.wav", 30.0, 0.5);

    let info = engine.load_file(&path).unwrap();
    assert!(close(engine.get_length_in_seconds(), 30.0, 1e-6));
    assert!(close(info.duration.as_secs_f64(), 30.0, 0.01));
    assert_eq!(info.sample_rate, RATE);
    assert_eq!(engine.playback_state(), PlaybackState::Stopped);
    assert_eq!(engine.get_current_position(), 0.0);
    assert_eq!(engine.metadata_text(), info.summary());
}

#[test]
fn test_shorter_mixer_track_drops_out() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine();
    engine.load_file(&wav(dir.path(), "primary.wav", 30.0, 0.5)).unwrap();
    engine.load_mixer_file(&wav(dir.path(), "mixer.wav", 15.0, 0.25)).unwrap();

    engine.play();
    let block = render(&engine, 10.0);
    assert!(block.iter().all(|s| (*s - 0.75).abs() < 1e-3));

    let block = render(&engine, 6.0);
    assert_eq!(engine.mixer_playback_state(), PlaybackState::Stopped);
    assert!(engine.is_playing());
    assert!(close(engine.get_current_position(), 16.0, 0.01));
    assert!(block.iter().all(|s| (*s - 0.5).abs() < 1e-3));

    // Seeking back into its range brings the mixer track back in
    engine.set_position(5.0);
    assert_eq!(engine.mixer_playback_state(), PlaybackState::Playing);
    let block = render(&engine, 0.5);
    assert!(block.iter().all(|s| (*s - 0.75).abs() < 1e-3));
}

#[test]
fn test_per_track_gain_in_mix() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine();
    engine.load_file(&wav(dir.path(), "a.wav", 5.0, 0.5)).unwrap();
    engine.load_mixer_file(&wav(dir.path(), "b.wav", 5.0, 0.25)).unwrap();
    engine.set_gain(0.6);
    engine.set_mixer_gain(0.4);

    engine.play();
    let block = render(&engine, 1.0);
    // 0.5 * 0.6 + 0.25 * 0.4
    assert!(block.iter().all(|s| (*s - 0.4).abs() < 1e-3));
}

#[test]
fn test_looping_track_wraps() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine();
    engine.load_file(&wav(dir.path(), "short.wav", 2.0, 0.5)).unwrap();
    engine.set_looping(true);
    engine.play();

    let block = render(&engine, 5.0);
    assert!(engine.is_playing());
    assert!(engine.get_current_position() < 2.0);
    let audible = block.iter().filter(|s| (**s - 0.5).abs() < 1e-3).count();
    assert!(audible >= BLOCK - 2);
}

#[test]
fn test_track_stops_at_end_without_loop() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine();
    engine.load_file(&wav(dir.path(), "short.wav", 2.0, 0.5)).unwrap();
    engine.play();

    let block = render(&engine, 3.0);
    assert_eq!(engine.playback_state(), PlaybackState::Stopped);
    assert!(close(engine.get_current_position(), 2.0, 1e-6));
    assert!(block.iter().all(|s| *s == 0.0));
}

#[test]
fn test_ab_loop_returns_to_start() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine();
    engine.load_file(&wav(dir.path(), "long.wav", 30.0, 0.5)).unwrap();
    engine.set_ab_looping(true, 10.0, 20.0).unwrap();

    engine.set_position(19.5);
    engine.play();
    render(&engine, 1.0);

    let position = engine.get_current_position();
    assert!((10.0..11.0).contains(&position), "position {}", position);
    assert!(engine.is_playing());

    assert!(matches!(
        engine.set_ab_looping(true, 25.0, 40.0),
        Err(AudioError::InvalidLoopRegion { .. })
    ));
    assert!(!engine.ab_loop().enabled);

    // Disarmed: playback runs straight through the old end point
    engine.set_position(19.5);
    render(&engine, 1.0);
    assert!(engine.get_current_position() > 20.0);
}

#[test]
fn test_speed_change_mid_playback() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine();
    engine.load_file(&wav(dir.path(), "long.wav", 30.0, 0.5)).unwrap();

    assert_eq!(engine.set_speed(2.0), 2.0);
    engine.play();
    let block = render(&engine, 2.0);
    assert!(close(engine.get_current_position(), 4.0, 0.01));
    assert!(block.iter().all(|s| (*s - 0.5).abs() < 1e-3));

    engine.set_speed(1.0);
    render(&engine, 2.0);
    assert!(close(engine.get_current_position(), 6.0, 0.01));
}

#[test]
fn test_set_position_clamps_to_track() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine();
    engine.load_file(&wav(dir.path(), "ten.wav", 10.0, 0.5)).unwrap();

    engine.set_position(100.0);
    assert!(close(engine.get_current_position(), 10.0, 1e-6));
    engine.set_position(-4.0);
    assert_eq!(engine.get_current_position(), 0.0);
    engine.set_position(f64::NAN);
    assert_eq!(engine.get_current_position(), 0.0);
}

#[test]
fn test_failed_load_keeps_previous_track() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine();
    let path = wav(dir.path(), "good.wav", 10.0, 0.5);
    engine.load_file(&path).unwrap();
    engine.set_position(3.0);

    let bogus = dir.path().join("not-audio.wav");
    std::fs::write(&bogus, b"definitely not a wav file").unwrap();
    assert!(engine.load_file(&bogus).is_err());
    assert!(engine.load_mixer_file(&bogus).is_err());

    assert_eq!(engine.primary_info().map(|info| info.path.clone()), Some(path));
    assert!(close(engine.get_current_position(), 3.0, 1e-6));
    assert!(!engine.has_mixer());
}

struct Session {
    engine: PlaybackEngine,
    markers: MarkerList,
    logger: PlayerLogger,
    dispatcher: ControlDispatcher,
}

impl Session {
    fn new() -> Self {
        Self {
            engine: engine(),
            markers: MarkerList::new(),
            logger: PlayerLogger::new(),
            dispatcher: ControlDispatcher::new(),
        }
    }

    fn type_line(&mut self, line: &str) -> Result<Outcome, PlayerError> {
        let command = CliApp::parse_command(line)?;
        let mut context = ControlContext {
            engine: &mut self.engine,
            markers: &mut self.markers,
            logger: &self.logger,
            jump_seconds: 5.0,
        };
        self.dispatcher.dispatch(&mut context, &command)
    }

    fn state(&self) -> SessionState {
        SessionState {
            last_file: self.engine.primary_info().map(|info| info.path.clone()),
            last_position: self.engine.get_current_position(),
            volume: self.engine.gain(),
            speed: self.engine.speed(),
            markers: self.markers.to_vec(),
        }
    }
}

#[test]
fn test_typed_commands_drive_both_decks() {
    let dir = TempDir::new().unwrap();
    let primary = wav(dir.path(), "main track.wav", 30.0, 0.5);
    let overlay = wav(dir.path(), "overlay.wav", 30.0, 0.25);
    let mut session = Session::new();

    session.type_line(&format!("load {}", primary.display())).unwrap();
    session.type_line(&format!("mix {}", overlay.display())).unwrap();
    session.type_line("play").unwrap();
    session.type_line("seek 0:12").unwrap();
    session.type_line("mixvol 50").unwrap();
    session.type_line("speed 1.5").unwrap();

    assert!(session.engine.is_playing());
    assert_eq!(session.engine.mixer_playback_state(), PlaybackState::Playing);
    assert!(close(session.engine.mixer_position(), 12.0, 1e-3));
    assert_eq!(session.engine.mixer_gain(), 0.5);
    assert_eq!(session.engine.speed(), 1.5);

    let result = session.type_line("ab 20 10");
    assert!(matches!(result, Err(PlayerError::Audio(AudioError::InvalidLoopRegion { .. }))));
    session.type_line("ab 0:10 0:20").unwrap();
    assert!(session.engine.ab_loop().enabled);

    assert!(matches!(session.type_line("warp 9"), Err(PlayerError::Parse(_))));
    assert_eq!(session.type_line("quit").unwrap(), Outcome::Quit);

    assert_eq!(session.logger.event_count(PlaybackEventType::TrackLoaded), 1);
    assert_eq!(session.logger.event_count(PlaybackEventType::MixerLoaded), 1);
}

#[test]
fn test_session_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = wav(dir.path(), "song.wav", 20.0, 0.5);
    let store = SessionStore::new(dir.path().join("session.toml"));

    let mut first = Session::new();
    first.type_line(&format!("load {}", path.display())).unwrap();
    first.type_line("seek 7").unwrap();
    first.type_line("mark verse").unwrap();
    first.type_line("vol 40").unwrap();
    first.type_line("speed 0.75").unwrap();
    store.save(&first.state()).unwrap();

    let restored = store.load();
    let mut second = Session::new();
    let file = restored.restorable_file().map(Path::to_path_buf).unwrap();
    second.engine.load_file(&file).unwrap();
    second.engine.set_position(restored.last_position);
    second.engine.set_gain(restored.volume);
    second.engine.set_speed(restored.speed);
    second.markers = MarkerList::from_markers(restored.markers.clone());

    assert_eq!(second.state(), first.state());
    assert_eq!(second.markers.get(0).unwrap().label, "verse");
    second.type_line("goto 1").unwrap();
    assert!(close(second.engine.get_current_position(), 7.0, 1e-3));
}
