use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info, warn};

use crate::audio::decoder::{self, DecodedStream};
use crate::audio::metadata::resolve_track_info;
use crate::audio::mixer::Mixer;
use crate::audio::resampler::{PlaybackSpeed, TrackResampler};
use crate::audio::tags::{FfprobeTagReader, TagFallback};
use crate::audio::transport::Transport;
use crate::audio::waveform::WaveformThumbnail;
use crate::config::PlayerConfig;
use crate::error::{AudioError, PlayerError};
use crate::logging::OperationTimer;
use crate::models::{AbLoopRegion, DeckStatus, PlaybackState, PlayerStatus, TrackInfo, TrackSlot};

/// How close to the end a looping track has to be before it wraps
pub const LOOP_EPSILON_SECONDS: f64 = 0.05;

pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
pub const DEFAULT_CHANNELS: usize = 2;

/// Distance from the end `go_to_end` leaves the play head at
const END_MARGIN_SECONDS: f64 = 0.1;

/// Whole-file decodes slower than this are logged as warnings
const SLOW_DECODE: Duration = Duration::from_secs(2);

/// The part of the engine that runs on the real-time thread.
///
/// Owns both resamplers and the mixer. One call to [`BlockRenderer::render`]
/// fills an output buffer in chunks of at most `max_block_frames`, and after
/// each chunk checks the loop and A-B loop boundaries so any wrap lands
/// before the next chunk is pulled.
pub struct BlockRenderer {
    primary: TrackResampler,
    mixer_track: TrackResampler,
    mixer: Mixer,
    ab_loop: Arc<Mutex<AbLoopRegion>>,
    sample_rate: u32,
    channels: usize,
    max_block_frames: usize,
}

impl BlockRenderer {
    fn new(
        primary: Transport,
        mixer_track: Transport,
        speed: PlaybackSpeed,
        ab_loop: Arc<Mutex<AbLoopRegion>>,
        max_block_frames: usize,
    ) -> Self {
        let max_block_frames = max_block_frames.max(1);
        Self {
            primary: TrackResampler::new(primary, speed.clone(), DEFAULT_SAMPLE_RATE, DEFAULT_CHANNELS, max_block_frames),
            mixer_track: TrackResampler::new(mixer_track, speed, DEFAULT_SAMPLE_RATE, DEFAULT_CHANNELS, max_block_frames),
            mixer: Mixer::new(max_block_frames * DEFAULT_CHANNELS),
            ab_loop,
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            max_block_frames,
        }
    }

    /// Size everything for the output device. Not for the real-time thread.
    pub fn prepare(&mut self, max_block_frames: usize, sample_rate: u32, channels: usize) {
        self.max_block_frames = max_block_frames.max(1);
        self.sample_rate = sample_rate;
        self.channels = channels.max(1);
        self.primary.prepare(sample_rate, self.channels, self.max_block_frames);
        self.mixer_track.prepare(sample_rate, self.channels, self.max_block_frames);
        self.mixer.prepare(self.max_block_frames * self.channels);
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Make room for a stream at `source_rate` on `slot` ahead of loading it
    pub fn fit_source_rate(&mut self, slot: TrackSlot, source_rate: u32) {
        match slot {
            TrackSlot::Primary => self.primary.fit_source_rate(source_rate),
            TrackSlot::Mixer => self.mixer_track.fit_source_rate(source_rate),
        }
    }

    /// Fill `buffer` (interleaved, `channels()` wide) with the next audio
    pub fn render(&mut self, buffer: &mut [f32]) {
        let chunk_len = self.max_block_frames * self.channels;
        for chunk in buffer.chunks_mut(chunk_len) {
            self.mixer
                .mix(chunk, self.channels, &mut [&mut self.primary, &mut self.mixer_track]);
            self.apply_loop_boundaries();
        }
    }

    fn apply_loop_boundaries(&self) {
        let region = self.ab_loop.try_lock().ok().map(|region| *region);
        let primary = self.primary.transport();
        match region {
            Some(region) if region.enabled => {
                primary.jump_if_past(region.end, region.start);
            }
            Some(_) => {
                primary.wrap_if_near_end(LOOP_EPSILON_SECONDS);
            }
            // Region is being edited; check again after the next block
            None => {}
        }
        self.mixer_track.transport().wrap_if_near_end(LOOP_EPSILON_SECONDS);
    }
}

struct Deck {
    slot: TrackSlot,
    transport: Transport,
    info: Option<TrackInfo>,
    thumbnail: WaveformThumbnail,
}

impl Deck {
    fn new(slot: TrackSlot, gain: f32, peaks_per_second: u32) -> Self {
        let transport = Transport::new();
        transport.set_gain(gain);
        Self {
            slot,
            transport,
            info: None,
            thumbnail: WaveformThumbnail::new(peaks_per_second),
        }
    }

    fn is_loaded(&self) -> bool {
        self.info.is_some()
    }

    fn status(&self) -> DeckStatus {
        DeckStatus {
            slot: self.slot,
            track: self.info.clone(),
            state: self.transport.state(),
            position: self.transport.position_seconds(),
            length: self.transport.length_seconds(),
            gain: self.transport.gain(),
            muted: self.transport.is_muted(),
            looping: self.transport.is_looping(),
        }
    }

    fn clear(&mut self) {
        self.transport.unload();
        self.info = None;
        self.thumbnail.clear();
    }
}

/// Two-deck playback engine: a primary track plus an optional overlay
/// ("mixer") track that plays in lockstep with it.
///
/// All methods except [`PlaybackEngine::get_next_audio_block`] belong to the
/// control thread. The output stream holds a clone of
/// [`PlaybackEngine::renderer`] and renders through it directly.
pub struct PlaybackEngine {
    primary: Deck,
    mixer: Deck,
    speed: PlaybackSpeed,
    ab_loop: Arc<Mutex<AbLoopRegion>>,
    renderer: Arc<Mutex<BlockRenderer>>,
    tag_fallback: Box<dyn TagFallback>,
}

impl PlaybackEngine {
    pub fn new(config: &PlayerConfig) -> Self {
        let fallback = FfprobeTagReader::new(config.tag_probe_program.clone());
        Self::with_tag_fallback(config, Box::new(fallback))
    }

    pub fn with_tag_fallback(config: &PlayerConfig, tag_fallback: Box<dyn TagFallback>) -> Self {
        let primary = Deck::new(TrackSlot::Primary, config.default_volume, config.waveform_resolution);
        let mixer = Deck::new(TrackSlot::Mixer, config.default_mixer_volume, config.waveform_resolution);
        let speed = PlaybackSpeed::new();
        let ab_loop = Arc::new(Mutex::new(AbLoopRegion::disabled()));

        let renderer = BlockRenderer::new(
            primary.transport.clone(),
            mixer.transport.clone(),
            speed.clone(),
            Arc::clone(&ab_loop),
            config.block_size,
        );

        Self {
            primary,
            mixer,
            speed,
            ab_loop,
            renderer: Arc::new(Mutex::new(renderer)),
            tag_fallback,
        }
    }

    fn lock_renderer(&self) -> MutexGuard<'_, BlockRenderer> {
        self.renderer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_ab_loop(&self) -> MutexGuard<'_, AbLoopRegion> {
        self.ab_loop.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Publish the region to the renderer and tell the primary transport
    /// whether to hold at the end of the stream for it
    fn store_ab_loop(&self, region: AbLoopRegion) {
        *self.lock_ab_loop() = region;
        self.primary.transport.set_ab_armed(region.enabled);
    }

    fn disarm_ab_loop(&self) {
        let region = AbLoopRegion { enabled: false, ..self.ab_loop() };
        self.store_ab_loop(region);
    }

    fn deck(&self, slot: TrackSlot) -> &Deck {
        match slot {
            TrackSlot::Primary => &self.primary,
            TrackSlot::Mixer => &self.mixer,
        }
    }

    fn deck_mut(&mut self, slot: TrackSlot) -> &mut Deck {
        match slot {
            TrackSlot::Primary => &mut self.primary,
            TrackSlot::Mixer => &mut self.mixer,
        }
    }

    /// Handle the output stream renders through
    pub fn renderer(&self) -> Arc<Mutex<BlockRenderer>> {
        Arc::clone(&self.renderer)
    }

    /// Resize for the device's block size, sample rate and channel count
    pub fn prepare_to_play(&self, max_block_frames: usize, sample_rate: u32, channels: usize) {
        self.lock_renderer().prepare(max_block_frames, sample_rate, channels);
        debug!(
            "Engine prepared: {} frames, {} Hz, {} channels",
            max_block_frames, sample_rate, channels
        );
    }

    /// Real-time entry point. Never blocks: if the renderer is being
    /// reconfigured the block is silent.
    pub fn get_next_audio_block(&self, buffer: &mut [f32]) {
        match self.renderer.try_lock() {
            Ok(mut renderer) => renderer.render(buffer),
            Err(_) => buffer.fill(0.0),
        }
    }

    /// Decode `path` into the primary deck. On failure the current track is untouched.
    pub fn load_file(&mut self, path: &Path) -> Result<TrackInfo, PlayerError> {
        let info = self.load_into(TrackSlot::Primary, path)?;
        self.primary.thumbnail.set_source(path);
        Ok(info)
    }

    /// Decode `path` into the overlay deck. On failure the current overlay is untouched.
    pub fn load_mixer_file(&mut self, path: &Path) -> Result<TrackInfo, PlayerError> {
        let info = self.load_into(TrackSlot::Mixer, path)?;
        self.mixer.thumbnail.set_source(path);
        Ok(info)
    }

    fn load_into(&mut self, slot: TrackSlot, path: &Path) -> Result<TrackInfo, PlayerError> {
        let timer = OperationTimer::new(format!("decode {}", path.display()));
        let (stream, embedded, duration) = decoder::open_file(path).map_err(|e| {
            warn!("Failed to load {} into {} deck: {}", path.display(), slot, e);
            e
        })?;
        timer.finish_with_threshold(SLOW_DECODE);
        let info = resolve_track_info(
            path,
            embedded,
            duration,
            stream.sample_rate(),
            stream.channels(),
            self.tag_fallback.as_ref(),
        );
        self.load_stream(slot, stream, info.clone());
        info!("Loaded {} into {} deck", info.summary(), slot);
        Ok(info)
    }

    /// Bind an already decoded stream to a deck.
    ///
    /// The primary deck ends up stopped at zero with any A-B region
    /// disarmed. The overlay picks up the primary's loop flag, position and
    /// play state so the two stay aligned.
    pub fn load_stream(&mut self, slot: TrackSlot, stream: DecodedStream, info: TrackInfo) {
        self.lock_renderer().fit_source_rate(slot, stream.sample_rate());
        let deck = self.deck_mut(slot);
        deck.thumbnail.clear();
        deck.transport.load(Arc::new(stream));
        deck.info = Some(info);

        match slot {
            TrackSlot::Primary => {
                self.disarm_ab_loop();
            }
            TrackSlot::Mixer => {
                let looping = self.primary.transport.is_looping();
                self.mixer.transport.set_looping(looping);
                if self.primary.is_loaded() {
                    self.mixer.transport.set_position(self.primary.transport.position_seconds());
                    if self.primary.transport.is_playing() {
                        self.mixer.transport.play();
                    }
                }
            }
        }
    }

    pub fn unload_mixer(&mut self) {
        if self.mixer.is_loaded() {
            info!("Unloaded mixer deck");
        }
        self.mixer.clear();
    }

    /// Stop both decks and release their streams and thumbnails
    pub fn stop_and_clear(&mut self) {
        self.primary.clear();
        self.mixer.clear();
        self.store_ab_loop(AbLoopRegion::disabled());
        info!("Cleared both decks");
    }

    pub fn play(&mut self) {
        if !self.primary.is_loaded() {
            return;
        }
        if self.primary.transport.state() != PlaybackState::Playing && self.primary.transport.is_at_end() {
            self.set_position(0.0);
        }
        self.primary.transport.play();
        if self.mixer.is_loaded() {
            self.mixer.transport.play();
        }
    }

    pub fn pause(&mut self) {
        self.primary.transport.pause();
        if self.mixer.is_loaded() {
            self.mixer.transport.pause();
        }
    }

    pub fn stop(&mut self) {
        self.primary.transport.stop();
        if self.mixer.is_loaded() {
            self.mixer.transport.stop();
        }
    }

    /// Play if paused or stopped, pause if playing
    pub fn toggle_play_pause(&mut self) -> PlaybackState {
        if self.is_playing() {
            self.pause();
        } else {
            self.play();
        }
        self.playback_state()
    }

    /// Seek the primary and mirror it to the overlay, clamped to each track's length
    pub fn set_position(&mut self, seconds: f64) {
        let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
        self.primary.transport.set_position(seconds);

        if self.mixer.is_loaded() {
            self.mixer.transport.set_position(seconds);
            // An overlay that ran out rejoins when the primary seeks back into its range
            if self.primary.transport.is_playing()
                && !self.mixer.transport.is_playing()
                && seconds < self.mixer.transport.length_seconds()
            {
                self.mixer.transport.play();
            }
        }
    }

    pub fn get_current_position(&self) -> f64 {
        self.primary.transport.position_seconds()
    }

    pub fn get_length_in_seconds(&self) -> f64 {
        self.primary.transport.length_seconds()
    }

    pub fn mixer_position(&self) -> f64 {
        self.mixer.transport.position_seconds()
    }

    pub fn mixer_length(&self) -> f64 {
        self.mixer.transport.length_seconds()
    }

    pub fn jump_forward(&mut self, seconds: f64) {
        let target = (self.get_current_position() + seconds.max(0.0)).min(self.get_length_in_seconds());
        self.set_position(target);
    }

    pub fn jump_backward(&mut self, seconds: f64) {
        let target = (self.get_current_position() - seconds.max(0.0)).max(0.0);
        self.set_position(target);
    }

    pub fn go_to_start(&mut self) {
        self.set_position(0.0);
    }

    pub fn go_to_end(&mut self) {
        let length = self.get_length_in_seconds();
        if length > END_MARGIN_SECONDS {
            self.set_position(length - END_MARGIN_SECONDS);
        }
    }

    /// Clamp to [0.5, 2.0] and apply to both decks; returns the ratio in effect
    pub fn set_speed(&mut self, ratio: f64) -> f64 {
        let applied = self.speed.set(ratio);
        debug!("Playback speed set to {:.2}x", applied);
        applied
    }

    pub fn speed(&self) -> f64 {
        self.speed.get()
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.primary.transport.set_looping(looping);
        self.mixer.transport.set_looping(looping);
    }

    pub fn is_looping(&self) -> bool {
        self.primary.transport.is_looping()
    }

    /// Arm or disarm the A-B region on the primary timeline.
    ///
    /// A region that does not fit the loaded track is rejected and leaves
    /// A-B looping disarmed.
    pub fn set_ab_looping(&mut self, enabled: bool, start: f64, end: f64) -> Result<(), AudioError> {
        if !enabled {
            self.disarm_ab_loop();
            return Ok(());
        }

        if !self.primary.is_loaded() {
            self.disarm_ab_loop();
            return Err(AudioError::NoTrackLoaded { slot: TrackSlot::Primary });
        }

        let length = self.get_length_in_seconds();
        if !AbLoopRegion::is_valid_for(start, end, length) {
            self.disarm_ab_loop();
            return Err(AudioError::InvalidLoopRegion { start, end, length });
        }

        self.store_ab_loop(AbLoopRegion { enabled: true, start, end });
        Ok(())
    }

    pub fn ab_loop(&self) -> AbLoopRegion {
        *self.lock_ab_loop()
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.primary.transport.set_gain(gain);
    }

    pub fn gain(&self) -> f32 {
        self.primary.transport.gain()
    }

    pub fn set_mixer_gain(&mut self, gain: f32) {
        self.mixer.transport.set_gain(gain);
    }

    pub fn mixer_gain(&self) -> f32 {
        self.mixer.transport.gain()
    }

    /// Flip the primary mute; returns the new state
    pub fn toggle_mute(&mut self) -> bool {
        let muted = !self.primary.transport.is_muted();
        self.primary.transport.set_muted(muted);
        muted
    }

    /// Flip the overlay mute; returns the new state
    pub fn toggle_mixer_mute(&mut self) -> bool {
        let muted = !self.mixer.transport.is_muted();
        self.mixer.transport.set_muted(muted);
        muted
    }

    pub fn is_muted(&self) -> bool {
        self.primary.transport.is_muted()
    }

    pub fn is_mixer_muted(&self) -> bool {
        self.mixer.transport.is_muted()
    }

    pub fn is_playing(&self) -> bool {
        self.primary.transport.is_playing()
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.primary.transport.state()
    }

    pub fn mixer_playback_state(&self) -> PlaybackState {
        self.mixer.transport.state()
    }

    pub fn has_mixer(&self) -> bool {
        self.mixer.is_loaded()
    }

    pub fn primary_info(&self) -> Option<&TrackInfo> {
        self.primary.info.as_ref()
    }

    pub fn mixer_info(&self) -> Option<&TrackInfo> {
        self.mixer.info.as_ref()
    }

    /// "Artist - Title (m:ss)" for the primary, or a prompt when nothing is loaded
    pub fn metadata_text(&self) -> String {
        match self.primary_info() {
            Some(info) => info.summary(),
            None => "No file loaded".to_string(),
        }
    }

    pub fn thumbnail(&self, slot: TrackSlot) -> &WaveformThumbnail {
        &self.deck(slot).thumbnail
    }

    pub fn status(&self) -> PlayerStatus {
        PlayerStatus {
            primary: self.primary.status(),
            mixer: self.mixer.status(),
            speed: self.speed(),
            ab_loop: self.ab_loop(),
            output_device: None,
        }
    }
}
