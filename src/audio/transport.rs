//! Play/pause/stop/seek state for one decoded track.
//!
//! A `Transport` is a cheap handle around shared state. The control thread
//! loads streams and moves the play head; the output callback pulls samples
//! through [`Transport::read_block`] and never blocks: if the stream lock is
//! held by the control side for that instant, the callback skips the read
//! and leaves the play head where it was. Position and length live in
//! atomics, so status reads never touch the lock.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::audio::decoder::DecodedStream;
use crate::models::PlaybackState;

struct TransportShared {
    /// Only ever locked to swap the stream or move the play head
    stream: Mutex<Option<Arc<DecodedStream>>>,
    /// Play head in source frames. Written with `stream` held.
    position: AtomicU64,
    len_frames: AtomicU64,
    loaded: AtomicBool,
    state: AtomicU8,
    sample_rate: AtomicU32,
    gain: AtomicU32,
    muted: AtomicBool,
    looping: AtomicBool,
    /// Keep playing past the end so an A-B jump can bring the play head back
    ab_armed: AtomicBool,
    /// Bumped whenever the play head jumps, so downstream interpolation
    /// state can be discarded
    generation: AtomicU64,
}

#[derive(Clone)]
pub struct Transport {
    shared: Arc<TransportShared>,
}

impl Transport {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(TransportShared {
                stream: Mutex::new(None),
                position: AtomicU64::new(0),
                len_frames: AtomicU64::new(0),
                loaded: AtomicBool::new(false),
                state: AtomicU8::new(PlaybackState::Stopped.to_u8()),
                sample_rate: AtomicU32::new(0),
                gain: AtomicU32::new(1.0f32.to_bits()),
                muted: AtomicBool::new(false),
                looping: AtomicBool::new(false),
                ab_armed: AtomicBool::new(false),
                generation: AtomicU64::new(0),
            }),
        }
    }

    fn lock_stream(&self) -> MutexGuard<'_, Option<Arc<DecodedStream>>> {
        // The callback never panics while holding the lock, but recover anyway
        self.shared.stream.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn bump_generation(&self) {
        self.shared.generation.fetch_add(1, Ordering::AcqRel);
    }

    fn set_state(&self, state: PlaybackState) {
        self.shared.state.store(state.to_u8(), Ordering::Release);
    }

    fn store_position(&self, frames: u64) {
        self.shared.position.store(frames, Ordering::Release);
    }

    fn position_frames(&self) -> u64 {
        self.shared.position.load(Ordering::Acquire)
    }

    /// Swap in a new stream. The transport ends up stopped at position zero;
    /// gain, mute and loop settings carry over.
    pub fn load(&self, stream: Arc<DecodedStream>) {
        let previous = {
            let mut current = self.lock_stream();
            self.set_state(PlaybackState::Stopped);
            self.shared.sample_rate.store(stream.sample_rate(), Ordering::Release);
            self.shared.len_frames.store(stream.len_frames(), Ordering::Release);
            self.store_position(0);
            self.shared.loaded.store(true, Ordering::Release);
            let previous = current.replace(stream);
            self.bump_generation();
            previous
        };
        // Release the old samples outside the lock
        drop(previous);
    }

    pub fn unload(&self) {
        let previous = {
            let mut current = self.lock_stream();
            self.set_state(PlaybackState::Stopped);
            self.shared.loaded.store(false, Ordering::Release);
            self.shared.sample_rate.store(0, Ordering::Release);
            self.shared.len_frames.store(0, Ordering::Release);
            self.store_position(0);
            self.bump_generation();
            current.take()
        };
        drop(previous);
    }

    pub fn is_loaded(&self) -> bool {
        self.shared.loaded.load(Ordering::Acquire)
    }

    /// Start or resume. Idempotent while playing; no-op without a stream.
    pub fn play(&self) {
        let _current = self.lock_stream();
        if self.is_loaded() {
            self.set_state(PlaybackState::Playing);
        }
    }

    /// Pause playback. A stopped transport stays stopped.
    pub fn pause(&self) {
        let _ = self.shared.state.compare_exchange(
            PlaybackState::Playing.to_u8(),
            PlaybackState::Paused.to_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Stop and rewind to the start
    pub fn stop(&self) {
        let _current = self.lock_stream();
        self.set_state(PlaybackState::Stopped);
        self.store_position(0);
        self.bump_generation();
    }

    pub fn state(&self) -> PlaybackState {
        PlaybackState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlaybackState::Playing
    }

    /// Move the play head, clamped to [0, length]
    pub fn set_position(&self, seconds: f64) {
        let current = self.lock_stream();
        let Some(stream) = current.as_ref() else {
            return;
        };
        let frames = seconds_to_frames(seconds, stream.sample_rate()).min(stream.len_frames());
        self.store_position(frames);
        self.bump_generation();
    }

    pub fn position_seconds(&self) -> f64 {
        frames_to_seconds(self.position_frames(), self.sample_rate())
    }

    pub fn length_seconds(&self) -> f64 {
        frames_to_seconds(self.shared.len_frames.load(Ordering::Acquire), self.sample_rate())
    }

    /// Whether the play head sits on the last frame (or there is nothing loaded)
    pub fn is_at_end(&self) -> bool {
        !self.is_loaded() || self.position_frames() >= self.shared.len_frames.load(Ordering::Acquire)
    }

    pub fn sample_rate(&self) -> u32 {
        self.shared.sample_rate.load(Ordering::Acquire)
    }

    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::Acquire)
    }

    pub fn set_gain(&self, gain: f32) {
        let gain = if gain.is_finite() { gain.max(0.0) } else { 0.0 };
        self.shared.gain.store(gain.to_bits(), Ordering::Release);
    }

    pub fn gain(&self) -> f32 {
        f32::from_bits(self.shared.gain.load(Ordering::Acquire))
    }

    pub fn set_muted(&self, muted: bool) {
        self.shared.muted.store(muted, Ordering::Release);
    }

    pub fn is_muted(&self) -> bool {
        self.shared.muted.load(Ordering::Acquire)
    }

    /// Gain actually applied when mixing
    pub fn effective_gain(&self) -> f32 {
        if self.is_muted() {
            0.0
        } else {
            self.gain()
        }
    }

    pub fn set_looping(&self, looping: bool) {
        self.shared.looping.store(looping, Ordering::Release);
    }

    pub fn is_looping(&self) -> bool {
        self.shared.looping.load(Ordering::Acquire)
    }

    /// While armed, running off the end does not stop the transport
    pub fn set_ab_armed(&self, armed: bool) {
        self.shared.ab_armed.store(armed, Ordering::Release);
    }

    pub fn is_ab_armed(&self) -> bool {
        self.shared.ab_armed.load(Ordering::Acquire)
    }

    /// Copy source frames starting at the play head into `dest` and advance.
    ///
    /// Called from the output callback. Returns the number of frames that came
    /// from the stream; the rest of `dest` is zero. `None` means nothing was
    /// read (not playing, nothing loaded, or the control side holds the lock)
    /// and the play head has not moved.
    ///
    /// Running off the end stops the transport unless it is looping or an A-B
    /// region is armed; those are wrapped by the engine's boundary check.
    pub fn read_block(&self, dest: &mut [f32], channels: usize) -> Option<usize> {
        if !self.is_playing() {
            dest.fill(0.0);
            return None;
        }

        let Ok(current) = self.shared.stream.try_lock() else {
            dest.fill(0.0);
            return None;
        };
        let Some(stream) = current.as_ref() else {
            dest.fill(0.0);
            return None;
        };

        let wanted = dest.len() / channels.max(1);
        let position = self.position_frames();
        let read = stream.read_into(position, dest, channels);
        self.store_position((position + read as u64).min(stream.len_frames()));

        if read < wanted && !self.is_looping() && !self.is_ab_armed() {
            let _ = self.shared.state.compare_exchange(
                PlaybackState::Playing.to_u8(),
                PlaybackState::Stopped.to_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }

        Some(read)
    }

    /// Rewind to zero when playing, looping, and within `epsilon` seconds of
    /// the end. Callback side; skipped if the lock is contended.
    pub fn wrap_if_near_end(&self, epsilon: f64) -> bool {
        if !self.is_playing() || !self.is_looping() {
            return false;
        }
        let Ok(current) = self.shared.stream.try_lock() else {
            return false;
        };
        let Some(stream) = current.as_ref() else {
            return false;
        };

        let sample_rate = stream.sample_rate();
        if sample_rate == 0 {
            return false;
        }
        let position = frames_to_seconds(self.position_frames(), sample_rate);
        if position >= stream.length_seconds() - epsilon {
            self.store_position(0);
            self.bump_generation();
            true
        } else {
            false
        }
    }

    /// Jump back to `start` once the play head reaches `end`. Callback side.
    pub fn jump_if_past(&self, end: f64, start: f64) -> bool {
        if !self.is_playing() {
            return false;
        }
        let Ok(current) = self.shared.stream.try_lock() else {
            return false;
        };
        let Some(stream) = current.as_ref() else {
            return false;
        };

        let sample_rate = stream.sample_rate();
        if sample_rate == 0 {
            return false;
        }
        if frames_to_seconds(self.position_frames(), sample_rate) >= end {
            self.store_position(seconds_to_frames(start, sample_rate).min(stream.len_frames()));
            self.bump_generation();
            true
        } else {
            false
        }
    }

    /// Hold the stream lock the way a control-side seek does
    #[cfg(test)]
    pub(crate) fn hold_stream_lock(&self) -> MutexGuard<'_, Option<Arc<DecodedStream>>> {
        self.lock_stream()
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

fn frames_to_seconds(frames: u64, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    frames as f64 / sample_rate as f64
}

fn seconds_to_frames(seconds: f64, sample_rate: u32) -> u64 {
    if !seconds.is_finite() || seconds <= 0.0 {
        return 0;
    }
    (seconds * sample_rate as f64).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_stream(frames: usize, sample_rate: u32) -> Arc<DecodedStream> {
        let samples = (0..frames).map(|i| i as f32).collect();
        Arc::new(DecodedStream::from_interleaved(samples, 1, sample_rate))
    }

    #[test]
    fn test_new_transport_is_stopped_and_empty() {
        let transport = Transport::new();
        assert_eq!(transport.state(), PlaybackState::Stopped);
        assert!(!transport.is_loaded());
        assert_eq!(transport.length_seconds(), 0.0);
        assert_eq!(transport.position_seconds(), 0.0);
    }

    #[test]
    fn test_play_without_stream_is_noop() {
        let transport = Transport::new();
        transport.play();
        assert_eq!(transport.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_state_transitions() {
        let transport = Transport::new();
        transport.load(ramp_stream(1000, 100));

        transport.pause();
        assert_eq!(transport.state(), PlaybackState::Stopped);

        transport.play();
        transport.play();
        assert_eq!(transport.state(), PlaybackState::Playing);

        transport.pause();
        assert_eq!(transport.state(), PlaybackState::Paused);

        transport.set_position(4.0);
        transport.stop();
        assert_eq!(transport.state(), PlaybackState::Stopped);
        assert_eq!(transport.position_seconds(), 0.0);
    }

    #[test]
    fn test_set_position_clamps() {
        let transport = Transport::new();
        transport.load(ramp_stream(1000, 100));

        transport.set_position(2.5);
        assert!((transport.position_seconds() - 2.5).abs() < 0.01);

        transport.set_position(-3.0);
        assert_eq!(transport.position_seconds(), 0.0);

        transport.set_position(99.0);
        assert!((transport.position_seconds() - 10.0).abs() < 0.01);
    }

    #[test]
    fn test_read_block_advances_only_while_playing() {
        let transport = Transport::new();
        transport.load(ramp_stream(1000, 100));

        let mut block = [1.0f32; 10];
        assert_eq!(transport.read_block(&mut block, 1), None);
        assert!(block.iter().all(|s| *s == 0.0));

        transport.play();
        assert_eq!(transport.read_block(&mut block, 1), Some(10));
        assert_eq!(block[0], 0.0);
        assert_eq!(block[9], 9.0);
        assert!((transport.position_seconds() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_end_of_stream_stops_when_not_looping() {
        let transport = Transport::new();
        transport.load(ramp_stream(15, 100));
        transport.play();

        let mut block = [0.0f32; 10];
        transport.read_block(&mut block, 1);
        assert!(transport.is_playing());
        assert_eq!(transport.read_block(&mut block, 1), Some(5));
        assert_eq!(block[4], 14.0);
        assert_eq!(block[5], 0.0);
        assert_eq!(transport.state(), PlaybackState::Stopped);
        assert!(transport.is_at_end());
    }

    #[test]
    fn test_end_of_stream_keeps_playing_when_looping() {
        let transport = Transport::new();
        transport.load(ramp_stream(15, 100));
        transport.set_looping(true);
        transport.play();

        let mut block = [0.0f32; 10];
        transport.read_block(&mut block, 1);
        transport.read_block(&mut block, 1);
        assert!(transport.is_playing());
        assert!(transport.wrap_if_near_end(0.05));
        assert_eq!(transport.position_seconds(), 0.0);
    }

    #[test]
    fn test_armed_ab_region_keeps_playing_past_end() {
        let transport = Transport::new();
        transport.load(ramp_stream(15, 100));
        transport.set_ab_armed(true);
        transport.play();

        let mut block = [0.0f32; 10];
        transport.read_block(&mut block, 1);
        assert_eq!(transport.read_block(&mut block, 1), Some(5));
        assert!(transport.is_playing());
        assert!(transport.jump_if_past(0.15, 0.05));
        assert!((transport.position_seconds() - 0.05).abs() < 1e-9);

        transport.set_ab_armed(false);
        transport.set_position(0.15);
        transport.read_block(&mut block, 1);
        assert_eq!(transport.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_status_reads_do_not_take_the_stream_lock() {
        let transport = Transport::new();
        transport.load(ramp_stream(1000, 100));
        transport.play();
        transport.set_position(2.0);

        let _held = transport.hold_stream_lock();
        assert!((transport.position_seconds() - 2.0).abs() < 1e-9);
        assert!((transport.length_seconds() - 10.0).abs() < 1e-9);
        assert!(transport.is_loaded());
        assert!(!transport.is_at_end());

        // The callback skips the read and leaves the play head alone
        let mut block = [1.0f32; 10];
        assert_eq!(transport.read_block(&mut block, 1), None);
        assert!(block.iter().all(|s| *s == 0.0));
        assert!((transport.position_seconds() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_jump_if_past() {
        let transport = Transport::new();
        transport.load(ramp_stream(3000, 100));
        transport.play();
        transport.set_position(19.0);
        assert!(!transport.jump_if_past(20.0, 10.0));

        transport.set_position(20.0);
        let generation = transport.generation();
        assert!(transport.jump_if_past(20.0, 10.0));
        assert!((transport.position_seconds() - 10.0).abs() < 0.01);
        assert!(transport.generation() > generation);
    }

    #[test]
    fn test_load_resets_position_and_keeps_settings() {
        let transport = Transport::new();
        transport.load(ramp_stream(1000, 100));
        transport.set_gain(0.4);
        transport.set_looping(true);
        transport.play();
        transport.set_position(3.0);

        transport.load(ramp_stream(500, 50));
        assert_eq!(transport.state(), PlaybackState::Stopped);
        assert_eq!(transport.position_seconds(), 0.0);
        assert_eq!(transport.sample_rate(), 50);
        assert_eq!(transport.gain(), 0.4);
        assert!(transport.is_looping());
    }

    #[test]
    fn test_mute_zeroes_effective_gain() {
        let transport = Transport::new();
        transport.set_gain(0.7);
        transport.set_muted(true);
        assert_eq!(transport.effective_gain(), 0.0);
        transport.set_muted(false);
        assert_eq!(transport.effective_gain(), 0.7);

        transport.set_gain(f32::NAN);
        assert_eq!(transport.gain(), 0.0);
    }
}
