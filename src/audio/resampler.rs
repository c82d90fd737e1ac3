/*!
A streaming, linear-interpolating resampler that pulls from a [`Transport`].

- Produces exactly the number of output frames asked for on every call.
- Reads `speed * source_rate / output_rate` source frames per output frame, so it handles
  both device-rate conversion and varispeed in one step.
- Keeps the interpolation phase and the one or two source frames straddling the last block
  between calls, so consecutive blocks join without clicks. Changing the speed mid-stream
  keeps that state; a jump of the transport's play head discards it.
- Never allocates while rendering. [`TrackResampler::prepare`] and
  [`TrackResampler::fit_source_rate`] size the scratch space on the control thread.
*/

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::audio::transport::Transport;

pub const MIN_SPEED: f64 = 0.5;
pub const MAX_SPEED: f64 = 2.0;

/// Highest source rate the scratch space is sized for up front
const MAX_EXPECTED_SOURCE_RATE: u32 = 192_000;

/// Playback speed shared between the control thread and the renderers
#[derive(Debug, Clone)]
pub struct PlaybackSpeed {
    ratio: Arc<AtomicU64>,
}

impl PlaybackSpeed {
    pub fn new() -> Self {
        Self {
            ratio: Arc::new(AtomicU64::new(1.0f64.to_bits())),
        }
    }

    /// Clamp to [0.5, 2.0] and store; returns the value in effect
    pub fn set(&self, ratio: f64) -> f64 {
        let ratio = if ratio.is_finite() { ratio.clamp(MIN_SPEED, MAX_SPEED) } else { 1.0 };
        self.ratio.store(ratio.to_bits(), Ordering::Release);
        ratio
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.ratio.load(Ordering::Acquire))
    }
}

impl Default for PlaybackSpeed {
    fn default() -> Self {
        Self::new()
    }
}

pub struct TrackResampler {
    transport: Transport,
    speed: PlaybackSpeed,
    output_rate: u32,
    channels: usize,

    // Streaming state
    phase: f64,
    carry: Vec<f32>,
    carry_frames: usize,
    generation: u64,

    max_block_frames: usize,
    work: Vec<f32>,
}

impl TrackResampler {
    pub fn new(transport: Transport, speed: PlaybackSpeed, output_rate: u32, channels: usize, max_block_frames: usize) -> Self {
        let generation = transport.generation();
        let mut resampler = Self {
            transport,
            speed,
            output_rate,
            channels,
            phase: 0.0,
            carry: Vec::new(),
            carry_frames: 0,
            generation,
            max_block_frames,
            work: Vec::new(),
        };
        resampler.prepare(output_rate, channels, max_block_frames);
        resampler
    }

    /// Size scratch space for blocks of up to `max_block_frames` and reset the stream state
    pub fn prepare(&mut self, output_rate: u32, channels: usize, max_block_frames: usize) {
        self.output_rate = output_rate;
        self.channels = channels.max(1);
        self.max_block_frames = max_block_frames.max(1);

        let source_rate = self.transport.sample_rate().max(MAX_EXPECTED_SOURCE_RATE);
        self.work = vec![0.0; self.work_len_for(source_rate)];
        self.carry = vec![0.0; 2 * self.channels];
        self.reset();
    }

    /// Scratch samples needed to render a full block from `source_rate` at top speed
    fn work_len_for(&self, source_rate: u32) -> usize {
        let worst_step = MAX_SPEED * source_rate as f64 / self.output_rate.max(1) as f64;
        let work_frames = (self.max_block_frames as f64 * worst_step).ceil() as usize + 3;
        work_frames * self.channels
    }

    /// Grow the scratch space for a stream at `source_rate`. Called from the
    /// control thread before such a stream is handed to the transport.
    pub fn fit_source_rate(&mut self, source_rate: u32) {
        let needed = self.work_len_for(source_rate);
        if self.work.len() < needed {
            self.work.resize(needed, 0.0);
        }
    }

    /// Forget the interpolation phase and carried frames
    pub fn reset(&mut self) {
        self.phase = 0.0;
        self.carry_frames = 0;
        self.carry.fill(0.0);
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Source frames consumed per output frame right now
    pub fn step(&self) -> f64 {
        if self.output_rate == 0 {
            return 0.0;
        }
        self.speed.get() * self.transport.sample_rate() as f64 / self.output_rate as f64
    }

    /// Fill `out` (interleaved, `channels()` wide) with resampled audio.
    /// Renders silence without consuming input unless the transport is playing.
    pub fn render(&mut self, out: &mut [f32]) {
        let ch = self.channels;
        let frames = out.len() / ch;
        out[frames * ch..].fill(0.0);

        let step = self.step();
        if frames == 0 || step <= 0.0 || !self.transport.is_playing() {
            out[..frames * ch].fill(0.0);
            return;
        }

        let generation = self.transport.generation();
        if generation != self.generation {
            self.reset();
            self.generation = generation;
        }

        let last_pos = self.phase + (frames - 1) as f64 * step;
        let end_pos = self.phase + frames as f64 * step;
        let origin = end_pos.floor() as usize;
        let total_frames = (last_pos.floor() as usize + 1).max(origin) + 1;

        // Scratch space is sized on the control thread; never allocate here
        if self.work.len() < total_frames * ch {
            out[..frames * ch].fill(0.0);
            return;
        }

        let carried = self.carry_frames * ch;
        self.work[..carried].copy_from_slice(&self.carry[..carried]);
        if self
            .transport
            .read_block(&mut self.work[carried..total_frames * ch], ch)
            .is_none()
        {
            // Nothing consumed; the next block picks up from the same phase and carry
            out[..frames * ch].fill(0.0);
            return;
        }

        for k in 0..frames {
            let pos = self.phase + k as f64 * step;
            let i = pos.floor() as usize;
            let frac = (pos - i as f64) as f32;
            let base0 = i * ch;
            let base1 = base0 + ch;
            for c in 0..ch {
                let s0 = self.work[base0 + c];
                let s1 = self.work[base1 + c];
                out[k * ch + c] = s0 + (s1 - s0) * frac;
            }
        }

        // Keep the frames the next block still interpolates from
        self.carry_frames = total_frames - origin;
        let keep = self.carry_frames * ch;
        self.carry[..keep].copy_from_slice(&self.work[origin * ch..total_frames * ch]);
        self.phase = end_pos - origin as f64;
    }
}
