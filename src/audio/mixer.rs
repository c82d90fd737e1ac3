//! Sums the per-track resamplers into the output block.

use crate::audio::resampler::TrackResampler;

/// Most inputs a mixer tracks gain ramps for
pub const MAX_MIXER_INPUTS: usize = 4;

/// Something the mixer can pull a block of interleaved audio from
pub trait BlockSource: Send {
    fn render_block(&mut self, out: &mut [f32]);

    /// Gain to apply this block, mute already folded in
    fn output_gain(&self) -> f32;

    /// Inputs without a loaded track contribute nothing and are not rendered
    fn is_active(&self) -> bool;
}

impl BlockSource for TrackResampler {
    fn render_block(&mut self, out: &mut [f32]) {
        self.render(out);
    }

    fn output_gain(&self) -> f32 {
        self.transport().effective_gain()
    }

    fn is_active(&self) -> bool {
        self.transport().sample_rate() > 0
    }
}

/// Additive mixer. Gain changes ramp linearly across one block; the sum is
/// not clipped.
pub struct Mixer {
    scratch: Vec<f32>,
    last_gains: [Option<f32>; MAX_MIXER_INPUTS],
}

impl Mixer {
    pub fn new(max_block_samples: usize) -> Self {
        Self {
            scratch: vec![0.0; max_block_samples],
            last_gains: [None; MAX_MIXER_INPUTS],
        }
    }

    pub fn prepare(&mut self, max_block_samples: usize) {
        self.scratch = vec![0.0; max_block_samples];
        self.last_gains = [None; MAX_MIXER_INPUTS];
    }

    pub fn mix(&mut self, out: &mut [f32], channels: usize, inputs: &mut [&mut dyn BlockSource]) {
        out.fill(0.0);
        let channels = channels.max(1);
        let frames = out.len() / channels;
        if self.scratch.len() < out.len() {
            self.scratch.resize(out.len(), 0.0);
        }

        for (index, input) in inputs.iter_mut().enumerate() {
            if !input.is_active() {
                if let Some(last) = self.last_gains.get_mut(index) {
                    *last = None;
                }
                continue;
            }

            let scratch = &mut self.scratch[..out.len()];
            input.render_block(scratch);

            let target = input.output_gain();
            let start = self.last_gains.get(index).copied().flatten().unwrap_or(target);

            if start == target || frames == 0 {
                for (o, s) in out.iter_mut().zip(scratch.iter()) {
                    *o += s * target;
                }
            } else {
                let delta = (target - start) / frames as f32;
                for (f, (o_frame, s_frame)) in out.chunks_mut(channels).zip(scratch.chunks(channels)).enumerate() {
                    let gain = start + delta * (f + 1) as f32;
                    for (o, s) in o_frame.iter_mut().zip(s_frame) {
                        *o += s * gain;
                    }
                }
            }

            if let Some(last) = self.last_gains.get_mut(index) {
                *last = Some(target);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Constant {
        value: f32,
        gain: f32,
        active: bool,
    }

    impl BlockSource for Constant {
        fn render_block(&mut self, out: &mut [f32]) {
            out.fill(self.value);
        }

        fn output_gain(&self) -> f32 {
            self.gain
        }

        fn is_active(&self) -> bool {
            self.active
        }
    }

    fn constant(value: f32, gain: f32) -> Constant {
        Constant { value, gain, active: true }
    }

    #[test]
    fn test_sums_inputs_with_gain() {
        let mut mixer = Mixer::new(16);
        let mut a = constant(1.0, 0.6);
        let mut b = constant(1.0, 0.4);
        let mut out = [0.0f32; 8];

        mixer.mix(&mut out, 2, &mut [&mut a, &mut b]);
        for s in out {
            assert!((s - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_inactive_input_is_silent() {
        let mut mixer = Mixer::new(16);
        let mut a = constant(0.5, 1.0);
        let mut b = Constant { value: 1.0, gain: 1.0, active: false };
        let mut out = [0.0f32; 4];

        mixer.mix(&mut out, 1, &mut [&mut a, &mut b]);
        assert_eq!(out, [0.5; 4]);
    }

    #[test]
    fn test_gain_change_ramps_over_one_block() {
        let mut mixer = Mixer::new(16);
        let mut a = constant(1.0, 1.0);
        let mut out = [0.0f32; 4];
        mixer.mix(&mut out, 1, &mut [&mut a]);
        assert_eq!(out, [1.0; 4]);

        a.gain = 0.0;
        mixer.mix(&mut out, 1, &mut [&mut a]);
        assert!((out[0] - 0.75).abs() < 1e-6);
        assert!((out[1] - 0.5).abs() < 1e-6);
        assert!((out[2] - 0.25).abs() < 1e-6);
        assert!(out[3].abs() < 1e-6);

        mixer.mix(&mut out, 1, &mut [&mut a]);
        assert_eq!(out, [0.0; 4]);
    }

    #[test]
    fn test_sum_is_not_clipped() {
        let mut mixer = Mixer::new(4);
        let mut a = constant(0.9, 1.0);
        let mut b = constant(0.9, 1.0);
        let mut out = [0.0f32; 2];
        mixer.mix(&mut out, 1, &mut [&mut a, &mut b]);
        assert!((out[0] - 1.8).abs() < 1e-6);
    }

    #[test]
    fn test_grows_scratch_for_larger_blocks() {
        let mut mixer = Mixer::new(2);
        let mut a = constant(0.25, 1.0);
        let mut out = [0.0f32; 32];
        mixer.mix(&mut out, 2, &mut [&mut a]);
        assert!(out.iter().all(|s| *s == 0.25));
    }
}
