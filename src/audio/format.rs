//! Sample format conversion
//!
//! Stereo interleaving, clip + quantize to 16-bit PCM, and linear
//! resampling. All conversions write into [`ScratchBuffers`], which are
//! sized once from the largest block the upstream pipeline will submit and
//! never grow afterwards. Input that would not fit is rejected whole.

use crate::config::{ChannelMode, PayloadFormat, StreamConfig};

/// Scale factor from [-1.0, 1.0] to i16
const PCM_SCALE: f32 = 32767.0;

/// Input did not fit a pre-sized buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overflow {
    /// Samples the block needed
    pub needed: usize,
    /// Samples the buffer holds
    pub capacity: usize,
}

/// Clip to [-1.0, 1.0] and truncate to i16
#[inline]
pub fn quantize_sample(v: f32) -> i16 {
    (v.clamp(-1.0, 1.0) * PCM_SCALE) as i16
}

/// Quantize `input` into the front of `out`
///
/// Returns the number of samples written, or `Overflow` without touching
/// `out` if the input is longer than the buffer.
pub fn quantize(input: &[f32], out: &mut [i16]) -> Result<usize, Overflow> {
    if input.len() > out.len() {
        return Err(Overflow {
            needed: input.len(),
            capacity: out.len(),
        });
    }
    for (dst, &src) in out.iter_mut().zip(input) {
        *dst = quantize_sample(src);
    }
    Ok(input.len())
}

/// Write `left[i]` to `out[2i]` and `right[i]` to `out[2i + 1]`
pub fn interleave(left: &[f32], right: &[f32], out: &mut [f32]) -> Result<usize, Overflow> {
    let frames = left.len().min(right.len());
    let total = frames * 2;
    if total > out.len() {
        return Err(Overflow {
            needed: total,
            capacity: out.len(),
        });
    }
    for (i, frame) in out[..total].chunks_exact_mut(2).enumerate() {
        frame[0] = left[i];
        frame[1] = right[i];
    }
    Ok(total)
}

/// Output length of [`resample_linear`] for a given input length
#[inline]
pub fn resampled_len(in_count: usize, in_rate: u32, out_rate: u32) -> usize {
    (in_count as u64 * out_rate as u64 / in_rate as u64) as usize
}

/// Linear-interpolating sample rate conversion
///
/// Output index `i` maps to input position `i * in_rate / out_rate`. The
/// last input sample is held rather than extrapolated. Output is truncated
/// to `out.len()` if the buffer is short. Returns samples written.
pub fn resample_linear(input: &[i16], out: &mut [i16], in_rate: u32, out_rate: u32) -> usize {
    if input.is_empty() || in_rate == 0 || out_rate == 0 {
        return 0;
    }
    let out_count = resampled_len(input.len(), in_rate, out_rate).min(out.len());
    let step = in_rate as f64 / out_rate as f64;

    for (i, dst) in out[..out_count].iter_mut().enumerate() {
        let pos = i as f64 * step;
        let idx = pos as usize;
        let frac = pos - idx as f64;
        *dst = match input.get(idx + 1) {
            Some(&next) => (input[idx] as f64 * (1.0 - frac) + next as f64 * frac) as i16,
            None => input[idx],
        };
    }
    out_count
}

/// Pre-sized conversion buffers owned by one sink
#[derive(Debug, Default)]
pub struct ScratchBuffers {
    stereo: Vec<f32>,
    pcm: Vec<i16>,
    resample: Vec<i16>,
    /// (native, target) when resampling is active
    rates: Option<(u32, u32)>,
}

impl ScratchBuffers {
    /// Allocate the buffers `config` needs for blocks of at most `max_block_bytes`
    ///
    /// - stereo: 2 x samples, stereo mode and not passthrough
    /// - pcm: samples x channels, PCM/WAV only
    /// - resample: `pcm * target / native + 1`, PCM/WAV with differing rates
    pub fn for_config(config: &StreamConfig, max_block_bytes: usize) -> Self {
        let samples = max_block_bytes / std::mem::size_of::<f32>();
        let stereo = config.mode == ChannelMode::Stereo;

        let stereo_len = if stereo && config.format != PayloadFormat::Passthrough {
            samples * 2
        } else {
            0
        };

        let pcm_len = if config.needs_quantization() {
            samples * if stereo { 2 } else { 1 }
        } else {
            0
        };

        let (resample_len, rates) = if config.needs_resampling() {
            (
                resampled_len(pcm_len, config.native_rate, config.sample_rate) + 1,
                Some((config.native_rate, config.sample_rate)),
            )
        } else {
            (0, None)
        };

        Self {
            stereo: vec![0.0; stereo_len],
            pcm: vec![0; pcm_len],
            resample: vec![0; resample_len],
            rates,
        }
    }

    pub fn stereo_capacity(&self) -> usize {
        self.stereo.len()
    }

    pub fn pcm_capacity(&self) -> usize {
        self.pcm.len()
    }

    pub fn resample_capacity(&self) -> usize {
        self.resample.len()
    }

    pub fn has_stereo(&self) -> bool {
        !self.stereo.is_empty()
    }

    /// Quantize (and resample if configured) a block of samples
    pub fn pcm_from(&mut self, samples: &[f32]) -> Result<&[i16], Overflow> {
        quantize_and_resample(&mut self.pcm, &mut self.resample, self.rates, samples)
    }

    /// Interleave a left/right pair into the stereo buffer
    pub fn interleave(&mut self, left: &[f32], right: &[f32]) -> Result<&[f32], Overflow> {
        let n = interleave(left, right, &mut self.stereo)?;
        Ok(&self.stereo[..n])
    }

    /// Interleave, then quantize (and resample) the interleaved block
    pub fn pcm_from_stereo(&mut self, left: &[f32], right: &[f32]) -> Result<&[i16], Overflow> {
        let n = interleave(left, right, &mut self.stereo)?;
        quantize_and_resample(&mut self.pcm, &mut self.resample, self.rates, &self.stereo[..n])
    }

    /// Free all buffers; every capacity becomes zero
    pub fn release(&mut self) {
        *self = Self::default();
    }
}

fn quantize_and_resample<'a>(
    pcm: &'a mut [i16],
    resample: &'a mut [i16],
    rates: Option<(u32, u32)>,
    samples: &[f32],
) -> Result<&'a [i16], Overflow> {
    let n = quantize(samples, pcm)?;
    match rates {
        Some((native, target)) => {
            let out = resample_linear(&pcm[..n], resample, native, target);
            Ok(&resample[..out])
        }
        None => Ok(&pcm[..n]),
    }
}
