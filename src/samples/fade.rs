// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Symmetric linear fades at the head and tail of a clip, so that a looping
//! cursor wrapping from the last frame to the first doesn't click.

use super::library::SampleClip;

/// Default fade length in milliseconds.
pub const DEFAULT_FADE_MS: u32 = 10;

/// Number of frames covered by each ramp: `round(sample_rate * ms / 1000)`,
/// clamped to half the clip so the two ramps never overlap.
pub fn fade_frames(sample_rate: u32, fade_ms: u32, total_frames: usize) -> usize {
    let frames = (sample_rate as f64 * fade_ms as f64 / 1000.0).round() as usize;
    frames.min(total_frames / 2)
}

/// Gain of the fade-in ramp at position `index` of `len`. Runs from exactly 0.0
/// at the first frame to exactly 1.0 at the last.
#[inline]
fn ramp(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 0.0;
    }
    index as f32 / (len - 1) as f32
}

/// Returns a copy of `clip` with a fade-in over the first frames and the mirrored
/// fade-out over the last frames, applied to every channel.
pub fn apply(clip: &SampleClip, fade_ms: u32) -> SampleClip {
    let channels = clip.channel_count() as usize;
    let total_frames = clip.frames();
    let n = fade_frames(clip.sample_rate(), fade_ms, total_frames);

    let mut out = clip.samples().to_vec();
    if n == 0 || channels == 0 {
        return clip.with_samples(out);
    }

    for i in 0..n {
        let gain = ramp(i, n);
        let head = i * channels;
        let tail = (total_frames - 1 - i) * channels;
        for ch in 0..channels {
            out[head + ch] *= gain;
            out[tail + ch] *= gain;
        }
    }

    clip.with_samples(out)
}
