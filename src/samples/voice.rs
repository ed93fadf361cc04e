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

//! A single sounding note.
//!
//! Each voice loops its clip on a dedicated worker thread, pushing fixed-size
//! blocks into its own output stream until it is stopped.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{debug, error, span, Level};

use super::library::SampleClip;
use crate::audio::{AudioSink, SinkError};

/// Frames pushed to the sink per iteration.
pub const BLOCK_FRAMES: usize = 256;

/// Unique identifier of a voice instance.
pub type VoiceId = u64;

/// Global voice ID counter.
static NEXT_VOICE_ID: AtomicU64 = AtomicU64::new(1);

/// Cursor and running flag. Only ever touched under the voice's lock.
struct PlaybackState {
    /// Next frame to play.
    cursor: usize,
    running: bool,
}

/// One instance of a sounding note.
pub struct Voice {
    id: VoiceId,
    note: u8,
    clip: SampleClip,
    /// Velocity normalized to [0, 1].
    gain: f32,
    state: Mutex<PlaybackState>,
}

impl Voice {
    pub fn new(note: u8, clip: SampleClip, velocity: u8) -> Self {
        Self {
            id: NEXT_VOICE_ID.fetch_add(1, Ordering::SeqCst),
            note,
            clip,
            gain: f32::from(velocity.min(127)) / 127.0,
            state: Mutex::new(PlaybackState {
                cursor: 0,
                running: true,
            }),
        }
    }

    pub fn id(&self) -> VoiceId {
        self.id
    }

    pub fn note(&self) -> u8 {
        self.note
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn clip(&self) -> &SampleClip {
        &self.clip
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// The frame the next block will start at.
    pub fn cursor(&self) -> usize {
        self.state.lock().cursor
    }

    /// Asks the worker to finish. Safe from any thread; the worker notices before
    /// its next block, so `run` returns within one block period of a sink write.
    pub fn stop(&self) {
        self.state.lock().running = false;
    }

    /// Fills `block` with the next block of the clip, scaled by gain, and advances
    /// the cursor. Reads past the end of the clip wrap around to its start.
    /// Returns false once the voice has been stopped.
    fn next_block(&self, block: &mut Vec<f32>) -> bool {
        let mut state = self.state.lock();
        if !state.running {
            return false;
        }

        let frames = self.clip.frames();
        if frames == 0 {
            state.running = false;
            return false;
        }

        let channels = self.clip.channel_count() as usize;
        let samples = self.clip.samples();
        block.clear();
        for i in 0..BLOCK_FRAMES {
            let start = ((state.cursor + i) % frames) * channels;
            block.extend(samples[start..start + channels].iter().map(|s| s * self.gain));
        }
        state.cursor = (state.cursor + BLOCK_FRAMES) % frames;
        true
    }

    /// Plays the clip into a new stream on `sink` until stopped. Blocks the caller.
    pub fn run(&self, sink: &dyn AudioSink) -> Result<(), SinkError> {
        let mut stream = sink.open(self.clip.sample_rate(), self.clip.channel_count())?;
        let mut block = Vec::with_capacity(BLOCK_FRAMES * self.clip.channel_count() as usize);

        // The voice lock is released before the write so stop() never waits on the sink.
        while self.next_block(&mut block) {
            stream.write(&block)?;
        }
        Ok(())
    }

    /// Starts the voice's worker thread. `on_end` is called with the voice's note
    /// and id exactly once when the worker exits, whether it was stopped or failed.
    pub fn spawn<F>(self: &Arc<Self>, sink: Arc<dyn AudioSink>, on_end: F) -> io::Result<JoinHandle<()>>
    where
        F: FnOnce(u8, VoiceId) + Send + 'static,
    {
        let voice = self.clone();
        thread::Builder::new()
            .name(format!("voice-{}", self.note))
            .spawn(move || {
                let span = span!(Level::DEBUG, "voice", note = voice.note, id = voice.id);
                let _enter = span.enter();

                debug!(file = voice.clip.name(), gain = voice.gain, "Voice worker started");
                if let Err(e) = voice.run(sink.as_ref()) {
                    error!(err = %e, sink = %sink, "Voice playback failed");
                    voice.stop();
                }
                debug!("Voice worker exited");

                on_end(voice.note, voice.id);
            })
    }
}

impl fmt::Debug for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Voice")
            .field("id", &self.id)
            .field("note", &self.note)
            .field("clip", &self.clip.name())
            .field("gain", &self.gain)
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::audio::mock;
    use crate::testutil::eventually;

    fn ramp_clip(frames: usize) -> SampleClip {
        SampleClip::new(
            (0..frames).map(|i| i as f32).collect(),
            1,
            44100,
            "ramp.wav",
        )
    }

    #[test]
    fn test_gain_from_velocity() {
        assert_eq!(Voice::new(60, ramp_clip(10), 127).gain(), 1.0);
        assert_eq!(Voice::new(60, ramp_clip(10), 0).gain(), 0.0);
        assert!((Voice::new(60, ramp_clip(10), 64).gain() - 64.0 / 127.0).abs() < 1e-6);
        // Out of range velocities are clamped.
        assert_eq!(Voice::new(60, ramp_clip(10), 200).gain(), 1.0);
    }

    #[test]
    fn test_unique_ids() {
        let a = Voice::new(60, ramp_clip(10), 100);
        let b = Voice::new(60, ramp_clip(10), 100);
        assert!(b.id() > a.id());
    }

    #[test]
    fn test_block_wraps_at_loop_point() {
        let voice = Voice::new(60, ramp_clip(100), 127);
        let mut block = Vec::new();

        assert!(voice.next_block(&mut block));
        assert_eq!(block.len(), BLOCK_FRAMES);
        for (i, sample) in block.iter().enumerate() {
            assert_eq!(*sample, (i % 100) as f32);
        }
        assert_eq!(voice.cursor(), 56);

        assert!(voice.next_block(&mut block));
        assert_eq!(block[0], 56.0);
        assert_eq!(block[44], 0.0);
        assert_eq!(voice.cursor(), 12);
    }

    #[test]
    fn test_block_scaled_by_gain() {
        let clip = SampleClip::new(vec![1.0; 512], 1, 44100, "ones.wav");
        let voice = Voice::new(60, clip, 64);
        let mut block = Vec::new();
        assert!(voice.next_block(&mut block));
        let expected = 64.0 / 127.0;
        assert!(block.iter().all(|s| (s - expected).abs() < 1e-6));
    }

    #[test]
    fn test_stereo_frames_stay_interleaved() {
        // L counts up, R counts down.
        let frames = 300;
        let samples: Vec<f32> = (0..frames)
            .flat_map(|i| [i as f32, -(i as f32)])
            .collect();
        let voice = Voice::new(60, SampleClip::new(samples, 2, 48000, "st.wav"), 127);
        let mut block = Vec::new();
        assert!(voice.next_block(&mut block));
        assert_eq!(block.len(), BLOCK_FRAMES * 2);
        assert!(voice.next_block(&mut block));
        // Second block starts at frame 256 and wraps after frame 299.
        assert_eq!(&block[0..2], &[256.0, -256.0]);
        assert_eq!(&block[88..90], &[0.0, 0.0]);
        assert_eq!(&block[90..92], &[1.0, -1.0]);
    }

    #[test]
    fn test_stop_ends_blocks() {
        let voice = Voice::new(60, ramp_clip(100), 127);
        voice.stop();
        assert!(!voice.is_running());
        let mut block = Vec::new();
        assert!(!voice.next_block(&mut block));
        assert_eq!(voice.cursor(), 0);
    }

    #[test]
    fn test_worker_plays_until_stopped() {
        let sink = mock::Sink::get("mock-device");
        let voice = Arc::new(Voice::new(60, ramp_clip(1000), 127));
        let ended = Arc::new(AtomicUsize::new(0));
        let ended_note = Arc::new(AtomicU64::new(0));

        let handle = {
            let ended = ended.clone();
            let ended_note = ended_note.clone();
            let expected_id = voice.id();
            voice
                .spawn(Arc::new(sink.clone()), move |note, id| {
                    assert_eq!(id, expected_id);
                    ended_note.store(note as u64, Ordering::SeqCst);
                    ended.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap()
        };

        eventually(
            || sink.streams().first().is_some_and(|s| s.blocks >= 2),
            "voice never wrote to the sink",
        );
        assert_eq!(ended.load(Ordering::SeqCst), 0);

        voice.stop();
        handle.join().unwrap();

        assert_eq!(ended.load(Ordering::SeqCst), 1);
        assert_eq!(ended_note.load(Ordering::SeqCst), 60);

        let streams = sink.streams();
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].sample_rate, 44100);
        assert_eq!(streams[0].channels, 1);
        assert!(streams[0].closed);
        assert_eq!(streams[0].captured[..4], [0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_failing_sink_still_ends_voice() {
        let sink = mock::Sink::failing("mock-broken");
        let voice = Arc::new(Voice::new(60, ramp_clip(1000), 127));
        let ended = Arc::new(AtomicUsize::new(0));

        let handle = {
            let ended = ended.clone();
            voice
                .spawn(Arc::new(sink), move |_, _| {
                    ended.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap()
        };
        handle.join().unwrap();

        assert_eq!(ended.load(Ordering::SeqCst), 1);
        assert!(!voice.is_running());
    }
}
