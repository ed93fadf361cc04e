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

//! Sample directory loading and note assignment.
//!
//! Clips are loaded entirely into memory at startup so that voices never touch disk.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rayon::prelude::*;
use tracing::{info, warn};

use super::decode::{decode_file, is_supported};
use super::error::SampleError;
use super::fade;

/// Default note assigned to the first clip.
pub const DEFAULT_BASE_NOTE: u8 = 36;

/// Highest assignable MIDI note.
const MAX_NOTE: u8 = 127;

/// An immutable, shareable PCM clip. Cloning only bumps a reference count.
#[derive(Clone)]
pub struct SampleClip {
    /// Interleaved samples.
    data: Arc<Vec<f32>>,
    /// Number of channels in the clip.
    channel_count: u16,
    /// Sample rate of the audio data.
    sample_rate: u32,
    /// The file the clip was loaded from.
    name: Arc<str>,
}

impl SampleClip {
    pub fn new(data: Vec<f32>, channel_count: u16, sample_rate: u32, name: &str) -> Self {
        Self {
            data: Arc::new(data),
            channel_count,
            sample_rate,
            name: Arc::from(name),
        }
    }

    /// Returns a clip with the same format and name but different sample data.
    pub fn with_samples(&self, data: Vec<f32>) -> Self {
        Self {
            data: Arc::new(data),
            channel_count: self.channel_count,
            sample_rate: self.sample_rate,
            name: self.name.clone(),
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.data
    }

    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        if self.channel_count == 0 {
            return 0;
        }
        self.data.len() / self.channel_count as usize
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    /// Returns the memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}

impl fmt::Debug for SampleClip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleClip")
            .field("name", &self.name)
            .field("channels", &self.channel_count)
            .field("sample_rate", &self.sample_rate)
            .field("frames", &self.frames())
            .finish()
    }
}

/// Maps MIDI note numbers to clips. Lookups are by exact note only.
#[derive(Clone, Debug, Default)]
pub struct NoteMapping {
    clips: BTreeMap<u8, SampleClip>,
}

impl NoteMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `note` to `clip`, replacing any previous clip for that note.
    pub fn insert(&mut self, note: u8, clip: SampleClip) {
        self.clips.insert(note, clip);
    }

    pub fn get(&self, note: u8) -> Option<&SampleClip> {
        self.clips.get(&note)
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    /// Iterates over (note, clip) pairs in ascending note order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, &SampleClip)> {
        self.clips.iter().map(|(note, clip)| (*note, clip))
    }

    /// Returns the total memory used by all clips.
    pub fn memory_usage(&self) -> usize {
        self.clips.values().map(|clip| clip.memory_size()).sum()
    }
}

/// Loads sample directories into note mappings.
pub struct SampleLibrary;

impl SampleLibrary {
    /// Loads every supported clip in `directory`, sorted by filename, and assigns
    /// consecutive notes starting at `base_note`. Clips are faded with
    /// [`fade::DEFAULT_FADE_MS`] so they loop without clicks.
    ///
    /// Files that fail to decode are skipped with a warning. An empty mapping is
    /// returned (not an error) when nothing decodes; only an unreadable directory
    /// is an error.
    pub fn load(directory: &Path, base_note: u8) -> Result<NoteMapping, SampleError> {
        Self::load_with_fade(directory, base_note, fade::DEFAULT_FADE_MS)
    }

    /// Like [`SampleLibrary::load`] with an explicit fade length.
    pub fn load_with_fade(
        directory: &Path,
        base_note: u8,
        fade_ms: u32,
    ) -> Result<NoteMapping, SampleError> {
        if !directory.is_dir() {
            return Err(SampleError::NotADirectory(directory.to_path_buf()));
        }

        let files = Self::candidate_files(directory)?;
        info!(
            directory = ?directory,
            candidates = files.len(),
            "Loading sample directory"
        );

        // Decoding is the expensive part, so fan it out. Order is preserved by collect.
        let decoded: Vec<(PathBuf, Result<SampleClip, SampleError>)> = files
            .into_par_iter()
            .map(|path| {
                let clip = Self::load_clip(&path, fade_ms);
                (path, clip)
            })
            .collect();

        let mut mapping = NoteMapping::new();
        let mut next_note = Some(base_note);
        for (path, result) in decoded {
            let clip = match result {
                Ok(clip) => clip,
                Err(e) => {
                    warn!(path = ?path, error = %e, "Failed to load sample, skipping");
                    continue;
                }
            };

            let note = match next_note {
                Some(note) if note <= MAX_NOTE => note,
                _ => {
                    warn!(
                        path = ?path,
                        "No MIDI notes left to assign, skipping"
                    );
                    continue;
                }
            };
            next_note = note.checked_add(1);

            info!(
                note,
                file = clip.name(),
                channels = clip.channel_count(),
                sample_rate = clip.sample_rate(),
                frames = clip.frames(),
                duration_ms = clip.duration().as_millis(),
                "Sample loaded"
            );
            mapping.insert(note, clip);
        }

        if mapping.is_empty() {
            warn!(directory = ?directory, "No playable clips found");
        } else {
            info!(
                clips = mapping.len(),
                memory_kb = mapping.memory_usage() / 1024,
                "Sample directory loaded"
            );
        }

        Ok(mapping)
    }

    /// Lists supported audio files in `directory`, sorted by filename.
    fn candidate_files(directory: &Path) -> Result<Vec<PathBuf>, SampleError> {
        let mut files = Vec::new();
        for entry in fs::read_dir(directory)? {
            let path = entry?.path();
            if path.is_file() && is_supported(&path) {
                files.push(path);
            }
        }
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(files)
    }

    /// Decodes and fades a single clip.
    fn load_clip(path: &Path, fade_ms: u32) -> Result<SampleClip, SampleError> {
        let decoded = decode_file(path)?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let clip = SampleClip::new(
            decoded.samples,
            decoded.channels,
            decoded.sample_rate,
            &name,
        );
        Ok(fade::apply(&clip, fade_ms))
    }
}
