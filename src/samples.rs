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

//! MIDI-triggered sample playback.
//!
//! This module provides:
//! - Sample loading and note assignment (in memory, so voices never touch disk)
//! - Loop-point fade shaping
//! - Per-note voices, each looping its clip on a dedicated worker
//! - Voice management with a polyphony limit and oldest-first stealing

mod decode;
mod error;
pub mod fade;
mod library;
mod manager;
mod voice;

pub use decode::{decode_file, is_supported, DecodedAudio, SUPPORTED_EXTENSIONS};
pub use error::SampleError;
pub use library::{NoteMapping, SampleClip, SampleLibrary, DEFAULT_BASE_NOTE};
pub use manager::{VoiceManager, VoiceStats, DEFAULT_MAX_VOICES};
pub use voice::{Voice, VoiceId, BLOCK_FRAMES};
