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

//! Voice management for polyphonic sample playback.
//!
//! Handles voice allocation, retriggering, and oldest-first voice stealing.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, error, info};

use super::library::NoteMapping;
use super::voice::{Voice, VoiceId};
use crate::audio::AudioSink;

/// Default maximum number of simultaneously sounding voices.
pub const DEFAULT_MAX_VOICES: usize = 16;

/// Active voices by note, plus their insertion order for FIFO eviction.
#[derive(Default)]
struct VoiceTable {
    voices: HashMap<u8, Arc<Voice>>,
    /// Notes in insertion order, oldest first.
    order: VecDeque<u8>,
}

impl VoiceTable {
    fn len(&self) -> usize {
        self.voices.len()
    }

    fn get(&self, note: u8) -> Option<&Arc<Voice>> {
        self.voices.get(&note)
    }

    fn insert(&mut self, voice: Arc<Voice>) {
        let note = voice.note();
        if self.voices.insert(note, voice).is_some() {
            self.order.retain(|n| *n != note);
        }
        self.order.push_back(note);
    }

    fn remove(&mut self, note: u8) -> Option<Arc<Voice>> {
        let voice = self.voices.remove(&note)?;
        self.order.retain(|n| *n != note);
        Some(voice)
    }

    fn pop_oldest(&mut self) -> Option<Arc<Voice>> {
        let note = self.order.pop_front()?;
        self.voices.remove(&note)
    }

    fn drain(&mut self) -> Vec<Arc<Voice>> {
        let voices = self
            .order
            .drain(..)
            .filter_map(|note| self.voices.remove(&note))
            .collect();
        self.voices.clear();
        voices
    }
}

/// Counters describing what the manager has done so far.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VoiceStats {
    /// Voices whose worker was started.
    pub started: u64,
    /// Voice workers that have exited.
    pub completed: u64,
    /// Voices evicted to stay under the voice limit.
    pub stolen: u64,
    /// Voices replaced by a new note on for the same note.
    pub retriggered: u64,
}

struct Shared {
    table: Mutex<VoiceTable>,
    mapping: NoteMapping,
    sink: Arc<dyn AudioSink>,
    max_voices: usize,
    started: AtomicU64,
    completed: AtomicU64,
    stolen: AtomicU64,
    retriggered: AtomicU64,
    /// Worker threads that haven't exited yet.
    workers: AtomicUsize,
}

/// Owns the table of sounding voices. Cloning gives another handle to the same
/// table.
#[derive(Clone)]
pub struct VoiceManager {
    shared: Arc<Shared>,
}

impl VoiceManager {
    /// Creates a manager playing clips from `mapping` into `sink`, with at most
    /// `max_voices` (minimum 1) sounding at once.
    pub fn new(mapping: NoteMapping, sink: Arc<dyn AudioSink>, max_voices: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                table: Mutex::new(VoiceTable::default()),
                mapping,
                sink,
                max_voices: max_voices.max(1),
                started: AtomicU64::new(0),
                completed: AtomicU64::new(0),
                stolen: AtomicU64::new(0),
                retriggered: AtomicU64::new(0),
                workers: AtomicUsize::new(0),
            }),
        }
    }

    pub fn max_voices(&self) -> usize {
        self.shared.max_voices
    }

    /// Starts a voice for `note`. A voice already sounding on the note is stopped
    /// first; if the table is full the oldest voice is stolen. Unmapped notes are
    /// ignored.
    pub fn note_on(&self, note: u8, velocity: u8) {
        let Some(clip) = self.shared.mapping.get(note) else {
            debug!(note, "No sample mapped to note, ignoring note on");
            return;
        };
        let voice = Arc::new(Voice::new(note, clip.clone(), velocity));

        let mut table = self.shared.table.lock();
        if let Some(previous) = table.remove(note) {
            previous.stop();
            self.shared.retriggered.fetch_add(1, Ordering::Relaxed);
            debug!(note, old_voice = previous.id(), "Retriggering note");
        }

        while table.len() >= self.shared.max_voices {
            let Some(oldest) = table.pop_oldest() else {
                break;
            };
            oldest.stop();
            self.shared.stolen.fetch_add(1, Ordering::Relaxed);
            debug!(
                stolen_note = oldest.note(),
                stolen_voice = oldest.id(),
                max_voices = self.shared.max_voices,
                "Voice limit reached, stealing oldest voice"
            );
        }

        info!(note, velocity, file = clip.name(), voice = voice.id(), "Note on");
        table.insert(voice.clone());

        let shared = Arc::downgrade(&self.shared);
        self.shared.workers.fetch_add(1, Ordering::SeqCst);
        match voice.spawn(self.shared.sink.clone(), move |note, id| {
            worker_exited(&shared, note, id)
        }) {
            Ok(_) => {
                self.shared.started.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                error!(note, err = %e, "Unable to start voice worker");
                self.shared.workers.fetch_sub(1, Ordering::SeqCst);
                voice.stop();
                table.remove(note);
            }
        }

        debug_assert!(table.len() <= self.shared.max_voices);
    }

    /// Stops the voice sounding on `note`, if any.
    pub fn note_off(&self, note: u8) {
        let removed = self.shared.table.lock().remove(note);
        match removed {
            Some(voice) => {
                voice.stop();
                info!(note, voice = voice.id(), "Note off");
            }
            None => debug!(note, "No active voice for note, ignoring note off"),
        }
    }

    /// Called when a voice's worker exits. Removes the voice from the table only if
    /// the entry for `note` is still that same voice; a retriggered note keeps its
    /// new voice.
    pub fn on_voice_end(&self, note: u8, id: VoiceId) {
        let mut table = self.shared.table.lock();
        if table.get(note).is_some_and(|voice| voice.id() == id) {
            table.remove(note);
            debug!(note, voice = id, "Voice ended, removed from table");
        } else {
            debug!(note, voice = id, "Voice ended, entry already removed or replaced");
        }
    }

    /// Stops and removes every voice.
    pub fn drain(&self) {
        let voices = self.shared.table.lock().drain();
        for voice in voices.iter() {
            voice.stop();
        }
        info!(count = voices.len(), "Stopped all voices");
    }

    /// Notes with an active voice, oldest first.
    pub fn active_notes(&self) -> Vec<u8> {
        self.shared.table.lock().order.iter().copied().collect()
    }

    pub fn active_count(&self) -> usize {
        self.shared.table.lock().len()
    }

    /// The voice currently sounding on `note`.
    pub fn voice_for(&self, note: u8) -> Option<Arc<Voice>> {
        self.shared.table.lock().get(note).cloned()
    }

    /// Number of voice workers that are still running, including stopped voices
    /// that haven't finished their last block yet.
    pub fn workers(&self) -> usize {
        self.shared.workers.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> VoiceStats {
        VoiceStats {
            started: self.shared.started.load(Ordering::Relaxed),
            completed: self.shared.completed.load(Ordering::Relaxed),
            stolen: self.shared.stolen.load(Ordering::Relaxed),
            retriggered: self.shared.retriggered.load(Ordering::Relaxed),
        }
    }
}

/// Completion callback for voice workers. Holds the manager weakly so workers
/// don't keep it alive.
fn worker_exited(shared: &Weak<Shared>, note: u8, id: VoiceId) {
    let Some(shared) = shared.upgrade() else {
        return;
    };
    shared.completed.fetch_add(1, Ordering::Relaxed);
    let manager = VoiceManager { shared };
    manager.on_voice_end(note, id);
    manager.shared.workers.fetch_sub(1, Ordering::SeqCst);
}

impl fmt::Debug for VoiceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoiceManager")
            .field("sink", &self.shared.sink.to_string())
            .field("mapped_notes", &self.shared.mapping.len())
            .field("max_voices", &self.shared.max_voices)
            .field("active_notes", &self.active_notes())
            .field("stats", &self.stats())
            .finish()
    }
}
