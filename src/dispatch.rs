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

//! Applies incoming note events to the voice manager, strictly in arrival order.

use tokio::sync::mpsc::Receiver;
use tracing::{debug, info, instrument};

use crate::midi::{NoteEvent, NoteKind};
use crate::samples::VoiceManager;

/// Applies a single note event.
pub fn apply(manager: &VoiceManager, event: NoteEvent) {
    match event.kind {
        NoteKind::On => manager.note_on(event.note, event.velocity),
        NoteKind::Off => manager.note_off(event.note),
    }
}

/// Consumes raw MIDI from `receiver` until every sender is gone, then stops all
/// voices. Messages that aren't notes are ignored.
#[instrument(name = "dispatch", skip_all)]
pub async fn run(manager: VoiceManager, mut receiver: Receiver<Vec<u8>>) {
    while let Some(raw) = receiver.recv().await {
        match NoteEvent::parse(&raw) {
            Some(event) => {
                debug!(%event, "Dispatching note event");
                apply(&manager, event);
            }
            None => debug!(raw = ?raw, "Ignoring non-note MIDI message"),
        }
    }

    info!("Event stream closed, stopping all voices");
    manager.drain();
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use super::*;
    use crate::audio::mock;
    use crate::midi::{self, EventSource};
    use crate::samples::{NoteMapping, SampleClip, VoiceStats};
    use crate::testutil::eventually;

    fn manager(sink: &mock::Sink) -> VoiceManager {
        let mut mapping = NoteMapping::new();
        for note in 36..=38 {
            mapping.insert(
                note,
                SampleClip::new(vec![0.25; 2048], 2, 48000, &format!("{}.wav", note)),
            );
        }
        VoiceManager::new(mapping, Arc::new(sink.clone()), 2)
    }

    fn note(kind: NoteKind, note: u8, velocity: u8) -> NoteEvent {
        NoteEvent {
            kind,
            channel: 0,
            note,
            velocity,
        }
    }

    #[test]
    fn test_apply() {
        let sink = mock::Sink::get("mock-device");
        let manager = manager(&sink);

        apply(&manager, note(NoteKind::On, 36, 100));
        apply(&manager, note(NoteKind::On, 37, 100));
        assert_eq!(manager.active_notes(), vec![36, 37]);

        apply(&manager, note(NoteKind::Off, 36, 0));
        assert_eq!(manager.active_notes(), vec![37]);

        // Unmapped.
        apply(&manager, note(NoteKind::On, 90, 100));
        assert_eq!(manager.active_notes(), vec![37]);

        manager.drain();
        eventually(|| manager.workers() == 0, "voice workers never exited");
        eventually(|| sink.open_streams() == 0, "streams never closed");
        assert!(sink.streams().iter().all(|s| s.channels == 2 && s.sample_rate == 48000));
    }

    #[tokio::test]
    async fn test_run_applies_events_in_order() {
        let sink = mock::Sink::get("mock-device");
        let manager = manager(&sink);
        let source = midi::mock::Source::get("mock-keys");

        let (tx, rx) = mpsc::channel(16);
        source.watch_events(tx).unwrap();
        let dispatcher = tokio::spawn(run(manager.clone(), rx));

        for raw in [
            vec![0x90, 36, 100],
            vec![0x90, 36, 80], // Retrigger.
            vec![0xB0, 7, 127], // Not a note.
            vec![0x90, 37, 100],
            vec![0x90, 38, 100], // Steals 36.
            vec![0x80, 37, 0],
            vec![0x90, 38, 0], // Note off by zero velocity.
            vec![0x90, 99, 100], // Unmapped.
        ] {
            assert!(source.inject(&raw));
        }
        source.stop_watch_events();
        dispatcher.await.unwrap();

        assert_eq!(manager.active_count(), 0);
        eventually(|| manager.workers() == 0, "voice workers never exited");
        assert_eq!(
            manager.stats(),
            VoiceStats {
                started: 4,
                completed: 4,
                stolen: 1,
                retriggered: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_run_drains_on_close() {
        let sink = mock::Sink::get("mock-device");
        let manager = manager(&sink);

        let (tx, rx) = mpsc::channel(16);
        tx.send(vec![0x90, 36, 100]).await.unwrap();
        tx.send(vec![0x90, 37, 100]).await.unwrap();
        drop(tx);

        run(manager.clone(), rx).await;
        assert_eq!(manager.active_count(), 0);
        eventually(|| manager.workers() == 0, "voice workers never exited");
        eventually(|| sink.open_streams() == 0, "streams never closed");
        assert_eq!(sink.streams().len(), 2);
    }
}
