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

//! Note events and the sources that produce them.

use std::{fmt, sync::Arc};

use midly::{live::LiveEvent, MidiMessage};
use tokio::sync::mpsc::Sender;

mod error;
mod midir;
pub mod mock;

pub use error::SourceError;

/// An ordered stream of raw MIDI input.
pub trait EventSource: fmt::Display + std::marker::Send + std::marker::Sync {
    /// Returns the name of the source.
    fn name(&self) -> String;

    /// Watches for input and sends each raw event to the given sender, in arrival order.
    fn watch_events(&self, sender: Sender<Vec<u8>>) -> Result<(), SourceError>;

    /// Stops watching events.
    fn stop_watch_events(&self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoteKind {
    On,
    Off,
}

/// A note on or note off.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NoteEvent {
    pub kind: NoteKind,
    /// MIDI channel, 0-15.
    pub channel: u8,
    pub note: u8,
    pub velocity: u8,
}

impl NoteEvent {
    /// Parses a raw MIDI message. Returns None for anything that isn't a note
    /// message. A note on with velocity 0 is a note off.
    pub fn parse(raw: &[u8]) -> Option<NoteEvent> {
        let LiveEvent::Midi { channel, message } = LiveEvent::parse(raw).ok()? else {
            return None;
        };

        let (kind, key, vel) = match message {
            MidiMessage::NoteOn { key, vel } if vel.as_int() == 0 => (NoteKind::Off, key, vel),
            MidiMessage::NoteOn { key, vel } => (NoteKind::On, key, vel),
            MidiMessage::NoteOff { key, vel } => (NoteKind::Off, key, vel),
            _ => return None,
        };

        Some(NoteEvent {
            kind,
            channel: channel.as_int(),
            note: key.as_int(),
            velocity: vel.as_int(),
        })
    }
}

impl fmt::Display for NoteEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            NoteKind::On => "on",
            NoteKind::Off => "off",
        };
        write!(
            f,
            "note {} {} (channel {}, velocity {})",
            kind, self.note, self.channel, self.velocity
        )
    }
}

/// Lists the names of MIDI input ports known to midir.
pub fn list_devices() -> Result<Vec<String>, SourceError> {
    midir::list()
}

/// Gets the event source with exactly the given name. Names starting with "mock"
/// give a mock source.
pub fn get_source(name: &str) -> Result<Arc<dyn EventSource>, SourceError> {
    if name.starts_with("mock") {
        return Ok(Arc::new(mock::Source::get(name)));
    }

    Ok(Arc::new(midir::get(name)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_note_on() {
        let event = NoteEvent::parse(&[0x90, 60, 100]).unwrap();
        assert_eq!(
            event,
            NoteEvent {
                kind: NoteKind::On,
                channel: 0,
                note: 60,
                velocity: 100
            }
        );
    }

    #[test]
    fn test_parse_note_off() {
        let event = NoteEvent::parse(&[0x83, 61, 40]).unwrap();
        assert_eq!(event.kind, NoteKind::Off);
        assert_eq!(event.channel, 3);
        assert_eq!(event.note, 61);
        assert_eq!(event.velocity, 40);
    }

    #[test]
    fn test_zero_velocity_note_on_is_off() {
        let event = NoteEvent::parse(&[0x9F, 36, 0]).unwrap();
        assert_eq!(event.kind, NoteKind::Off);
        assert_eq!(event.channel, 15);
        assert_eq!(event.note, 36);
    }

    #[test]
    fn test_parse_ignores_other_messages() {
        // Control change.
        assert_eq!(NoteEvent::parse(&[0xB0, 7, 100]), None);
        // Timing clock.
        assert_eq!(NoteEvent::parse(&[0xF8]), None);
        assert_eq!(NoteEvent::parse(&[]), None);
    }

    #[test]
    fn test_get_mock_source() {
        let source = get_source("mock-keys").unwrap();
        assert_eq!(source.name(), "mock-keys");
        assert_eq!(source.to_string(), "mock-keys (Mock)");
    }
}
