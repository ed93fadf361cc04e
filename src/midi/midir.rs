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
use std::fmt;

use midir::{Ignore, MidiInput, MidiInputConnection, MidiInputPort};
use parking_lot::Mutex;
use tokio::sync::mpsc::Sender;
use tracing::{error, info, span, Level};

use super::SourceError;

/// A MIDI input port.
pub struct Source {
    name: String,
    port: MidiInputPort,
    event_connection: Mutex<Option<MidiInputConnection<()>>>,
}

impl super::EventSource for Source {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn watch_events(&self, sender: Sender<Vec<u8>>) -> Result<(), SourceError> {
        let span = span!(Level::INFO, "watch events (midir)");
        let _enter = span.enter();

        let mut event_connection = self.event_connection.lock();
        if event_connection.is_some() {
            return Err(SourceError::AlreadyWatching);
        }

        let mut input = MidiInput::new("polysampler input")?;
        // Only note traffic matters here.
        input.ignore(Ignore::All);

        let connection = input
            .connect(
                &self.port,
                "polysampler note watcher",
                move |_, raw_event, _| {
                    if let Err(e) = sender.blocking_send(Vec::from(raw_event)) {
                        error!(err = %e, "Error sending MIDI event to receiver");
                    }
                },
                (),
            )
            .map_err(|e| SourceError::Backend(e.to_string()))?;
        *event_connection = Some(connection);

        info!(device = self.name, "Watching MIDI events");
        Ok(())
    }

    fn stop_watch_events(&self) {
        if let Some(connection) = self.event_connection.lock().take() {
            let _ = connection.close();
            info!(device = self.name, "Stopped watching MIDI events");
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (midir)", self.name)
    }
}

/// Lists the names of all midir input ports.
pub fn list() -> Result<Vec<String>, SourceError> {
    let input = MidiInput::new("polysampler input listing")?;
    let mut names = input
        .ports()
        .iter()
        .map(|port| input.port_name(port))
        .collect::<Result<Vec<String>, _>>()?;
    names.sort();
    Ok(names)
}

/// Gets the input port named exactly `name`.
pub fn get(name: &str) -> Result<Source, SourceError> {
    let input = MidiInput::new("polysampler input listing")?;

    let mut available = Vec::new();
    let mut matches = Vec::new();
    for port in input.ports() {
        let port_name = input.port_name(&port)?;
        if port_name == name {
            matches.push(port);
        }
        available.push(port_name);
    }

    if matches.len() > 1 {
        return Err(SourceError::Ambiguous {
            name: name.to_string(),
            count: matches.len(),
        });
    }
    let Some(port) = matches.pop() else {
        available.sort();
        return Err(SourceError::NoDevice {
            name: name.to_string(),
            available,
        });
    };

    Ok(Source {
        name: name.to_string(),
        port,
        event_connection: Mutex::new(None),
    })
}
