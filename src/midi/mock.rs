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
use std::{fmt, sync::Arc};

use parking_lot::Mutex;
use tokio::sync::mpsc::Sender;
use tracing::{debug, info};

use super::SourceError;

/// A mock source. Tests inject raw MIDI, which arrives through the same channel
/// a real port would use.
#[derive(Clone)]
pub struct Source {
    name: String,
    sender: Arc<Mutex<Option<Sender<Vec<u8>>>>>,
}

impl Source {
    /// Gets the given mock source.
    pub fn get(name: &str) -> Source {
        Source {
            name: name.to_string(),
            sender: Arc::new(Mutex::new(None)),
        }
    }

    /// Sends a raw event to the watcher. Returns false if nothing is watching or
    /// the receiver can't take it.
    pub fn inject(&self, raw: &[u8]) -> bool {
        let sender = self.sender.lock();
        match sender.as_ref() {
            Some(sender) => sender.try_send(raw.to_vec()).is_ok(),
            None => false,
        }
    }

    pub fn is_watching(&self) -> bool {
        self.sender.lock().is_some()
    }
}

impl super::EventSource for Source {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn watch_events(&self, sender: Sender<Vec<u8>>) -> Result<(), SourceError> {
        let mut current = self.sender.lock();
        if current.is_some() {
            return Err(SourceError::AlreadyWatching);
        }
        *current = Some(sender);
        info!(device = self.name, "Watching mock events");
        Ok(())
    }

    /// Drops the sender, closing the channel once every other sender is gone.
    fn stop_watch_events(&self) {
        if self.sender.lock().take().is_some() {
            debug!(device = self.name, "Stopped watching mock events");
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
