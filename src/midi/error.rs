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
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no MIDI input named \"{name}\" (available: {})", .available.join(", "))]
    NoDevice { name: String, available: Vec<String> },

    #[error("{count} MIDI inputs are named \"{name}\"")]
    Ambiguous { name: String, count: usize },

    #[error("already watching events")]
    AlreadyWatching,

    #[error("MIDI initialization failed: {0}")]
    Init(#[from] ::midir::InitError),

    #[error("unable to read MIDI port info: {0}")]
    PortInfo(#[from] ::midir::PortInfoError),

    #[error("MIDI backend error: {0}")]
    Backend(String),
}
