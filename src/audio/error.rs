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
/// Error types for audio output.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("No audio output device found with name {0}")]
    NoDevice(String),

    #[error("Audio backend error: {0}")]
    Backend(String),

    #[error("Device {device} does not support {channels} channel(s) at {sample_rate}Hz")]
    UnsupportedConfig {
        device: String,
        sample_rate: u32,
        channels: u16,
    },

    #[error("Output stream is closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
