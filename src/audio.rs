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

pub mod cpal;
pub mod error;
pub mod mixer;
pub mod mock;

pub use error::SinkError;

/// An open output stream. Dropping it closes the stream.
pub trait OutputStream: Send {
    /// Pushes a block of interleaved samples. May block until the sink accepts it.
    fn write(&mut self, block: &[f32]) -> Result<(), SinkError>;
}

/// Something that can open output streams for a given format.
pub trait AudioSink: fmt::Display + Send + Sync {
    /// Opens a stream with the given sample rate and channel count.
    fn open(&self, sample_rate: u32, channels: u16) -> Result<Box<dyn OutputStream>, SinkError>;
}

/// Lists the output devices known to cpal.
pub fn list_devices() -> Result<Vec<String>, SinkError> {
    cpal::list()
}

/// Gets the sink for the given device name. `None` selects the host's default
/// output device; names starting with "mock" select a mock sink.
pub fn get_sink(device: Option<&str>) -> Result<Arc<dyn AudioSink>, SinkError> {
    if let Some(device) = device {
        if device.starts_with("mock") {
            return Ok(Arc::new(mock::Sink::get(device)));
        }
    }

    Ok(Arc::new(cpal::Sink::get(device)?))
}
