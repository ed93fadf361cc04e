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
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use super::{AudioSink, OutputStream, SinkError};

/// Maximum number of samples captured per stream.
const CAPTURE_LIMIT: usize = 1 << 16;

/// What the mock sink saw on one stream.
#[derive(Clone, Debug, Default)]
pub struct StreamRecord {
    pub sample_rate: u32,
    pub channels: u16,
    /// Number of write calls.
    pub blocks: usize,
    /// Total samples written.
    pub samples: usize,
    /// The first samples written, up to a fixed limit.
    pub captured: Vec<f32>,
    /// The most recent block.
    pub last_block: Vec<f32>,
    pub closed: bool,
}

/// Holds writes on stalled streams until released.
#[derive(Default)]
struct Stall {
    held: Mutex<bool>,
    released: Condvar,
}

/// A mock sink. Doesn't actually play anything, but paces writes like a real
/// device and records everything written to it.
#[derive(Clone)]
pub struct Sink {
    name: String,
    streams: Arc<Mutex<Vec<StreamRecord>>>,
    fail_open: bool,
    stall: Arc<Stall>,
    /// Whether the next opened stream stalls.
    stall_next: Arc<AtomicBool>,
}

impl Sink {
    /// Gets the given mock sink.
    pub fn get(name: &str) -> Sink {
        Sink {
            name: name.to_string(),
            streams: Arc::new(Mutex::new(Vec::new())),
            fail_open: false,
            stall: Arc::new(Stall::default()),
            stall_next: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Makes the next opened stream hang in every write, after recording the
    /// block, until [`Sink::release_stall`] is called.
    pub fn stall_next_stream(&self) {
        *self.stall.held.lock() = true;
        self.stall_next.store(true, Ordering::SeqCst);
    }

    /// Lets stalled writes complete.
    pub fn release_stall(&self) {
        *self.stall.held.lock() = false;
        self.stall.released.notify_all();
    }

    /// A mock sink that refuses to open any stream.
    pub fn failing(name: &str) -> Sink {
        Sink {
            fail_open: true,
            ..Sink::get(name)
        }
    }

    /// Returns a snapshot of every stream opened so far, in open order.
    pub fn streams(&self) -> Vec<StreamRecord> {
        self.streams.lock().clone()
    }

    /// Number of streams that are currently open.
    pub fn open_streams(&self) -> usize {
        self.streams.lock().iter().filter(|s| !s.closed).count()
    }
}

impl AudioSink for Sink {
    fn open(&self, sample_rate: u32, channels: u16) -> Result<Box<dyn OutputStream>, SinkError> {
        if self.fail_open {
            return Err(SinkError::Backend(format!("{} refuses to open", self.name)));
        }

        let mut streams = self.streams.lock();
        let index = streams.len();
        streams.push(StreamRecord {
            sample_rate,
            channels,
            ..Default::default()
        });
        let stalled = self.stall_next.swap(false, Ordering::SeqCst);
        debug!(
            sink = self.name,
            index,
            sample_rate,
            channels,
            stalled,
            "Mock stream opened"
        );

        Ok(Box::new(Stream {
            streams: self.streams.clone(),
            index,
            sample_rate,
            channels,
            stall: stalled.then(|| self.stall.clone()),
        }))
    }
}

impl fmt::Display for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

struct Stream {
    streams: Arc<Mutex<Vec<StreamRecord>>>,
    index: usize,
    sample_rate: u32,
    channels: u16,
    stall: Option<Arc<Stall>>,
}

impl OutputStream for Stream {
    fn write(&mut self, block: &[f32]) -> Result<(), SinkError> {
        {
            let mut streams = self.streams.lock();
            let record = &mut streams[self.index];
            record.blocks += 1;
            record.samples += block.len();
            let room = CAPTURE_LIMIT.saturating_sub(record.captured.len());
            record
                .captured
                .extend_from_slice(&block[..room.min(block.len())]);
            record.last_block = block.to_vec();
        }

        if let Some(stall) = &self.stall {
            let mut held = stall.held.lock();
            while *held {
                stall.released.wait(&mut held);
            }
        }

        // Pretend the device takes one block period to consume the block.
        let frames = block.len() / self.channels.max(1) as usize;
        if self.sample_rate > 0 {
            thread::sleep(Duration::from_secs_f64(
                frames as f64 / self.sample_rate as f64,
            ));
        }
        Ok(())
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        self.streams.lock()[self.index].closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_records_writes() {
        let sink = Sink::get("mock-device");
        {
            let mut stream = sink.open(44100, 2).unwrap();
            stream.write(&[0.1, 0.2, 0.3, 0.4]).unwrap();
            stream.write(&[0.5, 0.6]).unwrap();
            assert_eq!(sink.open_streams(), 1);
        }

        let streams = sink.streams();
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].sample_rate, 44100);
        assert_eq!(streams[0].channels, 2);
        assert_eq!(streams[0].blocks, 2);
        assert_eq!(streams[0].samples, 6);
        assert_eq!(streams[0].captured, vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
        assert_eq!(streams[0].last_block, vec![0.5, 0.6]);
        assert!(streams[0].closed);
        assert_eq!(sink.open_streams(), 0);
    }

    #[test]
    fn test_stalled_stream_blocks_only_itself() {
        let sink = Sink::get("mock-device");
        sink.stall_next_stream();
        let mut stalled = sink.open(44100, 1).unwrap();
        let mut free = sink.open(44100, 1).unwrap();

        let writer = thread::spawn(move || stalled.write(&[0.5; 4]));
        free.write(&[0.25; 4]).unwrap();
        free.write(&[0.25; 4]).unwrap();

        thread::sleep(Duration::from_millis(50));
        assert!(!writer.is_finished());
        let streams = sink.streams();
        assert_eq!(streams[0].blocks, 1);
        assert_eq!(streams[1].blocks, 2);

        sink.release_stall();
        assert!(writer.join().unwrap().is_ok());
    }

    #[test]
    fn test_failing_mock() {
        let sink = Sink::failing("mock-broken");
        assert!(sink.open(44100, 1).is_err());
        assert!(sink.streams().is_empty());
    }
}
