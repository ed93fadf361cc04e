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

//! Core mixing logic that's independent of any audio backend.
//!
//! Every stream opened on a device becomes a [`Lane`] on a shared [`MixerBus`].
//! Writers push interleaved blocks into their lane and block while it is full;
//! the backend's single output callback sums all lanes into the device buffer.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use super::SinkError;

/// Global lane ID counter.
static NEXT_LANE_ID: AtomicU64 = AtomicU64::new(1);

/// A bounded queue of interleaved samples feeding the bus.
pub struct Lane {
    id: u64,
    queue: Mutex<VecDeque<f32>>,
    /// Signalled whenever the mixer drains samples or the lane closes.
    drained: Condvar,
    capacity: usize,
    closed: AtomicBool,
}

impl Lane {
    fn new(capacity: usize) -> Self {
        Self {
            id: NEXT_LANE_ID.fetch_add(1, Ordering::Relaxed),
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            drained: Condvar::new(),
            capacity,
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Appends `block` to the lane, blocking until there is room for all of it.
    /// Blocks larger than the lane are accepted once the lane is empty.
    pub fn push(&self, block: &[f32]) -> Result<(), SinkError> {
        let mut queue = self.queue.lock();
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(SinkError::Closed);
            }
            let fits = queue.len() + block.len() <= self.capacity;
            if fits || queue.is_empty() {
                queue.extend(block.iter().copied());
                return Ok(());
            }
            self.drained.wait(&mut queue);
        }
    }

    /// Adds up to `out.len()` queued samples into `out`. Returns how many were used.
    fn mix_into(&self, out: &mut [f32]) -> usize {
        let mut queue = self.queue.lock();
        let count = queue.len().min(out.len());
        for (dst, src) in out.iter_mut().zip(queue.drain(..count)) {
            *dst += src;
        }
        drop(queue);
        if count > 0 {
            self.drained.notify_all();
        }
        count
    }

    /// Number of samples waiting to be mixed.
    pub fn queued(&self) -> usize {
        self.queue.lock().len()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        // Take the lock so a writer between its closed check and wait can't miss this.
        let _queue = self.queue.lock();
        self.drained.notify_all();
    }
}

/// Sums every open lane into one output buffer.
pub struct MixerBus {
    lanes: Mutex<Vec<Arc<Lane>>>,
    channels: u16,
    sample_rate: u32,
    shut_down: AtomicBool,
}

impl MixerBus {
    pub fn new(channels: u16, sample_rate: u32) -> Self {
        Self {
            lanes: Mutex::new(Vec::new()),
            channels,
            sample_rate,
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Adds a lane holding at most `capacity_frames` frames.
    pub fn add_lane(&self, capacity_frames: usize) -> Result<Arc<Lane>, SinkError> {
        if self.is_shut_down() {
            return Err(SinkError::Closed);
        }
        let lane = Arc::new(Lane::new(capacity_frames * self.channels as usize));
        self.lanes.lock().push(lane.clone());
        Ok(lane)
    }

    /// Removes a lane and wakes any writer blocked on it.
    pub fn remove_lane(&self, id: u64) {
        let mut lanes = self.lanes.lock();
        if let Some(index) = lanes.iter().position(|lane| lane.id == id) {
            let lane = lanes.swap_remove(index);
            lane.close();
        }
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.lock().len()
    }

    /// Fills `out` with the sum of every lane. Lanes that run dry contribute silence.
    pub fn mix_into(&self, out: &mut [f32]) {
        out.fill(0.0);
        let lanes = self.lanes.lock();
        for lane in lanes.iter() {
            lane.mix_into(out);
        }
    }

    /// Closes every lane. Blocked writers return [`SinkError::Closed`].
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
        let lanes: Vec<Arc<Lane>> = self.lanes.lock().drain(..).collect();
        for lane in lanes {
            lane.close();
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}
