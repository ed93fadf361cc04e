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
    collections::HashMap,
    fmt,
    sync::{mpsc, Arc},
    thread,
    time::Duration,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use tracing::{error, info, span, warn, Level};

use super::mixer::{Lane, MixerBus};
use super::{AudioSink, OutputStream, SinkError};

/// Frames each lane can hold before writers block. Four 256-frame blocks is
/// enough to ride out callback jitter without adding much latency.
const LANE_CAPACITY_FRAMES: usize = 1024;

/// A cpal output device. Every distinct (sample rate, channel count) pair gets one
/// device stream, shared by all streams opened with that format.
pub struct Sink {
    /// The name of the device.
    name: String,
    /// The underlying cpal device.
    device: cpal::Device,
    /// Running buses keyed by (sample rate, channels).
    buses: Mutex<HashMap<(u32, u16), Arc<MixerBus>>>,
}

impl Sink {
    /// Gets the named cpal output device, or the default output device if no name
    /// is given.
    pub fn get(name: Option<&str>) -> Result<Sink, SinkError> {
        let device = match name {
            Some(name) => find_devices()?
                .into_iter()
                .find(|(device_name, _)| device_name.trim() == name)
                .map(|(_, device)| device)
                .ok_or_else(|| SinkError::NoDevice(name.to_string()))?,
            None => cpal::default_host()
                .default_output_device()
                .ok_or_else(|| SinkError::NoDevice(String::from("default")))?,
        };
        let name = device
            .name()
            .map_err(|e| SinkError::Backend(e.to_string()))?;

        info!(device = name, "Using audio output device");
        Ok(Sink {
            name,
            device,
            buses: Mutex::new(HashMap::new()),
        })
    }

    /// Returns the bus for the given format, starting its device stream if needed.
    fn bus(&self, sample_rate: u32, channels: u16) -> Result<Arc<MixerBus>, SinkError> {
        let mut buses = self.buses.lock();
        if let Some(bus) = buses.get(&(sample_rate, channels)) {
            if !bus.is_shut_down() {
                return Ok(bus.clone());
            }
        }

        let bus = Arc::new(MixerBus::new(channels, sample_rate));
        self.start_stream(bus.clone())?;
        buses.insert((sample_rate, channels), bus.clone());
        Ok(bus)
    }

    /// Starts the device stream feeding from `bus`. cpal streams aren't Send on
    /// every platform, so the stream lives on its own thread until the bus shuts down.
    fn start_stream(&self, bus: Arc<MixerBus>) -> Result<(), SinkError> {
        let sample_rate = bus.sample_rate();
        let channels = bus.channels();
        let supported = self.supported_config(sample_rate, channels)?;
        let sample_format = supported.sample_format();
        let config = supported.config();

        let device = self.device.clone();
        let device_name = self.name.clone();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), SinkError>>();
        thread::Builder::new()
            .name(format!("cpal-{}hz-{}ch", sample_rate, channels))
            .spawn(move || {
                let span = span!(Level::INFO, "output stream (cpal)");
                let _enter = span.enter();

                let stream = match build_stream(&device, &config, sample_format, bus.clone()) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(SinkError::Backend(e.to_string())));
                    return;
                }

                info!(
                    device = device_name,
                    sample_rate,
                    channels,
                    format = ?sample_format,
                    "Output stream started"
                );
                let _ = ready_tx.send(Ok(()));

                // Keep the stream alive until the bus is shut down.
                while !bus.is_shut_down() {
                    thread::sleep(Duration::from_millis(100));
                }
                info!(device = device_name, sample_rate, channels, "Output stream stopped");
            })?;

        ready_rx
            .recv()
            .map_err(|_| SinkError::Backend(String::from("output stream thread exited")))?
    }

    /// Finds a supported device configuration for the format, preferring f32.
    fn supported_config(
        &self,
        sample_rate: u32,
        channels: u16,
    ) -> Result<cpal::SupportedStreamConfig, SinkError> {
        let unsupported = || SinkError::UnsupportedConfig {
            device: self.name.clone(),
            sample_rate,
            channels,
        };

        let mut candidates: Vec<cpal::SupportedStreamConfigRange> = self
            .device
            .supported_output_configs()
            .map_err(|e| SinkError::Backend(e.to_string()))?
            .filter(|range| {
                range.channels() == channels
                    && range.min_sample_rate().0 <= sample_rate
                    && range.max_sample_rate().0 >= sample_rate
                    && is_supported_format(range.sample_format())
            })
            .collect();
        candidates.sort_by_key(|range| range.sample_format() != cpal::SampleFormat::F32);

        candidates
            .into_iter()
            .next()
            .map(|range| range.with_sample_rate(cpal::SampleRate(sample_rate)))
            .ok_or_else(unsupported)
    }
}

impl AudioSink for Sink {
    fn open(&self, sample_rate: u32, channels: u16) -> Result<Box<dyn OutputStream>, SinkError> {
        let bus = self.bus(sample_rate, channels)?;
        let lane = bus.add_lane(LANE_CAPACITY_FRAMES)?;
        Ok(Box::new(Stream { bus, lane }))
    }
}

impl fmt::Display for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (cpal)", self.name)
    }
}

impl Drop for Sink {
    fn drop(&mut self) {
        for bus in self.buses.lock().values() {
            bus.shutdown();
        }
    }
}

/// One lane on a shared bus.
struct Stream {
    bus: Arc<MixerBus>,
    lane: Arc<Lane>,
}

impl OutputStream for Stream {
    fn write(&mut self, block: &[f32]) -> Result<(), SinkError> {
        self.lane.push(block)
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        self.bus.remove_lane(self.lane.id());
    }
}

fn is_supported_format(format: cpal::SampleFormat) -> bool {
    matches!(
        format,
        cpal::SampleFormat::F32
            | cpal::SampleFormat::I16
            | cpal::SampleFormat::I32
            | cpal::SampleFormat::U16
    )
}

fn build_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    bus: Arc<MixerBus>,
) -> Result<cpal::Stream, SinkError> {
    let result = match sample_format {
        cpal::SampleFormat::F32 => device.build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| bus.mix_into(data),
            |err| error!("cpal output stream error: {}", err),
            None,
        ),
        cpal::SampleFormat::I16 => build_converting_stream::<i16>(device, config, bus),
        cpal::SampleFormat::I32 => build_converting_stream::<i32>(device, config, bus),
        cpal::SampleFormat::U16 => build_converting_stream::<u16>(device, config, bus),
        other => {
            warn!(format = ?other, "Unsupported output sample format");
            return Err(SinkError::Backend(format!(
                "unsupported sample format {:?}",
                other
            )));
        }
    };
    result.map_err(|e| SinkError::Backend(e.to_string()))
}

/// Builds a stream for integer formats: mix in f32, then convert.
fn build_converting_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    bus: Arc<MixerBus>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            scratch.resize(data.len(), 0.0);
            bus.mix_into(&mut scratch);
            for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
                *dst = T::from_sample(src);
            }
        },
        |err| error!("cpal output stream error: {}", err),
        None,
    )
}

/// Lists output devices across every available host.
fn find_devices() -> Result<Vec<(String, cpal::Device)>, SinkError> {
    // Suppress noisy backend output while probing.
    let _shh_stdout = shh::stdout()?;
    let _shh_stderr = shh::stderr()?;

    let mut devices = Vec::new();
    for host_id in cpal::available_hosts() {
        let host = match cpal::host_from_id(host_id) {
            Ok(host) => host,
            Err(e) => {
                error!(err = e.to_string(), host = host_id.name(), "Unable to open host");
                continue;
            }
        };
        let host_devices = match host.output_devices() {
            Ok(host_devices) => host_devices,
            Err(e) => {
                error!(
                    err = e.to_string(),
                    host = host_id.name(),
                    "Unable to list devices for host"
                );
                continue;
            }
        };

        for device in host_devices {
            if let Ok(name) = device.name() {
                devices.push((name, device));
            }
        }
    }

    devices.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(devices)
}

/// Lists the names of cpal output devices.
pub fn list() -> Result<Vec<String>, SinkError> {
    Ok(find_devices()?.into_iter().map(|(name, _)| name).collect())
}
