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

//! Whole-file decoding of audio clips into interleaved f32 PCM.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};

use super::error::SampleError;

/// Extensions (lowercase) that are considered audio clips.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["wav", "wave", "flac", "mp3", "ogg", "aif", "aiff"];

/// Fully decoded PCM data for one file.
#[derive(Debug)]
pub struct DecodedAudio {
    /// Interleaved samples.
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Returns true if the path carries a recognized audio extension.
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Decodes the entire file at `path`. Mono files come back as a single channel
/// with one sample per frame.
pub fn decode_file(path: &Path) -> Result<DecodedAudio, SampleError> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let probed = get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| SampleError::NoAudioTrack(path.to_path_buf()))?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    let sample_rate = params
        .sample_rate
        .ok_or_else(|| SampleError::UnknownSampleRate(path.to_path_buf()))?;
    let mut channels = params.channels.map(|c| c.count() as u16).unwrap_or(0);

    let mut decoder = get_codecs().make(&params, &DecoderOptions::default())?;

    let mut samples = Vec::new();
    while let Some(packet) = next_packet(format_reader.as_mut(), decoder.as_mut(), track_id)? {
        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // Corrupt packets are skipped rather than failing the whole clip.
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(e.into()),
        };
        if decoded.frames() == 0 {
            continue;
        }

        // Some containers only report the channel layout once audio is decoded.
        if channels == 0 {
            channels = decoded.spec().channels.count() as u16;
        }

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    if channels == 0 {
        return Err(SampleError::UnknownChannels(path.to_path_buf()));
    }
    if samples.len() < channels as usize {
        return Err(SampleError::Empty(path.to_path_buf()));
    }

    // Drop any trailing partial frame.
    let whole = samples.len() - samples.len() % channels as usize;
    samples.truncate(whole);

    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels,
    })
}

/// Reads the next packet for the given track. Returns `Ok(None)` at end of stream.
fn next_packet(
    format_reader: &mut dyn FormatReader,
    decoder: &mut dyn Decoder,
    track_id: u32,
) -> Result<Option<Packet>, SampleError> {
    loop {
        match format_reader.next_packet() {
            Ok(packet) if packet.track_id() == track_id => return Ok(Some(packet)),
            Ok(_) => continue,
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(None)
            }
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::write_wav;

    #[test]
    fn test_is_supported() {
        assert!(is_supported(Path::new("kick.wav")));
        assert!(is_supported(Path::new("KICK.WAV")));
        assert!(is_supported(Path::new("pad.flac")));
        assert!(!is_supported(Path::new("notes.txt")));
        assert!(!is_supported(Path::new("README")));
    }

    #[test]
    fn test_decode_mono_float() {
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("mono.wav");
        write_wav(&path, 1, &[0.5, -0.25, 0.125, 1.0], 44100).unwrap();

        let decoded = decode_file(&path).unwrap();
        assert_eq!(decoded.channels, 1);
        assert_eq!(decoded.sample_rate, 44100);
        assert_eq!(decoded.samples, vec![0.5, -0.25, 0.125, 1.0]);
    }

    #[test]
    fn test_decode_stereo_interleaved() {
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("stereo.wav");
        write_wav(&path, 2, &[0.1, -0.1, 0.2, -0.2, 0.3, -0.3], 48000).unwrap();

        let decoded = decode_file(&path).unwrap();
        assert_eq!(decoded.channels, 2);
        assert_eq!(decoded.sample_rate, 48000);
        assert_eq!(decoded.samples.len(), 6);
        assert!((decoded.samples[0] - 0.1).abs() < 1e-6);
        assert!((decoded.samples[1] + 0.1).abs() < 1e-6);
        assert!((decoded.samples[5] + 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_decode_int16() {
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("int.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for sample in [0i16, 16384, -16384, i16::MAX] {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();

        let decoded = decode_file(&path).unwrap();
        assert_eq!(decoded.channels, 1);
        assert_eq!(decoded.sample_rate, 22050);
        assert_eq!(decoded.samples.len(), 4);
        assert!((decoded.samples[1] - 0.5).abs() < 1e-3);
        assert!((decoded.samples[2] + 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("broken.wav");
        std::fs::write(&path, b"this is not a wav file").unwrap();

        assert!(decode_file(&path).is_err());
    }

    #[test]
    fn test_decode_missing_file() {
        let tempdir = tempfile::tempdir().unwrap();
        let result = decode_file(&tempdir.path().join("missing.wav"));
        assert!(matches!(result, Err(SampleError::Io(_))));
    }
}
