use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::Path;

use crate::app_config::OutputEncoding;

/// Write mono samples as a WAV file
pub fn write_mono(path: &Path, samples: &[f32], sample_rate: u32, encoding: OutputEncoding) -> Result<(), hound::Error> {
    let spec = match encoding {
        OutputEncoding::Pcm16 => WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        },
        OutputEncoding::Float32 => WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        },
    };

    let mut writer = WavWriter::create(path, spec)?;
    match encoding {
        OutputEncoding::Pcm16 => {
            for &sample in samples {
                let scaled = (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
                writer.write_sample(scaled)?;
            }
        }
        OutputEncoding::Float32 => {
            for &sample in samples {
                writer.write_sample(sample)?;
            }
        }
    }
    writer.finalize()
}

/// Read a WAV file as mono floats, averaging channels when needed
pub fn read_mono(path: &Path) -> Result<(Vec<f32>, u32), hound::Error> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };
    Ok((samples, spec.sample_rate))
}
