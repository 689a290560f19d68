use rubato::{FftFixedIn, Resampler};

const CHUNK: usize = 1024;
const SUB_CHUNKS: usize = 2;

/// Number of samples `len` input samples become after rate conversion
pub fn resampled_len(len: usize, from: u32, to: u32) -> usize {
    if from == 0 {
        return 0;
    }
    (len as f64 * to as f64 / from as f64).round() as usize
}

/// Resample mono PCM from `from` Hz to `to` Hz.
///
/// The output has exactly `round(len * to / from)` samples: the resampler's
/// startup delay is trimmed and the tail is flushed with silence.
pub fn resample_mono(input: &[f32], from: u32, to: u32) -> Result<Vec<f32>, String> {
    if from == 0 || to == 0 {
        return Err(format!("invalid sample rates {} -> {}", from, to));
    }
    if from == to || input.is_empty() {
        return Ok(input.to_vec());
    }

    let mut resampler = FftFixedIn::<f32>::new(from as usize, to as usize, CHUNK, SUB_CHUNKS, 1)
        .map_err(|e| e.to_string())?;

    let target_len = resampled_len(input.len(), from, to);
    let delay = resampler.output_delay();
    let mut output = Vec::with_capacity(target_len + delay + CHUNK);

    let mut position = 0;
    let mut chunk = vec![0.0f32; CHUNK];
    // keep feeding (zero padded once input runs out) until the delayed tail is out
    while output.len() < target_len + delay {
        let needed = resampler.input_frames_next();
        chunk.resize(needed, 0.0);
        chunk.fill(0.0);

        let end = (position + needed).min(input.len());
        if position < end {
            chunk[..end - position].copy_from_slice(&input[position..end]);
        }
        position = end;

        let frames = resampler
            .process(&[chunk.as_slice()], None)
            .map_err(|e| e.to_string())?;
        output.extend_from_slice(&frames[0]);
    }

    Ok(output.into_iter().skip(delay).take(target_len).collect())
}
