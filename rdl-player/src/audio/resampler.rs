//! Streaming sample rate conversion using rubato
//!
//! Converts decoded stereo chunks to the output device rate. Input arrives
//! in arbitrary chunk sizes; rubato wants fixed-size planar blocks, so input
//! is buffered until a full block is available.

use crate::error::{Error, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoResampler};
use tracing::debug;

/// Frames handed to rubato per call
const CHUNK_FRAMES: usize = 1024;

const CHANNELS: usize = 2;

/// Stereo resampler fed incrementally
pub struct StreamResampler {
    /// None when input and output rates match
    inner: Option<FastFixedIn<f32>>,
    pending: [Vec<f32>; CHANNELS],
}

impl StreamResampler {
    pub fn new(input_rate: u32, output_rate: u32) -> Result<Self> {
        if input_rate == output_rate {
            debug!("Sample rate already at {}Hz, skipping resample", output_rate);
            return Ok(Self {
                inner: None,
                pending: [Vec::new(), Vec::new()],
            });
        }

        debug!("Resampling from {}Hz to {}Hz", input_rate, output_rate);

        let inner = FastFixedIn::<f32>::new(
            output_rate as f64 / input_rate as f64,
            1.0,
            PolynomialDegree::Septic,
            CHUNK_FRAMES,
            CHANNELS,
        )
        .map_err(|e| Error::Decode(format!("Failed to create resampler: {}", e)))?;

        Ok(Self {
            inner: Some(inner),
            pending: [
                Vec::with_capacity(CHUNK_FRAMES * 2),
                Vec::with_capacity(CHUNK_FRAMES * 2),
            ],
        })
    }

    /// True when samples pass through unchanged
    pub fn is_passthrough(&self) -> bool {
        self.inner.is_none()
    }

    /// Feed interleaved stereo input, returning whatever output is ready
    pub fn process(&mut self, interleaved: &[f32]) -> Result<Vec<f32>> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(interleaved.to_vec());
        };

        for frame in interleaved.chunks_exact(CHANNELS) {
            self.pending[0].push(frame[0]);
            self.pending[1].push(frame[1]);
        }

        let mut output = Vec::new();
        loop {
            let needed = inner.input_frames_next();
            if self.pending[0].len() < needed {
                break;
            }

            let block: Vec<Vec<f32>> = self
                .pending
                .iter_mut()
                .map(|channel| channel.drain(..needed).collect())
                .collect();

            let planar = inner
                .process(&block, None)
                .map_err(|e| Error::Decode(format!("Resampling failed: {}", e)))?;
            interleave_into(&planar, &mut output);
        }

        Ok(output)
    }

    /// Resample the buffered remainder at end of stream
    pub fn flush(&mut self) -> Result<Vec<f32>> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(Vec::new());
        };
        if self.pending[0].is_empty() {
            return Ok(Vec::new());
        }

        let block: Vec<Vec<f32>> = self.pending.iter_mut().map(std::mem::take).collect();
        let planar = inner
            .process_partial(Some(block.as_slice()), None)
            .map_err(|e| Error::Decode(format!("Resampling failed: {}", e)))?;

        let mut output = Vec::new();
        interleave_into(&planar, &mut output);
        Ok(output)
    }
}

/// [[L, L, ...], [R, R, ...]] -> [L, R, L, R, ...]
fn interleave_into(planar: &[Vec<f32>], output: &mut Vec<f32>) {
    let frames = planar.first().map(Vec::len).unwrap_or(0);
    output.reserve(frames * CHANNELS);
    for i in 0..frames {
        for channel in planar {
            output.push(channel[i]);
        }
    }
}
