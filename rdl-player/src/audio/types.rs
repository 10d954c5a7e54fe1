//! Core audio data types

/// One stereo sample frame, passed from the ring buffer to the device
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioFrame {
    pub left: f32,
    pub right: f32,
}

impl AudioFrame {
    /// Silent frame (0.0, 0.0)
    pub fn zero() -> Self {
        AudioFrame {
            left: 0.0,
            right: 0.0,
        }
    }

    pub fn from_stereo(left: f32, right: f32) -> Self {
        AudioFrame { left, right }
    }

    /// Scale both channels and clamp to [-1.0, 1.0]
    pub fn apply_volume(&mut self, volume: f32) {
        self.left = (self.left * volume).clamp(-1.0, 1.0);
        self.right = (self.right * volume).clamp(-1.0, 1.0);
    }
}

/// Convert interleaved samples with `channels` channels to interleaved
/// stereo. Mono is duplicated; channels past the second are dropped.
pub fn to_stereo(samples: &[f32], channels: usize) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.iter().flat_map(|&s| [s, s]).collect(),
        2 => samples.to_vec(),
        n => samples
            .chunks_exact(n)
            .flat_map(|frame| [frame[0], frame[1]])
            .collect(),
    }
}
