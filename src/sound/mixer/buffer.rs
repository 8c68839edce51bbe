// buffer.rs - Audio buffer storage

//! PCM buffers owned by the mixer.
//!
//! Data arrives as little-endian bytes and is kept as decoded `i16`
//! samples, interleaved when the format is stereo.

use crate::sound::formats::AudioFormat;
use crate::sound::mixer::types::BufferState;

/// Audio buffer containing PCM data
#[derive(Debug, Clone, Default)]
pub struct MixerBuffer {
    /// Current buffer state
    pub state: BufferState,
    /// Layout of `samples`
    pub format: AudioFormat,
    /// Sample rate given with the data
    pub frequency: u32,
    /// Decoded samples
    pub samples: Vec<i16>,
}

impl MixerBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents with `data`; a trailing odd byte is dropped
    pub fn set_data(&mut self, format: AudioFormat, data: &[u8], frequency: u32) {
        self.format = format;
        self.frequency = frequency;
        self.samples.clear();
        self.samples.extend(
            data.chunks_exact(2)
                .map(|c| i16::from_le_bytes([c[0], c[1]])),
        );
        self.state = BufferState::Filled;
    }

    /// Number of whole frames held
    pub fn frames(&self) -> usize {
        self.samples.len() / self.format.channels()
    }

    /// Size of the data in bytes
    pub fn size(&self) -> usize {
        self.samples.len() * 2
    }

    /// Left/right pair for `frame`; mono data is duplicated
    pub fn frame(&self, frame: usize) -> (i16, i16) {
        match self.format {
            AudioFormat::Mono16 => {
                let s = self.samples[frame];
                (s, s)
            }
            AudioFormat::Stereo16 => (self.samples[frame * 2], self.samples[frame * 2 + 1]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_new() {
        let buf = MixerBuffer::new();
        assert_eq!(buf.state, BufferState::Initial);
        assert_eq!(buf.frames(), 0);
        assert_eq!(buf.size(), 0);
    }

    #[test]
    fn test_buffer_set_data_mono() {
        let mut buf = MixerBuffer::new();
        buf.set_data(AudioFormat::Mono16, &[0x01, 0x00, 0xff, 0xff, 0x7f], 22050);
        assert_eq!(buf.state, BufferState::Filled);
        assert_eq!(buf.samples, vec![1, -1]);
        assert_eq!(buf.frames(), 2);
        assert_eq!(buf.size(), 4);
        assert_eq!(buf.frame(1), (-1, -1));
        assert_eq!(buf.frequency, 22050);
    }

    #[test]
    fn test_buffer_set_data_stereo() {
        let mut buf = MixerBuffer::new();
        buf.set_data(AudioFormat::Stereo16, &[1, 0, 2, 0, 3, 0, 4, 0], 44100);
        assert_eq!(buf.frames(), 2);
        assert_eq!(buf.frame(0), (1, 2));
        assert_eq!(buf.frame(1), (3, 4));
    }
}
