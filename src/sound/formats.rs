//! Audio format tags for playback buffers
//!
//! Decoders always produce signed 16-bit little-endian PCM; the tag only
//! tells the backend how many channels a block carries.

/// Sample layout of a block handed to a playback backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioFormat {
    /// 16-bit mono (2 bytes per frame)
    #[default]
    Mono16,
    /// 16-bit interleaved stereo (4 bytes per frame)
    Stereo16,
}

impl AudioFormat {
    /// Returns the number of bytes per frame
    pub fn bytes_per_frame(&self) -> usize {
        match self {
            AudioFormat::Mono16 => 2,
            AudioFormat::Stereo16 => 4,
        }
    }

    /// Returns the number of channels
    pub fn channels(&self) -> usize {
        match self {
            AudioFormat::Mono16 => 1,
            AudioFormat::Stereo16 => 2,
        }
    }

    /// Returns true if this is a stereo format
    pub fn is_stereo(&self) -> bool {
        matches!(self, AudioFormat::Stereo16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_format_sizes() {
        assert_eq!(AudioFormat::Mono16.bytes_per_frame(), 2);
        assert_eq!(AudioFormat::Stereo16.bytes_per_frame(), 4);
        assert_eq!(AudioFormat::Mono16.channels(), 1);
        assert_eq!(AudioFormat::Stereo16.channels(), 2);
    }

    #[test]
    fn test_audio_format_default_is_mono() {
        assert_eq!(AudioFormat::default(), AudioFormat::Mono16);
        assert!(!AudioFormat::default().is_stereo());
    }
}
