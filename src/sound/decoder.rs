//! Sound decoder trait definition
//!
//! Defines the `SoundDecoder` capability set shared by every streamed file
//! format. Positions are tracked in frames (one sample per channel) and
//! exposed to callers in milliseconds.

use thiserror::Error;

/// Error type for decoder operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// File not found
    #[error("File not found: {0}")]
    NotFound(String),
    /// Invalid or corrupted audio data
    #[error("Invalid audio data: {0}")]
    InvalidData(String),
    /// Unsupported audio format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    /// I/O error
    #[error("I/O error: {0}")]
    IoError(String),
    /// Decoder was never opened successfully
    #[error("Decoder not initialized")]
    NotInitialized,
    /// End of stream reached
    #[error("End of file")]
    EndOfFile,
    /// Codec-level failure
    #[error("Decoder error: {0}")]
    DecoderError(String),
}

impl DecodeError {
    /// Clean exhaustion, as opposed to a failure worth reporting
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, DecodeError::EndOfFile)
    }
}

impl From<std::io::Error> for DecodeError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => DecodeError::NotFound(err.to_string()),
            std::io::ErrorKind::UnexpectedEof => DecodeError::EndOfFile,
            _ => DecodeError::IoError(err.to_string()),
        }
    }
}

/// Result type for decoder operations
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Sound decoder trait
///
/// Every streamed format implements this. `decode` fills as much of the
/// caller's buffer as the format allows and returns planar (channel-major)
/// 16-bit little-endian PCM. It never returns `Ok(0)`: exhaustion is
/// `Err(DecodeError::EndOfFile)`, anything else in `Err` is a failure.
pub trait SoundDecoder: Send {
    /// Returns the decoder name (e.g., "WAV", "MP3")
    fn name(&self) -> &'static str;

    /// Returns true if the file was opened and its header accepted
    fn is_opened(&self) -> bool;

    /// Bytes per decoded sample
    fn sample_size(&self) -> u32 {
        2
    }

    /// Total number of frames in the file
    fn sample_count(&self) -> u32;

    /// Sample frequency in Hz
    fn sample_rate(&self) -> u32;

    /// Number of channels
    fn channels(&self) -> u32;

    /// Reposition to the block or frame containing `milliseconds`
    ///
    /// Resets any filter state carried across blocks.
    fn seek(&mut self, milliseconds: u32);

    /// Current read position in milliseconds
    fn tell(&self) -> u32;

    /// Decode audio data into the provided buffer
    ///
    /// # Arguments
    /// * `buf` - Buffer to write decoded PCM data into
    ///
    /// # Returns
    /// Number of bytes written, always greater than zero on success
    fn decode(&mut self, buf: &mut [u8]) -> DecodeResult<usize>;

    /// Interleaved samples per second
    fn avg_samples_per_sec(&self) -> u32 {
        let rate = u64::from(self.channels()) * u64::from(self.sample_rate());
        u32::try_from(rate).unwrap_or(u32::MAX)
    }

    /// Interleaved samples making up one playback buffer (a quarter second)
    fn buffer_samples(&self) -> u32 {
        let channels = u64::from(self.channels().max(1));
        let samples = (u64::from(self.avg_samples_per_sec()) / 4).max(channels);
        let rounded = samples + (channels - samples % channels) % channels;
        u32::try_from(rounded).unwrap_or(u32::MAX)
    }

    /// Bytes needed to hold one playback buffer
    fn buffer_size(&self) -> usize {
        let bytes = u64::from(self.buffer_samples()) * u64::from(self.sample_size());
        usize::try_from(bytes).unwrap_or(usize::MAX)
    }

    /// Total length in milliseconds
    fn length_ms(&self) -> u32 {
        self.frames_to_ms(self.sample_count())
    }

    /// Frames covered by `milliseconds` at this decoder's rate
    fn ms_to_frames(&self, milliseconds: u32) -> u32 {
        ms_to_frames(milliseconds, self.sample_rate())
    }

    /// Milliseconds covered by `frames` at this decoder's rate
    fn frames_to_ms(&self, frames: u32) -> u32 {
        frames_to_ms(frames, self.sample_rate())
    }
}

/// Highest sample rate any decoder accepts
pub const MAX_SAMPLE_RATE: u32 = 384_000;

/// Convert milliseconds to frames at `rate`
pub fn ms_to_frames(milliseconds: u32, rate: u32) -> u32 {
    let frames = u64::from(milliseconds) * u64::from(rate) / 1000;
    u32::try_from(frames).unwrap_or(u32::MAX)
}

/// Convert frames to milliseconds at `rate`
pub fn frames_to_ms(frames: u32, rate: u32) -> u32 {
    if rate == 0 {
        return 0;
    }
    let ms = u64::from(frames) * 1000 / u64::from(rate);
    u32::try_from(ms).unwrap_or(u32::MAX)
}

/// Write `samples` into `buf` as little-endian bytes, returning bytes written
pub(crate) fn write_samples_le(samples: &[i16], buf: &mut [u8]) -> usize {
    let count = samples.len().min(buf.len() / 2);
    for (dst, sample) in buf.chunks_exact_mut(2).zip(&samples[..count]) {
        dst.copy_from_slice(&sample.to_le_bytes());
    }
    count * 2
}
