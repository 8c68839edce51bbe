//! Decoder selection by file extension
//!
//! `StreamDecoder` is a closed set of the container readers the engine
//! supports. Each variant is compiled in only when its cargo feature is
//! enabled; an extension whose variant is missing is treated as unknown.

use std::path::Path;

use log::{info, warn};

use super::decoder::{DecodeResult, SoundDecoder};
#[cfg(feature = "mp3")]
use super::mp3::Mp3File;
#[cfg(feature = "opus")]
use super::opus::OpusFile;
use super::vb::{VbFile, VB_DEFAULT_CHANNELS, VB_DEFAULT_SAMPLE_RATE};
use super::wav::WavFile;

/// Per-stream settings supplied by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    /// Sample rate for VAG block files, which carry none
    pub sample_rate_override: Option<u32>,
    /// Channel count for VAG block files
    pub vb_channels: u8,
    /// Extra processed-count queries before a desync is reported
    pub desync_retries: u32,
}

impl Default for StreamSettings {
    fn default() -> Self {
        StreamSettings {
            sample_rate_override: None,
            vb_channels: VB_DEFAULT_CHANNELS,
            desync_retries: 4,
        }
    }
}

/// One of the supported container readers
pub enum StreamDecoder {
    Wave(WavFile),
    #[cfg(feature = "mp3")]
    Mp3(Mp3File),
    #[cfg(feature = "opus")]
    Opus(OpusFile),
    VagBlocks(VbFile),
}

macro_rules! dispatch {
    ($self:expr, $dec:ident => $body:expr) => {
        match $self {
            StreamDecoder::Wave($dec) => $body,
            #[cfg(feature = "mp3")]
            StreamDecoder::Mp3($dec) => $body,
            #[cfg(feature = "opus")]
            StreamDecoder::Opus($dec) => $body,
            StreamDecoder::VagBlocks($dec) => $body,
        }
    };
}

impl StreamDecoder {
    /// Pick a reader from the extension of `path` and open it.
    ///
    /// Returns `None` for unknown extensions. A recognised file that fails
    /// to open is still returned; check `is_opened`.
    pub fn open(path: &Path, settings: &StreamSettings) -> Option<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let decoder = match ext.as_str() {
            "wav" => StreamDecoder::Wave(WavFile::open(path)),
            #[cfg(feature = "mp3")]
            "mp3" => StreamDecoder::Mp3(Mp3File::open(path)),
            #[cfg(feature = "opus")]
            "opus" => StreamDecoder::Opus(OpusFile::open(path)),
            "vb" => StreamDecoder::VagBlocks(VbFile::open(
                path,
                settings.sample_rate_override.unwrap_or(VB_DEFAULT_SAMPLE_RATE),
                settings.vb_channels,
            )),
            _ => {
                warn!("no decoder for {}", path.display());
                return None;
            }
        };

        if decoder.is_opened() {
            info!(
                "{} stream {}: {} Hz, {} ch, {} frames, {} avg samples/s, {} buffer samples, {} ms",
                decoder.name(),
                path.display(),
                decoder.sample_rate(),
                decoder.channels(),
                decoder.sample_count(),
                decoder.avg_samples_per_sec(),
                decoder.buffer_samples(),
                decoder.length_ms()
            );
        }
        Some(decoder)
    }
}

impl SoundDecoder for StreamDecoder {
    fn name(&self) -> &'static str {
        dispatch!(self, d => d.name())
    }

    fn is_opened(&self) -> bool {
        dispatch!(self, d => d.is_opened())
    }

    fn sample_size(&self) -> u32 {
        dispatch!(self, d => d.sample_size())
    }

    fn sample_count(&self) -> u32 {
        dispatch!(self, d => d.sample_count())
    }

    fn sample_rate(&self) -> u32 {
        dispatch!(self, d => d.sample_rate())
    }

    fn channels(&self) -> u32 {
        dispatch!(self, d => d.channels())
    }

    fn seek(&mut self, milliseconds: u32) {
        dispatch!(self, d => d.seek(milliseconds))
    }

    fn tell(&self) -> u32 {
        dispatch!(self, d => d.tell())
    }

    fn decode(&mut self, buf: &mut [u8]) -> DecodeResult<usize> {
        dispatch!(self, d => d.decode(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_with(suffix: &str, data: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(data).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_unknown_extension() {
        let file = temp_with(".xm", b"whatever");
        assert!(StreamDecoder::open(file.path(), &StreamSettings::default()).is_none());
        assert!(StreamDecoder::open(Path::new("noext"), &StreamSettings::default()).is_none());
    }

    #[test]
    fn test_extension_is_case_insensitive() {
        let file = temp_with(".VB", &[0u8; 0x4000]);
        let decoder = StreamDecoder::open(file.path(), &StreamSettings::default()).unwrap();
        assert!(matches!(decoder, StreamDecoder::VagBlocks(_)));
        assert!(decoder.is_opened());
    }

    #[test]
    fn test_vb_uses_override_rate_and_channels() {
        let file = temp_with(".vb", &[0u8; 0x2000]);
        let settings = StreamSettings {
            sample_rate_override: Some(22050),
            vb_channels: 1,
            ..StreamSettings::default()
        };
        let decoder = StreamDecoder::open(file.path(), &settings).unwrap();
        assert_eq!(decoder.sample_rate(), 22050);
        assert_eq!(decoder.channels(), 1);
        assert_eq!(decoder.name(), "VB");
    }

    #[test]
    fn test_broken_wav_reports_not_opened() {
        let file = temp_with(".wav", b"RIFF\0\0\0\0JUNK");
        let decoder = StreamDecoder::open(file.path(), &StreamSettings::default()).unwrap();
        assert!(matches!(decoder, StreamDecoder::Wave(_)));
        assert!(!decoder.is_opened());
        assert_eq!(decoder.tell(), 0);
    }

    #[test]
    fn test_stream_decoder_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<StreamDecoder>();
    }
}
