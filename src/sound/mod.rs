//! Streaming audio decode and playback
//!
//! Decoders turn a file into interleaved 16-bit PCM; a [`Stream`] pulls
//! from one decoder and keeps two mono backend sources fed.
//!
//! # Architecture
//!
//! - `SoundDecoder` trait defines the decoder interface
//! - `StreamDecoder` picks a decoder by file extension (WAV, MP3, Opus, VB)
//! - `ima_adpcm` and `vag_adpcm` hold the block codecs behind WAV and VB
//! - `StereoSorter` splits interleaved stereo into two mono halves
//! - `PlaybackBackend` is the OpenAL-style source/buffer interface
//! - `mixer` provides a headless backend, `rodio_backend` a device backend

pub mod backend;
pub mod decoder;
pub mod formats;
pub mod ima_adpcm;
pub mod mixer;
#[cfg(feature = "mp3")]
pub mod mp3;
#[cfg(feature = "opus")]
pub mod opus;
#[cfg(feature = "rodio-backend")]
pub mod rodio_backend;
pub mod sort;
pub mod stream;
pub mod stream_decoder;
pub mod vag_adpcm;
pub mod vb;
pub mod wav;

pub use backend::{
    BackendError, BackendResult, BufferId, PlaybackBackend, SharedBackend, SourceId, SourceState,
};
pub use decoder::{DecodeError, DecodeResult, SoundDecoder, MAX_SAMPLE_RATE};
pub use formats::AudioFormat;
pub use mixer::Mixer;
#[cfg(feature = "mp3")]
pub use mp3::Mp3File;
#[cfg(feature = "opus")]
pub use opus::OpusFile;
#[cfg(feature = "rodio-backend")]
pub use rodio_backend::RodioBackend;
pub use sort::StereoSorter;
pub use stream::{Stream, DEFAULT_STREAM_BUFFERS, MAX_PAN, MAX_VOLUME};
pub use stream_decoder::{StreamDecoder, StreamSettings};
pub use vb::VbFile;
pub use wav::WavFile;
