//! Playback backend contract
//!
//! A stream drives two mono sources through this trait. The operations
//! mirror an OpenAL-style source/buffer model: buffers are filled with PCM,
//! queued on a source, played, and handed back once processed.

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use super::formats::AudioFormat;

/// Handle of a playback source
pub type SourceId = usize;

/// Handle of a playback buffer
pub type BufferId = usize;

/// Source playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceState {
    #[default]
    Initial,
    Stopped,
    Playing,
    Paused,
}

/// Backend error codes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("invalid name: {0}")]
    InvalidName(usize),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("driver failure: {0}")]
    DriverFailure(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Operations a stream needs from the audio device layer
pub trait PlaybackBackend: Send {
    fn gen_sources(&mut self, n: usize) -> BackendResult<Vec<SourceId>>;

    fn gen_buffers(&mut self, n: usize) -> BackendResult<Vec<BufferId>>;

    fn source_state(&mut self, source: SourceId) -> BackendResult<SourceState>;

    /// Start or resume playback. Playing a fully processed queue rewinds it.
    fn play(&mut self, source: SourceId) -> BackendResult<()>;

    fn pause(&mut self, source: SourceId) -> BackendResult<()>;

    /// Stop playback; every queued buffer becomes processed.
    fn stop(&mut self, source: SourceId) -> BackendResult<()>;

    fn buffers_queued(&mut self, source: SourceId) -> BackendResult<usize>;

    fn buffers_processed(&mut self, source: SourceId) -> BackendResult<usize>;

    fn is_buffer(&self, buffer: BufferId) -> bool;

    /// Load little-endian 16-bit PCM into an unqueued buffer
    fn buffer_data(
        &mut self,
        buffer: BufferId,
        format: AudioFormat,
        data: &[u8],
        frequency: u32,
    ) -> BackendResult<()>;

    fn queue_buffers(&mut self, source: SourceId, buffers: &[BufferId]) -> BackendResult<()>;

    /// Remove `n` processed buffers from the head of the queue.
    ///
    /// Fails without removing anything if fewer than `n` are processed.
    fn unqueue_buffers(&mut self, source: SourceId, n: usize) -> BackendResult<Vec<BufferId>>;

    fn set_gain(&mut self, source: SourceId, gain: f32) -> BackendResult<()>;

    fn set_position(&mut self, source: SourceId, position: [f32; 3]) -> BackendResult<()>;

    fn set_pitch(&mut self, source: SourceId, pitch: f32) -> BackendResult<()>;

    fn looping(&mut self, source: SourceId) -> BackendResult<bool>;

    fn set_looping(&mut self, source: SourceId, looping: bool) -> BackendResult<()>;

    /// Bytes already played from the buffer at the head of the unprocessed queue
    fn byte_offset(&mut self, source: SourceId) -> BackendResult<usize>;
}

/// Backend shared between the driver and its streams
pub type SharedBackend = Arc<Mutex<dyn PlaybackBackend>>;
