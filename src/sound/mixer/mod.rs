// mod.rs - In-memory playback backend

//! OpenAL-like mixer that plays queued buffers in memory.
//!
//! `Mixer` implements [`PlaybackBackend`] without a device. Time only moves
//! when the owner calls [`Mixer::advance`] or [`Mixer::mix`], which makes it
//! the headless driver and the backend used by the integration tests.
//! Pitch is stored but never applied; there is no resampling.
//!
//! # Architecture
//!
//! - `types` - Buffer states and sample limits
//! - `buffer` - PCM buffer storage
//! - `source` - Source queues and playback cursor
//! - `mix` - Gain, pan and saturation

pub mod buffer;
pub mod mix;
pub mod source;
pub mod types;

pub use buffer::MixerBuffer;
pub use source::MixerSource;
pub use types::BufferState;

use log::trace;

use crate::sound::backend::{
    BackendError, BackendResult, BufferId, PlaybackBackend, SourceId, SourceState,
};
use crate::sound::formats::AudioFormat;

/// Owned set of sources and buffers
#[derive(Debug, Default)]
pub struct Mixer {
    sources: Vec<MixerSource>,
    buffers: Vec<MixerBuffer>,
}

impl Mixer {
    pub fn new() -> Self {
        Self::default()
    }

    fn source(&self, handle: SourceId) -> BackendResult<&MixerSource> {
        self.sources.get(handle).ok_or(BackendError::InvalidName(handle))
    }

    fn source_mut(&mut self, handle: SourceId) -> BackendResult<&mut MixerSource> {
        self.sources
            .get_mut(handle)
            .ok_or(BackendError::InvalidName(handle))
    }

    /// Play `frames` frames on every playing source, discarding the output
    pub fn advance(&mut self, frames: usize) {
        for src in &mut self.sources {
            src.consume(&self.buffers, frames, |_, _, _| {});
        }
    }

    /// Play `frames` frames on one source only
    pub fn advance_source(&mut self, handle: SourceId, frames: usize) -> BackendResult<()> {
        let src = self
            .sources
            .get_mut(handle)
            .ok_or(BackendError::InvalidName(handle))?;
        src.consume(&self.buffers, frames, |_, _, _| {});
        Ok(())
    }

    /// Render playing sources into interleaved stereo `out`.
    ///
    /// Mono buffers are panned by the source x position. Both channels of a
    /// stereo buffer only get the source gain.
    pub fn mix(&mut self, out: &mut [i16]) {
        let frames = out.len() / 2;
        let mut acc = vec![0.0f32; frames * 2];

        for src in &mut self.sources {
            let gain = src.gain;
            let (pan_l, pan_r) = mix::pan_weights(src.position[0]);
            let buffers = &self.buffers;
            let stereo = src
                .queue
                .get(src.next)
                .and_then(|&b| buffers.get(b))
                .is_some_and(|b| b.format.is_stereo());
            let (wl, wr) = if stereo {
                (gain, gain)
            } else {
                (gain * pan_l, gain * pan_r)
            };
            src.consume(buffers, frames, |i, left, right| {
                mix::accumulate(&mut acc[i * 2], left, wl);
                mix::accumulate(&mut acc[i * 2 + 1], right, wr);
            });
        }

        for (dst, value) in out.iter_mut().zip(acc) {
            *dst = mix::clamp_sample(value);
        }
        trace!("mixer: rendered {} frames", frames);
    }

    /// Buffers currently queued on `source`, oldest first
    pub fn queued(&self, source: SourceId) -> Vec<BufferId> {
        self.sources
            .get(source)
            .map(|s| s.queue.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Samples held by `buffer`
    pub fn buffer_samples(&self, buffer: BufferId) -> Option<&[i16]> {
        self.buffers.get(buffer).map(|b| b.samples.as_slice())
    }

    /// Sample rate and format of `buffer`
    pub fn buffer_format(&self, buffer: BufferId) -> Option<(AudioFormat, u32)> {
        self.buffers.get(buffer).map(|b| (b.format, b.frequency))
    }

    pub fn gain(&self, source: SourceId) -> Option<f32> {
        self.sources.get(source).map(|s| s.gain)
    }

    pub fn position(&self, source: SourceId) -> Option<[f32; 3]> {
        self.sources.get(source).map(|s| s.position)
    }

    pub fn pitch(&self, source: SourceId) -> Option<f32> {
        self.sources.get(source).map(|s| s.pitch)
    }
}

impl PlaybackBackend for Mixer {
    fn gen_sources(&mut self, n: usize) -> BackendResult<Vec<SourceId>> {
        let first = self.sources.len();
        self.sources.resize_with(first + n, MixerSource::new);
        Ok((first..first + n).collect())
    }

    fn gen_buffers(&mut self, n: usize) -> BackendResult<Vec<BufferId>> {
        let first = self.buffers.len();
        self.buffers.resize_with(first + n, MixerBuffer::new);
        Ok((first..first + n).collect())
    }

    fn source_state(&mut self, source: SourceId) -> BackendResult<SourceState> {
        Ok(self.source(source)?.state)
    }

    fn play(&mut self, source: SourceId) -> BackendResult<()> {
        self.source_mut(source)?.play();
        Ok(())
    }

    fn pause(&mut self, source: SourceId) -> BackendResult<()> {
        self.source_mut(source)?.pause();
        Ok(())
    }

    fn stop(&mut self, source: SourceId) -> BackendResult<()> {
        self.source_mut(source)?.stop();
        Ok(())
    }

    fn buffers_queued(&mut self, source: SourceId) -> BackendResult<usize> {
        Ok(self.source(source)?.queued_count())
    }

    fn buffers_processed(&mut self, source: SourceId) -> BackendResult<usize> {
        Ok(self.source(source)?.processed_count())
    }

    fn is_buffer(&self, buffer: BufferId) -> bool {
        buffer < self.buffers.len()
    }

    fn buffer_data(
        &mut self,
        buffer: BufferId,
        format: AudioFormat,
        data: &[u8],
        frequency: u32,
    ) -> BackendResult<()> {
        let buf = self
            .buffers
            .get_mut(buffer)
            .ok_or(BackendError::InvalidName(buffer))?;
        if buf.state == BufferState::Queued {
            return Err(BackendError::InvalidOperation(format!(
                "buffer {} is queued",
                buffer
            )));
        }
        if frequency == 0 {
            return Err(BackendError::InvalidValue("zero frequency".to_string()));
        }
        buf.set_data(format, data, frequency);
        Ok(())
    }

    fn queue_buffers(&mut self, source: SourceId, buffers: &[BufferId]) -> BackendResult<()> {
        let src = self
            .sources
            .get_mut(source)
            .ok_or(BackendError::InvalidName(source))?;
        src.queue_buffers(buffers, &mut self.buffers)
    }

    fn unqueue_buffers(&mut self, source: SourceId, n: usize) -> BackendResult<Vec<BufferId>> {
        let src = self
            .sources
            .get_mut(source)
            .ok_or(BackendError::InvalidName(source))?;
        src.unqueue_buffers(n, &mut self.buffers)
    }

    fn set_gain(&mut self, source: SourceId, gain: f32) -> BackendResult<()> {
        if !gain.is_finite() || gain < 0.0 {
            return Err(BackendError::InvalidValue(format!("gain {}", gain)));
        }
        self.source_mut(source)?.gain = gain;
        Ok(())
    }

    fn set_position(&mut self, source: SourceId, position: [f32; 3]) -> BackendResult<()> {
        self.source_mut(source)?.position = position;
        Ok(())
    }

    fn set_pitch(&mut self, source: SourceId, pitch: f32) -> BackendResult<()> {
        if !pitch.is_finite() || pitch <= 0.0 {
            return Err(BackendError::InvalidValue(format!("pitch {}", pitch)));
        }
        self.source_mut(source)?.pitch = pitch;
        Ok(())
    }

    fn looping(&mut self, source: SourceId) -> BackendResult<bool> {
        Ok(self.source(source)?.looping)
    }

    fn set_looping(&mut self, source: SourceId, looping: bool) -> BackendResult<()> {
        self.source_mut(source)?.looping = looping;
        Ok(())
    }

    fn byte_offset(&mut self, source: SourceId) -> BackendResult<usize> {
        Ok(self.source(source)?.byte_offset(&self.buffers))
    }
}
