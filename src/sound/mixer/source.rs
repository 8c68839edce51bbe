// source.rs - Audio source management

//! Audio sources for the mixer.
//!
//! A source owns a queue of buffer handles. Buffers before `next` in the
//! queue have been played and count as processed; `pos` is the frame offset
//! inside the buffer at `next`.

use std::collections::VecDeque;

use crate::sound::backend::{BackendError, BackendResult, BufferId, SourceState};
use crate::sound::mixer::buffer::MixerBuffer;
use crate::sound::mixer::types::BufferState;

/// Audio source for playback
#[derive(Debug, Clone)]
pub struct MixerSource {
    /// Current playback state
    pub state: SourceState,
    /// Whether the queue restarts when it runs out
    pub looping: bool,
    pub gain: f32,
    pub pitch: f32,
    pub position: [f32; 3],
    /// Queued buffer handles, oldest first
    pub queue: VecDeque<BufferId>,
    /// Index in `queue` of the buffer being played
    pub next: usize,
    /// Frame offset inside the current buffer
    pub pos: usize,
}

impl Default for MixerSource {
    fn default() -> Self {
        MixerSource {
            state: SourceState::Initial,
            looping: false,
            gain: 1.0,
            pitch: 1.0,
            position: [0.0; 3],
            queue: VecDeque::new(),
            next: 0,
            pos: 0,
        }
    }
}

impl MixerSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queued_count(&self) -> usize {
        self.queue.len()
    }

    pub fn processed_count(&self) -> usize {
        self.next.min(self.queue.len())
    }

    fn rewind(&mut self) {
        self.next = 0;
        self.pos = 0;
    }

    pub fn play(&mut self) {
        if self.queue.is_empty() {
            self.state = SourceState::Stopped;
            return;
        }
        if self.state != SourceState::Playing && self.next >= self.queue.len() {
            // Rewind if at end
            self.rewind();
        }
        self.state = SourceState::Playing;
    }

    pub fn pause(&mut self) {
        if self.state == SourceState::Playing {
            self.state = SourceState::Paused;
        }
    }

    pub fn stop(&mut self) {
        self.next = self.queue.len();
        self.pos = 0;
        self.state = SourceState::Stopped;
    }

    pub fn queue_buffers(
        &mut self,
        handles: &[BufferId],
        buffers: &mut [MixerBuffer],
    ) -> BackendResult<()> {
        // First pass: validate all buffers
        for &handle in handles {
            let buf = buffers.get(handle).ok_or(BackendError::InvalidName(handle))?;
            if buf.state == BufferState::Queued {
                return Err(BackendError::InvalidOperation(format!(
                    "buffer {} is already queued",
                    handle
                )));
            }
        }

        // Second pass: queue all buffers
        for &handle in handles {
            buffers[handle].state = BufferState::Queued;
            self.queue.push_back(handle);
        }
        Ok(())
    }

    pub fn unqueue_buffers(
        &mut self,
        n: usize,
        buffers: &mut [MixerBuffer],
    ) -> BackendResult<Vec<BufferId>> {
        if n > self.processed_count() {
            return Err(BackendError::InvalidOperation(format!(
                "{} buffers requested, {} processed",
                n,
                self.processed_count()
            )));
        }

        let unqueued: Vec<BufferId> = self.queue.drain(..n).collect();
        self.next -= n;
        for &handle in &unqueued {
            if let Some(buf) = buffers.get_mut(handle) {
                buf.state = BufferState::Filled;
            }
        }
        Ok(unqueued)
    }

    /// Bytes played from the current buffer
    pub fn byte_offset(&self, buffers: &[MixerBuffer]) -> usize {
        match self.state {
            SourceState::Playing | SourceState::Paused => self
                .queue
                .get(self.next)
                .and_then(|&b| buffers.get(b))
                .map_or(0, |buf| self.pos * buf.format.bytes_per_frame()),
            _ => 0,
        }
    }

    /// Play up to `frames` frames, passing each to `emit` with its index.
    ///
    /// A source that runs out of queued data stops.
    pub fn consume(
        &mut self,
        buffers: &[MixerBuffer],
        frames: usize,
        mut emit: impl FnMut(usize, i16, i16),
    ) {
        let mut done = 0;
        while done < frames && self.state == SourceState::Playing {
            let Some(buf) = self.queue.get(self.next).and_then(|&b| buffers.get(b)) else {
                let audible = self
                    .queue
                    .iter()
                    .any(|&b| buffers.get(b).is_some_and(|buf| buf.frames() > 0));
                if self.looping && audible {
                    self.rewind();
                } else {
                    self.state = SourceState::Stopped;
                }
                continue;
            };

            let len = buf.frames();
            let take = len.saturating_sub(self.pos).min(frames - done);
            for i in 0..take {
                let (left, right) = buf.frame(self.pos + i);
                emit(done + i, left, right);
            }
            self.pos += take;
            done += take;
            if self.pos >= len {
                self.next += 1;
                self.pos = 0;
            }
        }

        if self.state == SourceState::Playing && !self.looping && self.next >= self.queue.len() {
            self.state = SourceState::Stopped;
        }
    }
}
