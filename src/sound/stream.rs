//! Streamed playback of one audio file
//!
//! A `Stream` owns one decoder and feeds two mono backend sources in
//! lockstep: the first channel of every decoded chunk goes to the primary
//! source, the second (or the same data again for mono files) to the
//! secondary. Panning moves the two sources apart in the stereo field.
//!
//! The driver calls [`Stream::update`] once per tick to recycle processed
//! buffers, and [`Stream::on_device_lost`] / [`Stream::on_device_restored`]
//! around device suspension.

use std::collections::VecDeque;
use std::path::Path;

use log::{debug, error, trace, warn};

use super::backend::{BackendResult, BufferId, PlaybackBackend, SharedBackend, SourceId, SourceState};
use super::decoder::{DecodeError, SoundDecoder};
use super::formats::AudioFormat;
use super::stream_decoder::{StreamDecoder, StreamSettings};

/// Volume scale used by [`Stream::set_volume`]
pub const MAX_VOLUME: u8 = 127;

/// Largest pan value; 63 is centre
pub const MAX_PAN: u8 = 127;

/// Buffers per stream, two per queued chunk
pub const DEFAULT_STREAM_BUFFERS: usize = 8;

/// Streams one file through a pair of mono sources
pub struct Stream {
    backend: SharedBackend,
    sources: Option<[SourceId; 2]>,
    buffers: Vec<BufferId>,
    decoder: Option<StreamDecoder>,
    scratch: Vec<u8>,
    paused: bool,
    active: bool,
    reset: bool,
    volume: u8,
    pan: u8,
    pos_before_reset: u32,
    /// Extra processed-count queries before a desync is reported
    desync_retries: u32,
    /// Frames per channel of each queued buffer pair, oldest first
    queued_frames: VecDeque<usize>,
}

impl Stream {
    /// Open `path` for playback on `sources`.
    ///
    /// `buffers` are used in pairs; an odd trailing handle is ignored. An
    /// unknown or unreadable file yields a stream that reports not opened
    /// and ignores every call.
    pub fn new(
        path: &Path,
        backend: SharedBackend,
        sources: Option<[SourceId; 2]>,
        mut buffers: Vec<BufferId>,
        settings: StreamSettings,
    ) -> Self {
        if buffers.len() % 2 != 0 {
            warn!("stream {}: odd buffer count {}", path.display(), buffers.len());
            buffers.pop();
        }
        if buffers.is_empty() {
            warn!("stream {}: no buffers", path.display());
        }

        debug!("stream {}", path.display());
        let decoder = StreamDecoder::open(path, &settings).filter(|d| d.is_opened());
        let scratch = decoder
            .as_ref()
            .map(|d| vec![0; d.buffer_size()])
            .unwrap_or_default();

        Stream {
            backend,
            sources,
            buffers,
            decoder,
            scratch,
            paused: false,
            active: false,
            reset: false,
            volume: 0,
            pan: 0,
            pos_before_reset: 0,
            desync_retries: settings.desync_retries,
            queued_frames: VecDeque::new(),
        }
    }

    fn with_backend<T>(
        &self,
        f: impl FnOnce(&mut dyn PlaybackBackend, [SourceId; 2]) -> BackendResult<T>,
    ) -> Option<T> {
        let sources = self.sources?;
        let mut backend = self.backend.lock();
        match f(&mut *backend, sources) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("stream: backend call failed: {}", e);
                None
            }
        }
    }

    pub fn has_source(&self) -> bool {
        self.sources.is_some()
    }

    pub fn is_opened(&self) -> bool {
        self.decoder.is_some()
    }

    /// True while not paused and either active or still audible
    pub fn is_playing(&self) -> bool {
        if !self.has_source() || !self.is_opened() || self.paused {
            return false;
        }
        if self.active {
            return true;
        }
        self.with_backend(|b, [s0, s1]| {
            Ok(b.source_state(s0)? == SourceState::Playing
                || b.source_state(s1)? == SourceState::Playing)
        })
        .unwrap_or(false)
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// True between device loss and restore
    pub fn is_reset_pending(&self) -> bool {
        self.reset
    }

    /// Pause both sources without touching the paused flag
    pub fn pause(&mut self) {
        self.with_backend(|b, sources| {
            for source in sources {
                if b.source_state(source)? != SourceState::Paused {
                    b.pause(source)?;
                }
            }
            Ok(())
        });
    }

    pub fn set_pause(&mut self, pause: bool) {
        if !self.has_source() {
            return;
        }
        if pause {
            self.pause();
            self.paused = true;
        } else {
            if self.paused {
                self.set_play(true);
            }
            self.paused = false;
        }
    }

    pub fn set_pitch(&mut self, pitch: f32) {
        self.with_backend(|b, [s0, s1]| {
            b.set_pitch(s0, pitch)?;
            b.set_pitch(s1, pitch)
        });
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.with_backend(|b, [s0, s1]| {
            b.set_gain(s0, gain)?;
            b.set_gain(s1, gain)
        });
    }

    /// Set volume in `0..=MAX_VOLUME`
    pub fn set_volume(&mut self, volume: u8) {
        self.volume = volume.min(MAX_VOLUME);
        self.set_gain(f32::from(self.volume) / f32::from(MAX_VOLUME));
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    /// Set pan in `0..=MAX_PAN`.
    ///
    /// The primary source sits on the left half of the field and the
    /// secondary on the right; each keeps unit distance from the listener.
    pub fn set_pan(&mut self, pan: u8) {
        let pan = pan.min(MAX_PAN);
        let pan_i = i32::from(pan);
        let left = pan_position((pan_i - 63).clamp(0, 63));
        let right = pan_position((pan_i + 64).clamp(64, 127));
        self.with_backend(|b, [s0, s1]| {
            b.set_position(s0, left)?;
            b.set_position(s1, right)
        });
        self.pan = pan;
    }

    pub fn pan(&self) -> u8 {
        self.pan
    }

    /// Seek to `ms` and drop everything queued.
    ///
    /// An active stream is refilled from the new position and resumes
    /// unless paused.
    pub fn set_pos_ms(&mut self, ms: u32) {
        if !self.is_opened() {
            return;
        }
        self.seek_and_clear(ms);
        if self.active {
            self.fill_buffers();
            if !self.paused {
                self.set_play(true);
            }
        }
    }

    fn seek_and_clear(&mut self, ms: u32) {
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.seek(ms);
        }
        self.clear_buffers();
    }

    /// Playback position: decoder position minus audio still queued
    pub fn get_pos_ms(&self) -> u32 {
        let Some(decoder) = self.decoder.as_ref() else {
            return 0;
        };
        let Some((processed, offset)) = self.with_backend(|b, [s0, _]| {
            Ok((b.buffers_processed(s0)?, b.byte_offset(s0)?))
        }) else {
            return 0;
        };

        let pending: usize = self.queued_frames.iter().skip(processed).sum();
        let unplayed = pending.saturating_sub(offset / 2);
        decoder
            .tell()
            .saturating_sub(decoder.frames_to_ms(u32::try_from(unplayed).unwrap_or(u32::MAX)))
    }

    /// Decoder output rate, 0 when not opened
    pub fn sample_rate(&self) -> u32 {
        self.decoder.as_ref().map_or(0, |d| d.sample_rate())
    }

    pub fn get_length_ms(&self) -> u32 {
        self.decoder.as_ref().map_or(0, |d| d.length_ms())
    }

    /// Decode one chunk into the buffer pair.
    ///
    /// Returns frames per channel, or `None` when nothing was decoded.
    pub fn fill_buffer(&mut self, pair: [BufferId; 2]) -> Option<usize> {
        if !self.has_source() {
            return None;
        }
        let decoder = self.decoder.as_mut()?;
        let valid = {
            let backend = self.backend.lock();
            pair.iter().all(|&b| backend.is_buffer(b))
        };
        if !valid {
            warn!("stream: invalid buffer pair {:?}", pair);
            return None;
        }

        let size = match decoder.decode(&mut self.scratch) {
            Ok(size) => size,
            Err(DecodeError::EndOfFile) => {
                debug!("stream: {} exhausted at {} ms", decoder.name(), decoder.tell());
                return None;
            }
            Err(e) => {
                warn!("stream: {} decode failed: {}", decoder.name(), e);
                return None;
            }
        };

        let channels = decoder.channels().max(1) as usize;
        let rate = decoder.sample_rate();
        let channel_size = size / channels;
        let (first, rest) = self.scratch[..size].split_at(channel_size);
        let second = if channels == 1 { first } else { &rest[..channel_size] };

        self.with_backend(|b, _| {
            b.buffer_data(pair[0], AudioFormat::Mono16, first, rate)?;
            b.buffer_data(pair[1], AudioFormat::Mono16, second, rate)
        })?;
        Some(channel_size / 2)
    }

    /// Fill and queue buffer pairs until all are used or the decoder runs dry.
    ///
    /// Returns the number of pairs queued.
    pub fn fill_buffers(&mut self) -> usize {
        let pairs: Vec<[BufferId; 2]> = self
            .buffers
            .chunks_exact(2)
            .map(|p| [p[0], p[1]])
            .collect();

        let mut filled = 0;
        for pair in pairs {
            let Some(frames) = self.fill_buffer(pair) else {
                break;
            };
            if !self.queue_pair(pair, frames) {
                break;
            }
            filled += 1;
        }
        trace!("stream: filled {} buffer pairs", filled);
        filled
    }

    fn queue_pair(&mut self, [b0, b1]: [BufferId; 2], frames: usize) -> bool {
        let queued = self
            .with_backend(|b, [s0, s1]| {
                b.queue_buffers(s0, &[b0])?;
                b.queue_buffers(s1, &[b1])
            })
            .is_some();
        if queued {
            self.queued_frames.push_back(frames);
        }
        queued
    }

    /// Stop both sources and unqueue every buffer.
    ///
    /// The active flag is left alone.
    pub fn clear_buffers(&mut self) {
        self.with_backend(|b, sources| {
            for source in sources {
                b.stop(source)?;
                let queued = b.buffers_queued(source)?;
                b.unqueue_buffers(source, queued)?;
            }
            Ok(())
        });
        self.queued_frames.clear();
    }

    /// Rewind the decoder and reset pitch; returns whether the stream is opened
    pub fn setup(&mut self) -> bool {
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.seek(0);
            self.set_pitch(1.0);
        }
        self.is_opened()
    }

    pub fn set_play(&mut self, state: bool) {
        if !self.has_source() {
            return;
        }
        self.with_backend(|b, sources| {
            for source in sources {
                let current = b.source_state(source)?;
                if state && current != SourceState::Playing {
                    b.play(source)?;
                } else if !state && current != SourceState::Stopped {
                    b.stop(source)?;
                }
            }
            Ok(())
        });
        self.active = state;
    }

    /// Fill the buffer chain and start playing if anything was decoded
    pub fn start(&mut self) {
        if !self.has_source() {
            return;
        }
        if self.fill_buffers() != 0 {
            self.set_play(true);
        }
    }

    pub fn stop(&mut self) {
        if !self.has_source() {
            return;
        }
        self.set_play(false);
    }

    /// Recycle processed buffers; call once per output tick
    pub fn update(&mut self) {
        if !self.is_opened() || !self.has_source() || self.reset || self.paused {
            return;
        }
        // each attempt takes the backend lock on its own
        let mut attempt = 0;
        let (state, processed) = loop {
            let Some((state, p0, p1)) = self.with_backend(|b, [s0, s1]| {
                Ok((b.source_state(s0)?, b.buffers_processed(s0)?, b.buffers_processed(s1)?))
            }) else {
                return;
            };
            if p0 == p1 {
                break (state, p0);
            }
            if attempt >= self.desync_retries {
                error!(
                    "stream: sources out of sync, {} vs {} buffers processed",
                    p0, p1
                );
                break (state, p0.min(p1));
            }
            attempt += 1;
            std::thread::yield_now();
        };

        self.with_backend(|b, [s0, s1]| {
            if b.looping(s0)? {
                trace!("stream: set looping");
                b.set_looping(s0, true)?;
                b.set_looping(s1, true)?;
            }
            Ok(())
        });

        for _ in 0..processed {
            let Some((b0, b1)) = self.with_backend(|b, [s0, s1]| {
                let b0 = b.unqueue_buffers(s0, 1)?;
                let b1 = b.unqueue_buffers(s1, 1)?;
                Ok((b0, b1))
            }) else {
                break;
            };
            self.queued_frames.pop_front();

            let (Some(&b0), Some(&b1)) = (b0.first(), b1.first()) else {
                break;
            };
            if self.active {
                if let Some(frames) = self.fill_buffer([b0, b1]) {
                    self.queue_pair([b0, b1], frames);
                }
            }
        }

        if state != SourceState::Playing {
            let queued = self
                .with_backend(|b, [s0, _]| b.buffers_queued(s0))
                .unwrap_or(0);
            self.set_play(queued != 0);
        }
    }

    /// Snapshot the position and drop queued audio; buffer work is
    /// suspended until [`Stream::on_device_restored`]
    pub fn on_device_lost(&mut self) {
        self.reset = true;
        self.pos_before_reset = self.get_pos_ms();
        debug!("stream: device lost at {} ms", self.pos_before_reset);
        self.clear_buffers();
    }

    /// Resume from the snapshot with the state held before the loss
    pub fn on_device_restored(&mut self) {
        if !self.reset {
            return;
        }
        if self.setup() {
            self.set_pan(self.pan);
            self.set_volume(self.volume);
            self.seek_and_clear(self.pos_before_reset);
            if self.active {
                self.fill_buffers();
            }
            self.set_play(self.active);
            if self.paused {
                self.pause();
            }
            debug!("stream: restored at {} ms", self.pos_before_reset);
        }
        self.reset = false;
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        self.stop();
        self.clear_buffers();
    }
}

/// Source position for a pan step in `0..=127`
fn pan_position(step: i32) -> [f32; 3] {
    let x = (step - 63) as f32 / 64.0;
    [x, 0.0, (1.0 - x * x).sqrt()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sound::mixer::Mixer;
    use parking_lot::Mutex;
    use std::io::Write;
    use std::sync::Arc;

    fn mono_wav(rate: u32, samples: &[i16]) -> tempfile::NamedTempFile {
        let data: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data.len() as u32).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&rate.to_le_bytes());
        out.extend_from_slice(&(rate * 2).to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&data);

        let mut file = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        file.write_all(&out).unwrap();
        file.flush().unwrap();
        file
    }

    fn setup(path: &Path) -> (Arc<Mutex<Mixer>>, Stream, [SourceId; 2]) {
        let mixer = Arc::new(Mutex::new(Mixer::new()));
        let (sources, buffers) = {
            let mut m = mixer.lock();
            let s = m.gen_sources(2).unwrap();
            (
                [s[0], s[1]],
                m.gen_buffers(DEFAULT_STREAM_BUFFERS).unwrap(),
            )
        };
        let backend: SharedBackend = mixer.clone();
        let stream = Stream::new(
            path,
            backend,
            Some(sources),
            buffers,
            StreamSettings::default(),
        );
        (mixer, stream, sources)
    }

    /// Mixer whose second source reports fewer processed buffers for a
    /// few queries, like a device thread that has not caught up yet
    struct LaggingBackend {
        mixer: Mixer,
        lagging: SourceId,
        lag_queries: usize,
    }

    impl PlaybackBackend for LaggingBackend {
        fn gen_sources(&mut self, n: usize) -> BackendResult<Vec<SourceId>> {
            self.mixer.gen_sources(n)
        }
        fn gen_buffers(&mut self, n: usize) -> BackendResult<Vec<BufferId>> {
            self.mixer.gen_buffers(n)
        }
        fn source_state(&mut self, source: SourceId) -> BackendResult<SourceState> {
            self.mixer.source_state(source)
        }
        fn play(&mut self, source: SourceId) -> BackendResult<()> {
            self.mixer.play(source)
        }
        fn pause(&mut self, source: SourceId) -> BackendResult<()> {
            self.mixer.pause(source)
        }
        fn stop(&mut self, source: SourceId) -> BackendResult<()> {
            self.mixer.stop(source)
        }
        fn buffers_queued(&mut self, source: SourceId) -> BackendResult<usize> {
            self.mixer.buffers_queued(source)
        }
        fn buffers_processed(&mut self, source: SourceId) -> BackendResult<usize> {
            let processed = self.mixer.buffers_processed(source)?;
            if source == self.lagging && self.lag_queries > 0 {
                self.lag_queries -= 1;
                return Ok(processed.saturating_sub(1));
            }
            Ok(processed)
        }
        fn is_buffer(&self, buffer: BufferId) -> bool {
            self.mixer.is_buffer(buffer)
        }
        fn buffer_data(
            &mut self,
            buffer: BufferId,
            format: AudioFormat,
            data: &[u8],
            frequency: u32,
        ) -> BackendResult<()> {
            self.mixer.buffer_data(buffer, format, data, frequency)
        }
        fn queue_buffers(&mut self, source: SourceId, buffers: &[BufferId]) -> BackendResult<()> {
            self.mixer.queue_buffers(source, buffers)
        }
        fn unqueue_buffers(&mut self, source: SourceId, n: usize) -> BackendResult<Vec<BufferId>> {
            self.mixer.unqueue_buffers(source, n)
        }
        fn set_gain(&mut self, source: SourceId, gain: f32) -> BackendResult<()> {
            self.mixer.set_gain(source, gain)
        }
        fn set_position(&mut self, source: SourceId, position: [f32; 3]) -> BackendResult<()> {
            self.mixer.set_position(source, position)
        }
        fn set_pitch(&mut self, source: SourceId, pitch: f32) -> BackendResult<()> {
            self.mixer.set_pitch(source, pitch)
        }
        fn looping(&mut self, source: SourceId) -> BackendResult<bool> {
            self.mixer.looping(source)
        }
        fn set_looping(&mut self, source: SourceId, looping: bool) -> BackendResult<()> {
            self.mixer.set_looping(source, looping)
        }
        fn byte_offset(&mut self, source: SourceId) -> BackendResult<usize> {
            self.mixer.byte_offset(source)
        }
    }

    fn lagging_setup(
        path: &Path,
        retries: u32,
    ) -> (Arc<Mutex<LaggingBackend>>, Stream, [SourceId; 2]) {
        let mut mixer = Mixer::new();
        let s = mixer.gen_sources(2).unwrap();
        let buffers = mixer.gen_buffers(DEFAULT_STREAM_BUFFERS).unwrap();
        let lagging = Arc::new(Mutex::new(LaggingBackend {
            mixer,
            lagging: s[1],
            lag_queries: 0,
        }));
        let backend: SharedBackend = lagging.clone();
        let settings = StreamSettings {
            desync_retries: retries,
            ..Default::default()
        };
        let stream = Stream::new(path, backend, Some([s[0], s[1]]), buffers, settings);
        (lagging, stream, [s[0], s[1]])
    }

    #[test]
    fn test_desync_retry_converges() {
        let samples: Vec<i16> = (0..16000).map(|i| i as i16).collect();
        let file = mono_wav(8000, &samples);
        let (backend, mut stream, [s0, s1]) = lagging_setup(file.path(), 2);
        stream.start();

        {
            let mut b = backend.lock();
            b.mixer.advance(2000);
            b.lag_queries = 1;
        }
        stream.update();

        let mut b = backend.lock();
        assert_eq!(b.lag_queries, 0);
        for source in [s0, s1] {
            assert_eq!(b.mixer.buffers_queued(source).unwrap(), 4);
            let head = b.mixer.queued(source)[0];
            assert_eq!(b.mixer.buffer_samples(head).unwrap()[0], 2000);
        }
    }

    #[test]
    fn test_desync_without_retries_holds_buffers() {
        let samples: Vec<i16> = (0..16000).map(|i| i as i16).collect();
        let file = mono_wav(8000, &samples);
        let (backend, mut stream, [s0, _]) = lagging_setup(file.path(), 0);
        stream.start();

        {
            let mut b = backend.lock();
            b.mixer.advance(2000);
            b.lag_queries = 1;
        }
        stream.update();

        let b = backend.lock();
        let head = b.mixer.queued(s0)[0];
        assert_eq!(b.mixer.buffer_samples(head).unwrap()[0], 0);
    }

    #[test]
    fn test_pan_positions() {
        let file = mono_wav(8000, &[0; 100]);
        let (mixer, mut stream, [s0, s1]) = setup(file.path());

        stream.set_pan(63);
        let left = mixer.lock().position(s0).unwrap();
        let right = mixer.lock().position(s1).unwrap();
        assert!((left[0] + 63.0 / 64.0).abs() < 1e-6);
        assert_eq!(right, [1.0, 0.0, 0.0]);
        assert!((left[0] * left[0] + left[2] * left[2] - 1.0).abs() < 1e-6);

        stream.set_pan(127);
        let left = mixer.lock().position(s0).unwrap();
        assert_eq!(left, [0.0, 0.0, 1.0]);
        assert_eq!(stream.pan(), 127);

        stream.set_pan(0);
        let right = mixer.lock().position(s1).unwrap();
        assert!((right[0] - 1.0 / 64.0).abs() < 1e-6);
    }

    #[test]
    fn test_volume_sets_gain_on_both_sources() {
        let file = mono_wav(8000, &[0; 100]);
        let (mixer, mut stream, [s0, s1]) = setup(file.path());
        stream.set_volume(MAX_VOLUME);
        assert_eq!(mixer.lock().gain(s0), Some(1.0));
        stream.set_volume(200);
        assert_eq!(stream.volume(), MAX_VOLUME);
        stream.set_volume(0);
        assert_eq!(mixer.lock().gain(s1), Some(0.0));
    }

    #[test]
    fn test_unknown_file_is_inert() {
        let (mixer, mut stream, [s0, _]) = setup(Path::new("/nonexistent/track.wav"));
        assert!(!stream.is_opened());
        stream.start();
        stream.update();
        assert!(!stream.is_playing());
        assert_eq!(stream.get_pos_ms(), 0);
        assert_eq!(stream.get_length_ms(), 0);
        assert_eq!(mixer.lock().buffers_queued(s0).unwrap(), 0);
    }

    #[test]
    fn test_without_sources_nothing_is_queued() {
        let file = mono_wav(8000, &[0; 4000]);
        let mixer = Arc::new(Mutex::new(Mixer::new()));
        let buffers = mixer.lock().gen_buffers(4).unwrap();
        let backend: SharedBackend = mixer.clone();
        let mut stream = Stream::new(file.path(), backend, None, buffers, StreamSettings::default());
        assert!(stream.is_opened());
        assert!(!stream.has_source());
        assert_eq!(stream.fill_buffers(), 0);
        stream.start();
        assert!(!stream.is_playing());
    }

    #[test]
    fn test_mono_data_goes_to_both_sources() {
        let samples: Vec<i16> = (0..4000).map(|i| i as i16).collect();
        let file = mono_wav(8000, &samples);
        let (mixer, mut stream, [s0, s1]) = setup(file.path());
        assert_eq!(stream.fill_buffers(), 2);

        let m = mixer.lock();
        let b0 = m.queued(s0)[0];
        let b1 = m.queued(s1)[0];
        assert_eq!(m.buffer_samples(b0), m.buffer_samples(b1));
        assert_eq!(m.buffer_samples(b0).unwrap().len(), 2000);
        assert_eq!(m.buffer_format(b0), Some((AudioFormat::Mono16, 8000)));
    }

    #[test]
    fn test_pause_holds_position() {
        let file = mono_wav(8000, &[0; 16000]);
        let (mixer, mut stream, _) = setup(file.path());
        stream.start();
        mixer.lock().advance(800);
        stream.set_pause(true);
        assert!(stream.is_paused());
        assert!(!stream.is_playing());

        let before = stream.get_pos_ms();
        mixer.lock().advance(4000);
        stream.update();
        assert_eq!(stream.get_pos_ms(), before);
        assert_eq!(before, 100);

        stream.set_pause(false);
        assert!(stream.is_playing());
    }

    #[test]
    fn test_setup_rewinds() {
        let file = mono_wav(8000, &[0; 16000]);
        let (mixer, mut stream, [s0, _]) = setup(file.path());
        stream.set_pitch(2.0);
        stream.set_pos_ms(1000);
        assert!(stream.setup());
        assert_eq!(mixer.lock().pitch(s0), Some(1.0));
        stream.start();
        assert_eq!(stream.get_pos_ms(), 0);
    }
}
