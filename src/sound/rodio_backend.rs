//! Rodio-based playback backend
//!
//! A dedicated audio thread owns the output device and one `SpatialSink`
//! per source. `RodioBackend` talks to it over a command channel and waits
//! on a reply channel for every call. Rodio does not report buffer
//! completion, so processed buffers are estimated from elapsed play time.

use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamHandle, SpatialSink};

use super::backend::{
    BackendError, BackendResult, BufferId, PlaybackBackend, SourceId, SourceState,
};
use super::formats::AudioFormat;

const LEFT_EAR: [f32; 3] = [-1.0, 0.0, 0.0];
const RIGHT_EAR: [f32; 3] = [1.0, 0.0, 0.0];
const REPLY_TIMEOUT: Duration = Duration::from_millis(100);
const STARTUP_TIMEOUT: Duration = Duration::from_secs(2);

// =============================================================================
// Internal Types
// =============================================================================

type Reply<T> = Sender<BackendResult<T>>;

/// Command sent to the audio thread
enum AudioCmd {
    GenSources(usize, Reply<Vec<SourceId>>),
    GenBuffers(usize, Reply<Vec<BufferId>>),
    State(SourceId, Reply<SourceState>),
    Play(SourceId, Reply<()>),
    Pause(SourceId, Reply<()>),
    Stop(SourceId, Reply<()>),
    BuffersQueued(SourceId, Reply<usize>),
    BuffersProcessed(SourceId, Reply<usize>),
    IsBuffer(BufferId, Reply<bool>),
    BufferData(BufferId, AudioFormat, Vec<u8>, u32, Reply<()>),
    Queue(SourceId, Vec<BufferId>, Reply<()>),
    Unqueue(SourceId, usize, Reply<Vec<BufferId>>),
    SetGain(SourceId, f32, Reply<()>),
    SetPosition(SourceId, [f32; 3], Reply<()>),
    SetPitch(SourceId, f32, Reply<()>),
    Looping(SourceId, Reply<bool>),
    SetLooping(SourceId, bool, Reply<()>),
    ByteOffset(SourceId, Reply<usize>),
    Shutdown,
}

/// Buffer data stored in the audio thread
#[derive(Default)]
struct BufferData {
    format: AudioFormat,
    frequency: u32,
    samples: Vec<i16>,
    queued: bool,
}

impl BufferData {
    fn frames(&self) -> usize {
        self.samples.len() / self.format.channels()
    }
}

/// Queued buffer with the bookkeeping used to estimate completion
struct QueuedBuffer {
    id: BufferId,
    frames: usize,
    bytes_per_frame: usize,
    in_sink: bool,
    played: bool,
}

/// Per-source state
struct RodioSource {
    sink: Option<SpatialSink>,
    queue: VecDeque<QueuedBuffer>,
    state: SourceState,
    gain: f32,
    pitch: f32,
    looping: bool,
    position: [f32; 3],
    sample_rate: u32,
    play_start_time: Option<Instant>,
    frames_played_before_pause: usize,
    /// Frames of in-sink buffers already marked played
    frames_accounted: usize,
}

impl RodioSource {
    fn new() -> Self {
        Self {
            sink: None,
            queue: VecDeque::new(),
            state: SourceState::Initial,
            gain: 1.0,
            pitch: 1.0,
            looping: false,
            position: [0.0; 3],
            sample_rate: 0,
            play_start_time: None,
            frames_played_before_pause: 0,
            frames_accounted: 0,
        }
    }

    /// Estimate how many frames the sink has played
    fn frames_played(&self) -> usize {
        let from_time = self.play_start_time.map_or(0, |start| {
            (start.elapsed().as_secs_f64() * f64::from(self.sample_rate) * f64::from(self.pitch))
                as usize
        });
        self.frames_played_before_pause + from_time
    }

    fn processed(&self) -> usize {
        self.queue.iter().take_while(|b| b.played).count()
    }

    /// Move buffers to processed based on estimated playback position
    fn refresh(&mut self) {
        if self.state != SourceState::Playing {
            return;
        }
        if self.sink.as_ref().map_or(true, |s| s.empty()) {
            for buf in self.queue.iter_mut().filter(|b| b.in_sink) {
                buf.played = true;
            }
            self.state = SourceState::Stopped;
            self.play_start_time = None;
            return;
        }

        let mut budget = self.frames_played().saturating_sub(self.frames_accounted);
        for buf in self.queue.iter_mut().filter(|b| b.in_sink && !b.played) {
            if buf.frames > budget {
                break;
            }
            budget -= buf.frames;
            self.frames_accounted += buf.frames;
            buf.played = true;
        }
    }

    fn pause_clock(&mut self) {
        if self.play_start_time.is_some() {
            // Accumulate played frames up to pause point
            self.frames_played_before_pause = self.frames_played();
            self.play_start_time = None;
        }
    }
}

// =============================================================================
// Audio Thread
// =============================================================================

struct AudioThread {
    handle: OutputStreamHandle,
    sources: HashMap<SourceId, RodioSource>,
    buffers: HashMap<BufferId, BufferData>,
    next_id: usize,
}

fn audio_thread_main(rx: Receiver<AudioCmd>, ready: Sender<BackendResult<()>>) {
    debug!("rodio: audio thread starting");

    let (stream, handle) = match OutputStream::try_default() {
        Ok(s) => s,
        Err(e) => {
            let _ = ready.send(Err(BackendError::DriverFailure(format!(
                "failed to open audio device: {}",
                e
            ))));
            return;
        }
    };

    // Keep stream alive
    let _stream = stream;
    let mut audio = AudioThread {
        handle,
        sources: HashMap::new(),
        buffers: HashMap::new(),
        next_id: 1,
    };
    let _ = ready.send(Ok(()));
    info!("rodio: audio device opened");

    while let Ok(cmd) = rx.recv() {
        if !audio.handle_cmd(cmd) {
            break;
        }
    }

    for (_, mut src) in audio.sources.drain() {
        if let Some(sink) = src.sink.take() {
            sink.stop();
        }
    }
    debug!("rodio: audio thread exited");
}

impl AudioThread {
    /// Returns false when the thread should exit
    fn handle_cmd(&mut self, cmd: AudioCmd) -> bool {
        match cmd {
            AudioCmd::GenSources(n, reply) => {
                let ids = self.alloc_ids(n);
                for &id in &ids {
                    self.sources.insert(id, RodioSource::new());
                }
                let _ = reply.send(Ok(ids));
            }
            AudioCmd::GenBuffers(n, reply) => {
                let ids = self.alloc_ids(n);
                for &id in &ids {
                    self.buffers.insert(id, BufferData::default());
                }
                let _ = reply.send(Ok(ids));
            }
            AudioCmd::State(id, reply) => {
                let _ = reply.send(self.source(id).map(|src| {
                    src.refresh();
                    src.state
                }));
            }
            AudioCmd::Play(id, reply) => {
                let _ = reply.send(self.play(id));
            }
            AudioCmd::Pause(id, reply) => {
                let _ = reply.send(self.source(id).map(|src| {
                    if src.state == SourceState::Playing {
                        if let Some(sink) = &src.sink {
                            sink.pause();
                        }
                        src.pause_clock();
                        src.state = SourceState::Paused;
                    }
                }));
            }
            AudioCmd::Stop(id, reply) => {
                let _ = reply.send(self.source(id).map(|src| {
                    if let Some(sink) = src.sink.take() {
                        sink.stop();
                    }
                    // Move queued to processed
                    for buf in &mut src.queue {
                        buf.played = true;
                        buf.in_sink = false;
                    }
                    src.state = SourceState::Stopped;
                    src.play_start_time = None;
                    src.frames_played_before_pause = 0;
                    src.frames_accounted = 0;
                }));
            }
            AudioCmd::BuffersQueued(id, reply) => {
                let _ = reply.send(self.source(id).map(|src| src.queue.len()));
            }
            AudioCmd::BuffersProcessed(id, reply) => {
                let _ = reply.send(self.source(id).map(|src| {
                    src.refresh();
                    src.processed()
                }));
            }
            AudioCmd::IsBuffer(id, reply) => {
                let _ = reply.send(Ok(self.buffers.contains_key(&id)));
            }
            AudioCmd::BufferData(id, format, data, frequency, reply) => {
                let _ = reply.send(self.buffer_data(id, format, &data, frequency));
            }
            AudioCmd::Queue(id, ids, reply) => {
                let _ = reply.send(self.queue(id, &ids));
            }
            AudioCmd::Unqueue(id, n, reply) => {
                let _ = reply.send(self.unqueue(id, n));
            }
            AudioCmd::SetGain(id, gain, reply) => {
                let _ = reply.send(self.source(id).map(|src| {
                    src.gain = gain;
                    if let Some(sink) = &src.sink {
                        sink.set_volume(gain);
                    }
                }));
            }
            AudioCmd::SetPosition(id, position, reply) => {
                let _ = reply.send(self.source(id).map(|src| {
                    src.position = position;
                    if let Some(sink) = &src.sink {
                        sink.set_emitter_position(position);
                    }
                }));
            }
            AudioCmd::SetPitch(id, pitch, reply) => {
                let _ = reply.send(self.source(id).map(|src| {
                    let was_playing = src.play_start_time.is_some();
                    src.pause_clock();
                    src.pitch = pitch;
                    if was_playing {
                        src.play_start_time = Some(Instant::now());
                    }
                    if let Some(sink) = &src.sink {
                        sink.set_speed(pitch);
                    }
                }));
            }
            AudioCmd::Looping(id, reply) => {
                let _ = reply.send(self.source(id).map(|src| src.looping));
            }
            AudioCmd::SetLooping(id, looping, reply) => {
                // Reported back only; queued streaming never loops the sink
                let _ = reply.send(self.source(id).map(|src| src.looping = looping));
            }
            AudioCmd::ByteOffset(id, reply) => {
                let _ = reply.send(self.source(id).map(|src| {
                    src.refresh();
                    let into = src.frames_played().saturating_sub(src.frames_accounted);
                    src.queue
                        .iter()
                        .find(|b| b.in_sink && !b.played)
                        .map_or(0, |b| into.min(b.frames.saturating_sub(1)) * b.bytes_per_frame)
                }));
            }
            AudioCmd::Shutdown => {
                info!("rodio: shutting down");
                return false;
            }
        }
        true
    }

    fn alloc_ids(&mut self, n: usize) -> Vec<usize> {
        let ids = (self.next_id..self.next_id + n).collect();
        self.next_id += n;
        ids
    }

    fn source(&mut self, id: SourceId) -> BackendResult<&mut RodioSource> {
        self.sources.get_mut(&id).ok_or(BackendError::InvalidName(id))
    }

    fn samples_for(&self, id: BufferId) -> Option<SamplesBuffer<i16>> {
        self.buffers.get(&id).map(|buf| {
            SamplesBuffer::new(
                buf.format.channels() as u16,
                buf.frequency,
                buf.samples.clone(),
            )
        })
    }

    fn play(&mut self, id: SourceId) -> BackendResult<()> {
        let src = self.sources.get_mut(&id).ok_or(BackendError::InvalidName(id))?;
        src.refresh();

        match src.state {
            SourceState::Playing => return Ok(()),
            SourceState::Paused if src.sink.is_some() => {
                if let Some(sink) = &src.sink {
                    sink.play();
                }
                src.play_start_time = Some(Instant::now());
                src.state = SourceState::Playing;
                return Ok(());
            }
            _ => {}
        }

        if src.queue.is_empty() {
            src.state = SourceState::Stopped;
            return Ok(());
        }
        if src.queue.iter().all(|b| b.played) {
            // Rewind if at end
            for buf in &mut src.queue {
                buf.played = false;
            }
        }

        let sink = SpatialSink::try_new(&self.handle, src.position, LEFT_EAR, RIGHT_EAR)
            .map_err(|e| BackendError::DriverFailure(format!("sink: {}", e)))?;
        sink.set_volume(src.gain);
        sink.set_speed(src.pitch);

        let pending: Vec<BufferId> = src
            .queue
            .iter()
            .filter(|b| !b.played)
            .map(|b| b.id)
            .collect();
        for buf in src.queue.iter_mut() {
            buf.in_sink = !buf.played;
        }
        for buf_id in pending {
            if let Some(samples) = self.samples_for(buf_id) {
                sink.append(samples);
            }
        }

        let src = self.sources.get_mut(&id).ok_or(BackendError::InvalidName(id))?;
        src.sink = Some(sink);
        src.state = SourceState::Playing;
        src.play_start_time = Some(Instant::now());
        src.frames_played_before_pause = 0;
        src.frames_accounted = 0;
        Ok(())
    }

    fn buffer_data(
        &mut self,
        id: BufferId,
        format: AudioFormat,
        data: &[u8],
        frequency: u32,
    ) -> BackendResult<()> {
        let buf = self.buffers.get_mut(&id).ok_or(BackendError::InvalidName(id))?;
        if buf.queued {
            return Err(BackendError::InvalidOperation(format!("buffer {} is queued", id)));
        }
        if frequency == 0 {
            return Err(BackendError::InvalidValue("zero frequency".to_string()));
        }
        buf.format = format;
        buf.frequency = frequency;
        buf.samples = data
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        Ok(())
    }

    fn queue(&mut self, id: SourceId, ids: &[BufferId]) -> BackendResult<()> {
        // First pass: validate all buffers
        for &buf_id in ids {
            let buf = self.buffers.get(&buf_id).ok_or(BackendError::InvalidName(buf_id))?;
            if buf.queued {
                return Err(BackendError::InvalidOperation(format!(
                    "buffer {} is already queued",
                    buf_id
                )));
            }
        }

        let src = self.sources.get_mut(&id).ok_or(BackendError::InvalidName(id))?;
        src.refresh();
        let append = matches!(src.state, SourceState::Playing | SourceState::Paused);

        for &buf_id in ids {
            let samples = if append { self.samples_for(buf_id) } else { None };
            let Some(buf) = self.buffers.get_mut(&buf_id) else {
                continue;
            };
            buf.queued = true;
            let queued = QueuedBuffer {
                id: buf_id,
                frames: buf.frames(),
                bytes_per_frame: buf.format.bytes_per_frame(),
                in_sink: samples.is_some(),
                played: false,
            };
            let rate = buf.frequency;

            let src = self.sources.get_mut(&id).ok_or(BackendError::InvalidName(id))?;
            if src.sample_rate == 0 {
                src.sample_rate = rate;
            } else if src.sample_rate != rate {
                warn!("rodio: source {} mixes {} Hz and {} Hz buffers", id, src.sample_rate, rate);
            }
            if let (Some(sink), Some(samples)) = (&src.sink, samples) {
                sink.append(samples);
            }
            src.queue.push_back(queued);
        }
        Ok(())
    }

    fn unqueue(&mut self, id: SourceId, n: usize) -> BackendResult<Vec<BufferId>> {
        let src = self.sources.get_mut(&id).ok_or(BackendError::InvalidName(id))?;
        src.refresh();
        let processed = src.processed();
        if n > processed {
            return Err(BackendError::InvalidOperation(format!(
                "{} buffers requested, {} processed",
                n, processed
            )));
        }

        let ids: Vec<BufferId> = src.queue.drain(..n).map(|b| b.id).collect();
        for buf_id in &ids {
            if let Some(buf) = self.buffers.get_mut(buf_id) {
                buf.queued = false;
            }
        }
        Ok(ids)
    }
}

// =============================================================================
// Backend handle
// =============================================================================

/// Playback backend on the default output device
pub struct RodioBackend {
    sender: Sender<AudioCmd>,
    thread: Option<JoinHandle<()>>,
}

impl RodioBackend {
    /// Spawn the audio thread and open the default device
    pub fn new() -> BackendResult<Self> {
        let (tx, rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        let thread = thread::Builder::new()
            .name("sndstream-audio".to_string())
            .spawn(move || audio_thread_main(rx, ready_tx))
            .map_err(|e| BackendError::DriverFailure(format!("spawn audio thread: {}", e)))?;

        match ready_rx.recv_timeout(STARTUP_TIMEOUT) {
            Ok(Ok(())) => Ok(RodioBackend {
                sender: tx,
                thread: Some(thread),
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => Err(BackendError::DriverFailure(
                "audio thread did not start".to_string(),
            )),
        }
    }

    fn send_cmd_wait<T>(&self, cmd_fn: impl FnOnce(Reply<T>) -> AudioCmd) -> BackendResult<T> {
        let (tx, rx) = mpsc::channel();
        self.sender
            .send(cmd_fn(tx))
            .map_err(|_| BackendError::DriverFailure("audio thread gone".to_string()))?;
        // Use recv_timeout to avoid hanging forever
        rx.recv_timeout(REPLY_TIMEOUT).map_err(|e| {
            error!("rodio: no reply from audio thread: {}", e);
            BackendError::DriverFailure("audio thread did not reply".to_string())
        })?
    }
}

impl Drop for RodioBackend {
    fn drop(&mut self) {
        let _ = self.sender.send(AudioCmd::Shutdown);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl PlaybackBackend for RodioBackend {
    fn gen_sources(&mut self, n: usize) -> BackendResult<Vec<SourceId>> {
        self.send_cmd_wait(|tx| AudioCmd::GenSources(n, tx))
    }

    fn gen_buffers(&mut self, n: usize) -> BackendResult<Vec<BufferId>> {
        self.send_cmd_wait(|tx| AudioCmd::GenBuffers(n, tx))
    }

    fn source_state(&mut self, source: SourceId) -> BackendResult<SourceState> {
        self.send_cmd_wait(|tx| AudioCmd::State(source, tx))
    }

    fn play(&mut self, source: SourceId) -> BackendResult<()> {
        self.send_cmd_wait(|tx| AudioCmd::Play(source, tx))
    }

    fn pause(&mut self, source: SourceId) -> BackendResult<()> {
        self.send_cmd_wait(|tx| AudioCmd::Pause(source, tx))
    }

    fn stop(&mut self, source: SourceId) -> BackendResult<()> {
        self.send_cmd_wait(|tx| AudioCmd::Stop(source, tx))
    }

    fn buffers_queued(&mut self, source: SourceId) -> BackendResult<usize> {
        self.send_cmd_wait(|tx| AudioCmd::BuffersQueued(source, tx))
    }

    fn buffers_processed(&mut self, source: SourceId) -> BackendResult<usize> {
        self.send_cmd_wait(|tx| AudioCmd::BuffersProcessed(source, tx))
    }

    fn is_buffer(&self, buffer: BufferId) -> bool {
        self.send_cmd_wait(|tx| AudioCmd::IsBuffer(buffer, tx))
            .unwrap_or(false)
    }

    fn buffer_data(
        &mut self,
        buffer: BufferId,
        format: AudioFormat,
        data: &[u8],
        frequency: u32,
    ) -> BackendResult<()> {
        let data = data.to_vec();
        self.send_cmd_wait(|tx| AudioCmd::BufferData(buffer, format, data, frequency, tx))
    }

    fn queue_buffers(&mut self, source: SourceId, buffers: &[BufferId]) -> BackendResult<()> {
        let buffers = buffers.to_vec();
        self.send_cmd_wait(|tx| AudioCmd::Queue(source, buffers, tx))
    }

    fn unqueue_buffers(&mut self, source: SourceId, n: usize) -> BackendResult<Vec<BufferId>> {
        self.send_cmd_wait(|tx| AudioCmd::Unqueue(source, n, tx))
    }

    fn set_gain(&mut self, source: SourceId, gain: f32) -> BackendResult<()> {
        self.send_cmd_wait(|tx| AudioCmd::SetGain(source, gain, tx))
    }

    fn set_position(&mut self, source: SourceId, position: [f32; 3]) -> BackendResult<()> {
        self.send_cmd_wait(|tx| AudioCmd::SetPosition(source, position, tx))
    }

    fn set_pitch(&mut self, source: SourceId, pitch: f32) -> BackendResult<()> {
        if !pitch.is_finite() || pitch <= 0.0 {
            return Err(BackendError::InvalidValue(format!("pitch {}", pitch)));
        }
        self.send_cmd_wait(|tx| AudioCmd::SetPitch(source, pitch, tx))
    }

    fn looping(&mut self, source: SourceId) -> BackendResult<bool> {
        self.send_cmd_wait(|tx| AudioCmd::Looping(source, tx))
    }

    fn set_looping(&mut self, source: SourceId, looping: bool) -> BackendResult<()> {
        self.send_cmd_wait(|tx| AudioCmd::SetLooping(source, looping, tx))
    }

    fn byte_offset(&mut self, source: SourceId) -> BackendResult<usize> {
        self.send_cmd_wait(|tx| AudioCmd::ByteOffset(source, tx))
    }
}
