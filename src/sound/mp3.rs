//! MP3 decoder backed by symphonia
//!
//! Packets are decoded on demand into an interleaved carry-over buffer, so a
//! single `decode` call can span several MPEG frames or end in the middle of
//! one.

use std::fs::File;
use std::path::Path;

use log::{debug, error, warn};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::decoder::{write_samples_le, DecodeError, DecodeResult, SoundDecoder};
use super::sort::StereoSorter;

const MAX_CONSECUTIVE_ERRORS: usize = 10;

struct Mp3Stream {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
}

/// Streaming MP3 decoder
#[derive(Default)]
pub struct Mp3File {
    stream: Option<Mp3Stream>,
    sample_rate: u32,
    channels: u32,
    sample_count: u32,
    /// Frames handed out since the last seek target
    position: u64,
    /// Decoded interleaved samples not yet returned
    pending: Vec<i16>,
    pending_pos: usize,
    /// Frames to drop after an inexact seek
    skip_frames: u64,
    sample_buf: Option<SampleBuffer<i16>>,
    eof: bool,
    sorter: StereoSorter,
}

impl Mp3File {
    /// Open `path`; on failure the decoder reports not opened
    pub fn open(path: &Path) -> Self {
        let mut mp3 = Self::default();
        if let Err(e) = mp3.open_file(path) {
            warn!("MP3: cannot open {}: {}", path.display(), e);
            mp3 = Self::default();
        }
        mp3
    }

    fn open_file(&mut self, path: &Path) -> DecodeResult<()> {
        let file = File::open(path)
            .map_err(|e| DecodeError::NotFound(format!("{}: {}", path.display(), e)))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        hint.with_extension("mp3");

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| DecodeError::UnsupportedFormat(format!("probe failed: {}", e)))?;
        let reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| DecodeError::UnsupportedFormat("no audio track".to_string()))?;

        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| DecodeError::InvalidData("missing sample rate".to_string()))?;
        let channels = track
            .codec_params
            .channels
            .map(|ch| ch.count() as u32)
            .ok_or_else(|| DecodeError::InvalidData("missing channel layout".to_string()))?;
        let frames = track.codec_params.n_frames.unwrap_or(0);
        let track_id = track.id;

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| DecodeError::DecoderError(format!("no codec: {}", e)))?;

        if frames == 0 {
            debug!("MP3: {} has no frame count, length unknown", path.display());
        }

        self.sample_rate = sample_rate;
        self.channels = channels;
        self.sample_count = u32::try_from(frames).unwrap_or(u32::MAX);
        self.stream = Some(Mp3Stream {
            reader,
            decoder,
            track_id,
        });
        Ok(())
    }

    /// Decode the next packet of our track into `pending`.
    ///
    /// Returns `Ok(false)` at end of stream.
    fn read_packet(&mut self) -> DecodeResult<bool> {
        let stream = self.stream.as_mut().ok_or(DecodeError::NotInitialized)?;
        let mut consecutive_errors = 0;

        loop {
            let packet = match stream.reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    debug!("MP3: end of stream at frame {}", self.position);
                    return Ok(false);
                }
                Err(e) => {
                    return Err(DecodeError::DecoderError(format!("read packet: {}", e)));
                }
            };

            if packet.track_id() != stream.track_id {
                continue;
            }

            match stream.decoder.decode(&packet) {
                Ok(decoded) => {
                    if decoded.spec().channels.count() as u32 != self.channels {
                        return Err(DecodeError::DecoderError(
                            "channel layout changed mid-stream".to_string(),
                        ));
                    }
                    let duration = decoded.capacity() as u64;
                    let needed = decoded.capacity() * self.channels as usize;
                    if self.sample_buf.as_ref().map_or(true, |b| b.capacity() < needed) {
                        self.sample_buf = Some(SampleBuffer::<i16>::new(duration, *decoded.spec()));
                    }
                    self.pending.clear();
                    self.pending_pos = 0;
                    if let Some(sample_buf) = self.sample_buf.as_mut() {
                        sample_buf.copy_interleaved_ref(decoded);
                        self.pending.extend_from_slice(sample_buf.samples());
                    }
                    return Ok(true);
                }
                Err(e @ (SymphoniaError::DecodeError(_) | SymphoniaError::IoError(_))) => {
                    consecutive_errors += 1;
                    if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        error!("MP3: too many consecutive bad packets: {}", e);
                        return Err(DecodeError::DecoderError(e.to_string()));
                    }
                    warn!(
                        "MP3: skipping corrupt packet ({}/{}): {}",
                        consecutive_errors, MAX_CONSECUTIVE_ERRORS, e
                    );
                }
                Err(e) => {
                    error!("MP3: decode failed: {}", e);
                    return Err(DecodeError::DecoderError(e.to_string()));
                }
            }
        }
    }
}

impl SoundDecoder for Mp3File {
    fn name(&self) -> &'static str {
        "MP3"
    }

    fn is_opened(&self) -> bool {
        self.stream.is_some()
    }

    fn sample_count(&self) -> u32 {
        self.sample_count
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u32 {
        self.channels
    }

    fn seek(&mut self, milliseconds: u32) {
        let mut target = u64::from(self.ms_to_frames(milliseconds));
        if self.sample_count > 0 {
            target = target.min(u64::from(self.sample_count));
        }
        let at_end = self.sample_count > 0 && target >= u64::from(self.sample_count);
        let Some(stream) = self.stream.as_mut() else {
            return;
        };

        self.pending.clear();
        self.pending_pos = 0;
        self.skip_frames = 0;
        self.position = target;
        self.eof = at_end;
        if at_end {
            return;
        }

        match stream.reader.seek(
            SeekMode::Accurate,
            SeekTo::TimeStamp {
                ts: target,
                track_id: stream.track_id,
            },
        ) {
            Ok(seeked) => {
                stream.decoder.reset();
                self.skip_frames = seeked.required_ts.saturating_sub(seeked.actual_ts);
            }
            Err(e) => warn!("MP3: seek to {} ms failed: {}", milliseconds, e),
        }
    }

    fn tell(&self) -> u32 {
        if !self.is_opened() {
            return 0;
        }
        self.frames_to_ms(u32::try_from(self.position).unwrap_or(u32::MAX))
    }

    fn decode(&mut self, buf: &mut [u8]) -> DecodeResult<usize> {
        if !self.is_opened() {
            return Err(DecodeError::NotInitialized);
        }
        let channels = self.channels as usize;
        let capacity = buf.len() / 2 / channels * channels;
        if capacity == 0 {
            return Err(DecodeError::DecoderError("buffer smaller than one frame".to_string()));
        }

        let mut written = 0;
        while written < capacity {
            let available = self.pending.len() - self.pending_pos;
            if available > 0 {
                if self.skip_frames > 0 {
                    let frames = (self.skip_frames as usize).min(available / channels);
                    self.pending_pos += frames * channels;
                    self.skip_frames -= frames as u64;
                    if frames == 0 {
                        self.pending_pos = self.pending.len();
                    }
                    continue;
                }
                let n = available.min(capacity - written);
                write_samples_le(
                    &self.pending[self.pending_pos..self.pending_pos + n],
                    &mut buf[written * 2..],
                );
                self.pending_pos += n;
                written += n;
                continue;
            }

            if self.eof {
                break;
            }
            match self.read_packet() {
                Ok(true) => {}
                Ok(false) => self.eof = true,
                Err(e) if written > 0 => {
                    warn!("MP3: stopping after decode failure: {}", e);
                    self.eof = true;
                }
                Err(e) => return Err(e),
            }
        }

        if written == 0 {
            return Err(DecodeError::EndOfFile);
        }
        self.position += (written / channels) as u64;
        self.sorter.sort_channels(&mut buf[..written * 2], channels);
        Ok(written * 2)
    }
}
