//! Ogg Opus decoder
//!
//! Packets come from an Ogg packet reader and are decoded with libopus at
//! 48 kHz. Frame counts and positions are in decoded frames. A
//! `SAMPLERATE=<n>` comment sets the rate reported for playback, which
//! restores the pitch of files encoded from other rates.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use log::{debug, warn};
use ogg::reading::PacketReader;

use super::decoder::{
    write_samples_le, DecodeError, DecodeResult, SoundDecoder, MAX_SAMPLE_RATE,
};
use super::sort::StereoSorter;

const OPUS_DECODE_RATE: u32 = 48000;
const OPUS_HEAD_MAGIC: &[u8; 8] = b"OpusHead";
const OPUS_TAGS_MAGIC: &[u8; 8] = b"OpusTags";
const SAMPLE_RATE_TAG: &str = "SAMPLERATE";
/// Longest Opus packet is 120 ms
const MAX_PACKET_MS: u32 = 120;
/// Packets decoded and discarded ahead of a seek target
const PREROLL_PACKETS: usize = 4;
const MAX_CONSECUTIVE_ERRORS: usize = 10;

type OggReader = PacketReader<BufReader<File>>;

/// Fields of the identification header we use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpusHead {
    channels: u8,
    pre_skip: u16,
    mapping_family: u8,
}

fn parse_head(data: &[u8]) -> DecodeResult<OpusHead> {
    if data.len() < 19 || &data[..8] != OPUS_HEAD_MAGIC {
        return Err(DecodeError::InvalidData("missing OpusHead".to_string()));
    }
    Ok(OpusHead {
        channels: data[9],
        pre_skip: u16::from_le_bytes([data[10], data[11]]),
        mapping_family: data[18],
    })
}

/// Returns the `SAMPLERATE=` comment value if present
fn parse_tag_rate(data: &[u8]) -> DecodeResult<Option<u32>> {
    if data.len() < 16 || &data[..8] != OPUS_TAGS_MAGIC {
        return Err(DecodeError::InvalidData("missing OpusTags".to_string()));
    }
    let read_u32 = |pos: usize| -> Option<u32> {
        data.get(pos..pos + 4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    };

    let mut pos = 8;
    let vendor_len = read_u32(pos).unwrap_or(0) as usize;
    pos += 4 + vendor_len;
    let count = read_u32(pos).unwrap_or(0);
    pos += 4;

    for _ in 0..count {
        let Some(len) = read_u32(pos) else { break };
        pos += 4;
        let Some(comment) = data.get(pos..pos + len as usize) else { break };
        pos += len as usize;

        let comment = String::from_utf8_lossy(comment);
        if let Some((key, value)) = comment.split_once('=') {
            if key.eq_ignore_ascii_case(SAMPLE_RATE_TAG) {
                return Ok(value.trim().parse().ok());
            }
        }
    }
    Ok(None)
}

/// Granule position of the last page, scanning back from the end
fn last_granule<R: Read + Seek>(data: &mut R) -> Option<u64> {
    let file_size = data.seek(SeekFrom::End(0)).ok()?;

    // Search backwards for "OggS" page marker in the last 64KB
    let search_size = std::cmp::min(65536, file_size) as usize;
    data.seek(SeekFrom::Start(file_size - search_size as u64)).ok()?;
    let mut buffer = vec![0u8; search_size];
    data.read_exact(&mut buffer).ok()?;

    for i in (0..buffer.len().saturating_sub(13)).rev() {
        if buffer[i..].starts_with(b"OggS") {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&buffer[i + 6..i + 14]);
            let granule = u64::from_le_bytes(raw);
            // -1 means no packet ends on this page
            if granule != u64::MAX {
                return Some(granule);
            }
        }
    }
    None
}

/// Streaming Ogg Opus decoder
#[derive(Default)]
pub struct OpusFile {
    reader: Option<OggReader>,
    decoder: Option<opus::Decoder>,
    sample_rate: u32,
    channels: u32,
    sample_count: u32,
    /// Leading frames to discard
    pre_skip: u64,
    /// Frames handed out, counted from the start of the audio
    position: u64,
    pending: Vec<i16>,
    pending_pos: usize,
    skip_frames: u64,
    pcm: Vec<i16>,
    eof: bool,
    sorter: StereoSorter,
}

impl OpusFile {
    /// Open `path`; on failure the decoder reports not opened
    pub fn open(path: &Path) -> Self {
        let mut file = Self::default();
        if let Err(e) = file.open_file(path) {
            warn!("Opus: cannot open {}: {}", path.display(), e);
            file = Self::default();
        }
        file
    }

    fn open_file(&mut self, path: &Path) -> DecodeResult<()> {
        let file = File::open(path)
            .map_err(|e| DecodeError::NotFound(format!("{}: {}", path.display(), e)))?;
        let mut reader = PacketReader::new(BufReader::new(file));

        let head = parse_head(&Self::next_data(&mut reader)?)?;
        let tag_rate = parse_tag_rate(&Self::next_data(&mut reader)?)?;

        let channels = match (head.mapping_family, head.channels) {
            (0 | 1, 1) => opus::Channels::Mono,
            (0 | 1, 2) => opus::Channels::Stereo,
            (family, n) => {
                return Err(DecodeError::UnsupportedFormat(format!(
                    "{} channels with mapping family {}",
                    n, family
                )));
            }
        };

        let rate = match tag_rate {
            Some(rate) if (1..=MAX_SAMPLE_RATE).contains(&rate) => rate,
            Some(rate) => {
                warn!("Opus: ignoring SAMPLERATE={}, using {} Hz", rate, OPUS_DECODE_RATE);
                OPUS_DECODE_RATE
            }
            None => OPUS_DECODE_RATE,
        };

        let decoder = opus::Decoder::new(OPUS_DECODE_RATE, channels)
            .map_err(|e| DecodeError::DecoderError(format!("opus init: {}", e)))?;

        let mut scan = File::open(path)?;
        let granule = last_granule(&mut scan).unwrap_or(0);
        let total = granule.saturating_sub(u64::from(head.pre_skip));

        self.channels = u32::from(head.channels);
        self.sample_rate = rate;
        self.sample_count = u32::try_from(total).unwrap_or(u32::MAX);
        self.pre_skip = u64::from(head.pre_skip);
        self.skip_frames = self.pre_skip;
        self.pcm = vec![0; (OPUS_DECODE_RATE * MAX_PACKET_MS / 1000) as usize * self.channels as usize];
        self.decoder = Some(decoder);
        self.reader = Some(reader);

        debug!(
            "Opus: {} opened, {} Hz, {} channels, {} frames",
            path.display(),
            self.sample_rate,
            self.channels,
            self.sample_count
        );
        Ok(())
    }

    fn next_data(reader: &mut OggReader) -> DecodeResult<Vec<u8>> {
        match reader.read_packet() {
            Ok(Some(packet)) => Ok(packet.data),
            Ok(None) => Err(DecodeError::EndOfFile),
            Err(e) => Err(DecodeError::InvalidData(format!("ogg: {}", e))),
        }
    }

    fn decode_packet(&mut self, data: &[u8]) -> DecodeResult<usize> {
        let decoder = self.decoder.as_mut().ok_or(DecodeError::NotInitialized)?;
        let frames = decoder
            .decode(data, &mut self.pcm, false)
            .map_err(|e| DecodeError::DecoderError(format!("opus: {}", e)))?;
        let samples = frames * self.channels as usize;
        self.pending.clear();
        self.pending.extend_from_slice(&self.pcm[..samples]);
        self.pending_pos = 0;
        Ok(frames)
    }

    /// Decode the next audio packet into `pending`; `Ok(false)` at end
    fn read_packet(&mut self) -> DecodeResult<bool> {
        let mut consecutive_errors = 0;
        loop {
            let reader = self.reader.as_mut().ok_or(DecodeError::NotInitialized)?;
            let data = match reader.read_packet() {
                Ok(Some(packet)) => packet.data,
                Ok(None) => return Ok(false),
                Err(e) => return Err(DecodeError::DecoderError(format!("ogg: {}", e))),
            };
            match self.decode_packet(&data) {
                Ok(_) => return Ok(true),
                Err(e) => {
                    consecutive_errors += 1;
                    if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        return Err(e);
                    }
                    warn!("Opus: skipping bad packet: {}", e);
                }
            }
        }
    }

    /// Rewind to the first audio packet and position on `target` frames
    fn seek_frames(&mut self, target: u64) -> DecodeResult<()> {
        let reader = self.reader.as_mut().ok_or(DecodeError::NotInitialized)?;
        reader
            .seek_bytes(SeekFrom::Start(0))
            .map_err(|e| DecodeError::DecoderError(format!("ogg: {}", e)))?;
        Self::next_data(reader)?;
        Self::next_data(reader)?;

        if let Some(decoder) = self.decoder.as_mut() {
            decoder
                .reset_state()
                .map_err(|e| DecodeError::DecoderError(format!("opus reset: {}", e)))?;
        }

        // skip whole packets by their declared length
        let mut to_skip = target + self.pre_skip;
        let mut preroll: VecDeque<Vec<u8>> = VecDeque::with_capacity(PREROLL_PACKETS);
        let mut landing = None;
        let reader = self.reader.as_mut().ok_or(DecodeError::NotInitialized)?;
        while let Some(packet) = reader
            .read_packet()
            .map_err(|e| DecodeError::DecoderError(format!("ogg: {}", e)))?
        {
            let frames = opus::packet::get_nb_samples(&packet.data, OPUS_DECODE_RATE)
                .map_err(|e| DecodeError::DecoderError(format!("opus: {}", e)))?
                as u64;
            if frames > to_skip {
                landing = Some(packet.data);
                break;
            }
            to_skip -= frames;
            if preroll.len() == PREROLL_PACKETS {
                preroll.pop_front();
            }
            preroll.push_back(packet.data);
        }

        self.pending.clear();
        self.pending_pos = 0;
        match landing {
            Some(data) => {
                for packet in &preroll {
                    // warm up the decoder state, output discarded
                    self.decode_packet(packet)?;
                }
                self.decode_packet(&data)?;
                self.skip_frames = to_skip;
                self.eof = false;
            }
            None => {
                self.pending.clear();
                self.eof = true;
            }
        }
        Ok(())
    }
}

impl SoundDecoder for OpusFile {
    fn name(&self) -> &'static str {
        "Opus"
    }

    fn is_opened(&self) -> bool {
        self.reader.is_some() && self.decoder.is_some()
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
        if !self.is_opened() {
            return;
        }
        let target = u64::from(self.ms_to_frames(milliseconds).min(self.sample_count));
        self.position = target;
        if let Err(e) = self.seek_frames(target) {
            warn!("Opus: seek to {} ms failed: {}", milliseconds, e);
            self.eof = true;
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
        let mut capacity = buf.len() / 2 / channels * channels;
        if capacity == 0 {
            return Err(DecodeError::DecoderError("buffer smaller than one frame".to_string()));
        }
        if self.sample_count > 0 {
            let left = u64::from(self.sample_count).saturating_sub(self.position) as usize;
            capacity = capacity.min(left * channels);
        }

        let mut written = 0;
        while written < capacity {
            let available = self.pending.len() - self.pending_pos;
            if available > 0 {
                if self.skip_frames > 0 {
                    let frames = (self.skip_frames as usize).min(available / channels);
                    self.pending_pos += frames * channels;
                    self.skip_frames -= frames as u64;
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
                    warn!("Opus: stopping after decode failure: {}", e);
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
