//! WAV decoder implementation
//!
//! Streams RIFF WAVE files from disk. Supports:
//! - signed 16-bit PCM, any channel count
//! - IMA ADPCM (format 0x11) and the Xbox variant (0x69), which shares the
//!   same block layout
//!
//! ADPCM data is decoded a whole block at a time; a block is never split
//! across two `decode` calls.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use log::{debug, warn};

use super::decoder::{DecodeError, DecodeResult, SoundDecoder, MAX_SAMPLE_RATE};
use super::ima_adpcm::ImaAdpcmDecoder;
use super::sort::StereoSorter;

// WAV format constants (little-endian IDs)
const RIFF_ID: u32 = 0x46464952; // "RIFF"
const WAVE_ID: u32 = 0x45564157; // "WAVE"
const FMT_ID: u32 = 0x20746d66; // "fmt "
const DATA_ID: u32 = 0x61746164; // "data"

// WAV format codes
const WAVE_FORMAT_PCM: u16 = 1;
const WAVE_FORMAT_IMA_ADPCM: u16 = 0x11;
const WAVE_FORMAT_XBOX_ADPCM: u16 = 0x69;

// Bytes of block header per channel: seed sample + step index
const ADPCM_HEADER_SIZE: usize = 4;
// Samples decoded from one 4-byte run of a channel
const ADPCM_SAMPLES_IN_LINE: usize = 8;

/// Sample encoding of the data chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WavEncoding {
    #[default]
    Pcm,
    ImaAdpcm,
}

/// WAV format chunk
#[derive(Debug, Default, Clone, Copy)]
struct WavFormatHeader {
    format: u16,          // 1 = PCM, 0x11 = IMA ADPCM
    channels: u16,        // interleaved channel count
    sample_rate: u32,     // Samples per second
    block_align: u16,     // bytes per PCM frame or ADPCM block
    bits_per_sample: u16, // 16 for PCM, 4 for ADPCM
}

/// WAV chunk header
#[derive(Debug, Default)]
struct WavChunkHeader {
    id: u32,
    size: u32,
}

/// Streaming WAV decoder
#[derive(Default)]
pub struct WavFile {
    /// Open file, positioned inside the data chunk
    reader: Option<BufReader<File>>,
    fmt_header: WavFormatHeader,
    encoding: WavEncoding,
    /// Absolute offset of the first data byte
    data_start: u64,
    /// Length of the data chunk in bytes
    data_size: u32,
    /// Read position relative to `data_start`
    data_pos: u32,
    /// Bytes per block (one frame for PCM)
    block_align: u32,
    samples_per_block: u32,
    sample_count: u32,
    block_buf: Vec<u8>,
    pcm_buffers: Vec<Vec<i16>>,
    adpcm_decoders: Vec<ImaAdpcmDecoder>,
    sorter: StereoSorter,
}

impl WavFile {
    /// Open `path`; on failure the decoder reports not opened
    pub fn open(path: &Path) -> Self {
        let mut wav = Self::default();
        if let Err(e) = wav.open_file(path) {
            warn!("WAV: cannot open {}: {}", path.display(), e);
            wav = Self::default();
        }
        wav
    }

    pub fn encoding(&self) -> WavEncoding {
        self.encoding
    }

    /// Read a little-endian u16
    fn read_le_u16<R: Read>(reader: &mut R) -> DecodeResult<u16> {
        let mut buf = [0u8; 2];
        reader
            .read_exact(&mut buf)
            .map_err(|e| DecodeError::InvalidData(format!("Failed to read u16: {}", e)))?;
        Ok(u16::from_le_bytes(buf))
    }

    /// Read a little-endian u32
    fn read_le_u32<R: Read>(reader: &mut R) -> DecodeResult<u32> {
        let mut buf = [0u8; 4];
        reader
            .read_exact(&mut buf)
            .map_err(|e| DecodeError::InvalidData(format!("Failed to read u32: {}", e)))?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Parse the RIFF/WAVE preamble
    fn parse_file_header<R: Read>(reader: &mut R) -> DecodeResult<()> {
        let id = Self::read_le_u32(reader)?;
        let _size = Self::read_le_u32(reader)?;
        let format = Self::read_le_u32(reader)?;

        if id != RIFF_ID {
            return Err(DecodeError::InvalidData("Not a RIFF file".to_string()));
        }
        if format != WAVE_ID {
            return Err(DecodeError::InvalidData("Not a WAVE file".to_string()));
        }
        Ok(())
    }

    /// Parse chunk header
    fn parse_chunk_header<R: Read>(reader: &mut R) -> DecodeResult<WavChunkHeader> {
        let id = Self::read_le_u32(reader)?;
        let size = Self::read_le_u32(reader)?;
        Ok(WavChunkHeader { id, size })
    }

    /// Parse format chunk
    fn parse_format_header<R: Read + Seek>(
        reader: &mut R,
        size: u32,
    ) -> DecodeResult<WavFormatHeader> {
        if size < 16 {
            return Err(DecodeError::InvalidData(
                "Format chunk too small".to_string(),
            ));
        }

        let format = Self::read_le_u16(reader)?;
        let channels = Self::read_le_u16(reader)?;
        let sample_rate = Self::read_le_u32(reader)?;
        let _byte_rate = Self::read_le_u32(reader)?;
        let block_align = Self::read_le_u16(reader)?;
        let bits_per_sample = Self::read_le_u16(reader)?;

        // Skip cbSize and any codec-specific extension
        let extra = i64::from(size - 16) + i64::from(size & 1);
        if extra > 0 {
            reader.seek(SeekFrom::Current(extra)).map_err(|e| {
                DecodeError::InvalidData(format!("Failed to skip format bytes: {}", e))
            })?;
        }

        Ok(WavFormatHeader {
            format,
            channels,
            sample_rate,
            block_align,
            bits_per_sample,
        })
    }

    /// Validate the format chunk and derive block geometry
    fn configure(&mut self, header: WavFormatHeader) -> DecodeResult<()> {
        if header.channels == 0 {
            return Err(DecodeError::UnsupportedFormat("zero channels".to_string()));
        }
        if header.sample_rate == 0 || header.sample_rate > MAX_SAMPLE_RATE {
            return Err(DecodeError::UnsupportedFormat(format!(
                "sample rate {} Hz",
                header.sample_rate
            )));
        }
        let channels = u32::from(header.channels);

        match header.format {
            WAVE_FORMAT_PCM => {
                if header.bits_per_sample != 16 {
                    return Err(DecodeError::UnsupportedFormat(format!(
                        "PCM with {} bits, only signed 16-bit is supported",
                        header.bits_per_sample
                    )));
                }
                self.encoding = WavEncoding::Pcm;
                self.block_align = channels * 2;
                self.samples_per_block = 1;
            }
            WAVE_FORMAT_IMA_ADPCM | WAVE_FORMAT_XBOX_ADPCM => {
                let block_align = u32::from(header.block_align);
                let per_channel = block_align / channels;
                if block_align % channels != 0
                    || per_channel <= ADPCM_HEADER_SIZE as u32
                    || (per_channel - ADPCM_HEADER_SIZE as u32) % 4 != 0
                {
                    return Err(DecodeError::UnsupportedFormat(format!(
                        "ADPCM block align {} for {} channels",
                        block_align, channels
                    )));
                }
                self.encoding = WavEncoding::ImaAdpcm;
                self.block_align = block_align;
                self.samples_per_block = (per_channel - ADPCM_HEADER_SIZE as u32) * 2 + 1;
                self.block_buf = vec![0; block_align as usize];
                self.pcm_buffers = vec![vec![0; self.samples_per_block as usize]; channels as usize];
                self.adpcm_decoders = vec![ImaAdpcmDecoder::new(); channels as usize];
            }
            other => {
                return Err(DecodeError::UnsupportedFormat(format!(
                    "WAV format 0x{:x}",
                    other
                )));
            }
        }

        self.fmt_header = header;
        Ok(())
    }

    fn open_file(&mut self, path: &Path) -> DecodeResult<()> {
        let file = File::open(path)
            .map_err(|e| DecodeError::NotFound(format!("{}: {}", path.display(), e)))?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        Self::parse_file_header(&mut reader)?;

        let mut fmt_found = false;
        loop {
            let chunk = Self::parse_chunk_header(&mut reader)?;
            match chunk.id {
                FMT_ID => {
                    let header = Self::parse_format_header(&mut reader, chunk.size)?;
                    self.configure(header)?;
                    fmt_found = true;
                }
                DATA_ID => {
                    if !fmt_found {
                        return Err(DecodeError::InvalidData(
                            "data chunk before format chunk".to_string(),
                        ));
                    }
                    self.data_start = reader.stream_position()?;
                    let available = file_len.saturating_sub(self.data_start);
                    self.data_size = chunk.size.min(u32::try_from(available).unwrap_or(u32::MAX));
                    break;
                }
                _ => {
                    // Skip unknown chunk, honouring the pad byte
                    let skip = i64::from(chunk.size) + i64::from(chunk.size & 1);
                    reader.seek(SeekFrom::Current(skip)).map_err(|e| {
                        DecodeError::InvalidData(format!("Failed to skip chunk: {}", e))
                    })?;
                }
            }
        }

        self.sample_count = self.data_size / self.block_align * self.samples_per_block;
        self.data_pos = 0;
        self.reader = Some(reader);

        debug!(
            "WAV: {} opened, {:?}, {} Hz, {} channels, {} frames",
            path.display(),
            self.encoding,
            self.fmt_header.sample_rate,
            self.fmt_header.channels,
            self.sample_count
        );
        Ok(())
    }

    fn current_frame(&self) -> u32 {
        self.data_pos / self.block_align * self.samples_per_block
    }

    fn decode_pcm(&mut self, buf: &mut [u8]) -> DecodeResult<usize> {
        let block_align = self.block_align as usize;
        let remaining = (self.data_size - self.data_pos) as usize;
        let wanted = buf.len().min(remaining) / block_align * block_align;
        if wanted == 0 {
            return if remaining < block_align {
                Err(DecodeError::EndOfFile)
            } else {
                Err(DecodeError::DecoderError("buffer smaller than one frame".to_string()))
            };
        }

        let reader = self.reader.as_mut().ok_or(DecodeError::NotInitialized)?;
        let mut filled = 0;
        while filled < wanted {
            match reader.read(&mut buf[filled..wanted]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(DecodeError::IoError(e.to_string())),
            }
        }
        self.data_pos += filled as u32;

        let filled = filled / block_align * block_align;
        if filled == 0 {
            return Err(DecodeError::EndOfFile);
        }
        self.sorter
            .sort_channels(&mut buf[..filled], usize::from(self.fmt_header.channels));
        Ok(filled)
    }

    fn decode_adpcm(&mut self, buf: &mut [u8]) -> DecodeResult<usize> {
        let channels = usize::from(self.fmt_header.channels);
        let spb = self.samples_per_block as usize;
        let capacity = buf.len() / 2 / channels;
        let remaining = (self.sample_count - self.current_frame()) as usize;
        let frames = capacity.min(remaining) / spb * spb;
        if frames == 0 {
            return if remaining < spb {
                Err(DecodeError::EndOfFile)
            } else {
                Err(DecodeError::DecoderError("buffer smaller than one ADPCM block".to_string()))
            };
        }

        let reader = self.reader.as_mut().ok_or(DecodeError::NotInitialized)?;
        for block in 0..frames / spb {
            reader.read_exact(&mut self.block_buf)?;
            self.data_pos += self.block_align;

            for (c, (decoder, pcm)) in self
                .adpcm_decoders
                .iter_mut()
                .zip(self.pcm_buffers.iter_mut())
                .enumerate()
            {
                let hdr = &self.block_buf[c * ADPCM_HEADER_SIZE..(c + 1) * ADPCM_HEADER_SIZE];
                let sample = i16::from_le_bytes([hdr[0], hdr[1]]);
                let step = i16::from_le_bytes([hdr[2], hdr[3]]);
                decoder.init(sample, step);
                pcm[0] = sample;
            }

            // After the headers, channels alternate in 4-byte runs of 8 samples
            let mut offset = ADPCM_HEADER_SIZE * channels;
            let mut s = 1;
            while s < spb {
                for (decoder, pcm) in self.adpcm_decoders.iter_mut().zip(self.pcm_buffers.iter_mut()) {
                    decoder.decode(
                        &self.block_buf[offset..offset + 4],
                        &mut pcm[s..s + ADPCM_SAMPLES_IN_LINE],
                    );
                    offset += 4;
                }
                s += ADPCM_SAMPLES_IN_LINE;
            }

            for (c, pcm) in self.pcm_buffers.iter().enumerate() {
                let start = (c * frames + block * spb) * 2;
                for (dst, sample) in buf[start..start + spb * 2].chunks_exact_mut(2).zip(pcm) {
                    dst.copy_from_slice(&sample.to_le_bytes());
                }
            }
        }

        Ok(frames * channels * 2)
    }
}

impl SoundDecoder for WavFile {
    fn name(&self) -> &'static str {
        "WAV"
    }

    fn is_opened(&self) -> bool {
        self.reader.is_some()
    }

    fn sample_count(&self) -> u32 {
        self.sample_count
    }

    fn sample_rate(&self) -> u32 {
        self.fmt_header.sample_rate
    }

    fn channels(&self) -> u32 {
        u32::from(self.fmt_header.channels)
    }

    fn seek(&mut self, milliseconds: u32) {
        if !self.is_opened() {
            return;
        }
        let block = (self.ms_to_frames(milliseconds) / self.samples_per_block)
            .min(self.data_size / self.block_align);
        self.data_pos = block * self.block_align;

        let target = self.data_start + u64::from(self.data_pos);
        if let Some(reader) = self.reader.as_mut() {
            if let Err(e) = reader.seek(SeekFrom::Start(target)) {
                warn!("WAV: seek to {} ms failed: {}", milliseconds, e);
            }
        }
    }

    fn tell(&self) -> u32 {
        if !self.is_opened() {
            return 0;
        }
        self.frames_to_ms(self.current_frame())
    }

    fn decode(&mut self, buf: &mut [u8]) -> DecodeResult<usize> {
        if !self.is_opened() {
            return Err(DecodeError::NotInitialized);
        }
        match self.encoding {
            WavEncoding::Pcm => self.decode_pcm(buf),
            WavEncoding::ImaAdpcm => self.decode_adpcm(buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    fn wav_bytes(format: u16, channels: u16, rate: u32, block_align: u16, bits: u16, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data.len() as u32).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&format.to_le_bytes());
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&rate.to_le_bytes());
        out.extend_from_slice(&rate.wrapping_mul(u32::from(block_align)).to_le_bytes());
        out.extend_from_slice(&block_align.to_le_bytes());
        out.extend_from_slice(&bits.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(data);
        out
    }

    fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    fn samples(bytes: &[u8]) -> Vec<i16> {
        bytes
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect()
    }

    fn stereo_pcm(frames: usize) -> Vec<u8> {
        (0..frames)
            .flat_map(|i| {
                let l = i as i16;
                [l, -l]
            })
            .flat_map(|s| s.to_le_bytes())
            .collect()
    }

    #[test]
    fn test_wav_open_missing_file() {
        let wav = WavFile::open(Path::new("/nonexistent/file.wav"));
        assert!(!wav.is_opened());
        assert_eq!(wav.sample_count(), 0);
        assert_eq!(wav.tell(), 0);
    }

    #[rstest]
    #[case(0)]
    #[case(384_001)]
    #[case(0x8000_0000)]
    fn test_wav_rejects_bad_sample_rate(#[case] rate: u32) {
        let file = write_temp(&wav_bytes(1, 2, rate, 4, 16, &stereo_pcm(16)));
        let wav = WavFile::open(file.path());
        assert!(!wav.is_opened());
        assert_eq!(wav.sample_count(), 0);
    }

    #[test]
    fn test_wav_pcm_stereo_scenario() {
        let file = write_temp(&wav_bytes(1, 2, 44100, 4, 16, &stereo_pcm(8820)));
        let mut wav = WavFile::open(file.path());
        assert!(wav.is_opened());
        assert_eq!(wav.encoding(), WavEncoding::Pcm);
        assert_eq!(wav.sample_count(), 8820);
        assert_eq!(wav.sample_rate(), 44100);
        assert_eq!(wav.channels(), 2);
        assert_eq!(wav.length_ms(), 200);

        let mut buf = vec![0u8; 4096 * 2];
        let n = wav.decode(&mut buf).unwrap();
        assert_eq!(n, 8192);
        let out = samples(&buf[..n]);
        assert_eq!(&out[..3], &[0, 1, 2]);
        assert_eq!(out[2047], 2047);
        assert_eq!(&out[2048..2051], &[0, -1, -2]);
    }

    #[test]
    fn test_wav_pcm_drains_then_end_of_file() {
        let file = write_temp(&wav_bytes(1, 1, 8000, 2, 16, &[1, 0, 2, 0, 3, 0]));
        let mut wav = WavFile::open(file.path());
        let mut buf = [0u8; 64];
        assert_eq!(wav.decode(&mut buf).unwrap(), 6);
        assert_eq!(wav.decode(&mut buf), Err(DecodeError::EndOfFile));
    }

    #[rstest]
    #[case(1, 8)]
    #[case(1, 24)]
    #[case(3, 16)]
    #[case(0x55, 16)]
    fn test_wav_unsupported_formats(#[case] format: u16, #[case] bits: u16) {
        let file = write_temp(&wav_bytes(format, 1, 8000, 2, bits, &[0; 16]));
        let wav = WavFile::open(file.path());
        assert!(!wav.is_opened());
    }

    #[test]
    fn test_wav_invalid_riff() {
        let mut bytes = wav_bytes(1, 1, 8000, 2, 16, &[0; 16]);
        bytes[0] = b'X';
        let file = write_temp(&bytes);
        assert!(!WavFile::open(file.path()).is_opened());
    }

    #[test]
    fn test_wav_skips_unknown_chunks() {
        let mut bytes = Vec::new();
        let base = wav_bytes(1, 1, 8000, 2, 16, &[7, 0, 8, 0]);
        bytes.extend_from_slice(&base[..36]);
        bytes.extend_from_slice(b"LIST");
        bytes.extend_from_slice(&3u32.to_le_bytes());
        bytes.extend_from_slice(&[1, 2, 3, 0]);
        bytes.extend_from_slice(&base[36..]);

        let file = write_temp(&bytes);
        let mut wav = WavFile::open(file.path());
        assert!(wav.is_opened());
        let mut buf = [0u8; 16];
        assert_eq!(wav.decode(&mut buf).unwrap(), 4);
        assert_eq!(samples(&buf[..4]), vec![7, 8]);
    }

    #[test]
    fn test_wav_seek_tell_round_trip() {
        let file = write_temp(&wav_bytes(1, 2, 44100, 4, 16, &stereo_pcm(8820)));
        let mut wav = WavFile::open(file.path());
        wav.seek(100);
        assert_eq!(wav.tell(), 100);

        let mut buf = [0u8; 8];
        wav.decode(&mut buf).unwrap();
        assert_eq!(samples(&buf), vec![4410, 4411, -4410, -4411]);

        wav.seek(10_000);
        assert_eq!(wav.tell(), 200);
        assert_eq!(wav.decode(&mut buf), Err(DecodeError::EndOfFile));
    }

    fn adpcm_block(seeds: &[i16], per_channel_payload: usize) -> Vec<u8> {
        let mut block = Vec::new();
        for &seed in seeds {
            block.extend_from_slice(&seed.to_le_bytes());
            block.extend_from_slice(&0i16.to_le_bytes());
        }
        block.extend(std::iter::repeat(0u8).take(per_channel_payload * seeds.len()));
        block
    }

    #[test]
    fn test_wav_ima_adpcm_mono() {
        let mut data = adpcm_block(&[100], 32);
        data.extend(adpcm_block(&[100], 32));
        let file = write_temp(&wav_bytes(0x11, 1, 8000, 36, 4, &data));
        let mut wav = WavFile::open(file.path());
        assert!(wav.is_opened());
        assert_eq!(wav.encoding(), WavEncoding::ImaAdpcm);
        assert_eq!(wav.sample_count(), 130);

        let mut buf = vec![0u8; wav.buffer_size()];
        let n = wav.decode(&mut buf).unwrap();
        assert_eq!(n, 260);
        assert!(samples(&buf[..n]).iter().all(|&s| s == 100));
        assert_eq!(wav.decode(&mut buf), Err(DecodeError::EndOfFile));
    }

    #[test]
    fn test_wav_xbox_adpcm_stereo_is_planar() {
        let data = adpcm_block(&[100, -100], 32);
        let file = write_temp(&wav_bytes(0x69, 2, 22050, 72, 4, &data));
        let mut wav = WavFile::open(file.path());
        assert!(wav.is_opened());
        assert_eq!(wav.sample_count(), 65);

        let mut buf = vec![0u8; 65 * 4];
        assert_eq!(wav.decode(&mut buf).unwrap(), 260);
        let out = samples(&buf);
        assert!(out[..65].iter().all(|&s| s == 100));
        assert!(out[65..].iter().all(|&s| s == -100));
    }

    #[test]
    fn test_wav_adpcm_never_splits_blocks() {
        let mut data = Vec::new();
        for _ in 0..3 {
            data.extend(adpcm_block(&[5], 32));
        }
        let file = write_temp(&wav_bytes(0x11, 1, 8000, 36, 4, &data));
        let mut wav = WavFile::open(file.path());

        // room for 100 frames: one block only
        let mut buf = vec![0u8; 200];
        assert_eq!(wav.decode(&mut buf).unwrap(), 130);
        assert_eq!(wav.tell(), 65 * 1000 / 8000);

        let mut tiny = vec![0u8; 10];
        assert!(matches!(wav.decode(&mut tiny), Err(DecodeError::DecoderError(_))));
    }

    #[test]
    fn test_wav_adpcm_seek_lands_on_block() {
        let mut data = Vec::new();
        for _ in 0..4 {
            data.extend(adpcm_block(&[0], 32));
        }
        let file = write_temp(&wav_bytes(0x11, 1, 8000, 36, 4, &data));
        let mut wav = WavFile::open(file.path());
        // 20 ms = 160 frames, inside block 2 (frames 130..195)
        wav.seek(20);
        assert_eq!(wav.tell(), 130 * 1000 / 8000);
        assert!(20 - wav.tell() <= 65 * 1000 / 8000);
    }

    #[test]
    fn test_wav_rejects_bad_adpcm_geometry() {
        let file = write_temp(&wav_bytes(0x11, 1, 8000, 4, 4, &[0; 8]));
        assert!(!WavFile::open(file.path()).is_opened());
        let file = write_temp(&wav_bytes(0x11, 1, 8000, 38, 4, &[0; 38]));
        assert!(!WavFile::open(file.path()).is_opened());
    }

    #[test]
    fn test_wav_decoder_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<WavFile>();
    }
}
