//! Headerless VAG block files
//!
//! The file is a flat run of blocks. Each block holds `0x2000` bytes of VAG
//! lines per channel, channel after channel. Neither rate nor channel count
//! is stored, so both are supplied by the caller.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use log::{debug, warn};

use super::decoder::{DecodeError, DecodeResult, SoundDecoder, MAX_SAMPLE_RATE};
use super::vag_adpcm::{VagAdpcmDecoder, VAG_LINE_SIZE, VAG_SAMPLES_IN_LINE};

/// Bytes of one channel's region within a block
pub const VB_BLOCK_SIZE: usize = 0x2000;
const LINES_IN_BLOCK: u32 = (VB_BLOCK_SIZE / VAG_LINE_SIZE) as u32;
const SAMPLES_IN_BLOCK: u32 = LINES_IN_BLOCK * VAG_SAMPLES_IN_LINE as u32;

pub const VB_DEFAULT_SAMPLE_RATE: u32 = 32000;
pub const VB_DEFAULT_CHANNELS: u8 = 2;

/// Streaming decoder for VAG block files
pub struct VbFile {
    file: Option<File>,
    sample_rate: u32,
    channels: u8,
    number_of_blocks: u32,
    current_block: u32,
    line_in_block: u32,
    block_read: bool,
    decoders: Vec<VagAdpcmDecoder>,
    /// Cached ADPCM data of the current block, one region per channel
    vag_buffers: Vec<Vec<u8>>,
}

impl VbFile {
    /// Open `path` with an explicit rate and channel count
    pub fn open(path: &Path, sample_rate: u32, channels: u8) -> Self {
        let mut vb = Self {
            file: None,
            sample_rate,
            channels,
            number_of_blocks: 0,
            current_block: 0,
            line_in_block: 0,
            block_read: false,
            decoders: Vec::new(),
            vag_buffers: Vec::new(),
        };
        if let Err(e) = vb.open_file(path) {
            warn!("VB: cannot open {}: {}", path.display(), e);
        }
        vb
    }

    fn open_file(&mut self, path: &Path) -> DecodeResult<()> {
        if self.channels == 0 || self.sample_rate == 0 || self.sample_rate > MAX_SAMPLE_RATE {
            return Err(DecodeError::UnsupportedFormat(format!(
                "{} channels at {} Hz",
                self.channels, self.sample_rate
            )));
        }
        let file = File::open(path)
            .map_err(|e| DecodeError::NotFound(format!("{}: {}", path.display(), e)))?;
        let file_size = file.metadata()?.len();
        let blocks = file_size / (u64::from(self.channels) * VB_BLOCK_SIZE as u64);

        self.number_of_blocks = u32::try_from(blocks).unwrap_or(u32::MAX);
        self.decoders = vec![VagAdpcmDecoder::new(); usize::from(self.channels)];
        self.vag_buffers = vec![vec![0; VB_BLOCK_SIZE]; usize::from(self.channels)];
        self.file = Some(file);

        debug!(
            "VB: {} opened, {} blocks, {} Hz, {} channels",
            path.display(),
            self.number_of_blocks,
            self.sample_rate,
            self.channels
        );
        Ok(())
    }

    pub fn number_of_blocks(&self) -> u32 {
        self.number_of_blocks
    }

    fn read_block(&mut self, block: u32) -> DecodeResult<()> {
        let file = self.file.as_mut().ok_or(DecodeError::NotInitialized)?;
        let offset = u64::from(block) * u64::from(self.channels) * VB_BLOCK_SIZE as u64;
        file.seek(SeekFrom::Start(offset))?;
        for buffer in &mut self.vag_buffers {
            file.read_exact(buffer)?;
        }
        self.block_read = true;
        Ok(())
    }

    fn reset_decoders(&mut self) {
        for decoder in &mut self.decoders {
            decoder.reset();
        }
    }
}

impl SoundDecoder for VbFile {
    fn name(&self) -> &'static str {
        "VB"
    }

    fn is_opened(&self) -> bool {
        self.file.is_some()
    }

    fn sample_count(&self) -> u32 {
        if !self.is_opened() {
            return 0;
        }
        self.number_of_blocks.saturating_mul(SAMPLES_IN_BLOCK)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u32 {
        u32::from(self.channels)
    }

    fn seek(&mut self, milliseconds: u32) {
        if !self.is_opened() {
            return;
        }
        let mut frames = self.ms_to_frames(milliseconds);
        let mut block = frames / SAMPLES_IN_BLOCK;
        if block >= self.number_of_blocks {
            frames = 0;
            block = 0;
        }
        if block != self.current_block {
            self.block_read = false;
        }

        let line = (frames - block * SAMPLES_IN_BLOCK) / VAG_SAMPLES_IN_LINE as u32;
        if block != self.current_block || line != self.line_in_block {
            self.current_block = block;
            self.line_in_block = line;
            self.reset_decoders();
        }
    }

    fn tell(&self) -> u32 {
        if !self.is_opened() {
            return 0;
        }
        let frames = (self.current_block * LINES_IN_BLOCK + self.line_in_block)
            * VAG_SAMPLES_IN_LINE as u32;
        self.frames_to_ms(frames)
    }

    fn decode(&mut self, buf: &mut [u8]) -> DecodeResult<usize> {
        if !self.is_opened() {
            return Err(DecodeError::NotInitialized);
        }
        if self.current_block >= self.number_of_blocks {
            return Err(DecodeError::EndOfFile);
        }
        if !self.block_read {
            self.read_block(self.current_block)?;
        }

        let channels = usize::from(self.channels);
        let required_lines = buf.len() / 2 / channels / VAG_SAMPLES_IN_LINE;
        let remaining_lines = ((self.number_of_blocks - self.current_block) * LINES_IN_BLOCK
            - self.line_in_block) as usize;
        let lines = required_lines.min(remaining_lines);
        if lines == 0 {
            return Err(DecodeError::DecoderError("buffer smaller than one VAG line".to_string()));
        }
        let per_channel = lines * VAG_SAMPLES_IN_LINE;

        let mut pcm = [0i16; VAG_SAMPLES_IN_LINE];
        for line in 0..lines {
            let src = self.line_in_block as usize * VAG_LINE_SIZE;
            for (c, (decoder, vag)) in self.decoders.iter_mut().zip(&self.vag_buffers).enumerate() {
                let decoded = decoder.decode(&vag[src..src + VAG_LINE_SIZE], &mut pcm);
                // an end-of-data line contributes silence
                pcm[decoded..].fill(0);

                let start = (c * per_channel + line * VAG_SAMPLES_IN_LINE) * 2;
                for (dst, sample) in buf[start..start + VAG_SAMPLES_IN_LINE * 2]
                    .chunks_exact_mut(2)
                    .zip(&pcm)
                {
                    dst.copy_from_slice(&sample.to_le_bytes());
                }
            }

            self.line_in_block += 1;
            if self.line_in_block >= LINES_IN_BLOCK {
                self.current_block += 1;
                self.line_in_block = 0;
                self.block_read = false;
                if self.current_block >= self.number_of_blocks {
                    break;
                }
                self.read_block(self.current_block)?;
            }
        }

        Ok(per_channel * channels * 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// One block per channel; channel `c` lines carry nibble value `c + 1`
    fn vb_bytes(blocks: usize, channels: usize) -> Vec<u8> {
        let mut out = Vec::new();
        for _ in 0..blocks {
            for c in 0..channels {
                let nibble = (c as u8 + 1) & 0x7;
                for _ in 0..LINES_IN_BLOCK {
                    out.push(0x00);
                    out.push(0x00);
                    out.extend(std::iter::repeat(nibble | (nibble << 4)).take(14));
                }
            }
        }
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

    #[test]
    fn test_vb_rejects_huge_rate_override() {
        let file = write_temp(&vb_bytes(1, 2));
        let vb = VbFile::open(file.path(), 0x8000_0000, VB_DEFAULT_CHANNELS);
        assert!(!vb.is_opened());
        let vb = VbFile::open(file.path(), 0, VB_DEFAULT_CHANNELS);
        assert!(!vb.is_opened());
    }

    #[test]
    fn test_vb_one_block_stereo_counts() {
        let file = write_temp(&vb_bytes(1, 2));
        let vb = VbFile::open(file.path(), VB_DEFAULT_SAMPLE_RATE, VB_DEFAULT_CHANNELS);
        assert!(vb.is_opened());
        assert_eq!(vb.number_of_blocks(), 1);
        assert_eq!(vb.sample_count(), (0x2000 / 0x10) * 28);
        assert_eq!(vb.sample_rate(), 32000);
        assert_eq!(vb.channels(), 2);
    }

    #[test]
    fn test_vb_missing_file() {
        let vb = VbFile::open(Path::new("/nonexistent/music.vb"), 32000, 2);
        assert!(!vb.is_opened());
        assert_eq!(vb.sample_count(), 0);
    }

    #[test]
    fn test_vb_decode_is_planar() {
        let file = write_temp(&vb_bytes(1, 2));
        let mut vb = VbFile::open(file.path(), 32000, 2);
        let mut buf = vec![0u8; 28 * 2 * 2 * 3];
        let n = vb.decode(&mut buf).unwrap();
        assert_eq!(n, buf.len());

        let out = samples(&buf);
        assert!(out[..84].iter().all(|&s| s == 4096));
        assert!(out[84..].iter().all(|&s| s == 8192));
        assert_eq!(vb.tell(), 3 * 28 * 1000 / 32000);
    }

    #[test]
    fn test_vb_seek_beyond_end_resets() {
        let file = write_temp(&vb_bytes(1, 2));
        let mut vb = VbFile::open(file.path(), 32000, 2);
        vb.seek(200);
        assert!(vb.tell() > 0);
        vb.seek(vb.length_ms() + 1000);
        assert_eq!(vb.tell(), 0);
    }

    #[test]
    fn test_vb_seek_tell_within_a_line() {
        let file = write_temp(&vb_bytes(3, 1));
        let mut vb = VbFile::open(file.path(), 32000, 1);
        for target in [0u32, 1, 250, 333, 600] {
            vb.seek(target);
            let told = vb.tell();
            assert!(told <= target);
            assert!(target - told <= 1, "seek {} told {}", target, told);
        }
    }

    #[test]
    fn test_vb_seek_resets_history() {
        let file = write_temp(&vb_bytes(2, 1));
        let mut vb = VbFile::open(file.path(), 32000, 1);
        let mut buf = vec![0u8; 28 * 2];
        vb.decode(&mut buf).unwrap();
        assert_ne!(vb.decoders[0].history(), (0.0, 0.0));
        vb.seek(100);
        assert_eq!(vb.decoders[0].history(), (0.0, 0.0));
    }

    #[test]
    fn test_vb_crosses_blocks_and_ends() {
        let file = write_temp(&vb_bytes(2, 1));
        let mut vb = VbFile::open(file.path(), 32000, 1);
        let total = vb.sample_count() as usize;
        let mut buf = vec![0u8; 1000 * 28 * 2];

        let mut decoded = 0;
        loop {
            match vb.decode(&mut buf) {
                Ok(n) => decoded += n / 2,
                Err(DecodeError::EndOfFile) => break,
                Err(e) => panic!("unexpected error {}", e),
            }
        }
        assert_eq!(decoded, total);
        assert_eq!(vb.tell(), vb.length_ms());
    }

    #[test]
    fn test_vb_end_flag_yields_silence() {
        let mut bytes = vb_bytes(1, 1);
        bytes[1] = 7;
        let file = write_temp(&bytes);
        let mut vb = VbFile::open(file.path(), 32000, 1);
        let mut buf = vec![0xffu8; 28 * 2 * 2];
        vb.decode(&mut buf).unwrap();
        let out = samples(&buf);
        assert!(out[..28].iter().all(|&s| s == 0));
        assert!(out[28..].iter().all(|&s| s == 4096));
    }

    #[test]
    fn test_vb_empty_file_has_no_blocks() {
        let file = write_temp(&[]);
        let mut vb = VbFile::open(file.path(), 32000, 2);
        assert!(vb.is_opened());
        assert_eq!(vb.sample_count(), 0);
        let mut buf = vec![0u8; 1024];
        assert_eq!(vb.decode(&mut buf), Err(DecodeError::EndOfFile));
    }
}
