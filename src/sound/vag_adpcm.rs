//! VAG (PS1 SPU) ADPCM line decoder
//!
//! A line is 16 bytes: a header byte (high nibble = predictor, low nibble =
//! shift), a flags byte, and 14 bytes packing 28 four-bit samples.

/// Bytes per VAG line
pub const VAG_LINE_SIZE: usize = 0x10;

/// Samples produced by one line
pub const VAG_SAMPLES_IN_LINE: usize = 28;

/// Flags value marking the end of the sample data
pub const VAG_FLAG_END: u8 = 7;

#[rustfmt::skip]
const VAG_FILTERS: [[f64; 2]; 5] = [
    [0.0, 0.0],
    [60.0 / 64.0, 0.0],
    [115.0 / 64.0, -52.0 / 64.0],
    [98.0 / 64.0, -55.0 / 64.0],
    [122.0 / 64.0, -60.0 / 64.0],
];

/// Per-channel VAG predictor history
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VagAdpcmDecoder {
    s1: f64,
    s2: f64,
}

impl VagAdpcmDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the prediction history
    pub fn reset(&mut self) {
        self.s1 = 0.0;
        self.s2 = 0.0;
    }

    /// Current `(s1, s2)` history
    pub fn history(&self) -> (f64, f64) {
        (self.s1, self.s2)
    }

    fn quantize(sample: f64) -> i16 {
        (sample + 0.5).floor().clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
    }

    /// Decode whole lines from `input` into `output`.
    ///
    /// A trailing partial line is ignored, as is any line that does not fit
    /// in `output`. Decoding stops at the first line flagged as the end of
    /// data. Returns the number of samples written.
    pub fn decode(&mut self, input: &[u8], output: &mut [i16]) -> usize {
        let mut written = 0;

        for (line, out) in input
            .chunks_exact(VAG_LINE_SIZE)
            .zip(output.chunks_exact_mut(VAG_SAMPLES_IN_LINE))
        {
            let shift = u32::from(line[0] & 0x0f);
            let predictor = usize::from(line[0] >> 4);
            if line[1] == VAG_FLAG_END {
                break;
            }
            let [f0, f1] = VAG_FILTERS.get(predictor).copied().unwrap_or(VAG_FILTERS[0]);

            let mut raw = [0.0f64; VAG_SAMPLES_IN_LINE];
            for (pair, &d) in raw.chunks_exact_mut(2).zip(&line[2..]) {
                let lo = ((u16::from(d) & 0x0f) << 12) as i16;
                let hi = ((u16::from(d) & 0xf0) << 8) as i16;
                pair[0] = f64::from(lo.checked_shr(shift).unwrap_or(lo >> 15));
                pair[1] = f64::from(hi.checked_shr(shift).unwrap_or(hi >> 15));
            }

            for (sample, dst) in raw.iter().zip(out.iter_mut()) {
                let predicted = sample + self.s1 * f0 + self.s2 * f1;
                self.s2 = self.s1;
                self.s1 = predicted;
                *dst = Self::quantize(predicted);
            }
            written += VAG_SAMPLES_IN_LINE;
        }

        written
    }
}
