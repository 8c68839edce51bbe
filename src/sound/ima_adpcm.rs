//! IMA ADPCM nibble decoder
//!
//! One instance per channel. Each container block reseeds the decoder with
//! an explicit sample and step index.

#[rustfmt::skip]
static IMA_STEP_TABLE: [u16; 89] = [
    7, 8, 9, 10, 11, 12, 13, 14,
    16, 17, 19, 21, 23, 25, 28, 31,
    34, 37, 41, 45, 50, 55, 60, 66,
    73, 80, 88, 97, 107, 118, 130, 143,
    157, 173, 190, 209, 230, 253, 279, 307,
    337, 371, 408, 449, 494, 544, 598, 658,
    724, 796, 876, 963, 1060, 1166, 1282, 1411,
    1552, 1707, 1878, 2066, 2272, 2499, 2749, 3024,
    3327, 3660, 4026, 4428, 4871, 5358, 5894, 6484,
    7132, 7845, 8630, 9493, 10442, 11487, 12635, 13899,
    15289, 16818, 18500, 20350, 22385, 24623, 27086, 29794,
    32767,
];

const MAX_STEP_INDEX: i16 = 88;

/// Per-channel IMA ADPCM predictor state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImaAdpcmDecoder {
    sample: i16,
    step_index: i16,
}

impl ImaAdpcmDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reseed from a block header. The step index is clamped to the table.
    pub fn init(&mut self, sample: i16, step_index: i16) {
        self.sample = sample;
        self.step_index = step_index.clamp(0, MAX_STEP_INDEX);
    }

    pub fn sample(&self) -> i16 {
        self.sample
    }

    pub fn step_index(&self) -> i16 {
        self.step_index
    }

    /// Decode packed nibble pairs, low nibble first.
    ///
    /// Decodes as many bytes as fit in `output` (two samples per byte) and
    /// returns the number of samples written.
    pub fn decode(&mut self, input: &[u8], output: &mut [i16]) -> usize {
        let pairs = input.len().min(output.len() / 2);
        for (byte, out) in input[..pairs].iter().zip(output.chunks_exact_mut(2)) {
            out[0] = self.decode_sample(byte & 0x0f);
            out[1] = self.decode_sample(byte >> 4);
        }
        pairs * 2
    }

    /// Decode a single 4-bit code
    pub fn decode_sample(&mut self, nibble: u8) -> i16 {
        let step = i32::from(IMA_STEP_TABLE[self.step_index as usize]);

        if nibble & 4 != 0 {
            self.step_index += ((i16::from(nibble) & 3) + 1) * 2;
        } else {
            self.step_index -= 1;
        }
        self.step_index = self.step_index.clamp(0, MAX_STEP_INDEX);

        let mut delta = step >> 3;
        if nibble & 1 != 0 {
            delta += step >> 2;
        }
        if nibble & 2 != 0 {
            delta += step >> 1;
        }
        if nibble & 4 != 0 {
            delta += step;
        }
        if nibble & 8 != 0 {
            delta = -delta;
        }

        let next = (i32::from(self.sample) + delta).clamp(i32::from(i16::MIN), i32::from(i16::MAX));
        self.sample = next as i16;
        self.sample
    }
}
