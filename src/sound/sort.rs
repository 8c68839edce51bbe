//! Interleaved to planar sample reordering
//!
//! Panning is done with one mono playback source per channel, so every
//! multi-channel decode is split into contiguous per-channel runs before it
//! reaches the backend.

/// Rearranges interleaved 16-bit frames into planar layout in place.
///
/// The scratch buffer only ever grows; one sorter is owned per decoder.
#[derive(Debug, Default)]
pub struct StereoSorter {
    scratch: Vec<u8>,
}

impl StereoSorter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `LRLR...` to `LL..RR..`. A trailing partial frame is left untouched.
    pub fn sort(&mut self, buf: &mut [u8]) {
        self.sort_channels(buf, 2);
    }

    /// Planarise `channels`-wide interleaved 16-bit frames.
    pub fn sort_channels(&mut self, buf: &mut [u8], channels: usize) {
        if channels < 2 {
            return;
        }
        let frame_bytes = channels * 2;
        let frames = buf.len() / frame_bytes;
        if frames == 0 {
            return;
        }
        let used = frames * frame_bytes;
        if self.scratch.len() < used {
            self.scratch.resize(used, 0);
        }

        for frame in 0..frames {
            for channel in 0..channels {
                let src = (frame * channels + channel) * 2;
                let dst = (channel * frames + frame) * 2;
                self.scratch[dst..dst + 2].copy_from_slice(&buf[src..src + 2]);
            }
        }
        buf[..used].copy_from_slice(&self.scratch[..used]);
    }

    /// Current scratch size in bytes
    pub fn capacity(&self) -> usize {
        self.scratch.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn to_bytes(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    fn to_samples(bytes: &[u8]) -> Vec<i16> {
        bytes
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect()
    }

    #[test]
    fn test_sort_stereo() {
        let mut sorter = StereoSorter::new();
        let mut buf = to_bytes(&[1, -1, 2, -2, 3, -3]);
        sorter.sort(&mut buf);
        assert_eq!(to_samples(&buf), vec![1, 2, 3, -1, -2, -3]);
    }

    #[test]
    fn test_sort_empty_is_noop() {
        let mut sorter = StereoSorter::new();
        let mut buf: Vec<u8> = Vec::new();
        sorter.sort(&mut buf);
        assert_eq!(sorter.capacity(), 0);
    }

    #[test]
    fn test_sort_ignores_trailing_partial_frame() {
        let mut sorter = StereoSorter::new();
        let mut buf = to_bytes(&[1, 10, 2, 20]);
        buf.extend_from_slice(&[0xaa, 0xbb]);
        sorter.sort(&mut buf);
        assert_eq!(to_samples(&buf[..8]), vec![1, 2, 10, 20]);
        assert_eq!(&buf[8..], &[0xaa, 0xbb]);
    }

    #[test]
    fn test_sort_twice_is_not_identity() {
        let mut sorter = StereoSorter::new();
        let original = to_bytes(&[1, 10, 2, 20, 3, 30]);
        let mut buf = original.clone();
        sorter.sort(&mut buf);
        sorter.sort(&mut buf);
        assert_ne!(buf, original);
    }

    #[test]
    fn test_scratch_grows_but_never_shrinks() {
        let mut sorter = StereoSorter::new();
        let mut big = to_bytes(&[0; 64]);
        sorter.sort(&mut big);
        assert_eq!(sorter.capacity(), 128);

        let mut small = to_bytes(&[5, 6]);
        sorter.sort(&mut small);
        assert_eq!(sorter.capacity(), 128);
        assert_eq!(to_samples(&small), vec![5, 6]);
    }

    #[test]
    fn test_sort_three_channels() {
        let mut sorter = StereoSorter::new();
        let mut buf = to_bytes(&[1, 10, 100, 2, 20, 200]);
        sorter.sort_channels(&mut buf, 3);
        assert_eq!(to_samples(&buf), vec![1, 2, 10, 20, 100, 200]);
    }

    #[test]
    fn test_sort_mono_untouched() {
        let mut sorter = StereoSorter::new();
        let mut buf = to_bytes(&[1, 2, 3]);
        sorter.sort_channels(&mut buf, 1);
        assert_eq!(to_samples(&buf), vec![1, 2, 3]);
    }

    proptest! {
        #[test]
        fn prop_sort_splits_left_and_right(frames in proptest::collection::vec(any::<(i16, i16)>(), 0..256)) {
            let interleaved: Vec<i16> = frames.iter().flat_map(|&(l, r)| [l, r]).collect();
            let mut buf = to_bytes(&interleaved);
            StereoSorter::new().sort(&mut buf);

            let mut expected: Vec<i16> = frames.iter().map(|&(l, _)| l).collect();
            expected.extend(frames.iter().map(|&(_, r)| r));
            prop_assert_eq!(to_samples(&buf), expected);
        }
    }
}
