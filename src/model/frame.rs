use sha2::{Digest, Sha256};

use crate::clock::MonotonicTimestamp;
use crate::model::region::RegionId;

/// Pixel format of a captured buffer. The runtime treats the buffer as
/// opaque bytes; only Capture/Preprocess plugins interpret it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgba8,
    Bgra8,
    Rgb8,
    Gray8,
}

/// A short fingerprint over a frame's pixel content, used by Frame Skip to
/// detect unchanged frames without re-running OCR. 8-16 bytes, here fixed
/// at 16 (the low half of a SHA-256 digest).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub [u8; 16]);

impl Fingerprint {
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        let mut out = [0u8; 16];
        out.copy_from_slice(&digest[..16]);
        Self(out)
    }

    /// Hamming distance in bits, used by Frame Skip's perceptual-hash mode.
    #[must_use]
    pub fn hamming_distance(&self, other: &Fingerprint) -> u32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }
}

impl std::fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// An immutable pixel snapshot of one region at one instant. Never mutated
/// after emission; any transformation (Preprocess) produces a new Frame
/// with the same `region_id` but a fresh `frame_id`... actually `frame_id`
/// is preserved through Preprocess since it is the same logical frame; only
/// Capture mints new frame_ids.
#[derive(Clone, Debug)]
pub struct Frame {
    pub frame_id: u64,
    pub region_id: RegionId,
    pub captured_at: MonotonicTimestamp,
    pub pixels: std::sync::Arc<Vec<u8>>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub fingerprint: Fingerprint,
}

impl Frame {
    #[must_use]
    pub fn new(
        frame_id: u64,
        region_id: RegionId,
        captured_at: MonotonicTimestamp,
        pixels: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Self {
        let fingerprint = Fingerprint::of(&pixels);
        Self {
            frame_id,
            region_id,
            captured_at,
            pixels: std::sync::Arc::new(pixels),
            width,
            height,
            format,
            fingerprint,
        }
    }

    /// Derives a new Frame from `self`, as a Preprocess stage would:
    /// same identity (`frame_id`, `region_id`), new pixel content and
    /// therefore a recomputed fingerprint.
    #[must_use]
    pub fn with_pixels(&self, pixels: Vec<u8>, width: u32, height: u32) -> Self {
        Self::new(
            self.frame_id,
            self.region_id,
            self.captured_at,
            pixels,
            width,
            height,
            self.format,
        )
    }
}

/// Per-region bookkeeping for minting strictly-increasing `frame_id`s.
#[derive(Default)]
pub struct FrameIdAllocator {
    next: u64,
}

impl FrameIdAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self { next: 0 }
    }

    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_for_identical_bytes() {
        let a = Fingerprint::of(b"hello world");
        let b = Fingerprint::of(b"hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_differs_for_different_bytes() {
        let a = Fingerprint::of(b"hello world");
        let b = Fingerprint::of(b"hello worlD");
        assert_ne!(a, b);
    }

    #[test]
    fn frame_id_allocator_is_strictly_increasing() {
        let mut alloc = FrameIdAllocator::new();
        let ids: Vec<u64> = (0..5).map(|_| alloc.next_id()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }
}
