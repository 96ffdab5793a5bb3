//! Bounded accumulation buffer for partially received frames.

use bytes::BytesMut;

use crate::error::BufferOverflow;

/// Default maximum: 4 MiB of payload plus 11 bytes of frame header.
pub const DEFAULT_INCOMING_BUFFER_SIZE: usize = 4 * 1024 * 1024 + 11;

/// Default growth increment.
pub const DEFAULT_BUFFER_STEP_SIZE: usize = 256;

/// Round `required` up to the next multiple of `step`, capped at `max`.
///
/// A `required` above `max` is returned unchanged so the caller can report
/// the overflow with the real figure.
pub fn round_up_to_step(required: usize, step: usize, max: usize) -> usize {
    if required > max {
        return required;
    }
    let step = step.max(1);
    required
        .div_ceil(step)
        .saturating_mul(step)
        .min(max)
}

/// The single growable byte region a connection reads into.
///
/// Holds the bytes of frames that have not fully arrived yet. Growth happens
/// in `step_size` increments and never past `max_size`; an append that would
/// exceed it fails with [`BufferOverflow`] and leaves the buffer unchanged.
///
/// Growing allocates a fresh region of exactly the rounded size and copies
/// the leftover into it, so the allocation itself is bounded by `max_size`.
#[derive(Debug)]
pub struct IncomingBuffer {
    max_size: usize,
    step_size: usize,
    data: BytesMut,
}

impl IncomingBuffer {
    /// Create an empty buffer. No memory is allocated until the first append.
    pub fn new(max_size: usize, step_size: usize) -> Self {
        Self {
            max_size,
            step_size: step_size.max(1),
            data: BytesMut::new(),
        }
    }

    /// Configured maximum.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Configured growth step.
    pub fn step_size(&self) -> usize {
        self.step_size
    }

    /// Bytes the current allocation can hold from the unconsumed front.
    ///
    /// Right after growth this is a step multiple or `max_size`; consuming
    /// frames from the front only lowers it.
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// No bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Grow so that at least `required` bytes fit.
    ///
    /// # Errors
    ///
    /// Returns [`BufferOverflow`] when `required` exceeds the maximum.
    pub fn ensure_capacity(&mut self, required: usize) -> Result<usize, BufferOverflow> {
        if required > self.max_size {
            return Err(BufferOverflow {
                required,
                max: self.max_size,
            });
        }
        if required > self.data.capacity() {
            let target = round_up_to_step(required, self.step_size, self.max_size);
            let mut grown = BytesMut::with_capacity(target);
            grown.extend_from_slice(&self.data);
            self.data = grown;
        }
        Ok(self.data.capacity())
    }

    /// Append one transport read.
    ///
    /// # Errors
    ///
    /// Returns [`BufferOverflow`] if the buffered total would exceed the
    /// maximum. Nothing is appended in that case.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), BufferOverflow> {
        let required = self.data.len().saturating_add(bytes.len());
        self.ensure_capacity(required)?;
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    /// The buffered bytes, for the codec to consume from the front.
    ///
    /// Callers only take bytes off the front; appending goes through
    /// [`append`](Self::append) so growth stays bounded.
    pub fn bytes_mut(&mut self) -> &mut BytesMut {
        &mut self.data
    }

    /// Drop the allocation once every byte has been consumed.
    ///
    /// Returns `true` if the buffer was released.
    pub fn release_if_drained(&mut self) -> bool {
        if self.data.is_empty() && self.data.capacity() > 0 {
            self.data = BytesMut::new();
            return true;
        }
        false
    }

    /// Discard everything, e.g. after the connection failed.
    pub fn clear(&mut self) {
        self.data = BytesMut::new();
    }
}

impl Default for IncomingBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_INCOMING_BUFFER_SIZE, DEFAULT_BUFFER_STEP_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_up_to_step() {
        assert_eq!(round_up_to_step(1, 256, 4096), 256);
        assert_eq!(round_up_to_step(256, 256, 4096), 256);
        assert_eq!(round_up_to_step(257, 256, 4096), 512);
        // Near the cap the rounding stops at the maximum.
        assert_eq!(round_up_to_step(4000, 256, 4001), 4001);
        assert_eq!(round_up_to_step(5000, 256, 4096), 5000);
    }

    #[test]
    fn test_first_append_allocates_step_multiple() {
        let mut buffer = IncomingBuffer::new(1024, 256);
        assert_eq!(buffer.capacity(), 0);
        buffer.append(&[0u8; 10]).unwrap();
        assert_eq!(buffer.capacity(), 256);
        assert_eq!(buffer.len(), 10);
    }

    #[test]
    fn test_growth_with_leftover() {
        let mut buffer = IncomingBuffer::new(1024, 256);
        buffer.append(&[0u8; 200]).unwrap();
        buffer.append(&[0u8; 100]).unwrap();
        assert_eq!(buffer.capacity(), 512);
        assert_eq!(buffer.len(), 300);
    }

    #[test]
    fn test_cap_on_empty_path() {
        let mut exact = IncomingBuffer::new(1000, 256);
        exact.append(&[0u8; 1000]).unwrap();
        assert_eq!(exact.capacity(), 1000);

        let mut over = IncomingBuffer::new(1000, 256);
        let err = over.append(&[0u8; 1001]).unwrap_err();
        assert_eq!(err, BufferOverflow { required: 1001, max: 1000 });
        assert!(over.is_empty());
    }

    #[test]
    fn test_cap_on_leftover_path() {
        let mut exact = IncomingBuffer::new(1000, 256);
        exact.append(&[0u8; 600]).unwrap();
        exact.append(&[0u8; 400]).unwrap();
        assert_eq!(exact.len(), 1000);

        let mut over = IncomingBuffer::new(1000, 256);
        over.append(&[0u8; 600]).unwrap();
        assert!(over.append(&[0u8; 401]).is_err());
        assert_eq!(over.len(), 600);
    }

    #[test]
    fn test_allocation_never_exceeds_max() {
        let mut empty_path = IncomingBuffer::new(1000, 256);
        empty_path.append(&[0u8; 1000]).unwrap();
        assert_eq!(empty_path.bytes_mut().capacity(), 1000);

        let mut leftover = IncomingBuffer::new(1000, 256);
        leftover.append(&[0u8; 600]).unwrap();
        assert_eq!(leftover.bytes_mut().capacity(), 768);
        leftover.append(&[0u8; 400]).unwrap();
        assert_eq!(leftover.len(), 1000);
        assert_eq!(leftover.bytes_mut().capacity(), 1000);
        assert_eq!(leftover.capacity(), 1000);
    }

    #[test]
    fn test_large_cap_growth_is_bounded() {
        let max = DEFAULT_INCOMING_BUFFER_SIZE;
        let mut buffer = IncomingBuffer::default();
        buffer.append(&vec![0u8; 3 * 1024 * 1024]).unwrap();
        buffer.append(&vec![0u8; 1024 * 1024]).unwrap();
        assert!(buffer.bytes_mut().capacity() <= max);
        assert_eq!(buffer.len(), 4 * 1024 * 1024);
    }

    #[test]
    fn test_growth_after_front_consumed() {
        let mut buffer = IncomingBuffer::new(1000, 256);
        buffer.append(&[1u8; 600]).unwrap();
        let _ = buffer.bytes_mut().split_to(500);
        // 100 left; the remaining region holds 268 more bytes.
        assert_eq!(buffer.capacity(), 268);

        buffer.append(&[2u8; 400]).unwrap();
        assert_eq!(buffer.len(), 500);
        assert_eq!(buffer.bytes_mut().capacity(), 512);
        assert_eq!(&buffer.bytes_mut()[..100], &[1u8; 100][..]);
        assert_eq!(&buffer.bytes_mut()[100..], &[2u8; 400][..]);
    }

    #[test]
    fn test_release_when_drained() {
        let mut buffer = IncomingBuffer::new(1024, 256);
        buffer.append(b"abc").unwrap();
        assert!(!buffer.release_if_drained());
        let _ = buffer.bytes_mut().split_to(3);
        assert!(buffer.release_if_drained());
        assert_eq!(buffer.capacity(), 0);
    }
}
