use heapless::Vec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RingError {
    /// Length byte plus payload does not fit in the free space.
    Full,
    /// Payload length does not fit in the one-byte length prefix.
    TooLong,
    /// Popped message is larger than the destination.
    Truncated,
}

/// Circular store of length-prefixed messages.
///
/// `N` must be a power of two. One slot always stays free so that
/// `read == write` only ever means empty.
pub struct RingBuffer<const N: usize> {
    buf: [u8; N],
    read: usize,
    write: usize,
}

impl<const N: usize> RingBuffer<N> {
    const MASK: usize = {
        assert!(N.is_power_of_two() && N <= 256, "capacity must be a power of two <= 256");
        N - 1
    };

    pub const fn new() -> Self {
        Self {
            buf: [0; N],
            read: 0,
            write: 0,
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn free_space(&self) -> usize {
        N - (self.write.wrapping_sub(self.read) & Self::MASK)
    }

    pub fn is_empty(&self) -> bool {
        self.read == self.write
    }

    /// Drops every queued message.
    pub fn clear(&mut self) {
        self.read = self.write;
    }

    pub fn push(&mut self, payload: &[u8]) -> Result<(), RingError> {
        let len = u8::try_from(payload.len()).map_err(|_| RingError::TooLong)?;
        if payload.len() + 1 >= self.free_space() {
            return Err(RingError::Full);
        }

        self.put(len);
        for &byte in payload {
            self.put(byte);
        }
        Ok(())
    }

    /// Pops the head message into `out`. Returns `Ok(None)` when empty.
    pub fn pop_into<const M: usize>(
        &mut self,
        out: &mut Vec<u8, M>,
    ) -> Result<Option<usize>, RingError> {
        if self.is_empty() {
            return Ok(None);
        }

        let len = self.take() as usize;
        out.clear();
        for _ in 0..len {
            let byte = self.take();
            if out.push(byte).is_err() {
                return Err(RingError::Truncated);
            }
        }
        Ok(Some(len))
    }

    fn put(&mut self, byte: u8) {
        self.buf[self.write] = byte;
        self.write = (self.write + 1) & Self::MASK;
    }

    fn take(&mut self) -> u8 {
        let byte = self.buf[self.read];
        self.read = (self.read + 1) & Self::MASK;
        byte
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
