// Single-slot ownership of the buffer currently handed to the device

/// Holds at most one buffer. Replacing it frees the previous one first.
pub struct PendingBuffer {
    slot: Option<Box<[u8]>>,
    allocated: u64,
    freed: u64,
}

impl PendingBuffer {
    pub fn new() -> Self {
        Self {
            slot: None,
            allocated: 0,
            freed: 0,
        }
    }

    /// Frees the current buffer, if any, then allocates a zeroed one of `len`
    /// bytes and returns it for filling.
    pub fn replace(&mut self, len: usize) -> &mut [u8] {
        self.release();
        self.allocated += 1;
        self.slot.insert(vec![0u8; len].into_boxed_slice())
    }

    /// Frees the current buffer. Returns whether there was one.
    pub fn release(&mut self) -> bool {
        if self.slot.take().is_some() {
            self.freed += 1;
            true
        } else {
            false
        }
    }

    pub fn get(&self) -> Option<&[u8]> {
        self.slot.as_deref()
    }

    pub fn is_live(&self) -> bool {
        self.slot.is_some()
    }

    pub fn allocated(&self) -> u64 {
        self.allocated
    }

    pub fn freed(&self) -> u64 {
        self.freed
    }
}

impl Default for PendingBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_frees_previous() {
        let mut pending = PendingBuffer::new();
        assert!(!pending.is_live());

        pending.replace(8).fill(1);
        pending.replace(8).fill(2);

        assert_eq!(pending.allocated(), 2);
        assert_eq!(pending.freed(), 1);
        assert_eq!(pending.get(), Some(&[2u8; 8][..]));
    }

    #[test]
    fn release_is_idempotent() {
        let mut pending = PendingBuffer::new();
        pending.replace(4);
        assert!(pending.release());
        assert!(!pending.release());
        assert_eq!(pending.allocated(), pending.freed());
    }
}
