// Bounded queue of PCM buffers as seen by a device

use fmp_audio_core::{AudioError, Result};
use std::collections::VecDeque;

/// Fixed-capacity FIFO of submitted buffers with a read cursor into the head
pub struct PcmQueue {
    buffers: VecDeque<Box<[u8]>>,
    capacity: usize,
    read_pos: usize,
}

impl PcmQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffers: VecDeque::with_capacity(capacity),
            capacity,
            read_pos: 0,
        }
    }

    pub fn push(&mut self, data: &[u8]) -> Result<()> {
        if self.buffers.len() >= self.capacity {
            return Err(AudioError::EnqueueError(format!(
                "Buffer queue full ({} of {})",
                self.buffers.len(),
                self.capacity
            )));
        }
        self.buffers.push_back(data.to_vec().into_boxed_slice());
        Ok(())
    }

    /// Removes the head buffer as a whole, including any part already read
    pub fn pop_front(&mut self) -> Option<Box<[u8]>> {
        self.read_pos = 0;
        self.buffers.pop_front()
    }

    /// Copies queued bytes into `output`. Returns the number of bytes copied
    /// and the number of buffers that were fully consumed on the way.
    pub fn read(&mut self, output: &mut [u8]) -> (usize, usize) {
        let mut copied = 0;
        let mut completed = 0;

        while copied < output.len() {
            let Some(head) = self.buffers.front() else {
                break;
            };
            let remaining = &head[self.read_pos..];
            let to_copy = remaining.len().min(output.len() - copied);
            output[copied..copied + to_copy].copy_from_slice(&remaining[..to_copy]);
            copied += to_copy;
            self.read_pos += to_copy;

            if self.read_pos == head.len() {
                self.buffers.pop_front();
                self.read_pos = 0;
                completed += 1;
            }
        }

        (copied, completed)
    }

    pub fn clear(&mut self) {
        self.buffers.clear();
        self.read_pos = 0;
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_when_full() {
        let mut queue = PcmQueue::new(2);
        queue.push(&[1, 2]).unwrap();
        queue.push(&[3, 4]).unwrap();
        let err = queue.push(&[5, 6]).unwrap_err();
        assert!(matches!(err, AudioError::EnqueueError(_)));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn read_spans_buffers_and_counts_completions() {
        let mut queue = PcmQueue::new(3);
        queue.push(&[1, 2, 3, 4]).unwrap();
        queue.push(&[5, 6, 7, 8]).unwrap();

        let mut out = [0u8; 6];
        assert_eq!(queue.read(&mut out), (6, 1));
        assert_eq!(out, [1, 2, 3, 4, 5, 6]);
        assert_eq!(queue.len(), 1);

        let mut rest = [0u8; 6];
        assert_eq!(queue.read(&mut rest), (2, 1));
        assert_eq!(&rest[..2], &[7, 8]);
        assert!(queue.is_empty());
    }

    #[test]
    fn pop_front_discards_partial_read() {
        let mut queue = PcmQueue::new(2);
        queue.push(&[1, 2, 3, 4]).unwrap();
        queue.push(&[9, 9]).unwrap();
        let mut out = [0u8; 1];
        queue.read(&mut out);

        assert_eq!(queue.pop_front().as_deref(), Some(&[1u8, 2, 3, 4][..]));
        let mut next = [0u8; 2];
        assert_eq!(queue.read(&mut next), (2, 1));
        assert_eq!(next, [9, 9]);
    }
}
