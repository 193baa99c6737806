/// Re-blocks an arbitrary stream of samples into fixed-size blocks.
///
/// Capture devices push buffers of whatever size the host picks; the session
/// sends fixed blocks. Nothing is ever dropped: samples stay pending until a
/// full block is available. Wrap in `parking_lot::Mutex` for cross-thread use.
#[derive(Debug)]
pub struct BlockBuffer {
    pending: Vec<f32>,
    block_size: usize,
}

impl BlockBuffer {
    pub fn new(block_size: usize) -> Self {
        let block_size = block_size.max(1);
        Self {
            pending: Vec::with_capacity(block_size * 2),
            block_size,
        }
    }

    /// Append samples to the pending tail.
    pub fn write(&mut self, samples: &[f32]) {
        self.pending.extend_from_slice(samples);
    }

    /// Remove and return the oldest full block, if one is available.
    pub fn pop_block(&mut self) -> Option<Vec<f32>> {
        if self.pending.len() < self.block_size {
            return None;
        }
        let rest = self.pending.split_off(self.block_size);
        Some(std::mem::replace(&mut self.pending, rest))
    }

    /// Number of samples waiting for a block to fill.
    pub fn count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Discard pending samples.
    pub fn reset(&mut self) {
        self.pending.clear();
    }
}
