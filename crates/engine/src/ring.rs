// PCM ring buffer between the decode thread and the output callback

use parking_lot::Mutex;
use std::sync::Arc;

/// Interleaved f32 samples in a fixed ring; every slot is usable
pub struct PcmRing {
    storage: Vec<f32>,
    /// Index of the oldest buffered sample
    head: usize,
    len: usize,
}

impl PcmRing {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: vec![0.0; capacity.max(1)],
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn free(&self) -> usize {
        self.capacity() - self.len
    }

    /// Append as much of `data` as fits; returns the number of samples taken
    pub fn push(&mut self, data: &[f32]) -> usize {
        let count = data.len().min(self.free());
        let tail = (self.head + self.len) % self.capacity();
        let (first, second) = self.split_at(tail, count);
        self.storage[tail..tail + first].copy_from_slice(&data[..first]);
        self.storage[..second].copy_from_slice(&data[first..count]);
        self.len += count;
        count
    }

    /// Move the oldest samples into `out`; returns the number of samples moved
    pub fn pop_into(&mut self, out: &mut [f32]) -> usize {
        let count = out.len().min(self.len);
        let (first, second) = self.split_at(self.head, count);
        out[..first].copy_from_slice(&self.storage[self.head..self.head + first]);
        out[first..count].copy_from_slice(&self.storage[..second]);
        self.head = (self.head + count) % self.capacity();
        self.len -= count;
        count
    }

    /// Lengths of the run starting at `start` before and after the wrap
    fn split_at(&self, start: usize, count: usize) -> (usize, usize) {
        let first = count.min(self.capacity() - start);
        (first, count - first)
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    /// Change the capacity; buffered samples are discarded
    pub fn reallocate(&mut self, capacity: usize) {
        let capacity = capacity.max(1);
        if capacity != self.capacity() {
            self.storage = vec![0.0; capacity];
        }
        self.clear();
    }

    /// Fill level in `[0, 1]`
    pub fn fullness(&self) -> f32 {
        self.len as f32 / self.capacity() as f32
    }
}

/// `PcmRing` behind a lock, cloned into the decode thread and the output callback
#[derive(Clone)]
pub struct SharedRingBuffer {
    inner: Arc<Mutex<PcmRing>>,
}

impl SharedRingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PcmRing::with_capacity(capacity))),
        }
    }

    pub fn write(&self, data: &[f32]) -> usize {
        self.inner.lock().push(data)
    }

    pub fn read(&self, output: &mut [f32]) -> usize {
        self.inner.lock().pop_into(output)
    }

    pub fn available_write(&self) -> usize {
        self.inner.lock().free()
    }

    pub fn available_read(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn clear(&self) {
        self.inner.lock().clear()
    }

    pub fn resize(&self, capacity: usize) {
        self.inner.lock().reallocate(capacity)
    }

    pub fn fullness(&self) -> f32 {
        self.inner.lock().fullness()
    }
}
