use std::collections::VecDeque;

/// Bounded FIFO of f32 samples shared between a capture callback and the
/// processing loop. Wrap in `Arc<parking_lot::Mutex<SampleQueue>>` for
/// cross-thread access.
///
/// Overflow drops the oldest samples so a stalled consumer hears the most
/// recent audio rather than an ever-growing backlog.
#[derive(Debug)]
pub struct SampleQueue {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl SampleQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.min(1 << 16)),
            capacity,
        }
    }

    /// Append samples, dropping the oldest on overflow. A slice larger than
    /// the capacity keeps only its tail.
    pub fn push(&mut self, samples: &[f32]) {
        let samples = if samples.len() > self.capacity {
            &samples[samples.len() - self.capacity..]
        } else {
            samples
        };

        let overflow = (self.samples.len() + samples.len()).saturating_sub(self.capacity);
        if overflow > 0 {
            self.samples.drain(..overflow);
        }
        self.samples.extend(samples.iter().copied());
    }

    /// Remove and return up to `count` samples in FIFO order.
    pub fn pop(&mut self, count: usize) -> Vec<f32> {
        let to_read = count.min(self.samples.len());
        self.samples.drain(..to_read).collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_in_order() {
        let mut queue = SampleQueue::new(8);
        queue.push(&[1.0, 2.0, 3.0]);

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop(3), vec![1.0, 2.0, 3.0]);
        assert!(queue.is_empty());
    }

    #[test]
    fn pop_more_than_available() {
        let mut queue = SampleQueue::new(8);
        queue.push(&[1.0, 2.0]);

        assert_eq!(queue.pop(10), vec![1.0, 2.0]);
        assert!(queue.pop(1).is_empty());
    }

    #[test]
    fn overflow_drops_oldest() {
        let mut queue = SampleQueue::new(4);
        queue.push(&[1.0, 2.0, 3.0, 4.0]);
        queue.push(&[5.0, 6.0]);

        assert_eq!(queue.len(), 4);
        assert_eq!(queue.pop(4), vec![3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn oversized_push_keeps_tail() {
        let mut queue = SampleQueue::new(3);
        queue.push(&[1.0, 2.0, 3.0, 4.0, 5.0]);

        assert_eq!(queue.pop(3), vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn clear_empties_queue() {
        let mut queue = SampleQueue::new(4);
        queue.push(&[1.0, 2.0]);
        queue.clear();

        assert!(queue.is_empty());
        assert!(queue.pop(4).is_empty());
    }
}
