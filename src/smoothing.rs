use std::collections::VecDeque;

/// Fixed-capacity window over the most recent samples; the oldest is evicted on overflow.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    buf: VecDeque<f64>,
    capacity: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(value);
    }

    pub fn is_full(&self) -> bool {
        self.buf.len() == self.capacity
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Unweighted mean of the samples currently held.
    pub fn mean(&self) -> Option<f64> {
        match self.buf.len() {
            0 => None,
            n => Some(self.buf.iter().sum::<f64>() / n as f64),
        }
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_then_evicts_oldest() {
        let mut rb = RingBuffer::new(3);
        rb.push(1.0);
        rb.push(2.0);
        assert!(!rb.is_full());
        rb.push(3.0);
        assert!(rb.is_full());
        assert_eq!(rb.mean(), Some(2.0));

        rb.push(9.0);
        assert_eq!(rb.len(), 3);
        assert_eq!(rb.mean(), Some((2.0 + 3.0 + 9.0) / 3.0));
    }

    #[test]
    fn empty_buffer_has_no_mean() {
        let rb = RingBuffer::new(4);
        assert!(rb.is_empty());
        assert_eq!(rb.mean(), None);
    }

    #[test]
    fn clear_resets_fill_state() {
        let mut rb = RingBuffer::new(2);
        rb.push(1.0);
        rb.push(1.0);
        rb.clear();
        assert!(rb.is_empty());
        assert!(!rb.is_full());
    }

    #[test]
    fn zero_capacity_is_promoted_to_one() {
        let mut rb = RingBuffer::new(0);
        assert_eq!(rb.capacity(), 1);
        rb.push(5.0);
        assert!(rb.is_full());
        assert_eq!(rb.mean(), Some(5.0));
    }
}
