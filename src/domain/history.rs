// Fixed-capacity history of recent samples, fed to charts
use super::sample::Sample;
use std::collections::VecDeque;

pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl HistoryBuffer {
    /// A zero capacity is bumped to one; the newest sample is always kept
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push to the back, evicting the oldest samples past capacity
    pub fn append(&mut self, sample: Sample) {
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// Oldest-first copy of the buffer
    pub fn snapshot(&self) -> Vec<Sample> {
        self.samples.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[cfg(test)]
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};
    use std::collections::BTreeMap;

    fn sample(id: i64) -> Sample {
        let timestamp = DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(id);
        Sample::new(id, timestamp, BTreeMap::new())
    }

    fn ids(buffer: &HistoryBuffer) -> Vec<i64> {
        buffer.snapshot().iter().map(|s| s.id).collect()
    }

    #[test]
    fn test_append_keeps_most_recent_within_capacity() {
        let mut buffer = HistoryBuffer::new(20);
        for id in 1..=27 {
            buffer.append(sample(id));
        }

        assert_eq!(buffer.len(), 20);
        assert_eq!(ids(&buffer), (8..=27).collect::<Vec<_>>());
        assert_eq!(buffer.latest().map(|s| s.id), Some(27));
    }

    #[test]
    fn test_snapshot_is_oldest_first_and_repeatable() {
        let mut buffer = HistoryBuffer::new(5);
        buffer.append(sample(1));
        buffer.append(sample(2));
        buffer.append(sample(3));

        let first = buffer.snapshot();
        let second = buffer.snapshot();

        assert_eq!(first, second);
        assert_eq!(ids(&buffer), vec![1, 2, 3]);
    }

    #[test]
    fn test_no_deduplication() {
        let mut buffer = HistoryBuffer::new(5);
        buffer.append(sample(1));
        buffer.append(sample(1));
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut buffer = HistoryBuffer::new(0);
        buffer.append(sample(1));
        buffer.append(sample(2));

        assert_eq!(buffer.capacity(), 1);
        assert_eq!(ids(&buffer), vec![2]);

        buffer.clear();
        assert!(buffer.is_empty());
    }
}
