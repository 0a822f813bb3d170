//! Bounded, similarity-gated learning queue.

use std::collections::VecDeque;

use crate::text::{is_similar, normalize};

/// FIFO of pending raw phrases for one bucket.
///
/// An enqueue is rejected when the phrase is already queued or is similar to
/// one of the last `tail_scan` entries. Priority phrases go to the head.
/// Past `capacity`, the oldest (front) entries are evicted.
#[derive(Debug, Clone)]
pub struct LearningQueue {
    entries: VecDeque<String>,
    capacity: usize,
    tail_scan: usize,
    threshold: f64,
}

impl LearningQueue {
    /// Empty queue
    pub fn new(capacity: usize, tail_scan: usize, threshold: f64) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
            tail_scan,
            threshold,
        }
    }

    /// Try to enqueue `phrase`; false when rejected as a duplicate.
    pub fn enqueue(&mut self, phrase: &str, priority: bool) -> bool {
        if phrase.is_empty() || self.entries.iter().any(|entry| entry == phrase) {
            return false;
        }
        let key = normalize(phrase);
        if !key.is_empty()
            && self
                .entries
                .iter()
                .rev()
                .take(self.tail_scan)
                .any(|entry| is_similar(&key, &normalize(entry), self.threshold))
        {
            return false;
        }

        if priority {
            self.entries.push_front(phrase.to_string());
        } else {
            self.entries.push_back(phrase.to_string());
        }
        self.evict_overflow();
        true
    }

    /// Remove up to `count` entries from the front.
    pub fn drain_front(&mut self, count: usize) -> Vec<String> {
        let count = count.min(self.entries.len());
        self.entries.drain(..count).collect()
    }

    /// Put phrases back at the tail, skipping ones already queued.
    pub fn requeue(&mut self, phrases: &[String]) {
        for phrase in phrases {
            if !self.entries.contains(phrase) {
                self.entries.push_back(phrase.clone());
            }
        }
        self.evict_overflow();
    }

    fn evict_overflow(&mut self) {
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Queued phrases
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is queued
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Peek at the queue, head first
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(capacity: usize) -> LearningQueue {
        LearningQueue::new(capacity, 120, 0.90)
    }

    #[test]
    fn test_priority_goes_to_head() {
        let mut q = queue(10);
        assert!(q.enqueue("anyone farming tonight", false));
        assert!(q.enqueue("how do i get to the nether fortress", true));
        assert_eq!(q.iter().next().unwrap(), "how do i get to the nether fortress");
    }

    #[test]
    fn test_near_duplicate_rejected() {
        let mut q = queue(10);
        assert!(q.enqueue("who has spare iron ingots", false));
        assert!(!q.enqueue("who has spare iron ingots", false));
        assert!(!q.enqueue("Who has spare iron ingots!", false));
        assert!(q.enqueue("selling enchanted books cheap", false));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut q = queue(3);
        for phrase in ["alpha bravo", "charlie delta", "echo foxtrot", "golf hotel"] {
            assert!(q.enqueue(phrase, false));
        }
        assert_eq!(q.len(), 3);
        assert_eq!(q.iter().next().unwrap(), "charlie delta");
    }

    #[test]
    fn test_requeue_skips_present() {
        let mut q = queue(10);
        q.enqueue("alpha bravo", false);
        let drained = q.drain_front(5);
        assert!(q.is_empty());
        q.enqueue("charlie delta", false);
        q.requeue(&[drained[0].clone(), "charlie delta".to_string()]);
        assert_eq!(q.len(), 2);
    }
}
