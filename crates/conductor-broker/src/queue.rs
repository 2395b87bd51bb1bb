use conductor_core::Task;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A single named priority queue.
///
/// Ordering key is `(10 - priority, insertion_sequence)` ascending, so
/// priority 10 drains before priority 1 and equal priorities drain FIFO.
/// A popped task is never re-inserted automatically; redelivery is the
/// caller's responsibility.
#[derive(Debug, Default)]
pub struct TaskQueue {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
}

#[derive(Debug)]
struct Entry {
    score: u8,
    seq: u64,
    task: Task,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.score == other.score && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the lowest (score, seq) pops
        // first.
        (other.score, other.seq).cmp(&(self.score, self.seq))
    }
}

impl TaskQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a task, keyed by its priority and arrival order.
    ///
    /// The broker validates priorities at its boundary; out-of-range values
    /// reaching this level are clamped into 1..=10 rather than wrapping.
    pub fn push(&mut self, task: Task) {
        let score = 10 - task.priority.clamp(1, 10);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry { score, seq, task });
    }

    /// Removes and returns the highest-priority (then oldest) task.
    pub fn pop(&mut self) -> Option<Task> {
        self.heap.pop().map(|entry| entry.task)
    }

    /// Number of tasks currently queued.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// True when no tasks are queued.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
