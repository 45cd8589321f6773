use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Instant;

/// Handle of a scheduled task, used to cancel it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TimerToken(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Entry {
    deadline: Instant,
    id: u64,
}

/// Deadline-ordered set of pending tasks on the monotonic clock
///
/// Entries with equal deadlines run in insertion order (the entry id is
/// the insertion sequence). Cancellation removes the task from the live
/// map only; the matching heap entry is dropped lazily the next time it
/// surfaces, which keeps cancel cheap without disturbing the heap.
pub(crate) struct Scheduler<T> {
    heap: BinaryHeap<Reverse<Entry>>,
    live: HashMap<u64, T>,
    next_id: u64,
}

impl<T> Scheduler<T> {
    pub fn new() -> Scheduler<T> {
        Scheduler {
            heap: BinaryHeap::new(),
            live: HashMap::new(),
            next_id: 0,
        }
    }

    pub fn insert(&mut self, deadline: Instant, task: T) -> TimerToken {
        let id = self.next_id;
        self.next_id += 1;
        self.heap.push(Reverse(Entry { deadline, id }));
        self.live.insert(id, task);
        TimerToken(id)
    }

    pub fn cancel(&mut self, token: TimerToken) -> Option<T> {
        self.live.remove(&token.0)
    }

    /// Remove and return the next task with `deadline <= now`, if any
    pub fn pop_due(&mut self, now: Instant) -> Option<T> {
        loop {
            let entry = match self.heap.peek() {
                Some(&Reverse(entry)) => entry,
                None => return None,
            };
            if !self.live.contains_key(&entry.id) {
                self.heap.pop();
                continue;
            }
            if entry.deadline > now {
                return None;
            }
            self.heap.pop();
            return self.live.remove(&entry.id);
        }
    }

    /// Deadline of the nearest live task
    pub fn next_deadline(&mut self) -> Option<Instant> {
        loop {
            let entry = match self.heap.peek() {
                Some(&Reverse(entry)) => entry,
                None => return None,
            };
            if self.live.contains_key(&entry.id) {
                return Some(entry.deadline);
            }
            self.heap.pop();
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.live.len()
    }
}
