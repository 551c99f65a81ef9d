//! Pluggable storage for pending tasks.

use std::collections::{BinaryHeap, VecDeque};

use crate::task::Task;

/// Storage and ordering of tasks waiting to be executed.
///
/// The pool is generic over this trait and calls every method with the queue
/// mutex held, so implementations do not need any synchronization of their
/// own. The queue alone decides selection order: [`FifoQueue`] hands tasks
/// back in insertion order, [`PriorityQueue`] in priority order.
pub trait TaskQueue: Send {
    /// The element type stored by this queue.
    type Task: Task;

    /// Add a task to the queue.
    fn push(&mut self, task: Self::Task);

    /// Remove and return the task the queue selects next, if any.
    fn pop(&mut self) -> Option<Self::Task>;

    /// Whether no tasks are pending.
    fn is_empty(&self) -> bool;

    /// Drop every pending task.
    fn clear(&mut self);
}

/// A first-in, first-out task queue.
#[derive(Debug)]
pub struct FifoQueue<T> {
    tasks: VecDeque<T>,
}

impl<T> FifoQueue<T> {
    pub fn new() -> Self {
        Self {
            tasks: VecDeque::new(),
        }
    }
}

impl<T> Default for FifoQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Task> TaskQueue for FifoQueue<T> {
    type Task = T;

    fn push(&mut self, task: T) {
        self.tasks.push_back(task);
    }

    fn pop(&mut self) -> Option<T> {
        self.tasks.pop_front()
    }

    fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn clear(&mut self) {
        self.tasks.clear();
    }
}

/// A queue that always hands back the highest-priority pending task.
///
/// Usually paired with [`Prioritized`](crate::Prioritized) as the element
/// type. Ties between equal elements are broken in an unspecified order.
#[derive(Debug)]
pub struct PriorityQueue<T: Ord> {
    tasks: BinaryHeap<T>,
}

impl<T: Ord> PriorityQueue<T> {
    pub fn new() -> Self {
        Self {
            tasks: BinaryHeap::new(),
        }
    }
}

impl<T: Ord> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Task + Ord> TaskQueue for PriorityQueue<T> {
    type Task = T;

    fn push(&mut self, task: T) {
        self.tasks.push(task);
    }

    fn pop(&mut self) -> Option<T> {
        self.tasks.pop()
    }

    fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn clear(&mut self) {
        self.tasks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Prioritized;

    #[test]
    fn fifo_hands_back_insertion_order() {
        let order = std::sync::Mutex::new(Vec::new());
        let mut queue = FifoQueue::new();
        for label in ["a", "b", "c"] {
            let order = &order;
            queue.push(move || order.lock().unwrap().push(label));
        }

        assert!(!queue.is_empty());
        while let Some(task) = queue.pop() {
            task.run();
        }

        assert!(queue.is_empty());
        assert_eq!(*order.lock().unwrap(), ["a", "b", "c"]);
    }

    #[test]
    fn priority_hands_back_highest_first() {
        let task = || {};
        let mut queue = PriorityQueue::new();
        for priority in [1, 5, 3] {
            queue.push(Prioritized::new(priority, task));
        }

        assert_eq!(queue.pop().unwrap().priority(), 5);
        assert_eq!(queue.pop().unwrap().priority(), 3);
        assert_eq!(queue.pop().unwrap().priority(), 1);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn clear_discards_everything() {
        let task = || {};
        let mut queue = PriorityQueue::new();
        queue.push(Prioritized::new(1, task));
        queue.push(Prioritized::new(2, task));

        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.pop().is_none());
    }
}
