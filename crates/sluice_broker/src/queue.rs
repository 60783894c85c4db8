//! Three-lane priority queue.

use sluice_core::{Priority, ResourceRequest};
use std::collections::VecDeque;

/// Anything that can be placed in a [`PriorityQueue`].
pub trait Prioritized {
    /// Lane the item belongs to.
    fn priority(&self) -> Priority;
}

impl Prioritized for ResourceRequest {
    fn priority(&self) -> Priority {
        *ResourceRequest::priority(self)
    }
}

/// FIFO lanes for High, Normal and Low priority.
///
/// `pop` always serves the highest non-empty lane. There is no aging, so Low
/// items can starve under sustained High or Normal load.
///
/// # Example
///
/// ```
/// use sluice_broker::PriorityQueue;
/// use sluice_core::{Priority, ResourceRequest};
///
/// let mut queue = PriorityQueue::new();
/// queue.push(ResourceRequest::builder().resource("llm").operation("complete").priority(Priority::Low).build().unwrap());
/// queue.push(ResourceRequest::builder().resource("llm").operation("complete").priority(Priority::High).build().unwrap());
///
/// assert_eq!(*queue.pop().unwrap().priority(), Priority::High);
/// assert_eq!(queue.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct PriorityQueue<T> {
    lanes: [VecDeque<T>; 3],
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self {
            lanes: [VecDeque::new(), VecDeque::new(), VecDeque::new()],
        }
    }
}

impl<T: Prioritized> PriorityQueue<T> {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends to the tail of the item's lane.
    pub fn push(&mut self, item: T) {
        self.lanes[item.priority().lane()].push_back(item);
    }

    /// Inserts at the head of the item's lane.
    ///
    /// Used when an item is throttled so it keeps its place ahead of later
    /// arrivals of the same priority.
    pub fn push_front(&mut self, item: T) {
        self.lanes[item.priority().lane()].push_front(item);
    }

    /// Removes the oldest item of the highest non-empty lane.
    pub fn pop(&mut self) -> Option<T> {
        self.lanes.iter_mut().find_map(VecDeque::pop_front)
    }

    /// Item `pop` would return.
    pub fn peek(&self) -> Option<&T> {
        self.lanes.iter().find_map(VecDeque::front)
    }

    /// Total items across lanes.
    pub fn len(&self) -> usize {
        self.lanes.iter().map(VecDeque::len).sum()
    }

    /// Items in one lane.
    pub fn len_of(&self, priority: Priority) -> usize {
        self.lanes[priority.lane()].len()
    }

    /// Whether every lane is empty.
    pub fn is_empty(&self) -> bool {
        self.lanes.iter().all(VecDeque::is_empty)
    }

    /// Removes and returns the first item, in pop order, matching `predicate`.
    pub fn remove<F>(&mut self, mut predicate: F) -> Option<T>
    where
        F: FnMut(&T) -> bool,
    {
        self.lanes.iter_mut().find_map(|lane| {
            let index = lane.iter().position(&mut predicate)?;
            lane.remove(index)
        })
    }

    /// Empties the queue, returning items in pop order.
    pub fn drain(&mut self) -> Vec<T> {
        self.lanes
            .iter_mut()
            .flat_map(|lane| lane.drain(..))
            .collect()
    }
}
