//! Tests for the three-lane priority queue.

use sluice_broker::{Prioritized, PriorityQueue};
use sluice_core::Priority;

#[derive(Debug, Clone, PartialEq)]
struct Job {
    name: &'static str,
    priority: Priority,
}

impl Prioritized for Job {
    fn priority(&self) -> Priority {
        self.priority
    }
}

fn job(name: &'static str, priority: Priority) -> Job {
    Job { name, priority }
}

fn names(queue: &mut PriorityQueue<Job>) -> Vec<&'static str> {
    std::iter::from_fn(|| queue.pop()).map(|j| j.name).collect()
}

#[test]
fn test_pop_serves_highest_lane_fifo() {
    let mut queue = PriorityQueue::new();
    queue.push(job("n1", Priority::Normal));
    queue.push(job("l1", Priority::Low));
    queue.push(job("h1", Priority::High));
    queue.push(job("n2", Priority::Normal));
    queue.push(job("h2", Priority::High));

    assert_eq!(queue.len(), 5);
    assert_eq!(queue.len_of(Priority::High), 2);
    assert_eq!(queue.peek().map(|j| j.name), Some("h1"));
    assert_eq!(names(&mut queue), vec!["h1", "h2", "n1", "n2", "l1"]);
    assert!(queue.is_empty());
}

#[test]
fn test_push_front_jumps_own_lane_only() {
    let mut queue = PriorityQueue::new();
    queue.push(job("h1", Priority::High));
    queue.push(job("n1", Priority::Normal));
    queue.push(job("n2", Priority::Normal));
    queue.push_front(job("throttled", Priority::Normal));

    assert_eq!(names(&mut queue), vec!["h1", "throttled", "n1", "n2"]);
}

#[test]
fn test_remove_takes_first_match() {
    let mut queue = PriorityQueue::new();
    queue.push(job("a", Priority::Low));
    queue.push(job("b", Priority::Normal));
    queue.push(job("c", Priority::Low));

    let removed = queue.remove(|j| j.priority == Priority::Low);
    assert_eq!(removed.map(|j| j.name), Some("a"));
    assert!(queue.remove(|j| j.name == "missing").is_none());
    assert_eq!(names(&mut queue), vec!["b", "c"]);
}

#[test]
fn test_drain_empties_in_pop_order() {
    let mut queue = PriorityQueue::new();
    queue.push(job("l", Priority::Low));
    queue.push(job("h", Priority::High));
    queue.push(job("n", Priority::Normal));

    let drained: Vec<_> = queue.drain().into_iter().map(|j| j.name).collect();
    assert_eq!(drained, vec!["h", "n", "l"]);
    assert!(queue.is_empty());
    assert_eq!(queue.pop(), None);
}
