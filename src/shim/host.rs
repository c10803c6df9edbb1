//! Host turn queue.
//!
//! Deliveries and deferred teardowns are queued here and run when the host
//! ends its turn. Work queued while the turn drains runs in the same turn,
//! after everything queued before it.

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::adapter::{Scheduler, Task};

/// Single-threaded cooperative host.
#[derive(Debug)]
pub struct Host {
    tx: Sender<Task>,
    rx: Receiver<Task>,
}

impl Host {
    /// A host with an empty queue.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Runs queued work until the queue is empty. Returns the number of tasks run.
    pub fn run_turn(&self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            task();
            ran += 1;
        }
        if ran > 0 {
            tracing::trace!(tasks = ran, "Host turn complete");
        }
        ran
    }

    /// Number of tasks waiting for the next turn.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl Default for Host {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for Host {
    fn defer(&self, task: Task) {
        if let Err(err) = self.tx.send(task) {
            tracing::error!(error = %err, "Host queue closed; dropping task");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn work_queued_during_turn_runs_in_same_turn() {
        let host = Arc::new(Host::new());
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let inner_host = Arc::clone(&host);
        let inner_order = Arc::clone(&order);
        host.defer(Box::new(move || {
            inner_order.lock().unwrap().push(1);
            let nested = Arc::clone(&inner_order);
            inner_host.defer(Box::new(move || nested.lock().unwrap().push(3)));
        }));
        let second = Arc::clone(&order);
        host.defer(Box::new(move || second.lock().unwrap().push(2)));

        assert_eq!(host.pending(), 2);
        assert_eq!(host.run_turn(), 3);
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(host.run_turn(), 0);
    }

    #[test]
    fn tasks_wait_for_the_turn() {
        let host = Host::new();
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        host.defer(Box::new(move || {
            inner.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(count.load(Ordering::SeqCst), 0);
        host.run_turn();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn deferred_tasks_are_queued_in_order() {
        let host = Host::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        for i in 0..3 {
            let inner = Arc::clone(&order);
            host.defer(Box::new(move || inner.lock().unwrap().push(i)));
        }

        assert_eq!(host.pending(), 3);
        assert_eq!(host.run_turn(), 3);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(host.pending(), 0);
    }
}
