use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

/// Change counters for the data a client session shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Revision {
    pub tasks: u64,
    pub categories: u64,
}

/// Publish/subscribe channel shared by the controllers of one client session.
/// Writers publish after a successful mutation; readers refetch when the
/// revision they last applied is behind.
#[derive(Clone, Default)]
pub struct TaskEvents {
    tx: Arc<watch::Sender<Revision>>,
}

impl TaskEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish_tasks(&self) {
        self.tx.send_modify(|revision| revision.tasks += 1);
        debug!(revision = self.current().tasks, "tasks changed");
    }

    pub fn publish_categories(&self) {
        self.tx.send_modify(|revision| revision.categories += 1);
        debug!(revision = self.current().categories, "categories changed");
    }

    pub fn current(&self) -> Revision {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Revision> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribers_see_each_kind_of_change() {
        let events = TaskEvents::new();
        let mut rx = events.subscribe();
        assert!(!rx.has_changed().unwrap_or(true));

        events.publish_tasks();
        events.publish_categories();
        events.clone().publish_tasks();

        assert!(rx.has_changed().unwrap_or(false));
        assert_eq!(*rx.borrow_and_update(), Revision { tasks: 2, categories: 1 });
    }
}
