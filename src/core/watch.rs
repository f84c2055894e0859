//! Watchers - fan-out of state snapshots to projectors

use futures::channel::mpsc;
use std::cell::RefCell;

/// Unbounded fan-out list. Closed receivers are pruned on the next notify.
pub struct Watchers<T> {
    senders: RefCell<Vec<mpsc::UnboundedSender<T>>>,
}

impl<T> Default for Watchers<T> {
    fn default() -> Self {
        Self { senders: RefCell::new(Vec::new()) }
    }
}

impl<T: Clone> Watchers<T> {
    pub fn watch(&self) -> mpsc::UnboundedReceiver<T> {
        let (tx, rx) = mpsc::unbounded();
        self.senders.borrow_mut().push(tx);
        rx
    }

    pub fn notify(&self, value: &T) {
        self.senders
            .borrow_mut()
            .retain(|tx| tx.unbounded_send(value.clone()).is_ok());
    }

    pub fn len(&self) -> usize {
        self.senders.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropped_receivers_are_pruned() {
        let watchers = Watchers::<u32>::default();
        let mut kept = watchers.watch();
        let dropped = watchers.watch();
        drop(dropped);

        watchers.notify(&7);
        assert_eq!(watchers.len(), 1);
        assert_eq!(kept.try_next().unwrap(), Some(7));
    }
}
