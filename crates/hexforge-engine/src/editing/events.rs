//! Change notifications emitted by the editor.
//!
//! Plain callbacks, no UI-toolkit coupling: observers subscribe on the
//! editor and are invoked after the state lock has been released, so a
//! callback may freely call back into the editor's read API.

/// What changed, from an observer's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorEvent {
    /// Total length changed.
    Resized { length: u64 },
    /// Bytes in `[position, position + length)` changed; `length == None`
    /// means "from position to end of data" (everything shifted).
    DataChanged { position: u64, length: Option<u64> },
    BytesInserted { position: u64, length: u64 },
    BytesRemoved { position: u64, length: u64 },
    /// The modified flag flipped, e.g. after a save or an undo back to
    /// the savepoint.
    ModifiedChanged { modified: bool },
}

pub type ObserverId = usize;

type Callback = Box<dyn Fn(&EditorEvent) + Send + Sync>;

#[derive(Default)]
pub(crate) struct ObserverList {
    next_id: ObserverId,
    observers: Vec<(ObserverId, Callback)>,
}

impl ObserverList {
    pub fn subscribe(&mut self, callback: Callback) -> ObserverId {
        let id = self.next_id;
        self.next_id += 1;
        self.observers.push((id, callback));
        id
    }

    /// Returns whether the observer was present.
    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(observer_id, _)| *observer_id != id);
        self.observers.len() != before
    }

    pub fn notify(&self, events: &[EditorEvent]) {
        for event in events {
            for (_, callback) in &self.observers {
                callback(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn observers_receive_events_until_unsubscribed() {
        let seen = Arc::new(AtomicUsize::new(0));
        let mut list = ObserverList::default();

        let counter = Arc::clone(&seen);
        let id = list.subscribe(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        list.notify(&[EditorEvent::Resized { length: 4 }]);
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        assert!(list.unsubscribe(id));
        assert!(!list.unsubscribe(id));
        list.notify(&[EditorEvent::Resized { length: 8 }]);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
