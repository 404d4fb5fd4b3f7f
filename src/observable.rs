/// Observable values with channel-backed subscriptions
///
/// State that background threads mutate and the UI thread reads goes
/// through an `Observable`. Subscribers receive every published value
/// over a channel and are removed again when their `Subscription` is
/// dropped.
use std::sync::{Arc, Weak};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

/// A shared, observable value.
///
/// Cloning an `Observable` clones the handle, not the value; all
/// clones publish to the same subscribers.
pub struct Observable<T: Clone> {
    inner: Arc<Mutex<Inner<T>>>,
}

struct Inner<T> {
    value: T,
    next_id: u64,
    subscribers: Vec<(u64, Sender<T>)>,
}

impl<T: Clone> Observable<T> {
    pub fn new(value: T) -> Self {
        Observable {
            inner: Arc::new(Mutex::new(Inner {
                value,
                next_id: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Current value.
    pub fn get(&self) -> T {
        self.inner.lock().value.clone()
    }

    /// Publish a new value to all live subscribers.
    pub fn set(&self, value: T) {
        let mut inner = self.inner.lock();
        inner.value = value.clone();
        // Disconnected receivers are pruned as they are discovered
        inner
            .subscribers
            .retain(|(_, sender)| sender.send(value.clone()).is_ok());
    }

    /// Register a new subscriber.
    ///
    /// The subscription only sees values published after this call;
    /// use `get` for the current value.
    pub fn subscribe(&self) -> Subscription<T> {
        let (sender, receiver) = unbounded();
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.push((id, sender));

        Subscription {
            id,
            receiver,
            source: Arc::downgrade(&self.inner),
        }
    }

    #[cfg(test)]
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }
}

impl<T: Clone> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Observable {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// A live subscription to an `Observable`.
///
/// Dropping the subscription unregisters it from the source.
pub struct Subscription<T: Clone> {
    id: u64,
    receiver: Receiver<T>,
    source: Weak<Mutex<Inner<T>>>,
}

impl<T: Clone> Subscription<T> {
    /// Next pending value, if any.
    pub fn try_recv(&self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    /// Drain all pending values and return the most recent one.
    pub fn latest(&self) -> Option<T> {
        let mut last = None;
        while let Ok(value) = self.receiver.try_recv() {
            last = Some(value);
        }
        last
    }

    /// Block until a value arrives or the timeout elapses.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<T> {
        self.receiver.recv_timeout(timeout).ok()
    }
}

impl<T: Clone> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.source.upgrade() {
            inner.lock().subscribers.retain(|(id, _)| *id != self.id);
        }
    }
}
