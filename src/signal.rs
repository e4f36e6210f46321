use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

/// Subscriber callback for signals and property notifiers.
///
/// Identity is the identity of the `Arc`: keep a clone of the handle you
/// subscribed to be able to unsubscribe it.
pub type Callback = Arc<dyn Fn(&[Value]) + Send + Sync>;

/// Wrap a closure as a [`Callback`].
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(&[Value]) + Send + Sync + 'static,
{
    Arc::new(f)
}

fn same_callback(a: &Callback, b: &Callback) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Fan-out of one remote signal to local subscribers.
pub struct SignalEmitter {
    name: String,
    subscribers: Mutex<Vec<Callback>>,
}

impl SignalEmitter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a subscriber. The same handle may be subscribed more than once.
    pub fn subscribe(&self, callback: Callback) {
        self.subscribers.lock().push(callback);
    }

    /// Remove the first subscription of `callback`. Returns whether one was found.
    pub fn unsubscribe(&self, callback: &Callback) -> bool {
        let mut subscribers = self.subscribers.lock();
        match subscribers.iter().position(|c| same_callback(c, callback)) {
            Some(index) => {
                subscribers.remove(index);
                true
            }
            None => false,
        }
    }

    /// Call every subscriber in subscription order.
    ///
    /// Works on a snapshot: subscriptions changed by a subscriber take
    /// effect from the next dispatch.
    pub fn dispatch(&self, args: &[Value]) {
        let snapshot = self.subscribers.lock().clone();
        for callback in &snapshot {
            callback(args);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl std::fmt::Debug for SignalEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalEmitter")
            .field("name", &self.name)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
