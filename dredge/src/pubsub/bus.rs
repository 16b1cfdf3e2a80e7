//! Topic-keyed fan-out bus.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::{debug, error};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Opaque handle returned by [`PubSub::subscribe`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    topic: String,
    id: u64,
}

impl SubscriptionHandle {
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

/// Synchronous topic-keyed publish/subscribe.
///
/// `publish` calls every subscriber of the topic on the caller's task, in
/// subscription order. A panicking subscriber is logged and skipped; the
/// others still receive the payload.
pub struct PubSub<T> {
    next_id: AtomicU64,
    topics: RwLock<HashMap<String, Vec<(u64, Callback<T>)>>>,
}

impl<T> Default for PubSub<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PubSub<T> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            topics: RwLock::new(HashMap::new()),
        }
    }

    pub fn subscribe<F>(&self, topic: &str, callback: F) -> SubscriptionHandle
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.topics
            .write()
            .entry(topic.to_string())
            .or_default()
            .push((id, Arc::new(callback)));

        debug!(topic, subscription = id, "Subscribed");
        SubscriptionHandle {
            topic: topic.to_string(),
            id,
        }
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let mut topics = self.topics.write();
        let Some(subscribers) = topics.get_mut(&handle.topic) else {
            return false;
        };

        let before = subscribers.len();
        subscribers.retain(|(id, _)| *id != handle.id);
        let removed = subscribers.len() != before;
        if subscribers.is_empty() {
            topics.remove(&handle.topic);
        }

        if removed {
            debug!(topic = %handle.topic, subscription = handle.id, "Unsubscribed");
        }
        removed
    }

    /// Deliver `payload` to every current subscriber of `topic`.
    ///
    /// Returns the number of subscribers that handled it without panicking.
    pub fn publish(&self, topic: &str, payload: &T) -> usize {
        let subscribers: Vec<(u64, Callback<T>)> = match self.topics.read().get(topic) {
            Some(subs) => subs.clone(),
            None => return 0,
        };

        let mut delivered = 0;
        for (id, callback) in subscribers {
            match catch_unwind(AssertUnwindSafe(|| callback(payload))) {
                Ok(()) => delivered += 1,
                Err(panic) => error!(
                    topic,
                    subscription = id,
                    panic = %crate::panic_hook::payload_message(panic.as_ref()),
                    "Subscriber panicked"
                ),
            }
        }
        delivered
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.read().get(topic).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_publish_reaches_topic_subscribers_only() {
        let bus = PubSub::<String>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = seen.clone();
        bus.subscribe("global", move |msg: &String| s.lock().push(format!("a:{msg}")));
        let s = seen.clone();
        bus.subscribe("global", move |msg: &String| s.lock().push(format!("b:{msg}")));
        let s = seen.clone();
        bus.subscribe("other", move |msg: &String| s.lock().push(format!("c:{msg}")));

        assert_eq!(bus.publish("global", &"hi".to_string()), 2);
        assert_eq!(*seen.lock(), vec!["a:hi", "b:hi"]);
        assert_eq!(bus.publish("nobody", &"x".to_string()), 0);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = PubSub::<u32>::new();
        let count = Arc::new(AtomicU64::new(0));
        let c = count.clone();
        let handle = bus.subscribe("t", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish("t", &1);
        assert!(bus.unsubscribe(&handle));
        assert!(!bus.unsubscribe(&handle));
        bus.publish("t", &2);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count("t"), 0);
    }

    #[test]
    fn test_panicking_subscriber_is_isolated() {
        let bus = PubSub::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe("t", |_| panic!("subscriber bug"));
        let s = seen.clone();
        bus.subscribe("t", move |v| s.lock().push(*v));

        assert_eq!(bus.publish("t", &7), 1);
        assert_eq!(bus.publish("t", &8), 1);
        assert_eq!(*seen.lock(), vec![7, 8]);
    }

    #[test]
    fn test_subscribe_from_callback_does_not_deadlock() {
        let bus = Arc::new(PubSub::<u32>::new());
        let inner = bus.clone();
        bus.subscribe("t", move |_| {
            inner.subscribe("late", |_| {});
        });

        bus.publish("t", &1);
        assert_eq!(bus.subscriber_count("late"), 1);
    }
}
