//! In-memory pub/sub with named topics and bounded fan-out.
//!
//! Session topics carry MCP notifications, server topics carry debug traces.
//! Subscribers get a rendezvous channel each; a publish never blocks the
//! caller — delivery runs in background tasks with a per-subscriber timeout,
//! so one stuck consumer cannot stall the rest.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::idgen::IdGen;

#[derive(Debug, Error)]
pub enum PubSubError {
    #[error("pubsub {0} not found")]
    NotFound(i64),
}

pub struct Subscription<T> {
    pub id: i64,
    pub events: mpsc::Receiver<T>,
}

struct Subscriber<T> {
    id: i64,
    tx: mpsc::Sender<T>,
    cancel: CancellationToken,
}

struct Topic<T> {
    subscribers: RwLock<Vec<Subscriber<T>>>,
}

pub struct PubSub<T> {
    idgen: Arc<IdGen>,
    topics: DashMap<i64, Arc<Topic<T>>>,
    receive_timeout: Duration,
}

impl<T: Clone + Send + Sync + 'static> PubSub<T> {
    pub fn new(idgen: Arc<IdGen>, receive_timeout: Duration) -> Self {
        Self {
            idgen,
            topics: DashMap::new(),
            receive_timeout,
        }
    }

    /// Create a topic. With `Some(id)` the call is idempotent: an existing
    /// topic is left untouched. With `None` a fresh id is generated.
    pub fn create(&self, id: Option<i64>) -> i64 {
        let id = match id {
            Some(id) if id > 0 => {
                if self.topics.contains_key(&id) {
                    return id;
                }
                id
            }
            _ => self.idgen.next(),
        };

        self.topics.entry(id).or_insert_with(|| {
            Arc::new(Topic {
                subscribers: RwLock::new(Vec::with_capacity(1)),
            })
        });
        id
    }

    /// Drop a topic and tear down all of its subscribers. Their channels
    /// close once any in-flight deliveries finish.
    pub fn delete(&self, id: i64) {
        if let Some((_, topic)) = self.topics.remove(&id) {
            let subs = topic.subscribers.write().expect("pubsub lock poisoned");
            for s in subs.iter() {
                s.cancel.cancel();
            }
        }
    }

    pub fn subscribe(&self, topic_id: i64) -> Result<Subscription<T>, PubSubError> {
        let topic = self
            .topics
            .get(&topic_id)
            .ok_or(PubSubError::NotFound(topic_id))?
            .clone();

        let (tx, rx) = mpsc::channel(1);
        let id = self.idgen.next();
        topic
            .subscribers
            .write()
            .expect("pubsub lock poisoned")
            .push(Subscriber {
                id,
                tx,
                cancel: CancellationToken::new(),
            });

        Ok(Subscription { id, events: rx })
    }

    /// Remove one subscriber; idempotent. The subscriber's channel closes
    /// once its sender clones are gone.
    pub fn unsubscribe(&self, topic_id: i64, subscription_id: i64) -> Result<(), PubSubError> {
        let topic = self
            .topics
            .get(&topic_id)
            .ok_or(PubSubError::NotFound(topic_id))?
            .clone();

        let mut subs = topic.subscribers.write().expect("pubsub lock poisoned");
        if let Some(pos) = subs.iter().position(|s| s.id == subscription_id) {
            let sub = subs.swap_remove(pos);
            sub.cancel.cancel();
        }
        Ok(())
    }

    /// Fan `event` out to the topic's current subscribers without blocking
    /// the caller. Each delivery races the configured timeout and the
    /// subscriber's own cancellation; losers are logged and dropped.
    pub fn publish(&self, topic_id: i64, event: T) -> Result<i64, PubSubError> {
        let topic = self
            .topics
            .get(&topic_id)
            .ok_or(PubSubError::NotFound(topic_id))?
            .clone();

        let snapshot: Vec<(i64, mpsc::Sender<T>, CancellationToken)> = {
            let subs = topic.subscribers.read().expect("pubsub lock poisoned");
            subs.iter()
                .map(|s| (s.id, s.tx.clone(), s.cancel.clone()))
                .collect()
        };

        let timeout = self.receive_timeout;
        for (sub_id, tx, cancel) in snapshot {
            let event = event.clone();
            tokio::spawn(async move {
                tokio::select! {
                    sent = tx.send(event) => {
                        if sent.is_err() {
                            tracing::warn!(subscriber_id = sub_id, "subscriber channel closed during publish");
                        }
                    }
                    _ = tokio::time::sleep(timeout) => {
                        tracing::error!(
                            subscriber_id = sub_id,
                            timeout_ms = timeout.as_millis() as u64,
                            "failed to send message to subscriber within the given timeout duration"
                        );
                    }
                    _ = cancel.cancelled() => {}
                }
            });
        }

        Ok(self.idgen.next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IdGenConfig;
    use std::time::Duration;

    fn pubsub(timeout_ms: u64) -> PubSub<String> {
        let idgen = Arc::new(IdGen::new(&IdGenConfig::default()).unwrap());
        PubSub::new(idgen, Duration::from_millis(timeout_ms))
    }

    #[tokio::test]
    async fn publish_reaches_all_subscribers() {
        let ps = pubsub(1_000);
        let topic = ps.create(None);
        let mut a = ps.subscribe(topic).unwrap();
        let mut b = ps.subscribe(topic).unwrap();

        ps.publish(topic, "hello".to_string()).unwrap();

        assert_eq!(a.events.recv().await.unwrap(), "hello");
        assert_eq!(b.events.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn create_with_id_is_idempotent() {
        let ps = pubsub(1_000);
        let topic = ps.create(Some(42));
        assert_eq!(topic, 42);
        let mut sub = ps.subscribe(topic).unwrap();

        // second create must not wipe existing subscribers
        assert_eq!(ps.create(Some(42)), 42);
        ps.publish(42, "still-there".to_string()).unwrap();
        assert_eq!(sub.events.recv().await.unwrap(), "still-there");
    }

    #[tokio::test]
    async fn subscribe_to_missing_topic_fails() {
        let ps = pubsub(1_000);
        assert!(matches!(ps.subscribe(7), Err(PubSubError::NotFound(7))));
        assert!(ps.publish(7, "x".into()).is_err());
    }

    #[tokio::test]
    async fn slow_subscriber_does_not_stall_others() {
        let ps = pubsub(50);
        let topic = ps.create(None);
        let _slow = ps.subscribe(topic).unwrap(); // never drained
        let mut fast = ps.subscribe(topic).unwrap();

        // fill the slow subscriber's buffer so further sends block
        ps.publish(topic, "one".to_string()).unwrap();
        ps.publish(topic, "two".to_string()).unwrap();

        assert_eq!(fast.events.recv().await.unwrap(), "one");
        assert_eq!(fast.events.recv().await.unwrap(), "two");

        // publisher side must have returned long before the timeout window
        let started = std::time::Instant::now();
        ps.publish(topic, "three".to_string()).unwrap();
        assert!(started.elapsed() < Duration::from_millis(40));
        assert_eq!(fast.events.recv().await.unwrap(), "three");
    }

    #[tokio::test]
    async fn unsubscribe_closes_the_channel() {
        let ps = pubsub(1_000);
        let topic = ps.create(None);
        let mut sub = ps.subscribe(topic).unwrap();

        ps.unsubscribe(topic, sub.id).unwrap();
        assert!(sub.events.recv().await.is_none());

        // publishing afterwards is fine, nobody listens
        ps.publish(topic, "into the void".to_string()).unwrap();
    }

    #[tokio::test]
    async fn delete_tears_down_subscribers() {
        let ps = pubsub(1_000);
        let topic = ps.create(Some(9));
        let mut sub = ps.subscribe(topic).unwrap();

        ps.delete(topic);
        assert!(sub.events.recv().await.is_none());
        assert!(matches!(ps.subscribe(topic), Err(PubSubError::NotFound(9))));
    }
}
