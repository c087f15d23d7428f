//! Topic registry: one publisher per topic (client key).

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::error::{ProduceError, PubsubError};
use super::payload::Payload;
use super::publisher::Publisher;

/// Maps topics to publishers.
///
/// Topics are created lazily on first `publish` or `subscribe` and live
/// until the owner calls `remove`. The map is sharded, and no map guard is
/// held while a publish waits for room, so topics do not contend with each
/// other.
#[derive(Debug)]
pub struct Pubsub {
    topics: DashMap<String, Arc<Publisher>>,
    default_capacity: usize,
}

impl Pubsub {
    pub fn new(default_capacity: usize) -> Self {
        Self {
            topics: DashMap::new(),
            default_capacity: default_capacity.max(1),
        }
    }

    pub fn default_capacity(&self) -> usize {
        self.default_capacity
    }

    /// Get or create the publisher for `topic`.
    fn publisher(&self, topic: &str) -> Arc<Publisher> {
        if let Some(existing) = self.topics.get(topic) {
            return Arc::clone(existing.value());
        }
        let entry = self.topics.entry(topic.to_string()).or_insert_with(|| {
            debug!(topic = %topic, capacity = self.default_capacity, "creating topic");
            Arc::new(Publisher::new(self.default_capacity))
        });
        Arc::clone(entry.value())
    }

    /// Publish on `topic`, creating the topic if needed.
    pub async fn publish<F, E>(&self, topic: &str, produce: F) -> Result<(), PubsubError>
    where
        F: FnOnce() -> Result<Payload, E>,
        E: Into<ProduceError>,
    {
        let publisher = self.publisher(topic);
        publisher.publish(produce).await
    }

    /// Drain handle for `topic`, creating the topic if needed.
    pub fn subscribe(&self, topic: &str) -> Subscription {
        Subscription {
            topic: topic.to_string(),
            publisher: self.publisher(topic),
        }
    }

    /// Close `topic`. Returns `false` if it does not exist or was already closed.
    pub fn close(&self, topic: &str) -> bool {
        self.topics
            .get(topic)
            .map(|publisher| publisher.close())
            .unwrap_or(false)
    }

    /// Close and forget `topic`. Existing subscriptions still drain what is buffered.
    pub fn remove(&self, topic: &str) -> Option<Arc<Publisher>> {
        let (_, publisher) = self.topics.remove(topic)?;
        publisher.close();
        debug!(topic = %topic, "removed topic");
        Some(publisher)
    }

    /// Close every topic (shutdown).
    pub fn close_all(&self) {
        for entry in self.topics.iter() {
            entry.value().close();
        }
    }

    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.topics.iter().map(|e| e.key().clone()).collect();
        topics.sort();
        topics
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

impl Default for Pubsub {
    fn default() -> Self {
        Self::new(16)
    }
}

/// Consumer side of one topic.
#[derive(Debug, Clone)]
pub struct Subscription {
    topic: String,
    publisher: Arc<Publisher>,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn next_message(&self) -> Option<Result<String, PubsubError>> {
        self.publisher.next_message().await
    }

    pub async fn drain(&self) -> Result<Vec<String>, PubsubError> {
        self.publisher.drain().await
    }

    pub fn len(&self) -> usize {
        self.publisher.len()
    }

    pub fn is_empty(&self) -> bool {
        self.publisher.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.publisher.capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.publisher.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::time::Duration;

    fn text(s: &'static str) -> impl FnOnce() -> Result<Payload, Infallible> {
        move || Ok(Payload::from(s))
    }

    #[tokio::test]
    async fn publish_creates_topic_with_default_capacity() {
        let pubsub = Pubsub::new(8);
        assert!(pubsub.is_empty());

        pubsub.publish("client-1", text("hello")).await.unwrap();

        assert!(pubsub.contains("client-1"));
        let subscription = pubsub.subscribe("client-1");
        assert_eq!(subscription.capacity(), 8);
        assert_eq!(subscription.len(), 1);
        assert_eq!(pubsub.len(), 1);
    }

    #[tokio::test]
    async fn subscribe_before_publish_sees_the_same_queue() {
        let pubsub = Pubsub::new(4);
        let subscription = pubsub.subscribe("client-1");

        pubsub.publish("client-1", text("a")).await.unwrap();
        pubsub.publish("client-1", text("b")).await.unwrap();
        assert!(pubsub.close("client-1"));

        assert_eq!(subscription.drain().await.unwrap(), vec!["a", "b"]);
        assert!(subscription.is_closed());
    }

    #[tokio::test]
    async fn topics_are_independent() {
        let pubsub = Pubsub::new(1);
        pubsub.publish("full", text("x")).await.unwrap();

        // "full" is at capacity; another topic must still accept publishes.
        tokio::time::timeout(
            Duration::from_millis(200),
            pubsub.publish("other", text("y")),
        )
        .await
        .expect("a full topic must not block other topics")
        .unwrap();

        assert_eq!(pubsub.topics(), vec!["full".to_string(), "other".to_string()]);
        pubsub.close_all();
        assert_eq!(pubsub.subscribe("full").drain().await.unwrap(), vec!["x"]);
        assert_eq!(pubsub.subscribe("other").drain().await.unwrap(), vec!["y"]);
    }

    #[tokio::test]
    async fn remove_closes_and_forgets_topic() {
        let pubsub = Pubsub::new(2);
        let old = pubsub.subscribe("client-1");
        pubsub.publish("client-1", text("before")).await.unwrap();

        let removed = pubsub.remove("client-1").unwrap();
        assert!(removed.is_closed());
        assert!(!pubsub.contains("client-1"));
        assert!(pubsub.remove("client-1").is_none());
        assert!(!pubsub.close("client-1"));

        // old subscribers still drain, a new publish starts a fresh queue
        assert_eq!(old.drain().await.unwrap(), vec!["before"]);
        pubsub.publish("client-1", text("after")).await.unwrap();
        assert_eq!(pubsub.subscribe("client-1").len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_lazy_creation_yields_one_queue_per_topic() {
        let pubsub = Arc::new(Pubsub::new(64));
        let mut handles = Vec::new();
        for _ in 0..16 {
            let pubsub = Arc::clone(&pubsub);
            handles.push(tokio::spawn(async move {
                pubsub.publish("shared", text("m")).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(pubsub.len(), 1);
        assert_eq!(pubsub.subscribe("shared").len(), 16);
    }
}
