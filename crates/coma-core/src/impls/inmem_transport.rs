//! InMemoryTransport - 送信内容を記録するだけの Transport

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::ports::{Transport, TransportError};

#[derive(Default)]
struct Recorded {
    sent: Vec<(String, String)>,
    failing: HashSet<String>,
}

/// Records every `(topic, payload)` it is asked to send.
#[derive(Default)]
pub struct InMemoryTransport {
    recorded: Mutex<Recorded>,
    sent_signal: Notify,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every send on `topic` fail until `recover` is called.
    pub fn fail_topic(&self, topic: &str) {
        self.lock().failing.insert(topic.to_string());
    }

    pub fn recover(&self, topic: &str) {
        self.lock().failing.remove(topic);
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.lock().sent.clone()
    }

    pub fn sent_to(&self, topic: &str) -> Vec<String> {
        self.lock()
            .sent
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    /// Wait until at least `count` messages were sent, or `limit` passes.
    ///
    /// Returns whether the count was reached.
    pub async fn wait_for(&self, count: usize, limit: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            let notified = self.sent_signal.notified();
            if self.lock().sent.len() >= count {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.lock().sent.len() >= count;
            }
        }
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn send(&self, topic: &str, payload: &str) -> Result<(), TransportError> {
        {
            let mut recorded = self.lock();
            if recorded.failing.contains(topic) {
                return Err(format!("topic {topic} is unreachable").into());
            }
            recorded.sent.push((topic.to_string(), payload.to_string()));
        }
        self.sent_signal.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn records_and_filters_by_topic() {
        let transport = InMemoryTransport::new();
        transport.send("a", "1").await.unwrap();
        transport.send("b", "2").await.unwrap();
        transport.send("a", "3").await.unwrap();

        assert_eq!(transport.sent_to("a"), vec!["1", "3"]);
        assert_eq!(transport.sent().len(), 3);
    }

    #[tokio::test]
    async fn failing_topic_is_not_recorded() {
        let transport = InMemoryTransport::new();
        transport.fail_topic("a");
        assert!(transport.send("a", "lost").await.is_err());
        transport.recover("a");
        transport.send("a", "kept").await.unwrap();
        assert_eq!(transport.sent_to("a"), vec!["kept"]);
    }

    #[tokio::test]
    async fn wait_for_wakes_on_send() {
        let transport = Arc::new(InMemoryTransport::new());
        let waiter = tokio::spawn({
            let transport = Arc::clone(&transport);
            async move { transport.wait_for(1, Duration::from_secs(2)).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        transport.send("a", "x").await.unwrap();
        assert!(waiter.await.unwrap());

        assert!(!transport.wait_for(5, Duration::from_millis(50)).await);
    }
}
