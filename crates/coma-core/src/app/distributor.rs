//! Distributor - トピックのキューを読み Transport へ配送する consumer 群
//!
//! # フロー
//! 1. `attach(topic)` でトピックごとに consumer を 1 つ spawn（冪等）
//! 2. consumer は `next_message` でメッセージを取り出し `Transport::send`
//! 3. decode / send の失敗はメッセージ単位でログに残し、ループは継続
//! 4. トピックが close され空になったら consumer は終了
//!
//! `shutdown_and_join()` は全トピックを close し、バッファ済みのメッセージを
//! 配送し終えるまで待つ。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::ports::Transport;
use crate::pubsub::{Pubsub, PubsubError, Subscription};

#[derive(Default)]
struct Consumers {
    handles: HashMap<String, JoinHandle<()>>,
    shut_down: bool,
}

pub struct Distributor {
    pubsub: Arc<Pubsub>,
    transport: Arc<dyn Transport>,
    /// The shutdown flag lives under the same lock as the handles, so an
    /// `attach` racing `shutdown_and_join` either lands before the drain or
    /// is refused.
    consumers: Mutex<Consumers>,
}

impl Distributor {
    pub fn new(pubsub: Arc<Pubsub>, transport: Arc<dyn Transport>) -> Self {
        Self {
            pubsub,
            transport,
            consumers: Mutex::new(Consumers::default()),
        }
    }

    fn consumers(&self) -> MutexGuard<'_, Consumers> {
        self.consumers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start delivering `topic`.
    ///
    /// Returns `Ok(false)` if a consumer for `topic` is already running, and
    /// `PubsubError::Closed` once the distributor was shut down. A consumer
    /// that ended because its topic was removed is replaced.
    pub fn attach(&self, topic: &str) -> Result<bool, PubsubError> {
        let mut consumers = self.consumers();
        if consumers.shut_down {
            return Err(PubsubError::Closed);
        }
        if consumers
            .handles
            .get(topic)
            .is_some_and(|handle| !handle.is_finished())
        {
            return Ok(false);
        }

        let subscription = self.pubsub.subscribe(topic);
        let transport = Arc::clone(&self.transport);
        let handle = tokio::spawn(consume(subscription, transport));
        consumers.handles.insert(topic.to_string(), handle);
        debug!(topic = %topic, "consumer attached");
        Ok(true)
    }

    pub fn is_shut_down(&self) -> bool {
        self.consumers().shut_down
    }

    pub fn is_attached(&self, topic: &str) -> bool {
        self.consumers()
            .handles
            .get(topic)
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Topics with a running consumer, sorted.
    pub fn attached_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self
            .consumers()
            .handles
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .map(|(topic, _)| topic.clone())
            .collect();
        topics.sort();
        topics
    }

    /// Close every attached topic and wait until buffered messages are delivered.
    ///
    /// Later calls to `attach` are refused.
    pub async fn shutdown_and_join(&self) {
        let consumers: Vec<(String, JoinHandle<()>)> = {
            let mut consumers = self.consumers();
            consumers.shut_down = true;
            consumers.handles.drain().collect()
        };
        for (topic, _) in &consumers {
            self.pubsub.close(topic);
        }
        for (topic, handle) in consumers {
            if let Err(e) = handle.await {
                warn!(topic = %topic, error = %e, "consumer ended abnormally");
            }
        }
        info!("distributor stopped");
    }
}

async fn consume(subscription: Subscription, transport: Arc<dyn Transport>) {
    let topic = subscription.topic().to_string();
    let mut delivered = 0usize;
    let mut failed = 0usize;

    while let Some(message) = subscription.next_message().await {
        let payload = match message {
            Ok(payload) => payload,
            Err(e) => {
                failed += 1;
                warn!(topic = %topic, error = %e, "dropping undecodable message");
                continue;
            }
        };
        match transport.send(&topic, &payload).await {
            Ok(()) => delivered += 1,
            Err(e) => {
                failed += 1;
                warn!(topic = %topic, error = %e, "failed to deliver message");
            }
        }
    }

    debug!(topic = %topic, delivered, failed, "consumer stopped");
}
