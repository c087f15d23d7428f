//! ConfigurationService - クライアント設定の読み書きと配信
//!
//! 書き込み（set / update / upsert / delete）が成功したら、そのクライアントの
//! JSON view を非同期に配信する。書き込みの結果は配信の成否に依存しない。
//!
//! 配信は `client_key` をトピックとして `Pubsub` に publish し、
//! `Distributor` の consumer が `Transport` へ流す。
//!
//! 同じトピックへの配信は「view の読み取り → publish」をトピックごとの
//! 非同期ロックで 1 単位として直列化する。後から読んだ view が必ず後に
//! publish されるため、クライアントに古い view が最後に届くことはない。

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::app::distributor::Distributor;
use crate::domain::{Configuration, ConfigurationFilter, ConfigurationId, Configurations};
use crate::error::ServiceError;
use crate::ports::{ConfigurationReader, ConfigurationWriter};
use crate::pubsub::{Payload, Pubsub};

/// The `{field: value}` object of one client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationView {
    pub client_key: String,
    pub data: Map<String, Value>,
}

#[derive(Clone)]
pub struct ConfigurationService {
    reader: Arc<dyn ConfigurationReader>,
    writer: Arc<dyn ConfigurationWriter>,
    pubsub: Arc<Pubsub>,
    distributor: Arc<Distributor>,
    distributions: Arc<Mutex<JoinSet<()>>>,
    /// One lock per client key, held from reading the view until it is enqueued.
    topic_locks: Arc<DashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ConfigurationService {
    pub fn new(
        reader: Arc<dyn ConfigurationReader>,
        writer: Arc<dyn ConfigurationWriter>,
        pubsub: Arc<Pubsub>,
        distributor: Arc<Distributor>,
    ) -> Self {
        Self {
            reader,
            writer,
            pubsub,
            distributor,
            distributions: Arc::new(Mutex::new(JoinSet::new())),
            topic_locks: Arc::new(DashMap::new()),
        }
    }

    pub async fn get_configuration(&self, client_key: &str) -> Result<Configurations, ServiceError> {
        require("client key", client_key)?;
        self.reader
            .find_configurations(&ConfigurationFilter::client(client_key))
            .await
            .inspect_err(|e| error!(client_key = %client_key, error = %e, "failed to find configuration"))
            .map_err(ServiceError::from)
    }

    pub async fn get_configuration_view(
        &self,
        client_key: &str,
    ) -> Result<ConfigurationView, ServiceError> {
        let configurations = self.get_configuration(client_key).await?;
        Ok(ConfigurationView {
            client_key: client_key.to_string(),
            data: configurations.to_json_view(),
        })
    }

    /// Add a new field. Fails with `Duplicate` if the client already has it.
    pub async fn set_configuration(
        &self,
        client_key: &str,
        field: &str,
        value: Option<String>,
    ) -> Result<ConfigurationId, ServiceError> {
        require("client key", client_key)?;
        require("field", field)?;

        let existing = self
            .reader
            .find_configurations(&ConfigurationFilter::client(client_key).with_field(field))
            .await?;
        if existing.exists() {
            error!(client_key = %client_key, field = %field, "duplicate field name");
            return Err(ServiceError::Duplicate(format!("field '{field}'")));
        }

        let configuration = Configuration::new(client_key, field, value);
        let id = self
            .writer
            .insert_configuration(&configuration)
            .await
            .inspect_err(|e| error!(client_key = %client_key, field = %field, error = %e, "failed to insert configuration"))?;
        info!(client_key = %client_key, field = %field, id = %id, "configuration set");

        self.spawn_distribution(client_key);
        Ok(id)
    }

    /// Change the value of the entry matching `id` and `field`.
    pub async fn update_configuration(
        &self,
        client_key: &str,
        id: ConfigurationId,
        field: &str,
        value: Option<String>,
    ) -> Result<(), ServiceError> {
        require("client key", client_key)?;
        require("field", field)?;

        let mut current = self
            .reader
            .find_configurations(
                &ConfigurationFilter::client(client_key)
                    .with_id(id)
                    .with_field(field),
            )
            .await?;
        if !current.exists() {
            error!(client_key = %client_key, field = %field, id = %id, "configuration to update not found");
            return Err(ServiceError::NotFound(format!("configuration {id}")));
        }

        let mut update = Configuration::new(client_key, field, value);
        update.id = id;
        current.update_from(std::slice::from_ref(&update));

        for configuration in current.iter() {
            self.writer
                .update_configuration(configuration)
                .await
                .inspect_err(|e| error!(client_key = %client_key, field = %field, error = %e, "failed to update configuration"))?;
        }
        info!(client_key = %client_key, field = %field, id = %id, "configuration updated");

        self.spawn_distribution(client_key);
        Ok(())
    }

    /// Update `field` when the client has it, set it otherwise.
    pub async fn upsert_configuration(
        &self,
        client_key: &str,
        field: &str,
        value: Option<String>,
    ) -> Result<(), ServiceError> {
        require("client key", client_key)?;
        require("field", field)?;

        let existing = self
            .reader
            .find_configurations(&ConfigurationFilter::client(client_key).with_field(field))
            .await?;

        match existing.iter().next() {
            Some(first) => {
                self.update_configuration(client_key, first.id, field, value)
                    .await
            }
            None => self
                .set_configuration(client_key, field, value)
                .await
                .map(|_| ()),
        }
    }

    pub async fn delete_configuration(
        &self,
        client_key: &str,
        id: ConfigurationId,
    ) -> Result<(), ServiceError> {
        require("client key", client_key)?;
        let removed = self
            .writer
            .delete_configurations(&ConfigurationFilter::client(client_key).with_id(id))
            .await
            .inspect_err(|e| error!(client_key = %client_key, id = %id, error = %e, "failed to delete configuration"))?;
        info!(client_key = %client_key, id = %id, removed, "configuration deleted");

        self.spawn_distribution(client_key);
        Ok(())
    }

    /// Publish the client's current view on its topic.
    ///
    /// A client without any configuration has nothing to distribute and
    /// yields `NotFound`. After the distributor was shut down nothing is
    /// published and `PubsubError::Closed` is returned.
    pub async fn distribute_configuration(&self, client_key: &str) -> Result<(), ServiceError> {
        let topic_lock = self.topic_lock(client_key);
        let _serialized = topic_lock.lock().await;

        let view = self.get_configuration_view(client_key).await?;
        if view.data.is_empty() {
            error!(client_key = %client_key, "configuration data is empty");
            return Err(ServiceError::NotFound(format!(
                "configuration data for '{client_key}'"
            )));
        }

        self.distributor.attach(client_key).inspect_err(|e| {
            warn!(client_key = %client_key, error = %e, "distributor is shut down, skipping distribution");
        })?;
        self.pubsub
            .publish(client_key, || Payload::json(&view.data))
            .await
            .inspect_err(|e| error!(client_key = %client_key, error = %e, "failed to distribute configuration"))?;
        debug!(client_key = %client_key, fields = view.data.len(), "configuration distributed");
        Ok(())
    }

    fn topic_lock(&self, client_key: &str) -> Arc<tokio::sync::Mutex<()>> {
        if let Some(existing) = self.topic_locks.get(client_key) {
            return Arc::clone(existing.value());
        }
        let entry = self
            .topic_locks
            .entry(client_key.to_string())
            .or_default();
        Arc::clone(entry.value())
    }

    fn spawn_distribution(&self, client_key: &str) {
        let service = self.clone();
        let client_key = client_key.to_string();
        let mut distributions = self.distributions();
        // reap finished distributions so the set only holds in-flight work
        while let Some(joined) = distributions.try_join_next() {
            if let Err(e) = joined {
                error!(error = %e, "distribution task ended abnormally");
            }
        }
        distributions.spawn(async move {
            // errors are already logged inside
            let _ = service.distribute_configuration(&client_key).await;
        });
    }

    fn distributions(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.distributions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Distributions spawned and not yet reaped.
    pub fn pending_distributions(&self) -> usize {
        self.distributions().len()
    }

    /// Wait for every distribution started by a write so far.
    pub async fn wait_distributions(&self) {
        let mut pending = std::mem::take(&mut *self.distributions());
        while let Some(joined) = pending.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "distribution task ended abnormally");
            }
        }
    }
}

fn require(what: &str, value: &str) -> Result<(), ServiceError> {
    if value.trim().is_empty() {
        return Err(ServiceError::Validation(format!("{what} is required")));
    }
    Ok(())
}
