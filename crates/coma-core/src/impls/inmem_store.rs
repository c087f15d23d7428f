//! InMemoryStore - 開発用・テスト用のリポジトリ実装
//!
//! # 実装詳細
//! - 全リポジトリ port を 1 つの構造体で実装
//! - tokio の Mutex で排他制御（await を跨いでロックしない）
//! - configuration は挿入順を保持（JSON view の「後勝ち」が安定する）

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{
    Application, ApplicationId, ApplicationKey, ApplicationKeyFilter, Configuration,
    ConfigurationFilter, ConfigurationId, Configurations,
};
use crate::ports::{
    ApplicationKeyReader, ApplicationKeyWriter, ApplicationReader, ConfigurationReader,
    ConfigurationWriter, RepositoryError,
};

#[derive(Default)]
struct Tables {
    applications: HashMap<ApplicationId, Application>,
    /// One key per application.
    keys: HashMap<ApplicationId, ApplicationKey>,
    configurations: Vec<Configuration>,
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_application(&self, application: Application) {
        let mut tables = self.tables.lock().await;
        tables.applications.insert(application.id, application);
    }

    /// While set, every operation fails with `RepositoryError::Backend`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), RepositoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::Backend("store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ApplicationReader for InMemoryStore {
    async fn find_application(
        &self,
        id: ApplicationId,
    ) -> Result<Option<Application>, RepositoryError> {
        self.check_available()?;
        let tables = self.tables.lock().await;
        Ok(tables.applications.get(&id).cloned())
    }
}

#[async_trait]
impl ApplicationKeyReader for InMemoryStore {
    async fn find_application_key(
        &self,
        filter: &ApplicationKeyFilter,
    ) -> Result<Option<ApplicationKey>, RepositoryError> {
        self.check_available()?;
        if !filter.is_valid() {
            return Err(RepositoryError::InvalidFilter(
                "application id is required".to_string(),
            ));
        }
        let tables = self.tables.lock().await;
        Ok(tables.keys.values().find(|k| filter.matches(k)).cloned())
    }
}

#[async_trait]
impl ApplicationKeyWriter for InMemoryStore {
    async fn save_application_key(&self, key: &ApplicationKey) -> Result<(), RepositoryError> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        if !tables.applications.contains_key(&key.application_id) {
            return Err(RepositoryError::NotFound {
                entity: "application",
                key: key.application_id.to_string(),
            });
        }
        match tables.keys.get_mut(&key.application_id) {
            // keep the original key id, only the secret rotates
            Some(existing) => existing.key.clone_from(&key.key),
            None => {
                tables.keys.insert(key.application_id, key.clone());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ConfigurationReader for InMemoryStore {
    async fn find_configurations(
        &self,
        filter: &ConfigurationFilter,
    ) -> Result<Configurations, RepositoryError> {
        self.check_available()?;
        let tables = self.tables.lock().await;
        let found: Vec<Configuration> = tables
            .configurations
            .iter()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        Ok(Configurations::from(found))
    }
}

#[async_trait]
impl ConfigurationWriter for InMemoryStore {
    async fn insert_configuration(
        &self,
        configuration: &Configuration,
    ) -> Result<ConfigurationId, RepositoryError> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        if tables.configurations.iter().any(|c| c.id == configuration.id) {
            return Err(RepositoryError::Conflict(format!(
                "configuration {} already stored",
                configuration.id
            )));
        }
        tables.configurations.push(configuration.clone());
        Ok(configuration.id)
    }

    async fn update_configuration(
        &self,
        configuration: &Configuration,
    ) -> Result<(), RepositoryError> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        let stored = tables
            .configurations
            .iter_mut()
            .find(|c| c.id == configuration.id)
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "configuration",
                key: configuration.id.to_string(),
            })?;
        *stored = configuration.clone();
        Ok(())
    }

    async fn delete_configurations(
        &self,
        filter: &ConfigurationFilter,
    ) -> Result<usize, RepositoryError> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        let before = tables.configurations.len();
        tables.configurations.retain(|c| !filter.matches(c));
        Ok(before - tables.configurations.len())
    }
}
