//! Repository ports - 永続化の抽象化
//!
//! サービス層はここで定義する reader / writer trait にだけ依存する。
//! 実装はテスト・デモ用の `InMemoryStore` のみ（DB 実装は別クレート想定）。
//!
//! # 設計原則
//! - reader と writer を分離（読み取り専用の差し替えを容易にする）
//! - 「見つからない」は `Ok(None)` / 空の `Configurations` で返す
//! - `RepositoryError` はバックエンドの障害だけを表す

use async_trait::async_trait;

use crate::domain::{
    Application, ApplicationId, ApplicationKey, ApplicationKeyFilter, Configuration,
    ConfigurationFilter, ConfigurationId, Configurations,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("backend failure: {0}")]
    Backend(String),
}

#[async_trait]
pub trait ApplicationReader: Send + Sync {
    async fn find_application(
        &self,
        id: ApplicationId,
    ) -> Result<Option<Application>, RepositoryError>;
}

#[async_trait]
pub trait ApplicationKeyReader: Send + Sync {
    /// Fails with `InvalidFilter` when `filter` is not valid.
    async fn find_application_key(
        &self,
        filter: &ApplicationKeyFilter,
    ) -> Result<Option<ApplicationKey>, RepositoryError>;
}

#[async_trait]
pub trait ApplicationKeyWriter: Send + Sync {
    /// Create the key of an application, or replace the existing one.
    async fn save_application_key(&self, key: &ApplicationKey) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ConfigurationReader: Send + Sync {
    async fn find_configurations(
        &self,
        filter: &ConfigurationFilter,
    ) -> Result<Configurations, RepositoryError>;
}

#[async_trait]
pub trait ConfigurationWriter: Send + Sync {
    async fn insert_configuration(
        &self,
        configuration: &Configuration,
    ) -> Result<ConfigurationId, RepositoryError>;

    /// Fails with `NotFound` when no stored entry has the same id.
    async fn update_configuration(
        &self,
        configuration: &Configuration,
    ) -> Result<(), RepositoryError>;

    /// Returns how many entries were removed.
    async fn delete_configurations(
        &self,
        filter: &ConfigurationFilter,
    ) -> Result<usize, RepositoryError>;
}
