//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # Fail-fast 設計
//! - 全 port の実装が揃っているかを build() 時にチェック
//! - 不足があれば「足りないもの全部」を BuildError で返す（最初の 1 つではない）
//! - 設定値の検証もここで行う

use std::sync::Arc;

use crate::app::application_key::ApplicationKeyService;
use crate::app::configuration::ConfigurationService;
use crate::app::distributor::Distributor;
use crate::config::{ComaConfig, ConfigError};
use crate::ports::{
    ApplicationKeyReader, ApplicationKeyWriter, ApplicationReader, ConfigurationReader,
    ConfigurationWriter, Transport,
};
use crate::pubsub::Pubsub;

/// AppBuilder は port の実装を受け取り App を構築
///
/// # 使用例
/// ```ignore
/// let store = Arc::new(InMemoryStore::new());
/// let app = AppBuilder::new(config)
///     .repositories(store)
///     .transport(Arc::new(InMemoryTransport::new()))
///     .build()?;
/// ```
pub struct AppBuilder {
    config: ComaConfig,
    application_reader: Option<Arc<dyn ApplicationReader>>,
    application_key_reader: Option<Arc<dyn ApplicationKeyReader>>,
    application_key_writer: Option<Arc<dyn ApplicationKeyWriter>>,
    configuration_reader: Option<Arc<dyn ConfigurationReader>>,
    configuration_writer: Option<Arc<dyn ConfigurationWriter>>,
    transport: Option<Arc<dyn Transport>>,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing components: {0:?}. These ports must be provided before build().")]
    MissingComponents(Vec<String>),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl AppBuilder {
    pub fn new(config: ComaConfig) -> Self {
        Self {
            config,
            application_reader: None,
            application_key_reader: None,
            application_key_writer: None,
            configuration_reader: None,
            configuration_writer: None,
            transport: None,
        }
    }

    pub fn application_reader(mut self, reader: Arc<dyn ApplicationReader>) -> Self {
        self.application_reader = Some(reader);
        self
    }

    pub fn application_key_reader(mut self, reader: Arc<dyn ApplicationKeyReader>) -> Self {
        self.application_key_reader = Some(reader);
        self
    }

    pub fn application_key_writer(mut self, writer: Arc<dyn ApplicationKeyWriter>) -> Self {
        self.application_key_writer = Some(writer);
        self
    }

    pub fn configuration_reader(mut self, reader: Arc<dyn ConfigurationReader>) -> Self {
        self.configuration_reader = Some(reader);
        self
    }

    pub fn configuration_writer(mut self, writer: Arc<dyn ConfigurationWriter>) -> Self {
        self.configuration_writer = Some(writer);
        self
    }

    /// 1 つのストアが全リポジトリ port を実装している場合のショートカット
    pub fn repositories<S>(self, store: Arc<S>) -> Self
    where
        S: ApplicationReader
            + ApplicationKeyReader
            + ApplicationKeyWriter
            + ConfigurationReader
            + ConfigurationWriter
            + 'static,
    {
        self.application_reader(store.clone())
            .application_key_reader(store.clone())
            .application_key_writer(store.clone())
            .configuration_reader(store.clone())
            .configuration_writer(store)
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// AppBuilder を検証して App を生成
    ///
    /// # 検証
    /// - 設定値（ComaConfig::validate）
    /// - 全 port が設定済みか。不足分は BuildError::MissingComponents にまとめて返す
    pub fn build(self) -> Result<App, BuildError> {
        self.config.validate()?;

        let missing: Vec<String> = [
            ("application_reader", self.application_reader.is_none()),
            ("application_key_reader", self.application_key_reader.is_none()),
            ("application_key_writer", self.application_key_writer.is_none()),
            ("configuration_reader", self.configuration_reader.is_none()),
            ("configuration_writer", self.configuration_writer.is_none()),
            ("transport", self.transport.is_none()),
        ]
        .into_iter()
        .filter(|(_, absent)| *absent)
        .map(|(name, _)| name.to_string())
        .collect();

        let (
            Some(application_reader),
            Some(application_key_reader),
            Some(application_key_writer),
            Some(configuration_reader),
            Some(configuration_writer),
            Some(transport),
        ) = (
            self.application_reader,
            self.application_key_reader,
            self.application_key_writer,
            self.configuration_reader,
            self.configuration_writer,
            self.transport,
        )
        else {
            return Err(BuildError::MissingComponents(missing));
        };

        let pubsub = Arc::new(Pubsub::new(self.config.pubsub.default_capacity));
        let distributor = Arc::new(Distributor::new(Arc::clone(&pubsub), transport));
        let application_keys = ApplicationKeyService::new(
            application_reader,
            application_key_reader,
            application_key_writer,
            self.config.application.key_length,
            self.config.routine.timeout(),
        );
        let configurations = ConfigurationService::new(
            configuration_reader,
            configuration_writer,
            Arc::clone(&pubsub),
            Arc::clone(&distributor),
        );

        Ok(App {
            config: self.config,
            pubsub,
            distributor,
            application_keys,
            configurations,
        })
    }
}

/// App は構築済みのサービス群
pub struct App {
    pub config: ComaConfig,
    pub pubsub: Arc<Pubsub>,
    pub distributor: Arc<Distributor>,
    pub application_keys: ApplicationKeyService,
    pub configurations: ConfigurationService,
}

impl App {
    /// 実行中の配信を待ち、全トピックを閉じて consumer の終了を待つ
    pub async fn shutdown(&self) {
        self.configurations.wait_distributions().await;
        self.distributor.shutdown_and_join().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Application;
    use crate::impls::{InMemoryStore, InMemoryTransport};

    #[test]
    fn test_build_missing_all_components() {
        let result = AppBuilder::new(ComaConfig::default()).build();
        assert!(matches!(
            result,
            Err(BuildError::MissingComponents(missing)) if missing == vec![
                "application_reader",
                "application_key_reader",
                "application_key_writer",
                "configuration_reader",
                "configuration_writer",
                "transport",
            ]
        ));
    }

    #[test]
    fn test_build_missing_transport_only() {
        let result = AppBuilder::new(ComaConfig::default())
            .repositories(Arc::new(InMemoryStore::new()))
            .build();
        assert!(matches!(
            result,
            Err(BuildError::MissingComponents(missing)) if missing == vec!["transport"]
        ));
    }

    #[test]
    fn test_build_invalid_config() {
        let mut config = ComaConfig::default();
        config.pubsub.default_capacity = 0;
        let result = AppBuilder::new(config)
            .repositories(Arc::new(InMemoryStore::new()))
            .transport(Arc::new(InMemoryTransport::new()))
            .build();
        assert!(matches!(result, Err(BuildError::Config(ConfigError::Invalid(_)))));
    }

    #[tokio::test]
    async fn test_build_success_wires_services() {
        let store = Arc::new(InMemoryStore::new());
        let transport = Arc::new(InMemoryTransport::new());
        let mut config = ComaConfig::default();
        config.application.key_length = 12;
        config.pubsub.default_capacity = 2;

        let app = AppBuilder::new(config)
            .repositories(store.clone())
            .transport(transport.clone())
            .build()
            .unwrap();

        let application = Application::new("billing");
        store.add_application(application.clone()).await;
        let generated = app
            .application_keys
            .generate_or_update_application_key(&application.id.to_string())
            .await
            .unwrap();
        assert_eq!(generated.key.len(), 12);

        app.configurations
            .set_configuration(&generated.key, "PORT", Some("80".to_string()))
            .await
            .unwrap();
        app.shutdown().await;

        assert_eq!(app.pubsub.default_capacity(), 2);
        assert_eq!(transport.sent_to(&generated.key), vec![r#"{"PORT":"80"}"#]);
    }
}
