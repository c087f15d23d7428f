//! App - アプリケーション層
//!
//! ports と routine / pubsub を組み合わせてサービスを実装します。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: port 実装のワイヤリングと起動時検証
//! - **ApplicationKeyService**: アプリケーションキーの発行・照会
//! - **ConfigurationService**: 設定の読み書きと配信トリガー
//! - **Distributor**: トピックごとの consumer（Pubsub → Transport）

pub mod application_key;
pub mod builder;
pub mod configuration;
pub mod distributor;

pub use self::application_key::{ApplicationKeyService, ApplicationKeyView, GeneratedApplicationKey};
pub use self::builder::{App, AppBuilder, BuildError};
pub use self::configuration::{ConfigurationService, ConfigurationView};
pub use self::distributor::Distributor;
