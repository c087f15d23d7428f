//! coma-core
//!
//! Core building blocks for the Coma configuration service.
//!
//! # モジュール構成
//! - **routine**: 名前付きタスクの並行実行とエラー収集（Routine, Slot）
//! - **pubsub**: トピックごとの有界 FIFO キュー（Publisher, Pubsub）
//! - **domain**: ドメインモデル（ids, application, configuration）
//! - **ports**: 抽象化レイヤー（リポジトリ reader / writer, Transport）
//! - **app**: アプリケーション層（AppBuilder, 各サービス, Distributor）
//! - **impls**: in-memory 実装（開発用・テスト用）
//! - **config**: TOML 設定
//! - **error**: サービス層のエラー型

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod ports;
pub mod pubsub;
pub mod routine;

pub use self::config::{ComaConfig, ConfigError};
pub use self::error::ServiceError;
