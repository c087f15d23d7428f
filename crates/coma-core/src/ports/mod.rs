//! Ports - 抽象化レイヤー
//!
//! サービス層が外部（ストレージ、クライアント接続）に求めるインターフェース。

pub mod repository;
pub mod transport;

pub use self::repository::{
    ApplicationKeyReader, ApplicationKeyWriter, ApplicationReader, ConfigurationReader,
    ConfigurationWriter, RepositoryError,
};
pub use self::transport::{Transport, TransportError};
