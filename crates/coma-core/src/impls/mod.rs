//! Impls - 実装（開発用・テスト用）
//!
//! ports の in-memory 実装。
//! - **InMemoryStore**: 全リポジトリ port
//! - **InMemoryTransport**: 送信内容を記録する Transport

pub mod inmem_store;
pub mod inmem_transport;

pub use self::inmem_store::InMemoryStore;
pub use self::inmem_transport::InMemoryTransport;
