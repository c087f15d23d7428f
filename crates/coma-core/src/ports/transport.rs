//! Transport port - クライアントへの配送路
//!
//! `Distributor` がトピック（client key）ごとのメッセージをここへ流す。
//! 実際の WebSocket 実装は範囲外で、CLI はログ出力、テストは記録用の実装を使う。

use async_trait::async_trait;

/// Boxed error returned by a transport.
pub type TransportError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver one message to every client listening on `topic`.
    async fn send(&self, topic: &str, payload: &str) -> Result<(), TransportError>;
}
