/// Boxed error returned by a payload producer.
pub type ProduceError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum PubsubError {
    /// The producer function failed; nothing was enqueued.
    #[error("failed to produce message: {0}")]
    Produce(#[source] ProduceError),

    /// A buffered payload is not a valid UTF-8 message.
    #[error("failed to decode message: {0}")]
    Decode(#[from] std::string::FromUtf8Error),

    /// The publisher was closed before the payload could be enqueued.
    #[error("publisher is closed")]
    Closed,

    /// `try_publish` found the queue at capacity.
    #[error("publisher is full (capacity {capacity})")]
    Full { capacity: usize },
}
