//! Pubsub: bounded per-topic queues between configuration writes and delivery.
//!
//! - **Publisher**: fixed-capacity FIFO with close-to-drain semantics
//! - **Pubsub**: topic registry, one publisher per topic
//! - **Subscription**: consumer handle for one topic

mod error;
mod payload;
mod publisher;
mod registry;

pub use self::error::{ProduceError, PubsubError};
pub use self::payload::Payload;
pub use self::publisher::Publisher;
pub use self::registry::{Pubsub, Subscription};
