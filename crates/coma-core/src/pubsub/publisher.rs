//! Bounded FIFO buffer between one producer side and one consumer side.
//!
//! Implementation notes:
//! - `std::sync::Mutex` guards the buffer; it is never held across an await.
//! - Two `Notify`s signal "a slot was freed" and "a payload arrived".
//! - Each waiter creates its `Notified` future before inspecting the state,
//!   so a notification between the check and the await is not lost.
//! - Wakeups use `notify_waiters`: every registered waiter rechecks the
//!   buffer, so back-to-back pops release every producer that fits.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use super::error::{ProduceError, PubsubError};
use super::payload::Payload;

struct PublisherState {
    buffer: VecDeque<Payload>,
    closed: bool,
}

pub struct Publisher {
    state: Mutex<PublisherState>,
    capacity: usize,
    not_full: Notify,
    not_empty: Notify,
}

impl Publisher {
    /// Create a publisher holding at most `capacity` payloads.
    ///
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(PublisherState {
                buffer: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            capacity,
            not_full: Notify::new(),
            not_empty: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PublisherState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Produce a payload and append it, waiting while the buffer is full.
    ///
    /// If `produce` fails its error is returned and the buffer is untouched.
    pub async fn publish<F, E>(&self, produce: F) -> Result<(), PubsubError>
    where
        F: FnOnce() -> Result<Payload, E>,
        E: Into<ProduceError>,
    {
        let payload = produce().map_err(|e| PubsubError::Produce(e.into()))?;

        loop {
            let notified = self.not_full.notified();
            {
                let mut state = self.lock();
                if state.closed {
                    return Err(PubsubError::Closed);
                }
                if state.buffer.len() < self.capacity {
                    state.buffer.push_back(payload);
                    drop(state);
                    self.not_empty.notify_waiters();
                    return Ok(());
                }
            }
            notified.await;
        }
    }

    /// Like `publish`, but fails with `PubsubError::Full` instead of waiting.
    pub fn try_publish<F, E>(&self, produce: F) -> Result<(), PubsubError>
    where
        F: FnOnce() -> Result<Payload, E>,
        E: Into<ProduceError>,
    {
        let payload = produce().map_err(|e| PubsubError::Produce(e.into()))?;

        let mut state = self.lock();
        if state.closed {
            return Err(PubsubError::Closed);
        }
        if state.buffer.len() >= self.capacity {
            return Err(PubsubError::Full {
                capacity: self.capacity,
            });
        }
        state.buffer.push_back(payload);
        drop(state);
        self.not_empty.notify_waiters();
        Ok(())
    }

    /// Signal that nothing more will be published.
    ///
    /// Returns `true` if this call closed the publisher. Suspended producers
    /// fail with `Closed`; consumers keep receiving what is buffered.
    pub fn close(&self) -> bool {
        {
            let mut state = self.lock();
            if state.closed {
                return false;
            }
            state.closed = true;
        }
        self.not_full.notify_waiters();
        self.not_empty.notify_waiters();
        true
    }

    /// Wait for the next payload. `None` once closed and empty.
    pub async fn next_payload(&self) -> Option<Payload> {
        loop {
            let notified = self.not_empty.notified();
            {
                let mut state = self.lock();
                if let Some(payload) = state.buffer.pop_front() {
                    drop(state);
                    self.not_full.notify_waiters();
                    return Some(payload);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Wait for the next message and decode it.
    ///
    /// A payload that fails to decode is reported on its own; the following
    /// messages are still delivered.
    pub async fn next_message(&self) -> Option<Result<String, PubsubError>> {
        let payload = self.next_payload().await?;
        Some(payload.decode().map_err(PubsubError::from))
    }

    /// Consume every message until the publisher is closed and empty.
    ///
    /// The first payload that fails to decode aborts the whole drain; the
    /// messages decoded so far are discarded.
    pub async fn drain(&self) -> Result<Vec<String>, PubsubError> {
        let mut messages = Vec::new();
        while let Some(payload) = self.next_payload().await {
            messages.push(payload.decode()?);
        }
        Ok(messages)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().buffer.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Publisher")
            .field("capacity", &self.capacity)
            .field("len", &state.buffer.len())
            .field("closed", &state.closed)
            .finish()
    }
}
