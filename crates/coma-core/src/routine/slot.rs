//! Result slot written by one routine task.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// A write-once location a task stores its successful result into.
///
/// The caller creates the slot, hands a reference to `Routine::register`, and
/// reads it back once the routine has settled. Cloning a slot clones the
/// handle, not the value.
///
/// ```ignore
/// let application = Slot::new();
/// routine.register("findApplication", &application, find_application, id);
/// routine.start().await;
/// let application = application.take();
/// ```
pub struct Slot<T> {
    inner: Arc<Mutex<SlotState<T>>>,
}

struct SlotState<T> {
    value: Option<T>,
    written: bool,
}

impl<T> Slot<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SlotState {
                value: None,
                written: false,
            })),
        }
    }

    /// Store `value` unless the slot was already written.
    ///
    /// Returns `false` (and drops `value`) on a second write.
    pub(crate) fn fill(&self, value: T) -> bool {
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if state.written {
            return false;
        }
        state.value = Some(value);
        state.written = true;
        true
    }

    /// Has a task ever written this slot?
    ///
    /// Stays `true` after `take`.
    pub fn is_filled(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .written
    }

    /// Move the value out, leaving the slot empty (but still written).
    pub fn take(&self) -> Option<T> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .value
            .take()
    }

    /// Apply `f` to the stored value without moving it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        state.value.as_ref().map(f)
    }
}

impl<T: Clone> Slot<T> {
    pub fn get(&self) -> Option<T> {
        self.with(T::clone)
    }
}

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Slot")
            .field("value", &state.value)
            .field("written", &state.written)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_slot_is_empty() {
        let slot: Slot<i32> = Slot::new();
        assert!(!slot.is_filled());
        assert_eq!(slot.get(), None);
    }

    #[test]
    fn slot_is_written_at_most_once() {
        let slot = Slot::new();
        assert!(slot.fill(1));
        assert!(!slot.fill(2));
        assert_eq!(slot.get(), Some(1));
    }

    #[test]
    fn clones_share_the_value() {
        let slot = Slot::new();
        let handle = slot.clone();
        handle.fill("key".to_string());

        assert_eq!(slot.with(|v| v.len()), Some(3));
        assert_eq!(slot.take().as_deref(), Some("key"));
        // take empties the slot but it stays written
        assert!(slot.is_filled());
        assert_eq!(handle.take(), None);
    }
}
