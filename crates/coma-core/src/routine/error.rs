use std::time::Duration;

/// Why one task of a routine (or the routine itself) did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum RoutineError<E>
where
    E: std::error::Error + 'static,
{
    /// The task's work returned an error.
    #[error("task '{task}' failed: {source}")]
    Failed {
        task: String,
        #[source]
        source: E,
    },

    /// The task's work panicked. The panic was contained in the task.
    #[error("task '{task}' panicked: {message}")]
    Panicked { task: String, message: String },

    /// The join barrier ran past the deadline given to `start_with_timeout`.
    #[error("routine timed out after {after:?} (pending: {pending:?})")]
    TimedOut {
        after: Duration,
        pending: Vec<String>,
    },
}

impl<E> RoutineError<E>
where
    E: std::error::Error + 'static,
{
    /// Name of the task this error belongs to, if any.
    pub fn task(&self) -> Option<&str> {
        match self {
            Self::Failed { task, .. } | Self::Panicked { task, .. } => Some(task),
            Self::TimedOut { .. } => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }

    /// The task-reported error, if this is a plain task failure.
    pub fn into_source(self) -> Result<E, Self> {
        match self {
            Self::Failed { source, .. } => Ok(source),
            other => Err(other),
        }
    }
}
