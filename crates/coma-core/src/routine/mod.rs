//! Routine: run named lookups concurrently and collect every failure.
//!
//! A `Routine` is declared first (`register` only records work) and then
//! executed once with `start`, which spawns one tokio task per registered
//! task and waits for all of them. Successful results land in the caller's
//! `Slot`s; failures are collected in completion order. A failing task never
//! cancels its siblings.
//!
//! ```ignore
//! let application = Slot::new();
//! let key = Slot::new();
//!
//! let mut routine = Routine::new();
//! routine
//!     .register("findApplication", &application, find_application, application_id)
//!     .register("findKey", &key, find_key, filter);
//! routine.start().await;
//!
//! if let Some(first) = routine.into_error() {
//!     return Err(first.into());
//! }
//! ```

mod error;
mod slot;

pub use self::error::RoutineError;
pub use self::slot::Slot;

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

/// Writes a finished task's value into its slot.
///
/// Commits run on the caller's side of the join barrier, so a task that
/// finishes after a timeout never touches its slot.
type Commit = Box<dyn FnOnce() + Send>;

enum Work<E> {
    Async(Box<dyn FnOnce() -> BoxFuture<'static, Result<Commit, E>> + Send>),
    Blocking(Box<dyn FnOnce() -> Result<Commit, E> + Send>),
}

struct PendingTask<E> {
    name: String,
    work: Work<E>,
}

type Settled<E> = (String, Result<Result<Commit, E>, String>);

/// One orchestration run.
///
/// `E` is the error type every registered work function reports.
pub struct Routine<E>
where
    E: std::error::Error + Send + 'static,
{
    tasks: Vec<PendingTask<E>>,
    errors: Vec<RoutineError<E>>,
    settled: bool,
}

impl<E> Routine<E>
where
    E: std::error::Error + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            errors: Vec::new(),
            settled: false,
        }
    }

    /// Register an async task.
    ///
    /// `work` is called with `args` when the routine starts. On `Ok(value)`
    /// the value is written into `slot`; on `Err` the slot is left untouched
    /// and the error is recorded under `name`.
    pub fn register<T, A, F, Fut>(
        &mut self,
        name: impl Into<String>,
        slot: &Slot<T>,
        work: F,
        args: A,
    ) -> &mut Self
    where
        T: Send + 'static,
        A: Send + 'static,
        F: FnOnce(A) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let slot = slot.clone();
        let run = move || -> BoxFuture<'static, Result<Commit, E>> {
            async move {
                let value = work(args).await?;
                Ok(Box::new(move || {
                    slot.fill(value);
                }) as Commit)
            }
            .boxed()
        };
        self.push(name.into(), Work::Async(Box::new(run)))
    }

    /// Register a synchronous task. It runs on tokio's blocking pool.
    pub fn register_blocking<T, A, F>(
        &mut self,
        name: impl Into<String>,
        slot: &Slot<T>,
        work: F,
        args: A,
    ) -> &mut Self
    where
        T: Send + 'static,
        A: Send + 'static,
        F: FnOnce(A) -> Result<T, E> + Send + 'static,
    {
        let slot = slot.clone();
        let run = move || -> Result<Commit, E> {
            let value = work(args)?;
            Ok(Box::new(move || {
                slot.fill(value);
            }) as Commit)
        };
        self.push(name.into(), Work::Blocking(Box::new(run)))
    }

    fn push(&mut self, name: String, work: Work<E>) -> &mut Self {
        // Duplicate names are legal; they only make error attribution ambiguous.
        if self.tasks.iter().any(|t| t.name == name) {
            warn!(task = %name, "duplicate task name registered in routine");
        }
        self.tasks.push(PendingTask { name, work });
        self
    }

    /// Run every registered task concurrently and wait for all of them.
    ///
    /// Registered tasks are consumed: each one executes at most once.
    pub async fn start(&mut self) {
        self.run(None).await;
    }

    /// Like `start`, but gives up waiting after `limit`.
    ///
    /// Tasks still running at the deadline are aborted (blocking tasks are
    /// detached), their slots stay empty, and a `RoutineError::TimedOut`
    /// listing them is recorded.
    pub async fn start_with_timeout(&mut self, limit: Duration) {
        self.run(Some(limit)).await;
    }

    async fn run(&mut self, limit: Option<Duration>) {
        let tasks = std::mem::take(&mut self.tasks);
        let mut pending: Vec<String> = tasks.iter().map(|t| t.name.clone()).collect();

        let mut set: JoinSet<Settled<E>> = JoinSet::new();
        for PendingTask { name, work } in tasks {
            match work {
                Work::Async(make) => {
                    set.spawn(async move {
                        let outcome = AssertUnwindSafe(async move { make().await })
                            .catch_unwind()
                            .await
                            .map_err(|payload| panic_message(&payload));
                        (name, outcome)
                    });
                }
                Work::Blocking(run) => {
                    set.spawn_blocking(move || {
                        let outcome = std::panic::catch_unwind(AssertUnwindSafe(run))
                            .map_err(|payload| panic_message(&payload));
                        (name, outcome)
                    });
                }
            }
        }

        let deadline = limit.map(|limit| (limit, tokio::time::Instant::now() + limit));
        loop {
            let joined = match deadline {
                Some((after, at)) => match tokio::time::timeout_at(at, set.join_next()).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        set.abort_all();
                        warn!(?after, pending = ?pending, "routine timed out");
                        self.errors.push(RoutineError::TimedOut {
                            after,
                            pending: std::mem::take(&mut pending),
                        });
                        break;
                    }
                },
                None => set.join_next().await,
            };
            let Some(joined) = joined else {
                break;
            };

            let (name, outcome) = match joined {
                Ok(settled) => settled,
                Err(join_error) => {
                    // panics are caught inside the task, so this is a cancellation
                    warn!(error = %join_error, "routine task did not complete");
                    continue;
                }
            };
            if let Some(pos) = pending.iter().position(|p| *p == name) {
                pending.remove(pos);
            }

            match outcome {
                Ok(Ok(commit)) => {
                    commit();
                    debug!(task = %name, "routine task succeeded");
                }
                Ok(Err(source)) => {
                    debug!(task = %name, error = %source, "routine task failed");
                    self.errors.push(RoutineError::Failed { task: name, source });
                }
                Err(message) => {
                    error!(task = %name, panic = %message, "routine task panicked");
                    self.errors.push(RoutineError::Panicked {
                        task: name,
                        message,
                    });
                }
            }
        }

        // Tasks that vanished without reporting (runtime shutdown) still count.
        for task in pending {
            self.errors.push(RoutineError::Panicked {
                task,
                message: "task was cancelled before completing".to_string(),
            });
        }
        self.settled = true;
    }

    /// Has `start` (or `start_with_timeout`) returned at least once?
    pub fn is_settled(&self) -> bool {
        self.settled
    }

    pub fn is_error(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Every failure, in the order the tasks settled.
    pub fn errors(&self) -> &[RoutineError<E>] {
        &self.errors
    }

    /// The first failure, if any.
    pub fn error(&self) -> Option<&RoutineError<E>> {
        self.errors.first()
    }

    pub fn into_errors(self) -> Vec<RoutineError<E>> {
        self.errors
    }

    pub fn into_error(self) -> Option<RoutineError<E>> {
        self.errors.into_iter().next()
    }

    /// Names of the tasks registered but not yet started.
    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl<E> Default for Routine<E>
where
    E: std::error::Error + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Barrier;

    #[derive(Debug, thiserror::Error)]
    enum LookupError {
        #[error("not found")]
        NotFound,
        #[error("{0}")]
        Other(String),
    }

    async fn ok_after(value: i32, delay_ms: u64) -> Result<i32, LookupError> {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        Ok(value)
    }

    async fn fail_after(message: String, delay_ms: u64) -> Result<i32, LookupError> {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        Err(LookupError::Other(message))
    }

    #[tokio::test]
    async fn one_success_one_failure() {
        let slot_a = Slot::new();
        let slot_b: Slot<i32> = Slot::new();

        let mut routine = Routine::new();
        routine
            .register("A", &slot_a, |()| async { Ok(1) }, ())
            .register("B", &slot_b, |()| async { Err(LookupError::NotFound) }, ());
        routine.start().await;

        assert_eq!(slot_a.get(), Some(1));
        assert!(!slot_b.is_filled());
        assert!(routine.is_error());

        let messages: Vec<String> = routine
            .errors()
            .iter()
            .map(|e| match e {
                RoutineError::Failed { source, .. } => source.to_string(),
                other => panic!("unexpected error: {other}"),
            })
            .collect();
        assert_eq!(messages, vec!["not found".to_string()]);
        assert_eq!(routine.error().and_then(|e| e.task()), Some("B"));
    }

    #[rstest]
    #[case::empty(0, 0)]
    #[case::all_ok(3, 0)]
    #[case::one_failure(3, 1)]
    #[case::all_fail(4, 4)]
    #[tokio::test]
    async fn error_count_matches_failures(#[case] k: usize, #[case] e: usize) {
        let slots: Vec<Slot<usize>> = (0..k).map(|_| Slot::new()).collect();
        let mut routine = Routine::new();
        for (i, slot) in slots.iter().enumerate() {
            let fails = i < e;
            routine.register(
                format!("task-{i}"),
                slot,
                move |n: usize| async move {
                    if fails {
                        Err(LookupError::Other(format!("task-{n} failed")))
                    } else {
                        Ok(n)
                    }
                },
                i,
            );
        }
        routine.start().await;

        assert!(routine.is_settled());
        assert_eq!(routine.is_error(), e > 0);
        assert_eq!(routine.errors().len(), e);
        let filled = slots.iter().filter(|s| s.is_filled()).count();
        assert_eq!(filled, k - e);
    }

    #[tokio::test]
    async fn start_waits_for_every_task() {
        let slow = Slot::new();
        let fast = Slot::new();

        let mut routine = Routine::new();
        routine
            .register("slow", &slow, |v| ok_after(v, 80), 7)
            .register("fast", &fast, |v| ok_after(v, 0), 8);
        routine.start().await;

        assert_eq!(slow.get(), Some(7));
        assert_eq!(fast.get(), Some(8));
        assert!(!routine.is_error());
    }

    #[tokio::test]
    async fn failure_does_not_short_circuit_siblings() {
        let done = Arc::new(AtomicUsize::new(0));
        let slow = Slot::new();
        let failing: Slot<i32> = Slot::new();

        let mut routine = Routine::new();
        let counter = Arc::clone(&done);
        routine
            .register("failing", &failing, |m| fail_after(m, 0), "boom".to_string())
            .register(
                "slow",
                &slow,
                move |()| async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, LookupError>("done")
                },
                (),
            );
        routine.start().await;

        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert_eq!(slow.get(), Some("done"));
        assert_eq!(routine.errors().len(), 1);
    }

    #[tokio::test]
    async fn errors_are_in_completion_order() {
        let a: Slot<i32> = Slot::new();
        let b: Slot<i32> = Slot::new();

        let mut routine = Routine::new();
        routine
            .register("late", &a, |m| fail_after(m, 100), "late".to_string())
            .register("early", &b, |m| fail_after(m, 0), "early".to_string());
        routine.start().await;

        let order: Vec<&str> = routine.errors().iter().filter_map(|e| e.task()).collect();
        assert_eq!(order, vec!["early", "late"]);
    }

    #[tokio::test]
    async fn tasks_run_concurrently() {
        // Both tasks must be in flight at once to pass the barrier.
        let barrier = Arc::new(Barrier::new(2));
        let first = Slot::new();
        let second = Slot::new();

        let mut routine = Routine::new();
        for (name, slot) in [("first", &first), ("second", &second)] {
            routine.register(
                name,
                slot,
                |barrier: Arc<Barrier>| async move {
                    barrier.wait().await;
                    Ok::<_, LookupError>(true)
                },
                Arc::clone(&barrier),
            );
        }

        tokio::time::timeout(Duration::from_secs(2), routine.start())
            .await
            .expect("tasks were not run concurrently");
        assert_eq!(first.get(), Some(true));
        assert_eq!(second.get(), Some(true));
    }

    #[tokio::test]
    async fn panic_is_recorded_not_propagated() {
        let ok = Slot::new();
        let broken: Slot<i32> = Slot::new();

        let mut routine = Routine::new();
        routine
            .register("ok", &ok, |v| ok_after(v, 10), 1)
            .register(
                "broken",
                &broken,
                |()| async {
                    if true {
                        panic!("repository exploded");
                    }
                    Ok::<i32, LookupError>(0)
                },
                (),
            );
        routine.start().await;

        assert_eq!(ok.get(), Some(1));
        assert!(!broken.is_filled());
        match routine.error() {
            Some(RoutineError::Panicked { task, message }) => {
                assert_eq!(task, "broken");
                assert!(message.contains("repository exploded"));
            }
            other => panic!("expected panic error, got {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn blocking_tasks_fill_slots_and_catch_panics() {
        let sum = Slot::new();
        let broken: Slot<u32> = Slot::new();

        let mut routine = Routine::new();
        routine
            .register_blocking(
                "sum",
                &sum,
                |v: Vec<u32>| Ok::<_, LookupError>(v.iter().sum::<u32>()),
                vec![1, 2, 3],
            )
            .register_blocking(
                "broken",
                &broken,
                |()| -> Result<u32, LookupError> { panic!("sync panic") },
                (),
            );
        routine.start().await;

        assert_eq!(sum.get(), Some(6));
        assert_eq!(routine.errors().len(), 1);
        assert_eq!(routine.error().and_then(|e| e.task()), Some("broken"));
    }

    #[tokio::test]
    async fn timeout_is_a_distinct_error() {
        let fast = Slot::new();
        let hung: Slot<i32> = Slot::new();

        let mut routine = Routine::new();
        routine
            .register("fast", &fast, |v| ok_after(v, 0), 1)
            .register("hung", &hung, |v| ok_after(v, 10_000), 2);
        routine
            .start_with_timeout(Duration::from_millis(100))
            .await;

        assert_eq!(fast.get(), Some(1));
        assert!(!hung.is_filled());
        assert_eq!(routine.errors().len(), 1);
        match routine.error() {
            Some(RoutineError::TimedOut { pending, .. }) => {
                assert_eq!(pending, &vec!["hung".to_string()]);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(routine.error().is_some_and(RoutineError::is_timeout));
    }

    #[tokio::test]
    async fn error_views_are_idempotent() {
        let slot: Slot<i32> = Slot::new();
        let mut routine = Routine::new();
        routine.register("x", &slot, |()| async { Err(LookupError::NotFound) }, ());
        routine.start().await;

        let first: Vec<String> = routine.errors().iter().map(ToString::to_string).collect();
        let second: Vec<String> = routine.errors().iter().map(ToString::to_string).collect();
        assert_eq!(first, second);
        assert_eq!(routine.is_error(), routine.is_error());
        assert_eq!(first, vec!["task 'x' failed: not found".to_string()]);
    }

    #[tokio::test]
    async fn registration_is_declarative_and_tasks_run_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let slot = Slot::new();

        let mut routine = Routine::new();
        let counter = Arc::clone(&calls);
        routine.register(
            "count",
            &slot,
            move |()| async move { Ok::<_, LookupError>(counter.fetch_add(1, Ordering::SeqCst)) },
            (),
        );
        assert_eq!(routine.task_names(), vec!["count"]);
        tokio::task::yield_now().await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        routine.start().await;
        routine.start().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(routine.is_empty());
        assert_eq!(slot.get(), Some(0));
    }

    #[tokio::test]
    async fn into_error_returns_the_task_source() {
        let slot: Slot<i32> = Slot::new();
        let mut routine = Routine::new();
        routine.register("lookup", &slot, |()| async { Err(LookupError::NotFound) }, ());
        routine.start().await;

        let source = routine
            .into_error()
            .map(RoutineError::into_source)
            .expect("one error");
        assert!(matches!(source, Ok(LookupError::NotFound)));
    }
}
