use std::{
    any::Any,
    panic::AssertUnwindSafe,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
};

use futures::FutureExt;
use tokio::{sync::Semaphore, task::JoinSet};

use crate::errors::{Error, TaskError};

use super::{launcher::TaskLauncher, Task, TaskBatchResult};

/// Runs batches of independent tasks with at most `max_workers` in flight.
///
/// On the first failure, tasks that have not been dispatched yet are skipped.
/// Tasks that are already running are left alone and waited on - nothing is
/// killed, so side effects of in-flight tasks are not rolled back.
#[derive(Clone)]
pub struct ParallelTaskRunner {
    max_workers: usize,
    launcher: Arc<dyn TaskLauncher>,
}

impl std::fmt::Debug for ParallelTaskRunner {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ParallelTaskRunner").field("max_workers", &self.max_workers).finish()
    }
}

type FirstError = Arc<Mutex<Option<TaskError>>>;

impl ParallelTaskRunner {
    pub fn new(
        max_workers: usize,
        launcher: Arc<dyn TaskLauncher>,
    ) -> Result<Self, Error> {
        if max_workers == 0 {
            return Err(Error::config("max workers must be at least 1"));
        }
        Ok(Self {
            max_workers,
            launcher,
        })
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Runs one task on the caller's time, outside of any batch.
    pub async fn run_task(
        &self,
        task: &Task,
    ) -> Result<(), TaskError> {
        let id = *task.id();
        log::info!("[TASK {id}] STARTING: {}", task.command());
        let result = launch_guarded(self.launcher.as_ref(), task).await;
        match &result {
            Ok(()) => log::info!("[TASK {id}] COMPLETED"),
            Err(err) => log::error!("[TASK {id}] {err}"),
        }
        result
    }

    pub async fn run_batch(
        &self,
        tasks: Vec<Task>,
    ) -> TaskBatchResult {
        let total = tasks.len();
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let cancelled = Arc::new(AtomicBool::new(false));
        let first_error: FirstError = Default::default();
        let mut in_flight = JoinSet::new();
        let mut dispatched = 0;

        log::debug!("Running batch of {total} tasks with {} workers", self.max_workers);
        for task in tasks {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                // Only happens if the semaphore is closed, which we never do.
                break;
            };
            // Checked after the permit: a failing task raises the flag before
            // giving its permit back.
            if cancelled.load(Ordering::SeqCst) {
                break;
            }
            dispatched += 1;

            let launcher = self.launcher.clone();
            let cancelled = cancelled.clone();
            let first_error = first_error.clone();
            in_flight.spawn(async move {
                let id = *task.id();
                log::info!("[TASK {id}] STARTING: {}", task.command());
                match launch_guarded(launcher.as_ref(), &task).await {
                    Ok(()) => log::info!("[TASK {id}] COMPLETED"),
                    Err(err) => {
                        log::error!("[TASK {id}] Task failed: {err}");
                        cancelled.store(true, Ordering::SeqCst);
                        record_failure(&first_error, err);
                    },
                }
                drop(permit);
            });
        }

        let skipped = total - dispatched;
        if skipped > 0 {
            log::warn!("Cancelled {skipped} of {total} tasks that had not started yet");
        }

        // Barrier: everything that was started gets to finish.
        while let Some(joined) = in_flight.join_next().await {
            if let Err(err) = joined {
                log::error!("Task worker did not complete cleanly: {err}");
            }
        }

        let first_error = first_error.lock().unwrap_or_else(PoisonError::into_inner).take();
        match first_error {
            None => TaskBatchResult::AllSucceeded,
            Some(first_error) => TaskBatchResult::Failed {
                first_error,
                cancelled: skipped,
            },
        }
    }
}

fn record_failure(
    slot: &FirstError,
    err: TaskError,
) {
    let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
    if slot.is_none() {
        *slot = Some(err);
    } else {
        log::debug!("Suppressing subsequent task failure: {err}");
    }
}

async fn launch_guarded(
    launcher: &dyn TaskLauncher,
    task: &Task,
) -> Result<(), TaskError> {
    match AssertUnwindSafe(launcher.launch(task)).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(TaskError::Panicked {
            task: task.command().to_string(),
            message: panic_message(panic.as_ref()),
        }),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::atomic::AtomicUsize,
        time::Duration,
    };

    use futures::future::BoxFuture;

    use super::*;

    /// Fails any task whose command contains "fail"; sleeps on "slow".
    #[derive(Default)]
    struct CountingLauncher {
        running: AtomicUsize,
        peak: AtomicUsize,
        invocations: Mutex<HashMap<String, usize>>,
    }

    impl CountingLauncher {
        fn invocations(
            &self,
            command: &str,
        ) -> usize {
            *self.invocations.lock().unwrap().get(command).unwrap_or(&0)
        }
    }

    impl TaskLauncher for CountingLauncher {
        fn launch<'a>(
            &'a self,
            task: &'a Task,
        ) -> BoxFuture<'a, Result<(), TaskError>> {
            Box::pin(async move {
                *self.invocations.lock().unwrap().entry(task.command().to_string()).or_default() +=
                    1;
                let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                let delay = if task.command().contains("slow") {
                    50
                } else {
                    5
                };
                tokio::time::sleep(Duration::from_millis(delay)).await;
                self.running.fetch_sub(1, Ordering::SeqCst);
                if task.command().contains("panic") {
                    panic!("launcher blew up");
                }
                if task.command().contains("fail") {
                    return Err(TaskError::ExitStatus {
                        task: task.command().to_string(),
                        code: Some(1),
                    });
                }
                Ok(())
            })
        }
    }

    fn tasks(commands: &[&str]) -> Vec<Task> {
        commands.iter().map(|c| Task::new(*c, "/tmp")).collect()
    }

    #[test]
    fn zero_workers_is_rejected() {
        let launcher = Arc::new(CountingLauncher::default());
        assert!(matches!(ParallelTaskRunner::new(0, launcher), Err(Error::Configuration(_))));
    }

    #[tokio::test]
    async fn all_tasks_run_exactly_once() {
        let launcher = Arc::new(CountingLauncher::default());
        let runner = ParallelTaskRunner::new(3, launcher.clone()).unwrap();
        let commands = ["a", "b", "c", "d", "e", "f", "g"];
        let result = runner.run_batch(tasks(&commands)).await;
        assert!(result.is_success());
        for command in commands {
            assert_eq!(launcher.invocations(command), 1, "{command}");
        }
        assert!(launcher.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn empty_batch_succeeds() {
        let launcher = Arc::new(CountingLauncher::default());
        let runner = ParallelTaskRunner::new(2, launcher).unwrap();
        assert!(runner.run_batch(Vec::new()).await.is_success());
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_worker_count() {
        let launcher = Arc::new(CountingLauncher::default());
        let runner = ParallelTaskRunner::new(2, launcher.clone()).unwrap();
        let result = runner.run_batch(tasks(&["slow1", "slow2", "slow3", "slow4", "slow5"])).await;
        assert!(result.is_success());
        assert_eq!(launcher.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failure_skips_tasks_not_yet_started() {
        let launcher = Arc::new(CountingLauncher::default());
        let runner = ParallelTaskRunner::new(1, launcher.clone()).unwrap();
        let result = runner.run_batch(tasks(&["a", "fail-b", "c", "d"])).await;
        match result {
            TaskBatchResult::Failed {
                first_error,
                cancelled,
            } => {
                assert_eq!(first_error.task(), "fail-b");
                assert_eq!(cancelled, 2);
            },
            TaskBatchResult::AllSucceeded => panic!("batch should have failed"),
        }
        assert_eq!(launcher.invocations("a"), 1);
        assert_eq!(launcher.invocations("fail-b"), 1);
        assert_eq!(launcher.invocations("c"), 0);
        assert_eq!(launcher.invocations("d"), 0);
    }

    #[tokio::test]
    async fn in_flight_tasks_finish_after_failure() {
        let launcher = Arc::new(CountingLauncher::default());
        let runner = ParallelTaskRunner::new(2, launcher.clone()).unwrap();
        // "slow" is already running when "fail" finishes; it must still complete.
        let result = runner.run_batch(tasks(&["slow", "fail", "never"])).await;
        assert!(!result.is_success());
        assert_eq!(launcher.invocations("slow"), 1);
        assert_eq!(launcher.running.load(Ordering::SeqCst), 0);
        assert_eq!(launcher.invocations("never"), 0);
    }

    #[tokio::test]
    async fn only_the_first_failure_is_reported() {
        let launcher = Arc::new(CountingLauncher::default());
        let runner = ParallelTaskRunner::new(2, launcher).unwrap();
        let result = runner.run_batch(tasks(&["fail-fast", "slow-fail"])).await;
        let TaskBatchResult::Failed {
            first_error,
            cancelled,
        } = result
        else {
            panic!("batch should have failed");
        };
        assert_eq!(first_error.task(), "fail-fast");
        assert_eq!(cancelled, 0);
    }

    #[tokio::test]
    async fn panicking_launcher_counts_as_failure() {
        let launcher = Arc::new(CountingLauncher::default());
        let runner = ParallelTaskRunner::new(1, launcher).unwrap();
        let result = runner.run_batch(tasks(&["panic", "after"])).await;
        let TaskBatchResult::Failed {
            first_error,
            cancelled,
        } = result
        else {
            panic!("batch should have failed");
        };
        assert!(matches!(first_error, TaskError::Panicked { .. }));
        assert_eq!(cancelled, 1);
    }

    #[tokio::test]
    async fn real_shell_batch() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = Arc::new(crate::tasks::launcher::ShellLauncher::new("/bin/sh"));
        let runner = ParallelTaskRunner::new(2, launcher).unwrap();
        let batch = vec![
            Task::new("touch one", dir.path()),
            Task::new("touch two", dir.path()),
        ];
        assert!(runner.run_batch(batch).await.is_success());
        assert!(dir.path().join("one").exists());
        assert!(dir.path().join("two").exists());

        let batch = vec![Task::new("exit 1", dir.path())];
        assert!(!runner.run_batch(batch).await.is_success());
    }
}
