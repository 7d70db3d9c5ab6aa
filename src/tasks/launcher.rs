use std::process::Stdio;

use futures::future::BoxFuture;
use tokio::process::Command;

use crate::{application::ConfigConstants, errors::TaskError};

use super::Task;

/// Starts a task's external process and waits for it to exit.
///
/// The runner only cares about the pass/fail signal; output goes wherever the
/// launcher sends it.
pub trait TaskLauncher: Send + Sync + 'static {
    fn launch<'a>(
        &'a self,
        task: &'a Task,
    ) -> BoxFuture<'a, Result<(), TaskError>>;
}

/// Runs each task through `<shell> -c <command>` with inherited stdio.
#[derive(Clone, Debug)]
pub struct ShellLauncher {
    shell: String,
}

impl Default for ShellLauncher {
    fn default() -> Self {
        Self {
            shell: ConfigConstants::shell(),
        }
    }
}

impl ShellLauncher {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    async fn run(
        &self,
        task: &Task,
    ) -> Result<(), TaskError> {
        let status = Command::new(&self.shell)
            .arg("-c")
            .arg(task.command())
            .current_dir(task.working_dir())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|source| TaskError::Spawn {
                task: task.command().to_string(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(TaskError::ExitStatus {
                task: task.command().to_string(),
                code: status.code(),
            })
        }
    }
}

impl TaskLauncher for ShellLauncher {
    fn launch<'a>(
        &'a self,
        task: &'a Task,
    ) -> BoxFuture<'a, Result<(), TaskError>> {
        Box::pin(self.run(task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zero_exit_is_success() {
        let dir = tempfile::tempdir().unwrap();
        let task = Task::new("touch marker", dir.path());
        ShellLauncher::new("/bin/sh").launch(&task).await.unwrap();
        assert!(dir.path().join("marker").exists());
    }

    #[tokio::test]
    async fn non_zero_exit_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let task = Task::new("exit 3", dir.path());
        let err = ShellLauncher::new("/bin/sh").launch(&task).await.unwrap_err();
        assert!(matches!(err, TaskError::ExitStatus { code: Some(3), .. }));
        assert_eq!(err.task(), "exit 3");
    }

    #[tokio::test]
    async fn missing_working_dir_fails_to_spawn() {
        let task = Task::new("true", "/definitely/not/a/real/dir");
        let err = ShellLauncher::new("/bin/sh").launch(&task).await.unwrap_err();
        assert!(matches!(err, TaskError::Spawn { .. }));
    }
}
