pub mod launcher;
pub mod runner;

use std::{
    fmt::Display,
    path::{Path, PathBuf},
};

use crate::errors::{Error, TaskError};

/// A unit of external work: a pre-formatted shell command and the directory
/// to run it in.
///
/// * The command is opaque to the runner - it is handed to the shell as-is.
///
/// * Tasks in the same batch must be independent of each other. The runner
/// gives no ordering guarantee beyond dispatch order.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Task {
    id: TaskId,
    command: String,
    working_dir: PathBuf,
}

impl Task {
    pub fn new(
        command: impl Into<String>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: TaskId::new(),
            command: command.into(),
            working_dir: working_dir.into(),
        }
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TaskId {
    id: uuid::Uuid,
}

impl TaskId {
    fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
        }
    }
    pub fn id(&self) -> &uuid::Uuid {
        &self.id
    }
}

impl Display for TaskId {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        self.id.fmt(f)
    }
}

/// Wraps `value` in single quotes for safe interpolation into a shell command.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Outcome of one batch. Partial success is not reported separately.
#[derive(Debug)]
pub enum TaskBatchResult {
    AllSucceeded,
    Failed {
        first_error: TaskError,
        /// Tasks that were never dispatched because of the failure.
        cancelled: usize,
    },
}

impl TaskBatchResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::AllSucceeded)
    }

    pub fn into_result(self) -> Result<(), Error> {
        match self {
            Self::AllSucceeded => Ok(()),
            Self::Failed {
                first_error,
                ..
            } => Err(first_error.into()),
        }
    }
}
