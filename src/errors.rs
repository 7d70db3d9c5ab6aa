use std::path::PathBuf;

use crate::application::PipelineStage;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(
        "Not enough disk space available in {}. Needed [Bytes]: {needed}, free: {free}",
        .path.display()
    )]
    InsufficientDiskSpace {
        needed: u64,
        free: u64,
        path: PathBuf,
    },

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error("[DATABASE] {context}: {source}")]
    Database {
        context: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Unable to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{stage} stage failed: {source}")]
    StageFailed {
        stage: PipelineStage,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn config(message: impl ToString) -> Self {
        Self::Configuration(message.to_string())
    }

    pub(crate) fn database(
        context: impl ToString,
        source: sqlx::Error,
    ) -> Self {
        Self::Database {
            context: context.to_string(),
            source,
        }
    }

    pub(crate) fn io(
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn in_stage(
        self,
        stage: PipelineStage,
    ) -> Self {
        match self {
            // Already attributed - don't double-wrap.
            Self::StageFailed {
                ..
            } => self,
            other => Self::StageFailed {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The stage this error was raised in, if it came out of the pipeline.
    pub fn stage(&self) -> Option<PipelineStage> {
        match self {
            Self::StageFailed {
                stage,
                ..
            } => Some(*stage),
            _ => None,
        }
    }
}

/// Failure of a single shell-level task.
#[derive(thiserror::Error, Debug)]
pub enum TaskError {
    #[error("Unable to start task `{task}`: {source}")]
    Spawn {
        task: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Shell task `{task}` did not finish with exit code 0 (exit code: {code:?})")]
    ExitStatus {
        task: String,
        code: Option<i32>,
    },

    #[error("Task `{task}` panicked: {message}")]
    Panicked {
        task: String,
        message: String,
    },
}

impl TaskError {
    /// The command of the task that failed.
    pub fn task(&self) -> &str {
        match self {
            Self::Spawn {
                task,
                ..
            }
            | Self::ExitStatus {
                task,
                ..
            }
            | Self::Panicked {
                task,
                ..
            } => task,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_attribution_is_not_nested() {
        let err = Error::config("boom")
            .in_stage(PipelineStage::Ingest)
            .in_stage(PipelineStage::Index);
        assert_eq!(err.stage(), Some(PipelineStage::Ingest));
        assert!(err.to_string().starts_with("Ingest stage failed"));
    }

    #[test]
    fn disk_space_message_names_bytes() {
        let err = Error::InsufficientDiskSpace {
            needed: 10,
            free: 5,
            path: PathBuf::from("/data"),
        };
        assert_eq!(
            err.to_string(),
            "Not enough disk space available in /data. Needed [Bytes]: 10, free: 5"
        );
    }
}
