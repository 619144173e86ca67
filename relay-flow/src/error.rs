use thiserror::Error;

/// Errors raised while walking a graph
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Context error: {0}")]
    ContextError(String),

    #[error("Graph '{0}' has no start task")]
    MissingStartTask(String),

    #[error("Graph execution exceeded {0} steps")]
    StepLimitExceeded(usize),

    /// A task gave up. The inner error is whatever the task raised, so callers
    /// can downcast it back to their own error type.
    #[error(transparent)]
    TaskFailed(#[from] anyhow::Error),
}

impl GraphError {
    /// Wrap any task-level error.
    pub fn task_failed<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        GraphError::TaskFailed(anyhow::Error::new(error))
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;
