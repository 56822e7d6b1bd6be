use crate::task::TaskId;

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// The form input was rejected; the store is unchanged.
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// Every numeric id up to `u64::MAX` has been handed out.
    #[error("no task ids left")]
    IdsExhausted,

    /// Writing the collection failed and the in-memory change was rolled back.
    #[error("failed to persist tasks: {0:#}")]
    Storage(anyhow::Error),
}

impl TaskError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        TaskError::Validation {
            field,
            reason: reason.into(),
        }
    }
}
