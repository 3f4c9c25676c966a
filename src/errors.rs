use crate::semantic::{QueryError, StorageError};
use crate::tags::TagsError;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("index error: {0}")]
    Storage(#[from] StorageError),

    #[error("tags error: {0}")]
    Tags(#[from] TagsError),

    #[error("unexpected error: {0:?}")]
    Other(#[from] anyhow::Error),
}
