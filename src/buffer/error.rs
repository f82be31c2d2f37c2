use thiserror::Error;

use crate::disk::{DiskError, PageId};

#[derive(Debug, Error)]
pub enum BufferError {
    #[error("Disk error: {0}")]
    Disk(#[from] DiskError),

    #[error("Buffer pool is full: all frames are pinned")]
    NoFrameAvailable,

    #[error("Invalid page id: {0}")]
    InvalidPageId(PageId),
}

pub type BufferResult<T> = Result<T, BufferError>;
