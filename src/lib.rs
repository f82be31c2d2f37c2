pub mod buffer;
pub mod disk;

pub use buffer::{
    AccessType, BUFFER_POOL_SIZE, BufferError, BufferPoolManager, BufferResult,
    DEFAULT_REPLACER_K, FrameId, LruKReplacer, PageGuard, ReadPageGuard, WritePageGuard,
};
pub use disk::{
    DiskError, DiskManager, DiskResult, FileDiskManager, INVALID_PAGE_ID, MemoryDiskManager,
    PAGE_SIZE, PageId,
};
