#![forbid(unsafe_code)]

mod buffer;
mod cache;
mod dirty;
mod flusher;
pub mod frame;
mod options;
mod registry;
mod stats;

pub use buffer::PageBuffer;
pub use cache::{PageIntegrityIssue, WriteBackCache};
pub use dirty::{DirtyEntry, DirtyPageTable};
pub use flusher::REPEATED_FAILURE_THRESHOLD;
pub use frame::{DecodedFrame, FrameStatus, FRAME_HEADER_LEN, FRAME_MAGIC};
pub use options::{CacheOptions, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use registry::{FileEntry, FileRegistry};
pub use stats::{CacheStats, FlushObserver, NoopObserver};
