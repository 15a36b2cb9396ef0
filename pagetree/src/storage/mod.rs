//! Page storage and the B+Tree built on top of it.
//!
//! Pages are 8KB and addressed by a 64-bit id whose upper 16 bits name the
//! segment (one tree) the page belongs to:
//!
//! - `page`: raw page buffers and page id helpers
//! - `buffer_pool`: fix/unfix of shared or exclusive pages, dirty tracking
//! - `btree`: node encoding and the concurrent tree

pub mod btree;
mod buffer_pool;
mod page;

pub use buffer_pool::{BufferPool, DEFAULT_POOL_CAPACITY, DirtyPage, PageGuard, PoolError};
pub use page::{PAGE_SIZE, Page, PageId, SEGMENT_SHIFT, page_id, segment_of};
