//! In-memory page store backing the B+Tree.
//!
//! The buffer pool owns every page the tree touches and arbitrates access to
//! them. Pages are fixed for shared or exclusive access and unfixed when the
//! returned guard is dropped.
//!
//! # Design
//!
//! - Each resident page lives in its own frame behind a reader/writer lock
//! - The frame table is a `HashMap` behind a `Mutex`, held only long enough to
//!   look up or create a frame, never while waiting on a page lock
//! - A page that is fixed for the first time is created zeroed
//! - Guards release their page via RAII (Drop), on every exit path
//! - Dirty pages are drained by `take_dirty` for write-back
//!
//! # Invariants
//!
//! - Resident page count never exceeds `capacity`
//! - `fixed()` equals the number of live `PageGuard`s

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{Mutex, RawRwLock, RwLock};

use crate::storage::page::{PAGE_SIZE, Page, PageId};

/// Default buffer pool capacity in pages (65,536 pages = 512MB).
pub const DEFAULT_POOL_CAPACITY: usize = 65_536;

/// A resident page and its write-back state.
#[derive(Debug, Default)]
struct Frame {
    page: Page,
    dirty: bool,
}

/// Lock held by a guard on its frame.
enum Access {
    Shared(ArcRwLockReadGuard<RawRwLock, Frame>),
    Exclusive(ArcRwLockWriteGuard<RawRwLock, Frame>),
}

/// A page store holding a bounded number of pages in memory.
///
/// # Pre-conditions
/// - `capacity` must be > 0 when creating
///
/// # Invariants
/// - `frames.len() <= capacity`
pub struct BufferPool {
    /// Resident pages by id.
    frames: Mutex<HashMap<PageId, Arc<RwLock<Frame>>>>,
    /// Maximum number of resident pages.
    capacity: usize,
    /// Number of pages currently fixed.
    fixed: AtomicUsize,
    /// Highest value `fixed` has reached since the last reset.
    peak_fixed: AtomicUsize,
}

impl BufferPool {
    /// Create a new, empty buffer pool.
    ///
    /// # Panics
    /// Panics if capacity is 0.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Buffer pool capacity must be positive");

        Self {
            frames: Mutex::new(HashMap::new()),
            capacity,
            fixed: AtomicUsize::new(0),
            peak_fixed: AtomicUsize::new(0),
        }
    }

    /// Fix a page for shared (`exclusive == false`) or exclusive access.
    ///
    /// Blocks until the requested access can be granted. A page that has never
    /// been fixed before is created zeroed.
    ///
    /// # Errors
    /// Returns `PoolError::Exhausted` if the page is not resident and the pool
    /// already holds `capacity` pages.
    pub fn fix(&self, page_id: PageId, exclusive: bool) -> Result<PageGuard<'_>, PoolError> {
        let frame = self.frame(page_id)?;

        let access = if exclusive {
            Access::Exclusive(frame.write_arc())
        } else {
            Access::Shared(frame.read_arc())
        };

        let fixed = self.fixed.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_fixed.fetch_max(fixed, Ordering::AcqRel);

        Ok(PageGuard {
            pool: self,
            page_id,
            access,
            dirty: false,
        })
    }

    /// Release a page, flagging it for write-back when `dirty` is set.
    ///
    /// Equivalent to marking the guard dirty and dropping it. A shared guard
    /// cannot make a page dirty.
    pub fn unfix(&self, mut guard: PageGuard<'_>, dirty: bool) {
        if dirty {
            guard.mark_dirty();
        }
        drop(guard);
    }

    /// Look up the frame for a page, creating it if needed.
    fn frame(&self, page_id: PageId) -> Result<Arc<RwLock<Frame>>, PoolError> {
        let mut frames = self.frames.lock();
        if let Some(frame) = frames.get(&page_id) {
            return Ok(Arc::clone(frame));
        }

        if frames.len() >= self.capacity {
            return Err(PoolError::Exhausted {
                capacity: self.capacity,
            });
        }

        let frame = Arc::new(RwLock::new(Frame::default()));
        frames.insert(page_id, Arc::clone(&frame));
        Ok(frame)
    }

    /// Drain every dirty page for write-back.
    ///
    /// Each returned page carries a copy of its bytes and their CRC32. The
    /// dirty flag of each drained page is cleared. Blocks on pages that are
    /// currently fixed exclusively.
    pub fn take_dirty(&self) -> Vec<DirtyPage> {
        let frames: Vec<(PageId, Arc<RwLock<Frame>>)> = self
            .frames
            .lock()
            .iter()
            .map(|(&id, frame)| (id, Arc::clone(frame)))
            .collect();

        let mut dirty = Vec::new();
        for (page_id, frame) in frames {
            let mut frame = frame.write();
            if !frame.dirty {
                continue;
            }
            frame.dirty = false;
            dirty.push(DirtyPage {
                page_id,
                checksum: frame.page.compute_checksum(),
                bytes: Box::new(*frame.page.as_bytes()),
            });
        }

        dirty.sort_by_key(|page| page.page_id);
        dirty
    }

    /// Whether a page has unflushed modifications.
    #[must_use]
    pub fn is_dirty(&self, page_id: PageId) -> bool {
        let frame = self.frames.lock().get(&page_id).map(Arc::clone);
        frame.is_some_and(|frame| frame.read().dirty)
    }

    /// Number of resident pages.
    #[must_use]
    pub fn resident(&self) -> usize {
        self.frames.lock().len()
    }

    /// Number of pages currently fixed.
    #[must_use]
    pub fn fixed(&self) -> usize {
        self.fixed.load(Ordering::Acquire)
    }

    /// Highest number of simultaneously fixed pages since creation or the
    /// last `reset_peak_fixed`.
    #[must_use]
    pub fn peak_fixed(&self) -> usize {
        self.peak_fixed.load(Ordering::Acquire)
    }

    /// Reset the high-water mark to the current number of fixed pages.
    pub fn reset_peak_fixed(&self) {
        self.peak_fixed.store(self.fixed(), Ordering::Release);
    }

    /// Get the total capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("capacity", &self.capacity)
            .field("fixed", &self.fixed())
            .finish_non_exhaustive()
    }
}

/// A fixed page. Dropping the guard unfixes the page.
pub struct PageGuard<'a> {
    pool: &'a BufferPool,
    page_id: PageId,
    access: Access,
    dirty: bool,
}

impl PageGuard<'_> {
    /// The id of the fixed page.
    #[must_use]
    pub const fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Whether the page is fixed exclusively.
    #[must_use]
    pub const fn is_exclusive(&self) -> bool {
        matches!(self.access, Access::Exclusive(_))
    }

    /// Read access to the page.
    #[must_use]
    pub fn page(&self) -> &Page {
        match &self.access {
            Access::Shared(frame) => &frame.page,
            Access::Exclusive(frame) => &frame.page,
        }
    }

    /// Write access to the page.
    ///
    /// # Errors
    /// Returns `PoolError::NotExclusive` if the page was fixed shared.
    pub fn page_mut(&mut self) -> Result<&mut Page, PoolError> {
        match &mut self.access {
            Access::Exclusive(frame) => Ok(&mut frame.page),
            Access::Shared(_) => Err(PoolError::NotExclusive(self.page_id)),
        }
    }

    /// Flag the page for write-back when it is unfixed.
    pub const fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}

impl Drop for PageGuard<'_> {
    fn drop(&mut self) {
        if let Access::Exclusive(frame) = &mut self.access
            && self.dirty
        {
            frame.dirty = true;
        }
        self.pool.fixed.fetch_sub(1, Ordering::AcqRel);
    }
}

impl std::fmt::Debug for PageGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageGuard")
            .field("page_id", &self.page_id)
            .field("exclusive", &self.is_exclusive())
            .field("dirty", &self.dirty)
            .finish()
    }
}

/// A page drained for write-back.
#[derive(Debug)]
pub struct DirtyPage {
    pub page_id: PageId,
    /// CRC32 of `bytes`.
    pub checksum: u32,
    pub bytes: Box<[u8; PAGE_SIZE]>,
}

/// Errors reported by the page store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// Every frame is in use; the page cannot be made resident.
    Exhausted { capacity: usize },
    /// Write access was requested through a shared fix.
    NotExclusive(PageId),
}

impl std::fmt::Display for PoolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exhausted { capacity } => {
                write!(f, "buffer pool exhausted: all {capacity} pages resident")
            }
            Self::NotExclusive(page_id) => {
                write!(f, "page {page_id} is not fixed exclusively")
            }
        }
    }
}

impl std::error::Error for PoolError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_creation() {
        let pool = BufferPool::new(10);
        assert_eq!(pool.capacity(), 10);
        assert_eq!(pool.resident(), 0);
        assert_eq!(pool.fixed(), 0);
    }

    #[test]
    fn test_first_fix_creates_zeroed_page() {
        let pool = BufferPool::new(2);
        let guard = pool.fix(9, false).expect("should fix");
        assert_eq!(guard.page_id(), 9);
        assert!(!guard.is_exclusive());
        assert_eq!(guard.page().read_u64(0), 0);
        assert_eq!(pool.resident(), 1);
        assert_eq!(pool.fixed(), 1);
    }

    #[test]
    fn test_guard_drop_unfixes() {
        let pool = BufferPool::new(2);
        {
            let _a = pool.fix(1, true).expect("should fix");
            let _b = pool.fix(2, false).expect("should fix");
            assert_eq!(pool.fixed(), 2);
        }
        assert_eq!(pool.fixed(), 0);
        assert_eq!(pool.peak_fixed(), 2);

        pool.reset_peak_fixed();
        assert_eq!(pool.peak_fixed(), 0);
    }

    #[test]
    fn test_writes_persist_across_fixes() {
        let pool = BufferPool::new(1);
        {
            let mut guard = pool.fix(3, true).expect("should fix");
            guard.page_mut().expect("exclusive").write_u64(16, 77);
        }
        let guard = pool.fix(3, false).expect("should fix");
        assert_eq!(guard.page().read_u64(16), 77);
    }

    #[test]
    fn test_shared_guard_rejects_writes() {
        let pool = BufferPool::new(1);
        let mut guard = pool.fix(4, false).expect("should fix");
        assert_eq!(guard.page_mut().err(), Some(PoolError::NotExclusive(4)));
    }

    #[test]
    fn test_shared_fixes_coexist() {
        let pool = BufferPool::new(1);
        let a = pool.fix(5, false).expect("should fix");
        let b = pool.fix(5, false).expect("should fix");
        assert_eq!(pool.fixed(), 2);
        drop(a);
        drop(b);
        assert_eq!(pool.fixed(), 0);
    }

    #[test]
    fn test_exhaustion() {
        let pool = BufferPool::new(2);
        drop(pool.fix(1, true).expect("should fix"));
        drop(pool.fix(2, true).expect("should fix"));

        let err = pool.fix(3, true).expect_err("pool is full");
        assert_eq!(err, PoolError::Exhausted { capacity: 2 });
        assert_eq!(pool.fixed(), 0);

        // Resident pages are still reachable.
        assert!(pool.fix(1, false).is_ok());
    }

    #[test]
    fn test_dirty_tracking_and_drain() {
        let pool = BufferPool::new(4);

        let mut guard = pool.fix(2, true).expect("should fix");
        guard.page_mut().expect("exclusive").write_u16(0, 0xABCD);
        pool.unfix(guard, true);

        let mut guard = pool.fix(1, true).expect("should fix");
        guard.page_mut().expect("exclusive").write_u16(0, 1);
        guard.mark_dirty();
        drop(guard);

        // Clean fix does not flag the page.
        drop(pool.fix(3, true).expect("should fix"));

        assert!(pool.is_dirty(1));
        assert!(pool.is_dirty(2));
        assert!(!pool.is_dirty(3));
        assert!(!pool.is_dirty(99));

        let drained = pool.take_dirty();
        let ids: Vec<PageId> = drained.iter().map(|page| page.page_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(drained[1].bytes[..2], 0xABCDu16.to_le_bytes());
        assert_eq!(drained[1].checksum, crc32fast::hash(&drained[1].bytes[..]));

        assert!(!pool.is_dirty(1));
        assert!(pool.take_dirty().is_empty());
    }

    #[test]
    fn test_shared_unfix_never_dirties() {
        let pool = BufferPool::new(1);
        let guard = pool.fix(1, false).expect("should fix");
        pool.unfix(guard, true);
        assert!(!pool.is_dirty(1));
    }

    #[test]
    #[should_panic(expected = "capacity must be positive")]
    fn test_zero_capacity_panics() {
        let _ = BufferPool::new(0);
    }
}
