//! Page-backed B+Tree over a shared buffer pool.
//!
//! Every operation walks from the root to a leaf, fixing one page per level
//! and releasing a parent only after its child is fixed (lock coupling).
//! Lookups fix pages shared; insert and erase fix them exclusively.
//!
//! Insert splits full nodes on the way down (preemptive split), so the parent
//! of the node being split always has room for the new separator and a split
//! never propagates further than one level.
//!
//! The root pointer is guarded by its own latch. Readers hold it only until
//! the root page is fixed; insert holds it exclusively until it knows the
//! root will not split.
//!
//! Erase never merges or rebalances nodes, so the tree never shrinks.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{RwLock, RwLockWriteGuard};

use crate::storage::btree::codec::FixedSize;
use crate::storage::btree::node::{InnerNode, LeafNode, Node, NodeError, NodeHeader, NodeLayout};
use crate::storage::buffer_pool::{BufferPool, PageGuard, PoolError};
use crate::storage::page::{PageId, page_id};

/// A B+Tree whose nodes live in a buffer pool.
pub struct BTree<'a, K, V> {
    pool: &'a BufferPool,
    layout: NodeLayout<K, V>,
    segment_id: u16,
    /// Root page, `None` while the tree is empty.
    root: RwLock<Option<PageId>>,
    /// Next segment-local page number to hand out.
    next_page_id: AtomicU64,
}

/// Everything needed to reattach a tree to pages it already wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeMeta {
    pub segment_id: u16,
    pub root: Option<PageId>,
    pub next_page_id: u64,
}

/// Shape of a tree as found by `BTree::validate`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub height: usize,
    pub inner_nodes: usize,
    pub leaf_nodes: usize,
    pub entries: usize,
}

/// The page above the node currently visited by insert.
enum Anchor<'t, 'p> {
    /// The visited node is the root; the root latch is held exclusively.
    Root(RwLockWriteGuard<'t, Option<PageId>>),
    /// The visited node is a child of this page, which is not full.
    Parent(PageGuard<'p>),
}

/// A node waiting to be checked by `validate`, with the key range it must
/// respect (`low` inclusive, `high` exclusive).
struct PendingNode<K> {
    page_id: PageId,
    level: Option<u16>,
    low: Option<K>,
    high: Option<K>,
}

impl<'a, K: FixedSize + Ord, V: FixedSize> BTree<'a, K, V> {
    /// Create an empty tree in `segment_id` using the largest node capacity
    /// that fits a page.
    pub fn new(segment_id: u16, pool: &'a BufferPool) -> Result<Self, BTreeError> {
        Ok(Self::with_layout(segment_id, pool, NodeLayout::new()?))
    }

    /// Create an empty tree whose nodes hold at most `capacity` entries.
    pub fn with_capacity(
        segment_id: u16,
        pool: &'a BufferPool,
        capacity: usize,
    ) -> Result<Self, BTreeError> {
        Ok(Self::with_layout(
            segment_id,
            pool,
            NodeLayout::with_capacity(capacity)?,
        ))
    }

    /// Create an empty tree with an explicit node layout.
    #[must_use]
    pub const fn with_layout(segment_id: u16, pool: &'a BufferPool, layout: NodeLayout<K, V>) -> Self {
        Self::open(
            pool,
            layout,
            TreeMeta {
                segment_id,
                root: None,
                next_page_id: 0,
            },
        )
    }

    /// Reattach to a tree previously described by `meta`.
    ///
    /// `layout` must be the layout the pages were written with.
    #[must_use]
    pub const fn open(pool: &'a BufferPool, layout: NodeLayout<K, V>, meta: TreeMeta) -> Self {
        Self {
            pool,
            layout,
            segment_id: meta.segment_id,
            root: RwLock::new(meta.root),
            next_page_id: AtomicU64::new(meta.next_page_id),
        }
    }

    /// Snapshot of the root pointer and page allocator.
    #[must_use]
    pub fn meta(&self) -> TreeMeta {
        TreeMeta {
            segment_id: self.segment_id,
            root: self.root_page(),
            next_page_id: self.next_page_id.load(Ordering::Acquire),
        }
    }

    /// Get the root page ID, if the tree is not empty.
    #[must_use]
    pub fn root_page(&self) -> Option<PageId> {
        *self.root.read()
    }

    /// The node layout of this tree.
    #[must_use]
    pub const fn layout(&self) -> &NodeLayout<K, V> {
        &self.layout
    }

    /// Look up a value by key.
    pub fn lookup(&self, key: &K) -> Result<Option<V>, BTreeError> {
        let Some(page) = self.find_leaf(key, false)? else {
            return Ok(None);
        };
        let leaf = LeafNode::from_page(page.page(), &self.layout)?;
        Ok(leaf.get(key))
    }

    /// Remove a key.
    ///
    /// Returns the removed value if found. Removing an absent key changes
    /// nothing, not even the dirty state of the visited pages.
    pub fn erase(&self, key: &K) -> Result<Option<V>, BTreeError> {
        let Some(mut page) = self.find_leaf(key, true)? else {
            return Ok(None);
        };
        let mut leaf = LeafNode::from_page(page.page(), &self.layout)?;

        let removed = leaf.erase(key);
        if removed.is_some() {
            self.store(&mut page, &Node::Leaf(leaf))?;
        }

        Ok(removed)
    }

    /// Insert or update a key-value pair.
    ///
    /// Returns the old value if updating, None if inserting.
    pub fn insert(&self, key: K, value: V) -> Result<Option<V>, BTreeError> {
        let mut latch = self.root.write();
        let mut current = match *latch {
            Some(root_id) => self.pool.fix(root_id, true)?,
            None => {
                let mut root = self.pool.fix(self.allocate_page_id(), true)?;
                let leaf = LeafNode::new(self.layout.leaf_capacity());
                self.store(&mut root, &Node::Leaf(leaf))?;
                *latch = Some(root.page_id());
                tracing::debug!("created root leaf {}", root.page_id());
                root
            }
        };
        let mut anchor = Anchor::Root(latch);

        loop {
            let mut node = Node::from_page(current.page(), &self.layout)?;

            if node.is_full() {
                let (separator, sibling) = self.split(&mut current, &mut node, &mut anchor)?;
                if key >= separator {
                    current = sibling;
                }
                continue;
            }

            match node {
                Node::Leaf(mut leaf) => {
                    let old = leaf.insert(key, value)?;
                    self.store(&mut current, &Node::Leaf(leaf))?;
                    return Ok(old);
                }
                Node::Inner(inner) => {
                    let child = self.pool.fix(inner.child_for(&key), true)?;
                    // The visited node has room, so whatever sits above it
                    // (parent page or root latch) can go.
                    anchor = Anchor::Parent(std::mem::replace(&mut current, child));
                }
            }
        }
    }

    /// Split the full node in `current`, registering the new right sibling
    /// with the anchor. A split root is replaced by a new root one level up.
    ///
    /// Returns the separator and the fixed sibling.
    fn split(
        &self,
        current: &mut PageGuard<'a>,
        node: &mut Node<K, V>,
        anchor: &mut Anchor<'_, 'a>,
    ) -> Result<(K, PageGuard<'a>), BTreeError> {
        // Fix every page the split touches before changing any of them, so
        // an exhausted pool leaves the tree untouched.
        let mut sibling = self.pool.fix(self.allocate_page_id(), true)?;

        match anchor {
            Anchor::Parent(parent) => {
                let mut parent_node = InnerNode::from_page(parent.page(), &self.layout)?;
                let (separator, right) = node.split()?;
                parent_node.insert(separator, sibling.page_id())?;

                self.store(current, node)?;
                self.store(&mut sibling, &right)?;
                self.store(parent, &Node::Inner(parent_node))?;

                tracing::debug!(
                    "split page {} (level {}) into {}",
                    current.page_id(),
                    node.level(),
                    sibling.page_id()
                );
                Ok((separator, sibling))
            }
            Anchor::Root(latch) => {
                let mut root = self.pool.fix(self.allocate_page_id(), true)?;
                let (separator, right) = node.split()?;
                let level = node.level() + 1;
                let root_node = InnerNode::with_children(
                    level,
                    current.page_id(),
                    separator,
                    sibling.page_id(),
                    self.layout.inner_capacity(),
                );

                self.store(current, node)?;
                self.store(&mut sibling, &right)?;
                self.store(&mut root, &Node::Inner(root_node))?;
                **latch = Some(root.page_id());

                tracing::debug!(
                    "root {} split; new root {} at level {level}",
                    current.page_id(),
                    root.page_id()
                );
                // The new root has room for one more child: release the latch.
                *anchor = Anchor::Parent(root);
                Ok((separator, sibling))
            }
        }
    }

    /// Descend to the leaf responsible for `key`.
    ///
    /// Returns `None` for an empty tree.
    fn find_leaf(&self, key: &K, exclusive: bool) -> Result<Option<PageGuard<'a>>, BTreeError> {
        let latch = self.root.read();
        let Some(root_id) = *latch else {
            return Ok(None);
        };
        let mut current = self.pool.fix(root_id, exclusive)?;
        drop(latch);

        loop {
            if NodeHeader::from_page(current.page()).is_leaf() {
                return Ok(Some(current));
            }
            let inner = InnerNode::from_page(current.page(), &self.layout)?;
            let child = self.pool.fix(inner.child_for(key), exclusive)?;
            // Assigning drops the parent, after the child is fixed.
            current = child;
        }
    }

    /// Encode a node into an exclusively fixed page and flag it dirty.
    fn store(&self, page: &mut PageGuard<'_>, node: &Node<K, V>) -> Result<(), BTreeError> {
        node.write_to_page(page.page_mut()?, &self.layout);
        page.mark_dirty();
        Ok(())
    }

    fn allocate_page_id(&self) -> PageId {
        page_id(
            self.segment_id,
            self.next_page_id.fetch_add(1, Ordering::AcqRel),
        )
    }

    /// Number of levels; 0 for an empty tree.
    pub fn height(&self) -> Result<usize, BTreeError> {
        let latch = self.root.read();
        let Some(root_id) = *latch else {
            return Ok(0);
        };
        let page = self.pool.fix(root_id, false)?;
        Ok(usize::from(NodeHeader::from_page(page.page()).level) + 1)
    }

    /// All entries in key order.
    ///
    /// Pages are visited one at a time, so the result is not a consistent
    /// snapshot while other threads write.
    pub fn entries(&self) -> Result<Vec<(K, V)>, BTreeError> {
        let mut entries = Vec::new();
        let Some(root_id) = self.root_page() else {
            return Ok(entries);
        };

        let mut stack = vec![root_id];
        while let Some(page_id) = stack.pop() {
            let page = self.pool.fix(page_id, false)?;
            match Node::from_page(page.page(), &self.layout)? {
                Node::Leaf(leaf) => {
                    entries.extend(leaf.keys().iter().copied().zip(leaf.values().iter().copied()));
                }
                Node::Inner(inner) => stack.extend(inner.children().iter().rev()),
            }
        }

        Ok(entries)
    }

    /// Check the structure of the whole tree.
    ///
    /// Verifies that keys are strictly ascending in every node, that every key
    /// lies within the range its ancestors' separators assign to it, and that
    /// each child sits exactly one level below its parent (so all leaves share
    /// one depth). Like `entries`, this is not atomic with respect to writers.
    ///
    /// # Errors
    /// Returns `BTreeError::Corrupted` describing the first violation found.
    pub fn validate(&self) -> Result<TreeStats, BTreeError> {
        let mut stats = TreeStats::default();
        let Some(root_id) = self.root_page() else {
            return Ok(stats);
        };

        let mut stack = vec![PendingNode {
            page_id: root_id,
            level: None,
            low: None,
            high: None,
        }];

        while let Some(pending) = stack.pop() {
            let node = {
                let page = self.pool.fix(pending.page_id, false)?;
                Node::from_page(page.page(), &self.layout)?
            };

            match pending.level {
                None => stats.height = usize::from(node.level()) + 1,
                Some(expected) if expected != node.level() => {
                    return Err(BTreeError::Corrupted(format!(
                        "page {} is at level {}, expected {expected}",
                        pending.page_id,
                        node.level()
                    )));
                }
                Some(_) => {}
            }

            let keys = match &node {
                Node::Leaf(leaf) => leaf.keys(),
                Node::Inner(inner) => inner.keys(),
            };
            check_keys(pending.page_id, keys, pending.low.as_ref(), pending.high.as_ref())?;

            match &node {
                Node::Leaf(leaf) => {
                    stats.leaf_nodes += 1;
                    stats.entries += leaf.count();
                }
                Node::Inner(inner) => {
                    stats.inner_nodes += 1;
                    let separators = inner.keys();
                    for (index, &child) in inner.children().iter().enumerate() {
                        stack.push(PendingNode {
                            page_id: child,
                            level: Some(inner.level() - 1),
                            low: if index == 0 {
                                pending.low
                            } else {
                                Some(separators[index - 1])
                            },
                            high: separators.get(index).copied().or(pending.high),
                        });
                    }
                }
            }
        }

        Ok(stats)
    }
}

/// Check that `keys` ascend strictly and lie in `[low, high)`.
fn check_keys<K: Ord + std::fmt::Debug>(
    page_id: PageId,
    keys: &[K],
    low: Option<&K>,
    high: Option<&K>,
) -> Result<(), BTreeError> {
    if let Some(pair) = keys.windows(2).find(|pair| pair[0] >= pair[1]) {
        return Err(BTreeError::Corrupted(format!(
            "page {page_id}: keys out of order ({:?} before {:?})",
            pair[0], pair[1]
        )));
    }

    if let (Some(low), Some(first)) = (low, keys.first())
        && first < low
    {
        return Err(BTreeError::Corrupted(format!(
            "page {page_id}: key {first:?} below separator {low:?}"
        )));
    }

    if let (Some(high), Some(last)) = (high, keys.last())
        && last >= high
    {
        return Err(BTreeError::Corrupted(format!(
            "page {page_id}: key {last:?} not below separator {high:?}"
        )));
    }

    Ok(())
}

/// Errors that can occur during B+Tree operations.
#[derive(Debug)]
pub enum BTreeError {
    /// Page store error.
    Pool(PoolError),
    /// Node error.
    Node(NodeError),
    /// Structural invariant violated.
    Corrupted(String),
}

impl std::fmt::Display for BTreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pool(e) => write!(f, "page store error: {e}"),
            Self::Node(e) => write!(f, "node error: {e}"),
            Self::Corrupted(message) => write!(f, "corrupted tree: {message}"),
        }
    }
}

impl std::error::Error for BTreeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Pool(e) => Some(e),
            Self::Node(e) => Some(e),
            Self::Corrupted(_) => None,
        }
    }
}

impl From<PoolError> for BTreeError {
    fn from(e: PoolError) -> Self {
        Self::Pool(e)
    }
}

impl From<NodeError> for BTreeError {
    fn from(e: NodeError) -> Self {
        Self::Node(e)
    }
}
