//! B+Tree node types and their page layout.
//!
//! Both node kinds start with the same 4-byte header, followed by fixed
//! capacity arrays:
//!
//! ```text
//! leaf:  | level u16 | count u16 | keys[capacity] | values[capacity]       |
//! inner: | level u16 | count u16 | keys[capacity] | children[capacity + 1] |
//! ```
//!
//! All fields are little endian. Unused slots and the tail of the page are
//! zeroed, so a node always encodes to the same bytes.

#![allow(clippy::cast_possible_truncation)]

use std::marker::PhantomData;

use crate::storage::btree::codec::FixedSize;
use crate::storage::page::{PAGE_SIZE, Page, PageId};

/// Size of the node header (`level` + `count`).
pub const NODE_HEADER_SIZE: usize = 4;

/// Size of an encoded child page id.
const CHILD_SIZE: usize = 8;

/// Smallest capacity a node may be configured with.
///
/// Both halves of a split full node then hold at least two entries (leaf) or
/// two children (inner).
pub const MIN_CAPACITY: usize = 4;

/// Largest capacity the 16-bit `count` field can describe.
#[allow(clippy::cast_lossless)] // usize::from is not const
const MAX_COUNT: usize = u16::MAX as usize;

/// Header common to leaf and inner nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeHeader {
    /// Height above the leaves; 0 for leaves.
    pub level: u16,
    /// Entries in a leaf, children in an inner node.
    pub count: u16,
}

impl NodeHeader {
    /// Is the node a leaf?
    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        self.level == 0
    }

    /// Read a node header from a page.
    #[must_use]
    pub fn from_page(page: &Page) -> Self {
        Self {
            level: page.read_u16(0),
            count: page.read_u16(2),
        }
    }

    /// Write a node header to a page.
    pub fn write_to_page(&self, page: &mut Page) {
        page.write_u16(0, self.level);
        page.write_u16(2, self.count);
    }
}

/// Byte layout of the nodes of one tree instantiation.
///
/// Fixes the capacity of leaf and inner nodes for a (key, value) pair of
/// types. Pages written with one layout can only be read back with the same
/// layout.
pub struct NodeLayout<K, V> {
    leaf_capacity: usize,
    inner_capacity: usize,
    _types: PhantomData<fn() -> (K, V)>,
}

impl<K, V> Clone for NodeLayout<K, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, V> Copy for NodeLayout<K, V> {}

impl<K, V> std::fmt::Debug for NodeLayout<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeLayout")
            .field("leaf_capacity", &self.leaf_capacity)
            .field("inner_capacity", &self.inner_capacity)
            .finish()
    }
}

impl<K: FixedSize, V: FixedSize> NodeLayout<K, V> {
    /// Largest leaf capacity that fits a page.
    #[must_use]
    pub const fn max_leaf_capacity() -> usize {
        let entry = K::SIZE + V::SIZE;
        let fits = (PAGE_SIZE - NODE_HEADER_SIZE) / if entry == 0 { 1 } else { entry };
        if fits > MAX_COUNT { MAX_COUNT } else { fits }
    }

    /// Largest inner capacity that fits a page.
    ///
    /// An inner node stores `capacity` keys and `capacity + 1` child ids.
    #[must_use]
    pub const fn max_inner_capacity() -> usize {
        let fits = (PAGE_SIZE - NODE_HEADER_SIZE - CHILD_SIZE) / (K::SIZE + CHILD_SIZE);
        if fits > MAX_COUNT { MAX_COUNT } else { fits }
    }

    /// Layout using the largest capacities that fit a page.
    ///
    /// # Errors
    /// Returns `NodeError::CapacityOutOfRange` if the key and value types are
    /// too large for a page to hold `MIN_CAPACITY` entries.
    pub fn new() -> Result<Self, NodeError> {
        let leaf_capacity = Self::max_leaf_capacity();
        let inner_capacity = Self::max_inner_capacity();

        let fits = leaf_capacity.min(inner_capacity);
        if fits < MIN_CAPACITY {
            return Err(NodeError::CapacityOutOfRange {
                requested: fits,
                min: MIN_CAPACITY,
                max: fits,
            });
        }

        Ok(Self {
            leaf_capacity,
            inner_capacity,
            _types: PhantomData,
        })
    }

    /// Layout with the same, smaller capacity for both node kinds.
    ///
    /// # Errors
    /// Returns `NodeError::CapacityOutOfRange` unless
    /// `MIN_CAPACITY <= capacity <= min(max_leaf_capacity, max_inner_capacity)`.
    pub fn with_capacity(capacity: usize) -> Result<Self, NodeError> {
        let max = Self::max_leaf_capacity().min(Self::max_inner_capacity());
        if !(MIN_CAPACITY..=max).contains(&capacity) {
            return Err(NodeError::CapacityOutOfRange {
                requested: capacity,
                min: MIN_CAPACITY,
                max,
            });
        }

        Ok(Self {
            leaf_capacity: capacity,
            inner_capacity: capacity,
            _types: PhantomData,
        })
    }

    /// Maximum number of entries in a leaf.
    #[must_use]
    pub const fn leaf_capacity(&self) -> usize {
        self.leaf_capacity
    }

    /// Maximum number of children of an inner node.
    #[must_use]
    pub const fn inner_capacity(&self) -> usize {
        self.inner_capacity
    }

    const fn key_offset(index: usize) -> usize {
        NODE_HEADER_SIZE + index * K::SIZE
    }

    const fn value_offset(&self, index: usize) -> usize {
        Self::key_offset(self.leaf_capacity) + index * V::SIZE
    }

    const fn child_offset(&self, index: usize) -> usize {
        Self::key_offset(self.inner_capacity) + index * CHILD_SIZE
    }

    fn read_key(page: &Page, index: usize) -> K {
        K::decode(page.read_bytes(Self::key_offset(index), K::SIZE))
    }

    fn write_key(page: &mut Page, index: usize, key: &K) {
        key.encode(page.bytes_mut(Self::key_offset(index), K::SIZE));
    }
}

/// Position of the first key not less than `target`.
///
/// Returns `(index, true)` for the smallest `index` with
/// `keys[index] >= target`, or `(keys.len(), false)` when `target` is greater
/// than every key.
#[must_use]
pub fn lower_bound<K: Ord>(keys: &[K], target: &K) -> (usize, bool) {
    let index = keys.partition_point(|key| key < target);
    (index, index < keys.len())
}

/// A leaf node: sorted key/value pairs.
#[derive(Debug, Clone)]
pub struct LeafNode<K, V> {
    keys: Vec<K>,
    values: Vec<V>,
    capacity: usize,
}

impl<K: FixedSize + Ord, V: FixedSize> LeafNode<K, V> {
    /// Create a new empty leaf.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            keys: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Read a leaf node from a page.
    pub fn from_page(page: &Page, layout: &NodeLayout<K, V>) -> Result<Self, NodeError> {
        let header = NodeHeader::from_page(page);
        if !header.is_leaf() {
            return Err(NodeError::WrongNodeType {
                expected: "leaf",
                level: header.level,
            });
        }

        let count = usize::from(header.count);
        if count > layout.leaf_capacity {
            return Err(NodeError::InvalidHeader(header));
        }

        let mut node = Self::new(layout.leaf_capacity);
        for index in 0..count {
            node.keys.push(NodeLayout::<K, V>::read_key(page, index));
            node.values.push(V::decode(
                page.read_bytes(layout.value_offset(index), V::SIZE),
            ));
        }

        Ok(node)
    }

    /// Write a leaf node to a page, replacing its previous contents.
    pub fn write_to_page(&self, page: &mut Page, layout: &NodeLayout<K, V>) {
        page.clear();

        let header = NodeHeader {
            level: 0,
            count: self.keys.len() as u16,
        };
        header.write_to_page(page);

        for (index, (key, value)) in self.keys.iter().zip(&self.values).enumerate() {
            NodeLayout::<K, V>::write_key(page, index, key);
            value.encode(page.bytes_mut(layout.value_offset(index), V::SIZE));
        }
    }

    /// Number of entries.
    #[must_use]
    pub fn count(&self) -> usize {
        self.keys.len()
    }

    /// Check if the node is full.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.keys.len() >= self.capacity
    }

    /// Position of the first key not less than `key`.
    #[must_use]
    pub fn lower_bound(&self, key: &K) -> (usize, bool) {
        lower_bound(&self.keys, key)
    }

    /// Index of `key`, if present.
    fn position(&self, key: &K) -> Option<usize> {
        match self.lower_bound(key) {
            (index, true) if self.keys[index] == *key => Some(index),
            _ => None,
        }
    }

    /// Get a value by key.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        self.position(key).map(|index| self.values[index])
    }

    /// Insert or update an entry.
    ///
    /// Returns the old value if updating, None if inserting.
    ///
    /// # Errors
    /// Returns `NodeError::NodeFull` if the key is new and the leaf is full.
    pub fn insert(&mut self, key: K, value: V) -> Result<Option<V>, NodeError> {
        let (index, found) = self.lower_bound(&key);
        if found && self.keys[index] == key {
            return Ok(Some(std::mem::replace(&mut self.values[index], value)));
        }

        if self.is_full() {
            return Err(NodeError::NodeFull);
        }

        self.keys.insert(index, key);
        self.values.insert(index, value);
        Ok(None)
    }

    /// Remove an entry by key.
    ///
    /// Returns the removed value if found. Never merges or rebalances.
    pub fn erase(&mut self, key: &K) -> Option<V> {
        let index = self.position(key)?;
        self.keys.remove(index);
        Some(self.values.remove(index))
    }

    /// Split the node, returning the separator and the new right node.
    ///
    /// The lower half stays in place. The separator is the first key of the
    /// right node.
    ///
    /// # Errors
    /// Returns `NodeError::TooFewEntries` if the leaf holds fewer than two
    /// entries.
    pub fn split(&mut self) -> Result<(K, Self), NodeError> {
        if self.keys.len() < 2 {
            return Err(NodeError::TooFewEntries(self.keys.len()));
        }

        let mid = self.keys.len() / 2;
        let mut right = Self::new(self.capacity);
        right.keys.extend(self.keys.drain(mid..));
        right.values.extend(self.values.drain(mid..));

        Ok((right.keys[0], right))
    }

    /// Returns the keys.
    #[must_use]
    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    /// Returns the values.
    #[must_use]
    pub fn values(&self) -> &[V] {
        &self.values
    }
}

/// An inner node: `count` children separated by `count - 1` keys.
///
/// `children[i]` holds keys `< keys[i]`, `children[i + 1]` holds keys
/// `>= keys[i]`.
#[derive(Debug, Clone)]
pub struct InnerNode<K> {
    level: u16,
    keys: Vec<K>,
    children: Vec<PageId>,
    capacity: usize,
}

impl<K: FixedSize + Ord> InnerNode<K> {
    /// Create an inner node with two children, used for a new root.
    #[must_use]
    pub fn with_children(
        level: u16,
        left_child: PageId,
        separator: K,
        right_child: PageId,
        capacity: usize,
    ) -> Self {
        let mut keys = Vec::with_capacity(capacity);
        keys.push(separator);
        let mut children = Vec::with_capacity(capacity + 1);
        children.extend([left_child, right_child]);

        Self {
            level,
            keys,
            children,
            capacity,
        }
    }

    /// Read an inner node from a page.
    pub fn from_page<V: FixedSize>(
        page: &Page,
        layout: &NodeLayout<K, V>,
    ) -> Result<Self, NodeError> {
        let header = NodeHeader::from_page(page);
        if header.is_leaf() {
            return Err(NodeError::WrongNodeType {
                expected: "inner",
                level: header.level,
            });
        }

        let count = usize::from(header.count);
        if count == 0 || count > layout.inner_capacity {
            return Err(NodeError::InvalidHeader(header));
        }

        let mut keys = Vec::with_capacity(layout.inner_capacity);
        for index in 0..count - 1 {
            keys.push(NodeLayout::<K, V>::read_key(page, index));
        }

        let mut children = Vec::with_capacity(layout.inner_capacity + 1);
        for index in 0..count {
            children.push(page.read_u64(layout.child_offset(index)));
        }

        Ok(Self {
            level: header.level,
            keys,
            children,
            capacity: layout.inner_capacity,
        })
    }

    /// Write an inner node to a page, replacing its previous contents.
    pub fn write_to_page<V: FixedSize>(&self, page: &mut Page, layout: &NodeLayout<K, V>) {
        page.clear();

        let header = NodeHeader {
            level: self.level,
            count: self.children.len() as u16,
        };
        header.write_to_page(page);

        for (index, key) in self.keys.iter().enumerate() {
            NodeLayout::<K, V>::write_key(page, index, key);
        }
        for (index, &child) in self.children.iter().enumerate() {
            page.write_u64(layout.child_offset(index), child);
        }
    }

    /// Height above the leaves.
    #[must_use]
    pub const fn level(&self) -> u16 {
        self.level
    }

    /// Number of children.
    #[must_use]
    pub fn count(&self) -> usize {
        self.children.len()
    }

    /// Check if the node is full.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.children.len() >= self.capacity
    }

    /// Position of the first separator not less than `key`.
    #[must_use]
    pub fn lower_bound(&self, key: &K) -> (usize, bool) {
        lower_bound(&self.keys, key)
    }

    /// Find the child index for a given key.
    ///
    /// A key equal to a separator belongs to the child right of it.
    #[must_use]
    pub fn child_index(&self, key: &K) -> usize {
        match self.lower_bound(key) {
            (index, true) if self.keys[index] == *key => index + 1,
            (index, true) => index,
            (_, false) => self.children.len() - 1,
        }
    }

    /// Find the child page for a given key.
    #[must_use]
    pub fn child_for(&self, key: &K) -> PageId {
        self.children[self.child_index(key)]
    }

    /// Register the right sibling produced by a child split.
    ///
    /// `separator` is the first key routed to `right_child`.
    ///
    /// # Errors
    /// Returns `NodeError::NodeFull` if the node has no room for another child.
    pub fn insert(&mut self, separator: K, right_child: PageId) -> Result<(), NodeError> {
        if self.is_full() {
            return Err(NodeError::NodeFull);
        }

        let (index, _) = self.lower_bound(&separator);
        self.keys.insert(index, separator);
        self.children.insert(index + 1, right_child);
        Ok(())
    }

    /// Split the node, returning the promoted separator and the new right node.
    ///
    /// The left node keeps the first `count / 2` children. The promoted
    /// separator is the first key routed to the right node and is kept by
    /// neither half.
    ///
    /// # Errors
    /// Returns `NodeError::TooFewEntries` if the node has fewer than two
    /// children.
    pub fn split(&mut self) -> Result<(K, Self), NodeError> {
        if self.children.len() < 2 {
            return Err(NodeError::TooFewEntries(self.children.len()));
        }

        let mid = self.children.len() / 2;

        let mut right = Self {
            level: self.level,
            keys: Vec::with_capacity(self.capacity),
            children: Vec::with_capacity(self.capacity + 1),
            capacity: self.capacity,
        };
        right.keys.extend(self.keys.drain(mid..));
        right.children.extend(self.children.drain(mid..));

        // Left now ends with the separator between its last child and the
        // right node's first child.
        let separator = self.keys.pop().ok_or(NodeError::TooFewEntries(mid))?;

        Ok((separator, right))
    }

    /// Returns the separator keys.
    #[must_use]
    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    /// Returns the child page ids.
    #[must_use]
    pub fn children(&self) -> &[PageId] {
        &self.children
    }
}

/// A decoded node page.
#[derive(Debug, Clone)]
pub enum Node<K, V> {
    Leaf(LeafNode<K, V>),
    Inner(InnerNode<K>),
}

impl<K: FixedSize + Ord, V: FixedSize> Node<K, V> {
    /// Decode a page into the node kind given by its header.
    pub fn from_page(page: &Page, layout: &NodeLayout<K, V>) -> Result<Self, NodeError> {
        if NodeHeader::from_page(page).is_leaf() {
            LeafNode::from_page(page, layout).map(Self::Leaf)
        } else {
            InnerNode::from_page(page, layout).map(Self::Inner)
        }
    }

    /// Encode the node into a page.
    pub fn write_to_page(&self, page: &mut Page, layout: &NodeLayout<K, V>) {
        match self {
            Self::Leaf(leaf) => leaf.write_to_page(page, layout),
            Self::Inner(inner) => inner.write_to_page(page, layout),
        }
    }

    /// Height above the leaves.
    #[must_use]
    pub const fn level(&self) -> u16 {
        match self {
            Self::Leaf(_) => 0,
            Self::Inner(inner) => inner.level(),
        }
    }

    /// Check if the node is full.
    #[must_use]
    pub fn is_full(&self) -> bool {
        match self {
            Self::Leaf(leaf) => leaf.is_full(),
            Self::Inner(inner) => inner.is_full(),
        }
    }

    /// Split the node, returning the separator and the new right node.
    pub fn split(&mut self) -> Result<(K, Self), NodeError> {
        match self {
            Self::Leaf(leaf) => leaf
                .split()
                .map(|(separator, right)| (separator, Self::Leaf(right))),
            Self::Inner(inner) => inner
                .split()
                .map(|(separator, right)| (separator, Self::Inner(right))),
        }
    }
}

/// Errors that can occur when working with B+Tree nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// Header describes a node the layout cannot hold.
    InvalidHeader(NodeHeader),
    /// Page holds a different node kind than requested.
    WrongNodeType { expected: &'static str, level: u16 },
    /// Node has no room; it must be split first.
    NodeFull,
    /// Node has too few entries to split.
    TooFewEntries(usize),
    /// Requested capacity does not fit the page or is too small.
    CapacityOutOfRange {
        requested: usize,
        min: usize,
        max: usize,
    },
}

impl std::fmt::Display for NodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidHeader(header) => write!(
                f,
                "invalid node header: level {}, count {}",
                header.level, header.count
            ),
            Self::WrongNodeType { expected, level } => {
                write!(f, "expected {expected} node, found level {level}")
            }
            Self::NodeFull => write!(f, "node is full"),
            Self::TooFewEntries(count) => write!(f, "cannot split node with {count} entries"),
            Self::CapacityOutOfRange {
                requested,
                min,
                max,
            } => write!(
                f,
                "node capacity {requested} out of range (min {min}, max {max})"
            ),
        }
    }
}

impl std::error::Error for NodeError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(capacity: usize) -> NodeLayout<u64, u64> {
        NodeLayout::with_capacity(capacity).expect("valid capacity")
    }

    fn full_leaf(capacity: usize) -> LeafNode<u64, u64> {
        let mut leaf = LeafNode::new(capacity);
        for key in 0..capacity as u64 {
            leaf.insert(key * 10, key).expect("room");
        }
        leaf
    }

    #[test]
    fn test_default_capacities() {
        assert_eq!(NodeLayout::<u64, u64>::max_leaf_capacity(), 511);
        assert_eq!(NodeLayout::<u64, u64>::max_inner_capacity(), 511);
        assert_eq!(NodeLayout::<[u8; 32], u64>::max_inner_capacity(), 204);

        let layout = NodeLayout::<u32, u16>::new().expect("fits");
        assert_eq!(layout.leaf_capacity(), 1364);
        assert_eq!(layout.inner_capacity(), 681);
    }

    #[test]
    fn test_capacity_validation() {
        assert!(NodeLayout::<u64, u64>::with_capacity(4).is_ok());
        assert_eq!(
            NodeLayout::<u64, u64>::with_capacity(3).err(),
            Some(NodeError::CapacityOutOfRange {
                requested: 3,
                min: 4,
                max: 511
            })
        );
        assert!(NodeLayout::<u64, u64>::with_capacity(512).is_err());
        assert!(NodeLayout::<[u8; 4096], u64>::new().is_err());
    }

    #[test]
    fn test_lower_bound() {
        let keys = [10u64, 20, 30];
        assert_eq!(lower_bound::<u64>(&[], &5), (0, false));
        assert_eq!(lower_bound(&keys, &5), (0, true));
        assert_eq!(lower_bound(&keys, &10), (0, true));
        assert_eq!(lower_bound(&keys, &11), (1, true));
        assert_eq!(lower_bound(&keys, &30), (2, true));
        assert_eq!(lower_bound(&keys, &31), (3, false));
        assert_eq!(lower_bound(&[7u64], &7), (0, true));
        assert_eq!(lower_bound(&[7u64], &8), (1, false));
    }

    #[test]
    fn test_leaf_node_roundtrip() {
        let layout = layout(8);
        let mut leaf = LeafNode::new(8);
        leaf.insert(3, 30).expect("room");
        leaf.insert(1, 10).expect("room");
        leaf.insert(2, 20).expect("room");

        let mut page = Page::new();
        leaf.write_to_page(&mut page, &layout);
        assert_eq!(NodeHeader::from_page(&page), NodeHeader { level: 0, count: 3 });

        let restored = LeafNode::from_page(&page, &layout).expect("should parse");
        assert_eq!(restored.keys(), &[1, 2, 3]);
        assert_eq!(restored.values(), &[10, 20, 30]);
    }

    #[test]
    fn test_leaf_page_layout() {
        let layout = NodeLayout::<u32, u16>::with_capacity(4).expect("valid");
        let mut leaf = LeafNode::new(4);
        leaf.insert(0x0102_0304, 0xAABB).expect("room");

        let mut page = Page::new();
        leaf.write_to_page(&mut page, &layout);

        assert_eq!(page.read_bytes(0, 4), &[0u8, 0, 1, 0]);
        assert_eq!(page.read_bytes(4, 4), &[4u8, 3, 2, 1]);
        // Values start after keys[4].
        assert_eq!(page.read_bytes(4 + 4 * 4, 2), &[0xBBu8, 0xAA]);
        assert_eq!(page.read_bytes(8, 12), &[0u8; 12]);
    }

    #[test]
    fn test_inner_page_layout() {
        let layout = NodeLayout::<u32, u16>::with_capacity(4).expect("valid");
        let mut inner = InnerNode::with_children(2, 100, 50u32, 200, 4);
        inner.insert(70, 300).expect("room");

        let mut page = Page::new();
        inner.write_to_page(&mut page, &layout);

        assert_eq!(NodeHeader::from_page(&page), NodeHeader { level: 2, count: 3 });
        assert_eq!(page.read_bytes(4, 8), &[50u8, 0, 0, 0, 70, 0, 0, 0]);
        // Children start after keys[4].
        let children = 4 + 4 * 4;
        assert_eq!(page.read_u64(children), 100);
        assert_eq!(page.read_u64(children + 8), 200);
        assert_eq!(page.read_u64(children + 16), 300);

        let restored = InnerNode::from_page(&page, &layout).expect("should parse");
        assert_eq!(restored.level(), 2);
        assert_eq!(restored.keys(), &[50, 70]);
        assert_eq!(restored.children(), &[100, 200, 300]);
    }

    #[test]
    fn test_node_kind_checks() {
        let layout = layout(4);
        let mut page = Page::new();
        LeafNode::<u64, u64>::new(4).write_to_page(&mut page, &layout);
        assert!(matches!(
            InnerNode::from_page(&page, &layout),
            Err(NodeError::WrongNodeType { expected: "inner", level: 0 })
        ));
        assert!(matches!(
            Node::from_page(&page, &layout),
            Ok(Node::Leaf(leaf)) if leaf.count() == 0
        ));

        NodeHeader { level: 0, count: 5 }.write_to_page(&mut page);
        assert_eq!(
            LeafNode::from_page(&page, &layout).err(),
            Some(NodeError::InvalidHeader(NodeHeader { level: 0, count: 5 }))
        );

        NodeHeader { level: 1, count: 0 }.write_to_page(&mut page);
        assert!(matches!(
            Node::from_page(&page, &layout),
            Err(NodeError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_leaf_node_insert_update() {
        let mut leaf = LeafNode::<u64, u64>::new(4);

        assert_eq!(leaf.insert(1, 10), Ok(None));
        assert_eq!(leaf.count(), 1);

        assert_eq!(leaf.insert(1, 11), Ok(Some(10)));
        assert_eq!(leaf.count(), 1);
        assert_eq!(leaf.get(&1), Some(11));
        assert_eq!(leaf.get(&2), None);
    }

    #[test]
    fn test_full_leaf_rejects_new_keys_only() {
        let mut leaf = full_leaf(4);
        assert!(leaf.is_full());
        assert_eq!(leaf.insert(5, 0), Err(NodeError::NodeFull));
        // Updating an existing key needs no room.
        assert_eq!(leaf.insert(20, 99), Ok(Some(2)));
        assert_eq!(leaf.count(), 4);
    }

    #[test]
    fn test_leaf_node_erase() {
        let mut leaf = full_leaf(4);
        assert_eq!(leaf.erase(&10), Some(1));
        assert_eq!(leaf.keys(), &[0, 20, 30]);
        assert_eq!(leaf.values(), &[0, 2, 3]);

        assert_eq!(leaf.erase(&10), None);
        assert_eq!(leaf.count(), 3);
    }

    #[test]
    fn test_leaf_node_split() {
        let mut leaf = full_leaf(5);
        let (separator, right) = leaf.split().expect("full leaf splits");

        assert_eq!(leaf.keys(), &[0, 10]);
        assert_eq!(right.keys(), &[20, 30, 40]);
        assert_eq!(right.values(), &[2, 3, 4]);
        assert_eq!(separator, right.keys()[0]);
        assert_eq!(leaf.count() + right.count(), 5);
        assert!(!leaf.is_full() && !right.is_full());
    }

    #[test]
    fn test_tiny_leaf_does_not_split() {
        let mut leaf = LeafNode::<u64, u64>::new(4);
        leaf.insert(1, 1).expect("room");
        assert_eq!(leaf.split().err(), Some(NodeError::TooFewEntries(1)));
    }

    #[test]
    fn test_inner_node_child_index() {
        let mut inner = InnerNode::with_children(1, 100, 10u64, 200, 8);
        inner.insert(20, 300).expect("room");
        inner.insert(30, 400).expect("room");
        assert_eq!(inner.children(), &[100, 200, 300, 400]);

        // Key less than first separator -> first child
        assert_eq!(inner.child_index(&5), 0);
        // Key equal to a separator -> child right of it
        assert_eq!(inner.child_index(&10), 1);
        assert_eq!(inner.child_index(&15), 1);
        assert_eq!(inner.child_index(&30), 3);
        // Key greater than all -> last child
        assert_eq!(inner.child_for(&35), 400);
    }

    #[test]
    fn test_inner_insert_between_children() {
        let mut inner = InnerNode::with_children(1, 100, 50u64, 200, 4);
        // Child 100 split at 20 -> new sibling 150 sits between 100 and 200.
        inner.insert(20, 150).expect("room");
        assert_eq!(inner.keys(), &[20, 50]);
        assert_eq!(inner.children(), &[100, 150, 200]);
        assert_eq!(inner.child_for(&19), 100);
        assert_eq!(inner.child_for(&20), 150);
        assert_eq!(inner.child_for(&50), 200);

        inner.insert(80, 250).expect("room");
        assert!(inner.is_full());
        assert_eq!(inner.insert(90, 260), Err(NodeError::NodeFull));
    }

    #[test]
    fn test_inner_node_split() {
        let mut inner = InnerNode::with_children(3, 0, 10u64, 1, 4);
        inner.insert(20, 2).expect("room");
        inner.insert(30, 3).expect("room");
        assert!(inner.is_full());

        let (separator, right) = inner.split().expect("full node splits");

        assert_eq!(separator, 20);
        assert_eq!(inner.keys(), &[10]);
        assert_eq!(inner.children(), &[0, 1]);
        assert_eq!(right.keys(), &[30]);
        assert_eq!(right.children(), &[2, 3]);
        assert_eq!(right.level(), 3);

        // Keys and children are conserved; the separator moves up.
        assert_eq!(inner.keys().len() + right.keys().len() + 1, 3);
        assert_eq!(inner.count() + right.count(), 4);
    }

    #[test]
    fn test_odd_inner_split() {
        let mut inner = InnerNode::with_children(1, 0, 10u64, 1, 5);
        for (key, child) in [(20, 2), (30, 3), (40, 4)] {
            inner.insert(key, child).expect("room");
        }

        let (separator, right) = inner.split().expect("full node splits");
        assert_eq!(separator, 20);
        assert_eq!(inner.children(), &[0, 1]);
        assert_eq!(right.keys(), &[30, 40]);
        assert_eq!(right.children(), &[2, 3, 4]);
    }

    #[test]
    fn test_node_split_dispatch() {
        let mut node: Node<u64, u64> = Node::Leaf(full_leaf(4));
        assert!(node.is_full());
        assert_eq!(node.level(), 0);

        let (separator, right) = node.split().expect("full leaf splits");
        assert_eq!(separator, 20);
        assert!(matches!(right, Node::Leaf(leaf) if leaf.keys() == [20, 30]));
        assert!(!node.is_full());
    }
}
