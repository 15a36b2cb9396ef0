//! B+Tree over buffer-pool pages.
//!
//! # Structure
//!
//! The tree consists of:
//! - Inner nodes: separator keys and child page ids, routing lookups
//! - Leaf nodes: key-value pairs, all at level 0
//!
//! A separator is the first key routed to the child on its right.
//!
//! # Keys and values
//!
//! Keys and values have a fixed encoded size (`FixedSize`). Node capacity
//! follows from those sizes unless a smaller one is requested.
//!
//! # Usage
//!
//! ```
//! use pagetree::storage::BufferPool;
//! use pagetree::storage::btree::BTree;
//!
//! let pool = BufferPool::new(64);
//! let tree = BTree::<u64, u64>::with_capacity(0, &pool, 4).expect("valid capacity");
//!
//! tree.insert(1, 10).expect("insert");
//! assert_eq!(tree.lookup(&1).expect("lookup"), Some(10));
//! assert_eq!(tree.erase(&1).expect("erase"), Some(10));
//! assert_eq!(tree.lookup(&1).expect("lookup"), None);
//! ```

mod codec;
mod node;
mod tree;

pub use codec::FixedSize;
pub use node::{
    InnerNode, LeafNode, MIN_CAPACITY, NODE_HEADER_SIZE, Node, NodeError, NodeHeader, NodeLayout,
    lower_bound,
};
pub use tree::{BTree, BTreeError, TreeMeta, TreeStats};
