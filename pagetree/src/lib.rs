// Life of an operation:
// 1. Take the root latch (exclusive for insert, shared otherwise)
// 2. Fix the root page, then walk down one level at a time:
//     - fix the child before releasing the parent
//     - insert splits any full node before entering it
// 3. Read or update the leaf
// 4. Drop the guards; modified pages stay dirty until drained
//
// System components:
//  - Buffer pool (page store)
//  - B+Tree nodes and tree controller
//  - Workload driver for the binary

pub mod config;
pub mod storage;
pub mod workload;
