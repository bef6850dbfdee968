//! Purpose: Library crate backing the `mapstat` CLI and its tests.
//! Exports: `core` (engine interface, LMDB and in-memory engines, inspection).
//! Role: Read-only metadata collection for memory-mapped B+tree stores.
//! Invariants: Nothing in this crate writes to a store or commits a transaction.
//! Invariants: Engine handles are released by drop in reverse acquisition order.
pub mod core;
