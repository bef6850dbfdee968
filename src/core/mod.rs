// Storage-engine interface, engines, and the inspection pipeline.
pub mod engine;
pub mod error;
pub mod inspect;
pub mod lmdb;
pub mod memory;
pub mod report;
pub mod resolve;
pub mod walk;
