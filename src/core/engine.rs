// Storage-engine collaborator interface consumed by the inspection driver.
//
// Handles release their engine resources on drop: dropping a `Store` closes the
// environment and dropping a transaction aborts it. Nothing here ever commits.
use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::core::error::Error;

/// Engine operations, named as they appear in failure reports.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Op {
    EnvOpen,
    TxnBegin,
    EnvInfo,
    TableOpen,
    TableStat,
    CursorOpen,
    CursorNext,
}

impl Op {
    pub fn as_str(self) -> &'static str {
        match self {
            Op::EnvOpen => "env_open",
            Op::TxnBegin => "txn_begin",
            Op::EnvInfo => "env_info",
            Op::TableOpen => "table_open",
            Op::TableStat => "table_stat",
            Op::CursorOpen => "cursor_open",
            Op::CursorNext => "cursor_next",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Environment open parameters. The environment is always opened read-only.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct OpenOptions {
    /// Named-table slots to preallocate; `None` leaves only the root table usable.
    pub max_tables: Option<u32>,
    /// The path names the data file itself rather than its directory.
    pub no_subdir: bool,
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_tables(mut self, max_tables: u32) -> Self {
        self.max_tables = Some(max_tables);
        self
    }

    pub fn with_no_subdir(mut self, no_subdir: bool) -> Self {
        self.no_subdir = no_subdir;
        self
    }
}

/// Structural metrics of one table at one point in transaction time.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Stats {
    pub page_size: u32,
    pub depth: u32,
    pub branch_pages: u64,
    pub leaf_pages: u64,
    pub overflow_pages: u64,
    pub entries: u64,
}

/// Environment-wide runtime metrics.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct EnvInfo {
    pub map_size: u64,
    pub last_txn_id: u64,
    pub last_page_no: u64,
    pub max_readers: u32,
    pub num_readers: u32,
}

pub trait Engine {
    type Store: Store;

    fn open(&self, path: &Path, options: &OpenOptions) -> Result<Self::Store, Error>;
}

pub trait Store {
    type Txn<'s>: ReadTxn
    where
        Self: 's;

    fn begin_read(&self) -> Result<Self::Txn<'_>, Error>;

    fn env_info(&self) -> Result<EnvInfo, Error>;
}

/// A read-only snapshot. Tables opened here are scoped to it.
pub trait ReadTxn {
    type Table;
    type Keys<'t>: Iterator<Item = Result<Vec<u8>, Error>>
    where
        Self: 't;

    /// Opens a named table, or the root table when `name` is `None`.
    fn open_table(&self, name: Option<&[u8]>) -> Result<Self::Table, Error>;

    fn close_table(&self, table: Self::Table);

    fn stat(&self, table: &Self::Table) -> Result<Stats, Error>;

    /// Forward-only cursor over the table's keys in engine sort order.
    /// Values are never read.
    fn keys<'t>(&'t self, table: &Self::Table) -> Result<Self::Keys<'t>, Error>;
}

#[cfg(test)]
mod tests {
    use super::{Op, OpenOptions};

    #[test]
    fn op_names_are_stable() {
        let cases = [
            (Op::EnvOpen, "env_open"),
            (Op::TxnBegin, "txn_begin"),
            (Op::EnvInfo, "env_info"),
            (Op::TableOpen, "table_open"),
            (Op::TableStat, "table_stat"),
            (Op::CursorOpen, "cursor_open"),
            (Op::CursorNext, "cursor_next"),
        ];
        for (op, name) in cases {
            assert_eq!(op.to_string(), name);
        }
    }

    #[test]
    fn open_options_default_to_root_only() {
        let options = OpenOptions::new();
        assert_eq!(options.max_tables, None);
        assert!(!options.no_subdir);

        let options = options.with_max_tables(8).with_no_subdir(true);
        assert_eq!(options.max_tables, Some(8));
        assert!(options.no_subdir);
    }
}
