// In-memory engine with call accounting and fault injection.
//
// Mirrors the LMDB behaviours the inspector depends on: named tables live as
// keys of the root table, ordinary keys are incompatible with table opens, the
// named-table slot count is checked before the name lookup, and a read
// transaction sees a snapshot taken when it began.
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;

use crate::core::engine::{Engine, EnvInfo, Op, OpenOptions, ReadTxn, Stats, Store};
use crate::core::error::{Error, codes, describe};

pub const PAGE_SIZE: u32 = 4096;
pub const MAP_SIZE: u64 = 10 * 1024 * 1024;
pub const MAX_READERS: u32 = 126;

const LEAF_FANOUT: u64 = 64;
const BRANCH_FANOUT: u64 = 128;
const TABLE_RECORD_LEN: usize = 48;

/// Successful acquisitions and releases, per resource.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Calls {
    pub env_open: usize,
    pub env_close: usize,
    pub txn_begin: usize,
    pub txn_abort: usize,
    pub table_open: usize,
    pub table_close: usize,
    pub cursor_open: usize,
    pub cursor_close: usize,
}

impl Calls {
    pub fn balanced(&self) -> bool {
        self.env_open == self.env_close
            && self.txn_begin == self.txn_abort
            && self.table_open == self.table_close
            && self.cursor_open == self.cursor_close
    }
}

type Entries = BTreeMap<Vec<u8>, Vec<u8>>;

#[derive(Clone, Debug)]
enum Slot {
    Data(Vec<u8>),
    Table(Entries),
}

#[derive(Clone, Debug)]
struct Fault {
    op: Op,
    table: Option<Vec<u8>>,
    after: usize,
    code: i32,
}

impl Fault {
    fn matches(&self, op: Op, table: Option<&[u8]>) -> bool {
        self.op == op
            && match (&self.table, table) {
                (None, _) => true,
                (Some(wanted), Some(name)) => wanted.as_slice() == name,
                (Some(_), None) => false,
            }
    }
}

#[derive(Debug)]
struct State {
    root: BTreeMap<Vec<u8>, Slot>,
    last_txn_id: u64,
    faults: Vec<Fault>,
    calls: Calls,
    open_named: u32,
    readers: u32,
}

impl State {
    fn fault(&self, op: Op, table: Option<&[u8]>) -> Result<(), Error> {
        match self.faults.iter().find(|fault| fault.matches(op, table)) {
            Some(fault) => Err(Error::engine(op, fault.code, describe(fault.code))),
            None => Ok(()),
        }
    }

    fn commit(&mut self) {
        self.last_txn_id += 1;
    }
}

/// Shared handle; clones observe the same tables, faults, and counters.
#[derive(Clone, Debug)]
pub struct MemoryEngine {
    state: Rc<RefCell<State>>,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(State {
                root: BTreeMap::new(),
                last_txn_id: 0,
                faults: Vec::new(),
                calls: Calls::default(),
                open_named: 0,
                readers: 0,
            })),
        }
    }

    /// Stores an ordinary key in the root table.
    pub fn put(&self, key: &[u8], value: &[u8]) -> &Self {
        let mut state = self.state.borrow_mut();
        state.root.insert(key.to_vec(), Slot::Data(value.to_vec()));
        state.commit();
        self
    }

    pub fn create_table(&self, name: &[u8]) -> &Self {
        let mut state = self.state.borrow_mut();
        state
            .root
            .entry(name.to_vec())
            .or_insert_with(|| Slot::Table(Entries::new()));
        state.commit();
        self
    }

    /// Stores an entry in a named table, creating the table if needed.
    pub fn put_in(&self, table: &[u8], key: &[u8], value: &[u8]) -> &Self {
        let mut state = self.state.borrow_mut();
        let slot = state
            .root
            .entry(table.to_vec())
            .or_insert_with(|| Slot::Table(Entries::new()));
        if let Slot::Table(entries) = slot {
            entries.insert(key.to_vec(), value.to_vec());
        }
        state.commit();
        self
    }

    /// Every call to `op` fails with `code`.
    pub fn fail(&self, op: Op, code: i32) -> &Self {
        self.push_fault(op, None, 0, code)
    }

    /// Calls to `op` against the named table fail with `code`.
    pub fn fail_table(&self, op: Op, table: &[u8], code: i32) -> &Self {
        self.push_fault(op, Some(table.to_vec()), 0, code)
    }

    /// Cursors yield `keys` keys, then fail with `code`.
    pub fn fail_cursor_after(&self, keys: usize, code: i32) -> &Self {
        self.push_fault(Op::CursorNext, None, keys, code)
    }

    pub fn calls(&self) -> Calls {
        self.state.borrow().calls
    }

    pub fn open_tables(&self) -> u32 {
        self.state.borrow().open_named
    }

    fn push_fault(&self, op: Op, table: Option<Vec<u8>>, after: usize, code: i32) -> &Self {
        self.state.borrow_mut().faults.push(Fault {
            op,
            table,
            after,
            code,
        });
        self
    }
}

impl Engine for MemoryEngine {
    type Store = MemoryStore;

    fn open(&self, _path: &Path, options: &OpenOptions) -> Result<MemoryStore, Error> {
        let mut state = self.state.borrow_mut();
        state.fault(Op::EnvOpen, None)?;
        state.calls.env_open += 1;
        Ok(MemoryStore {
            state: Rc::clone(&self.state),
            max_tables: options.max_tables.unwrap_or(0),
        })
    }
}

#[derive(Debug)]
pub struct MemoryStore {
    state: Rc<RefCell<State>>,
    max_tables: u32,
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        self.state.borrow_mut().calls.env_close += 1;
    }
}

impl Store for MemoryStore {
    type Txn<'s>
        = MemoryTxn<'s>
    where
        Self: 's;

    fn begin_read(&self) -> Result<MemoryTxn<'_>, Error> {
        let mut state = self.state.borrow_mut();
        state.fault(Op::TxnBegin, None)?;
        if state.readers >= MAX_READERS {
            return Err(Error::engine(
                Op::TxnBegin,
                codes::READERS_FULL,
                describe(codes::READERS_FULL),
            ));
        }
        state.readers += 1;
        state.calls.txn_begin += 1;
        Ok(MemoryTxn {
            store: self,
            snapshot: state.root.clone(),
        })
    }

    fn env_info(&self) -> Result<EnvInfo, Error> {
        let state = self.state.borrow();
        state.fault(Op::EnvInfo, None)?;
        let last_page_no = state
            .root
            .values()
            .map(|slot| match slot {
                Slot::Data(_) => 0,
                Slot::Table(entries) => total_pages(&shape(entries.values().map(Vec::len))),
            })
            .sum::<u64>()
            + total_pages(&shape(state.root.values().map(slot_len)))
            + 1;
        Ok(EnvInfo {
            map_size: MAP_SIZE,
            last_txn_id: state.last_txn_id,
            last_page_no,
            max_readers: MAX_READERS,
            num_readers: state.readers,
        })
    }
}

#[derive(Debug)]
pub struct MemoryTxn<'s> {
    store: &'s MemoryStore,
    snapshot: BTreeMap<Vec<u8>, Slot>,
}

impl Drop for MemoryTxn<'_> {
    fn drop(&mut self) {
        let mut state = self.store.state.borrow_mut();
        state.readers -= 1;
        state.calls.txn_abort += 1;
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MemoryTable {
    Root,
    Named(Vec<u8>),
}

impl MemoryTable {
    fn name(&self) -> Option<&[u8]> {
        match self {
            MemoryTable::Root => None,
            MemoryTable::Named(name) => Some(name),
        }
    }
}

impl MemoryTxn<'_> {
    fn entries(&self, table: &MemoryTable) -> Result<Vec<(Vec<u8>, usize)>, Error> {
        match table {
            MemoryTable::Root => Ok(self
                .snapshot
                .iter()
                .map(|(key, slot)| (key.clone(), slot_len(slot)))
                .collect()),
            MemoryTable::Named(name) => match self.snapshot.get(name) {
                Some(Slot::Table(entries)) => Ok(entries
                    .iter()
                    .map(|(key, value)| (key.clone(), value.len()))
                    .collect()),
                _ => Err(Error::engine(
                    Op::TableStat,
                    codes::BAD_DBI,
                    describe(codes::BAD_DBI),
                )),
            },
        }
    }
}

impl ReadTxn for MemoryTxn<'_> {
    type Table = MemoryTable;
    type Keys<'t>
        = MemoryKeys
    where
        Self: 't;

    fn open_table(&self, name: Option<&[u8]>) -> Result<MemoryTable, Error> {
        let mut state = self.store.state.borrow_mut();
        state.fault(Op::TableOpen, name)?;
        let Some(name) = name else {
            state.calls.table_open += 1;
            return Ok(MemoryTable::Root);
        };

        if name.is_empty() || name.contains(&0) {
            return Err(Error::engine(
                Op::TableOpen,
                codes::BAD_VALSIZE,
                describe(codes::BAD_VALSIZE),
            ));
        }
        if state.open_named >= self.store.max_tables {
            return Err(Error::engine(
                Op::TableOpen,
                codes::DBS_FULL,
                describe(codes::DBS_FULL),
            ));
        }
        let code = match self.snapshot.get(name) {
            Some(Slot::Table(_)) => None,
            Some(Slot::Data(_)) => Some(codes::INCOMPATIBLE),
            None => Some(codes::NOT_FOUND),
        };
        if let Some(code) = code {
            return Err(Error::engine(Op::TableOpen, code, describe(code)));
        }

        state.open_named += 1;
        state.calls.table_open += 1;
        Ok(MemoryTable::Named(name.to_vec()))
    }

    fn close_table(&self, table: MemoryTable) {
        let mut state = self.store.state.borrow_mut();
        if let MemoryTable::Named(_) = table {
            state.open_named -= 1;
        }
        state.calls.table_close += 1;
    }

    fn stat(&self, table: &MemoryTable) -> Result<Stats, Error> {
        self.store.state.borrow().fault(Op::TableStat, table.name())?;
        let entries = self.entries(table)?;
        Ok(shape(entries.into_iter().map(|(_, len)| len)))
    }

    fn keys<'t>(&'t self, table: &MemoryTable) -> Result<MemoryKeys, Error> {
        let mut state = self.store.state.borrow_mut();
        state.fault(Op::CursorOpen, table.name())?;
        let keys = self
            .entries(table)?
            .into_iter()
            .map(|(key, _)| key)
            .collect::<Vec<_>>();
        let failure = state
            .faults
            .iter()
            .find(|fault| fault.matches(Op::CursorNext, table.name()))
            .map(|fault| (fault.after, fault.code));
        state.calls.cursor_open += 1;
        Ok(MemoryKeys {
            state: Rc::clone(&self.store.state),
            keys: keys.into_iter(),
            yielded: 0,
            failure,
        })
    }
}

#[derive(Debug)]
pub struct MemoryKeys {
    state: Rc<RefCell<State>>,
    keys: std::vec::IntoIter<Vec<u8>>,
    yielded: usize,
    failure: Option<(usize, i32)>,
}

impl Iterator for MemoryKeys {
    type Item = Result<Vec<u8>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some((after, code)) = self.failure {
            if self.yielded == after {
                self.failure = None;
                self.keys = Vec::new().into_iter();
                return Some(Err(Error::engine(Op::CursorNext, code, describe(code))));
            }
        }
        let key = self.keys.next()?;
        self.yielded += 1;
        Some(Ok(key))
    }
}

impl Drop for MemoryKeys {
    fn drop(&mut self) {
        self.state.borrow_mut().calls.cursor_close += 1;
    }
}

fn slot_len(slot: &Slot) -> usize {
    match slot {
        Slot::Data(value) => value.len(),
        Slot::Table(_) => TABLE_RECORD_LEN,
    }
}

/// Synthesizes B+tree metrics for a table holding values of the given sizes.
fn shape(value_lens: impl Iterator<Item = usize>) -> Stats {
    let mut entries = 0u64;
    let mut overflow_pages = 0u64;
    for len in value_lens {
        entries += 1;
        if len > PAGE_SIZE as usize / 2 {
            overflow_pages += (len as u64).div_ceil(PAGE_SIZE as u64);
        }
    }
    if entries == 0 {
        return Stats {
            page_size: PAGE_SIZE,
            ..Stats::default()
        };
    }

    let leaf_pages = entries.div_ceil(LEAF_FANOUT);
    let mut depth = 1;
    let mut branch_pages = 0;
    let mut level = leaf_pages;
    while level > 1 {
        level = level.div_ceil(BRANCH_FANOUT);
        branch_pages += level;
        depth += 1;
    }
    Stats {
        page_size: PAGE_SIZE,
        depth,
        branch_pages,
        leaf_pages,
        overflow_pages,
        entries,
    }
}

fn total_pages(stats: &Stats) -> u64 {
    stats.branch_pages + stats.leaf_pages + stats.overflow_pages
}
