// Inspection driver: open, snapshot, report, enumerate, and unwind.
//
// Resources are held in locals so they drop in reverse acquisition order on
// every exit path: table guard, then transaction (abort), then store (close).
use std::path::PathBuf;

use bstr::BStr;
use tracing::{debug, warn};

use crate::core::engine::{Engine, OpenOptions, ReadTxn, Store};
use crate::core::error::Error;
use crate::core::report::ReportSink;
use crate::core::resolve::open_table;
use crate::core::walk::{Walk, walk_sub_databases};

pub const DEFAULT_MAX_TABLES: u32 = 4;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Target {
    /// Root table stats only.
    Root,
    /// Root table stats, then every sub-database it references.
    All,
    /// Stats for one named sub-database.
    Named(Vec<u8>),
}

impl Target {
    fn name(&self) -> Option<&[u8]> {
        match self {
            Target::Named(name) => Some(name),
            Target::Root | Target::All => None,
        }
    }

    fn needs_named_tables(&self) -> bool {
        !matches!(self, Target::Root)
    }
}

#[derive(Clone, Debug)]
pub struct InspectRequest {
    pub path: PathBuf,
    pub target: Target,
    pub env_info: bool,
    pub no_subdir: bool,
    pub max_tables: u32,
}

impl InspectRequest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            target: Target::Root,
            env_info: false,
            no_subdir: false,
            max_tables: DEFAULT_MAX_TABLES,
        }
    }

    pub fn with_target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    pub fn with_env_info(mut self, env_info: bool) -> Self {
        self.env_info = env_info;
        self
    }

    pub fn with_no_subdir(mut self, no_subdir: bool) -> Self {
        self.no_subdir = no_subdir;
        self
    }

    pub fn with_max_tables(mut self, max_tables: u32) -> Self {
        self.max_tables = max_tables;
        self
    }

    /// Table slots are only preallocated when a named table will be opened.
    pub fn open_options(&self) -> OpenOptions {
        let options = OpenOptions::new().with_no_subdir(self.no_subdir);
        if self.target.needs_named_tables() {
            options.with_max_tables(self.max_tables)
        } else {
            options
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Summary {
    pub tables_reported: usize,
    pub keys_skipped: usize,
}

pub fn inspect<E: Engine>(
    engine: &E,
    request: &InspectRequest,
    sink: &mut dyn ReportSink,
) -> Result<Summary, Error> {
    let result = run(engine, request, sink);
    if let Err(err) = &result {
        warn!(path = %request.path.display(), error = %err, "inspection failed");
    }
    result
}

fn run<E: Engine>(
    engine: &E,
    request: &InspectRequest,
    sink: &mut dyn ReportSink,
) -> Result<Summary, Error> {
    let store = engine.open(&request.path, &request.open_options())?;
    let txn = store.begin_read()?;
    debug!(path = %request.path.display(), "read transaction started");

    if request.env_info {
        let info = store.env_info()?;
        sink.env_info(&info)?;
    }

    let name = request.target.name();
    if let Some(name) = name {
        debug!(table = %BStr::new(name), "opening named table");
    }
    let table = open_table(&txn, name)?;
    sink.target(name)?;
    let stats = txn.stat(table.table())?;
    sink.stats(&stats)?;

    let walk = match request.target {
        Target::All => walk_sub_databases(&txn, table.table(), sink)?,
        Target::Root | Target::Named(_) => Walk::default(),
    };

    Ok(Summary {
        tables_reported: 1 + walk.reported,
        keys_skipped: walk.skipped,
    })
}
