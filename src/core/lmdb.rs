//! Purpose: LMDB-backed engine over the raw C API.
//! Exports: `Lmdb`, `LmdbStore`, `LmdbTxn`, `LmdbTable`, `LmdbKeys`.
//! Role: Production `Engine`; read-only environment, snapshot transactions, key cursors.
//! Invariants: Every handle is released by `Drop` (cursor, then txn abort, then env close).
//! Invariants: Named table handles are closed as soon as the caller is done with them,
//! so enumeration needs one table slot regardless of how many sub-databases exist.
//! Invariants: All FFI interaction is confined to this module.
use std::ffi::CString;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::ptr::{self, NonNull};

use lmdb_master_sys as ffi;
use tracing::debug;

use crate::core::engine::{Engine, EnvInfo, Op, OpenOptions, ReadTxn, Stats, Store};
use crate::core::error::{Error, ErrorKind, codes, describe};

const FILE_MODE: ffi::mdb_mode_t = 0o644;

fn check(op: Op, rc: libc::c_int) -> Result<(), Error> {
    if rc == 0 {
        Ok(())
    } else {
        Err(Error::engine(op, rc, describe(rc)))
    }
}

fn null_handle(op: Op) -> Error {
    Error::new(ErrorKind::Internal)
        .with_op(op)
        .with_message("engine returned a null handle")
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Lmdb;

impl Engine for Lmdb {
    type Store = LmdbStore;

    fn open(&self, path: &Path, options: &OpenOptions) -> Result<LmdbStore, Error> {
        let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|err| {
            Error::engine(Op::EnvOpen, libc::EINVAL, describe(libc::EINVAL))
                .with_path(path)
                .with_source(err)
        })?;

        let mut raw = ptr::null_mut();
        check(Op::EnvOpen, unsafe { ffi::mdb_env_create(&mut raw) })?;
        let env = NonNull::new(raw).ok_or_else(|| null_handle(Op::EnvOpen))?;
        // From here on the handle is closed by `Drop`, including when open fails.
        let store = LmdbStore { env };

        if let Some(max_tables) = options.max_tables {
            check(Op::EnvOpen, unsafe {
                ffi::mdb_env_set_maxdbs(store.env.as_ptr(), max_tables)
            })?;
        }
        let mut flags = ffi::MDB_RDONLY;
        if options.no_subdir {
            flags |= ffi::MDB_NOSUBDIR;
        }
        check(Op::EnvOpen, unsafe {
            ffi::mdb_env_open(store.env.as_ptr(), c_path.as_ptr(), flags, FILE_MODE)
        })
        .map_err(|err| err.with_path(path))?;

        debug!(path = %path.display(), ?options, "opened environment");
        Ok(store)
    }
}

pub struct LmdbStore {
    env: NonNull<ffi::MDB_env>,
}

impl Drop for LmdbStore {
    fn drop(&mut self) {
        unsafe { ffi::mdb_env_close(self.env.as_ptr()) };
    }
}

impl Store for LmdbStore {
    type Txn<'s>
        = LmdbTxn<'s>
    where
        Self: 's;

    fn begin_read(&self) -> Result<LmdbTxn<'_>, Error> {
        let mut raw = ptr::null_mut();
        check(Op::TxnBegin, unsafe {
            ffi::mdb_txn_begin(self.env.as_ptr(), ptr::null_mut(), ffi::MDB_RDONLY, &mut raw)
        })?;
        let txn = NonNull::new(raw).ok_or_else(|| null_handle(Op::TxnBegin))?;
        Ok(LmdbTxn {
            env: self.env,
            txn,
            _store: PhantomData,
        })
    }

    fn env_info(&self) -> Result<EnvInfo, Error> {
        let mut info = MaybeUninit::<ffi::MDB_envinfo>::uninit();
        check(Op::EnvInfo, unsafe {
            ffi::mdb_env_info(self.env.as_ptr(), info.as_mut_ptr())
        })?;
        let info = unsafe { info.assume_init() };
        Ok(EnvInfo {
            map_size: info.me_mapsize as u64,
            last_txn_id: info.me_last_txnid as u64,
            last_page_no: info.me_last_pgno as u64,
            max_readers: info.me_maxreaders,
            num_readers: info.me_numreaders,
        })
    }
}

pub struct LmdbTxn<'e> {
    env: NonNull<ffi::MDB_env>,
    txn: NonNull<ffi::MDB_txn>,
    _store: PhantomData<&'e LmdbStore>,
}

impl Drop for LmdbTxn<'_> {
    fn drop(&mut self) {
        unsafe { ffi::mdb_txn_abort(self.txn.as_ptr()) };
    }
}

/// A table handle. Not `Copy`, so each handle is closed at most once.
#[derive(Debug)]
pub struct LmdbTable {
    dbi: ffi::MDB_dbi,
    named: bool,
}

impl ReadTxn for LmdbTxn<'_> {
    type Table = LmdbTable;
    type Keys<'t>
        = LmdbKeys<'t>
    where
        Self: 't;

    fn open_table(&self, name: Option<&[u8]>) -> Result<LmdbTable, Error> {
        let name = name.map(table_name).transpose()?;
        let name_ptr = name.as_ref().map_or(ptr::null(), |name| name.as_ptr());
        let mut dbi: ffi::MDB_dbi = 0;
        check(Op::TableOpen, unsafe {
            ffi::mdb_dbi_open(self.txn.as_ptr(), name_ptr, 0, &mut dbi)
        })?;
        Ok(LmdbTable {
            dbi,
            named: name.is_some(),
        })
    }

    fn close_table(&self, table: LmdbTable) {
        // The root handle is owned by the environment.
        if table.named {
            unsafe { ffi::mdb_dbi_close(self.env.as_ptr(), table.dbi) };
        }
    }

    fn stat(&self, table: &LmdbTable) -> Result<Stats, Error> {
        let mut stat = MaybeUninit::<ffi::MDB_stat>::uninit();
        check(Op::TableStat, unsafe {
            ffi::mdb_stat(self.txn.as_ptr(), table.dbi, stat.as_mut_ptr())
        })?;
        let stat = unsafe { stat.assume_init() };
        Ok(Stats {
            page_size: stat.ms_psize,
            depth: stat.ms_depth,
            branch_pages: stat.ms_branch_pages as u64,
            leaf_pages: stat.ms_leaf_pages as u64,
            overflow_pages: stat.ms_overflow_pages as u64,
            entries: stat.ms_entries as u64,
        })
    }

    fn keys<'t>(&'t self, table: &LmdbTable) -> Result<LmdbKeys<'t>, Error> {
        let mut raw = ptr::null_mut();
        check(Op::CursorOpen, unsafe {
            ffi::mdb_cursor_open(self.txn.as_ptr(), table.dbi, &mut raw)
        })?;
        let cursor = NonNull::new(raw).ok_or_else(|| null_handle(Op::CursorOpen))?;
        Ok(LmdbKeys {
            cursor,
            step: Some(ffi::MDB_FIRST),
            _txn: PhantomData,
        })
    }
}

pub struct LmdbKeys<'t> {
    cursor: NonNull<ffi::MDB_cursor>,
    /// Next cursor operation; `None` once the cursor is exhausted or failed.
    step: Option<ffi::MDB_cursor_op>,
    _txn: PhantomData<&'t ()>,
}

impl Drop for LmdbKeys<'_> {
    fn drop(&mut self) {
        unsafe { ffi::mdb_cursor_close(self.cursor.as_ptr()) };
    }
}

fn empty_val() -> ffi::MDB_val {
    ffi::MDB_val {
        mv_size: 0,
        mv_data: ptr::null_mut(),
    }
}

impl Iterator for LmdbKeys<'_> {
    type Item = Result<Vec<u8>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let op = self.step.take()?;
        let mut key = empty_val();
        let mut data = empty_val();
        let rc = unsafe { ffi::mdb_cursor_get(self.cursor.as_ptr(), &mut key, &mut data, op) };
        match rc {
            0 => {
                self.step = Some(ffi::MDB_NEXT);
                if key.mv_size == 0 || key.mv_data.is_null() {
                    return Some(Ok(Vec::new()));
                }
                // The key points into the map and stays valid for the transaction.
                let bytes =
                    unsafe { std::slice::from_raw_parts(key.mv_data.cast::<u8>(), key.mv_size) };
                Some(Ok(bytes.to_vec()))
            }
            codes::NOT_FOUND => None,
            rc => Some(Err(Error::engine(Op::CursorNext, rc, describe(rc)))),
        }
    }
}

/// LMDB names tables with non-empty C strings; any other byte string is accepted.
fn table_name(raw: &[u8]) -> Result<CString, Error> {
    let bad_name = || {
        Error::engine(
            Op::TableOpen,
            codes::BAD_VALSIZE,
            describe(codes::BAD_VALSIZE),
        )
    };
    if raw.is_empty() {
        return Err(bad_name());
    }
    CString::new(raw).map_err(|err| bad_name().with_source(err))
}
