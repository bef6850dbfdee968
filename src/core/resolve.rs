// Table resolution inside a read transaction, with scoped close on drop.
use tracing::debug;

use crate::core::engine::ReadTxn;
use crate::core::error::{Error, ErrorKind};

/// How a failed table open should be treated.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OpenFailure {
    /// The name does not reference a table; an ordinary root key.
    NotATable,
    /// The engine could not service the open.
    EngineFailure,
}

pub fn classify(err: &Error) -> OpenFailure {
    match err.kind() {
        ErrorKind::NotFound | ErrorKind::Incompatible => OpenFailure::NotATable,
        _ => OpenFailure::EngineFailure,
    }
}

/// An open table that is closed when the guard drops.
pub struct TableGuard<'t, T: ReadTxn> {
    txn: &'t T,
    table: Option<T::Table>,
}

impl<'t, T: ReadTxn> TableGuard<'t, T> {
    pub fn table(&self) -> &T::Table {
        match &self.table {
            Some(table) => table,
            None => unreachable!("table guard holds its table until drop"),
        }
    }
}

impl<T: ReadTxn> Drop for TableGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(table) = self.table.take() {
            self.txn.close_table(table);
        }
    }
}

/// Opens the root table (`None`) or a named table. Any failure is the caller's
/// to report.
pub fn open_table<'t, T: ReadTxn>(
    txn: &'t T,
    name: Option<&[u8]>,
) -> Result<TableGuard<'t, T>, Error> {
    let table = txn.open_table(name)?;
    Ok(TableGuard {
        txn,
        table: Some(table),
    })
}

pub enum Candidate<'t, T: ReadTxn> {
    Table(TableGuard<'t, T>),
    NotATable(Error),
}

/// Tries a root key as a sub-database name.
pub fn resolve_candidate<'t, T: ReadTxn>(
    txn: &'t T,
    key: &[u8],
) -> Result<Candidate<'t, T>, Error> {
    if key.contains(&0) {
        return Ok(Candidate::NotATable(
            Error::new(ErrorKind::Incompatible).with_message("key contains a NUL byte"),
        ));
    }
    match open_table(txn, Some(key)) {
        Ok(guard) => Ok(Candidate::Table(guard)),
        Err(err) => match classify(&err) {
            OpenFailure::NotATable => {
                debug!(error = %err, "key is not a sub-database");
                Ok(Candidate::NotATable(err))
            }
            OpenFailure::EngineFailure => Err(err),
        },
    }
}
