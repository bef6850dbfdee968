// Sub-database enumeration over the root table's keys.
//
// Every root key is tried as a table name in cursor order. Keys that do not
// name a table are skipped; any other engine failure ends the walk.
use bstr::BStr;
use tracing::debug;

use crate::core::engine::ReadTxn;
use crate::core::error::Error;
use crate::core::report::ReportSink;
use crate::core::resolve::{Candidate, resolve_candidate};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Walk {
    pub reported: usize,
    pub skipped: usize,
}

enum Position {
    Positioned(Vec<u8>),
    Exhausted,
}

fn advance<I>(cursor: &mut I) -> Result<Position, Error>
where
    I: Iterator<Item = Result<Vec<u8>, Error>>,
{
    match cursor.next() {
        Some(Ok(key)) => Ok(Position::Positioned(key)),
        Some(Err(err)) => Err(err),
        None => Ok(Position::Exhausted),
    }
}

/// Reports stats for every sub-database referenced by a key of `catalog`.
pub fn walk_sub_databases<T: ReadTxn>(
    txn: &T,
    catalog: &T::Table,
    sink: &mut dyn ReportSink,
) -> Result<Walk, Error> {
    let mut cursor = txn.keys(catalog)?;
    let mut walk = Walk::default();

    while let Position::Positioned(key) = advance(&mut cursor)? {
        let guard = match resolve_candidate(txn, &key)? {
            Candidate::Table(guard) => guard,
            Candidate::NotATable(_) => {
                debug!(key = %BStr::new(&key), "skipping ordinary key");
                walk.skipped += 1;
                continue;
            }
        };
        sink.sub_database(&key)?;
        let stats = txn.stat(guard.table())?;
        sink.stats(&stats)?;
        walk.reported += 1;
    }

    debug!(reported = walk.reported, skipped = walk.skipped, "sub-database walk finished");
    Ok(walk)
}
