// Report sinks and the fixed-format text rendering of stats and env info.
use std::io::{self, Write};

use crate::core::engine::{EnvInfo, Stats};

/// Receives report events in the order the inspector produces them.
pub trait ReportSink {
    fn env_info(&mut self, info: &EnvInfo) -> io::Result<()>;

    /// The table whose stats follow: root (`None`) or the requested named table.
    fn target(&mut self, name: Option<&[u8]>) -> io::Result<()>;

    /// An enumerated sub-database whose stats follow.
    fn sub_database(&mut self, name: &[u8]) -> io::Result<()>;

    fn stats(&mut self, stats: &Stats) -> io::Result<()>;
}

pub fn render_stats(stats: &Stats) -> String {
    format!(
        "Page size: {}\n\
         Tree depth: {}\n\
         Branch pages: {}\n\
         Leaf pages: {}\n\
         Overflow pages: {}\n\
         Entries: {}\n",
        stats.page_size,
        stats.depth,
        stats.branch_pages,
        stats.leaf_pages,
        stats.overflow_pages,
        stats.entries,
    )
}

pub fn render_env_info(info: &EnvInfo) -> String {
    format!(
        "Map size: {}\n\
         Last transaction ID: {}\n\
         Last page used: {}\n\
         Max readers: {}\n\
         Number of readers used: {}\n",
        info.map_size, info.last_txn_id, info.last_page_no, info.max_readers, info.num_readers,
    )
}

/// Streams the human-readable report as events arrive.
pub struct TextReport<W: Write> {
    out: W,
}

impl<W: Write> TextReport<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ReportSink for TextReport<W> {
    fn env_info(&mut self, info: &EnvInfo) -> io::Result<()> {
        self.out.write_all(render_env_info(info).as_bytes())
    }

    fn target(&mut self, _name: Option<&[u8]>) -> io::Result<()> {
        Ok(())
    }

    // Names are written as raw key bytes.
    fn sub_database(&mut self, name: &[u8]) -> io::Result<()> {
        self.out.write_all(b"\n")?;
        self.out.write_all(name)?;
        self.out.write_all(b"\n")
    }

    fn stats(&mut self, stats: &Stats) -> io::Result<()> {
        self.out.write_all(render_stats(stats).as_bytes())?;
        self.out.flush()
    }
}
