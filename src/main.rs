//! Purpose: `mapstat` CLI entry point.
//! Role: Binary crate root; parses args, runs one read-only inspection, prints the report.
//! Invariants: Reports and engine failures go to stdout; usage, hints, and logs go to stderr.
//! Invariants: Engine failures print as `<op> failed, error <code> <description>`.
//! Invariants: Process exit code is derived from `to_exit_code`; 0 only on a full report.
#![allow(clippy::result_large_err)]
use std::ffi::OsString;
use std::io::{self, Write};
use std::os::unix::ffi::OsStringExt;
use std::path::PathBuf;

use clap::{Parser, ValueHint, error::ErrorKind as ClapErrorKind};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

mod stat_json;

use mapstat::core::engine::Op;
use mapstat::core::error::{Error, ErrorKind, to_exit_code};
use mapstat::core::inspect::{DEFAULT_MAX_TABLES, InspectRequest, Target, inspect};
use mapstat::core::lmdb::Lmdb;
use mapstat::core::report::TextReport;
use stat_json::{JsonReport, error_json};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum OutputMode {
    Text,
    Json,
}

fn main() {
    init_tracing();
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, mode)) => {
            emit_error(&err, mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, OutputMode)> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            err.print().map_err(|io_err| {
                (
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write usage")
                        .with_source(io_err),
                    OutputMode::Text,
                )
            })?;
            let exit_code = match err.kind() {
                ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion => 0,
                _ => to_exit_code(ErrorKind::Usage),
            };
            return Ok(RunOutcome::with_code(exit_code));
        }
    };

    let mode = cli.output_mode();
    let request = cli.into_request();
    let result = match mode {
        OutputMode::Text => {
            let mut report = TextReport::new(io::stdout().lock());
            inspect(&Lmdb, &request, &mut report).map(|_| ())
        }
        OutputMode::Json => {
            let mut report = JsonReport::new(request.target == Target::All);
            inspect(&Lmdb, &request, &mut report).and_then(|_| emit_json(&report.into_value()))
        }
    };

    result
        .map(|()| RunOutcome::ok())
        .map_err(|err| add_hint(err, &request))
        .map_err(|err| (err, mode))
}

#[derive(Parser, Debug)]
#[command(
    name = "mapstat",
    version,
    about = "Report page, depth, and entry statistics of an LMDB store, read-only",
    long_about = None,
    after_help = r#"EXAMPLES
  $ mapstat ./data                 # root table stats
  $ mapstat ./data -a              # root table, then every sub-database
  $ mapstat ./data -s users -e     # env info, then one sub-database
  $ mapstat -n ./data.mdb --json   # data file path, JSON output

Set RUST_LOG=debug to trace skipped keys and lifecycle steps on stderr."#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        value_name = "DBPATH",
        help = "Store directory (or data file with --no-subdir)",
        value_hint = ValueHint::AnyPath
    )]
    dbpath: PathBuf,
    #[arg(
        short = 'a',
        long = "all",
        conflicts_with = "subdb",
        help = "Report the root table, then every sub-database it references"
    )]
    all: bool,
    #[arg(
        short = 's',
        long = "subdb",
        value_name = "SUBDB",
        help = "Report only the named sub-database"
    )]
    subdb: Option<OsString>,
    #[arg(short = 'e', long = "env", help = "Report environment info before table stats")]
    env: bool,
    #[arg(
        short = 'n',
        long = "no-subdir",
        help = "DBPATH names the data file rather than its directory"
    )]
    no_subdir: bool,
    #[arg(
        long,
        value_name = "N",
        default_value_t = DEFAULT_MAX_TABLES,
        value_parser = clap::value_parser!(u32).range(1..),
        help = "Table handle slots to reserve for -a/-s"
    )]
    max_tables: u32,
    #[arg(long, help = "Emit one JSON document instead of the text report")]
    json: bool,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else {
            OutputMode::Text
        }
    }

    fn into_request(self) -> InspectRequest {
        let target = match (self.all, self.subdb) {
            (_, Some(name)) => Target::Named(name.into_vec()),
            (true, None) => Target::All,
            (false, None) => Target::Root,
        };
        InspectRequest::new(self.dbpath)
            .with_target(target)
            .with_env_info(self.env)
            .with_no_subdir(self.no_subdir)
            .with_max_tables(self.max_tables)
    }
}

const DEFAULT_LOG_FILTER: &str = "warn";

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn add_hint(err: Error, request: &InspectRequest) -> Error {
    if err.hint().is_some() {
        return err;
    }
    match (err.op(), err.kind()) {
        (Some(Op::EnvOpen), ErrorKind::NotFound) if !request.no_subdir => err.with_hint(
            "Check DBPATH; pass --no-subdir when it names the data file itself.",
        ),
        (Some(Op::EnvOpen), ErrorKind::Corrupt) => {
            err.with_hint("DBPATH does not look like an LMDB store.")
        }
        (Some(Op::TableOpen), ErrorKind::NotFound | ErrorKind::Incompatible) => {
            err.with_hint("Run with -a to list the sub-databases this store holds.")
        }
        (Some(Op::TableOpen), ErrorKind::Capacity) => {
            let hint = format!(
                "The store has more sub-databases than --max-tables ({}); raise it.",
                request.max_tables
            );
            err.with_hint(hint)
        }
        (Some(Op::TxnBegin), ErrorKind::Capacity) => {
            err.with_hint("All reader slots are in use; retry once other readers finish.")
        }
        _ => err,
    }
}

fn emit_json(value: &Value) -> Result<(), Error> {
    let json = serde_json::to_string_pretty(value).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("json encode failed")
            .with_source(err)
    })?;
    let mut out = io::stdout().lock();
    writeln!(out, "{json}")?;
    out.flush()?;
    Ok(())
}

fn emit_error(err: &Error, mode: OutputMode) {
    match mode {
        OutputMode::Text => {
            println!("{err}");
            if let Some(hint) = err.hint() {
                eprintln!("hint: {hint}");
            }
        }
        OutputMode::Json => {
            let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
                "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}"
                    .to_string()
            });
            println!("{json}");
        }
    }
}
